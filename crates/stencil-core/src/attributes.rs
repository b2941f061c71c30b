//! Attribute contracts and the resolver that checks tag arguments against them.

use crate::error::AttributeError;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Wildcard optional name: accept any extra named attribute.
pub const ANY: &str = "_any";

/// Declared argument shape of one tag (or one grammar variant of a tag).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeContract {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
    pub shorttag_order: &'static [&'static str],
    pub option_flags: &'static [&'static str],
}

impl AttributeContract {
    pub const EMPTY: AttributeContract = AttributeContract {
        required: &[],
        optional: &[],
        shorttag_order: &[],
        option_flags: &[],
    };

    pub fn accepts_any(&self) -> bool {
        self.optional.contains(&ANY)
    }

    fn is_flag(&self, name: &str) -> bool {
        self.option_flags.contains(&name)
    }

    fn is_declared(&self, name: &str) -> bool {
        name != ANY && (self.required.contains(&name) || self.optional.contains(&name))
    }
}

/// Lowered assignment: both sides are emitted code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweredAssign {
    pub var: String,
    pub value: String,
}

/// A resolved attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    /// Target-language expression code.
    Code(String),
    Flag(bool),
    Assign(LoweredAssign),
    AssignList(Vec<LoweredAssign>),
}

impl AttrValue {
    fn describe(&self) -> String {
        match self {
            Self::Code(code) => code.clone(),
            Self::Flag(flag) => flag.to_string(),
            Self::Assign(assign) => format!("{} = {}", assign.var, assign.value),
            Self::AssignList(list) => list
                .iter()
                .map(|a| format!("{} = {}", a.var, a.value))
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// One tag argument after expression lowering, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Positional(AttrValue),
    Named(String, AttrValue),
    Flag(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAttributes {
    values: HashMap<String, AttrValue>,
    extra: IndexMap<String, AttrValue>,
}

impl ResolvedAttributes {
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Code of an optional expression attribute.
    pub fn code(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(AttrValue::Code(code)) => Some(code.as_str()),
            _ => None,
        }
    }

    /// Option flags default to false when absent.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(AttrValue::Flag(true)))
    }

    pub fn require_code(&self, name: &str) -> Result<&str, AttributeError> {
        match self.values.get(name) {
            Some(AttrValue::Code(code)) => Ok(code.as_str()),
            Some(other) => Err(invalid(name, other)),
            None => Err(AttributeError::MissingRequiredAttribute(name.to_string())),
        }
    }

    pub fn require_assign(&self, name: &str) -> Result<&LoweredAssign, AttributeError> {
        match self.values.get(name) {
            Some(AttrValue::Assign(assign)) => Ok(assign),
            Some(AttrValue::AssignList(list)) if list.len() == 1 => Ok(&list[0]),
            Some(other) => Err(invalid(name, other)),
            None => Err(AttributeError::MissingRequiredAttribute(name.to_string())),
        }
    }

    pub fn require_assign_list(&self, name: &str) -> Result<Vec<&LoweredAssign>, AttributeError> {
        match self.values.get(name) {
            Some(AttrValue::Assign(assign)) => Ok(vec![assign]),
            Some(AttrValue::AssignList(list)) => Ok(list.iter().collect()),
            Some(other) => Err(invalid(name, other)),
            None => Err(AttributeError::MissingRequiredAttribute(name.to_string())),
        }
    }

    /// Wildcard overflow, in the order the names were supplied.
    pub fn extra(&self) -> &IndexMap<String, AttrValue> {
        &self.extra
    }

    fn insert(&mut self, name: String, value: AttrValue) -> Result<(), AttributeError> {
        if self.values.contains_key(&name) || self.extra.contains_key(&name) {
            return Err(AttributeError::DuplicateAttribute(name));
        }
        self.values.insert(name, value);
        Ok(())
    }

    fn insert_extra(&mut self, name: String, value: AttrValue) -> Result<(), AttributeError> {
        if self.values.contains_key(&name) || self.extra.contains_key(&name) {
            return Err(AttributeError::DuplicateAttribute(name));
        }
        self.extra.insert(name, value);
        Ok(())
    }
}

fn invalid(name: &str, value: &AttrValue) -> AttributeError {
    AttributeError::InvalidAttributeValue {
        name: name.to_string(),
        value: value.describe(),
    }
}

/// Check `args` against `contract` and map them to names.
pub fn resolve_attributes(
    args: Vec<Arg>,
    contract: &AttributeContract,
) -> Result<ResolvedAttributes, AttributeError> {
    let mut resolved = ResolvedAttributes::default();
    let mut position = 0usize;

    for arg in args {
        match arg {
            Arg::Positional(value) => {
                match contract.shorttag_order.get(position) {
                    Some(name) => resolved.insert((*name).to_string(), value)?,
                    None if contract.accepts_any() => {
                        resolved.insert_extra(position.to_string(), value)?
                    }
                    None => {
                        return Err(AttributeError::TooManyAttributes {
                            max: contract.shorttag_order.len(),
                        });
                    }
                }
                position += 1;
            }
            Arg::Flag(name) => {
                if !contract.is_flag(&name) {
                    return Err(AttributeError::UnknownAttribute(name));
                }
                resolved.insert(name, AttrValue::Flag(true))?;
            }
            Arg::Named(name, value) => {
                if contract.is_flag(&name) {
                    let flag = flag_value(&name, &value)?;
                    resolved.insert(name, AttrValue::Flag(flag))?;
                } else if contract.is_declared(&name) {
                    resolved.insert(name, value)?;
                } else if contract.accepts_any() {
                    resolved.insert_extra(name, value)?;
                } else {
                    return Err(AttributeError::UnknownAttribute(name));
                }
            }
        }
    }

    for name in contract.required {
        if !resolved.contains(name) {
            return Err(AttributeError::MissingRequiredAttribute((*name).to_string()));
        }
    }

    Ok(resolved)
}

fn flag_value(name: &str, value: &AttrValue) -> Result<bool, AttributeError> {
    let code = match value {
        AttrValue::Flag(flag) => return Ok(*flag),
        AttrValue::Code(code) => code.trim().trim_matches(|c| c == '\'' || c == '"'),
        other => return Err(invalid(name, other)),
    };
    match code.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}
