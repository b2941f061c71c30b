//! Small helpers for building emitted code text.

/// Single-quoted string literal in the target language.
pub fn quote_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Template variable record for a bare variable name.
pub fn var_ref(name: &str) -> String {
    var_ref_code(&quote_str(name))
}

/// Template variable record for a name given as code.
pub fn var_ref_code(name_code: &str) -> String {
    format!("$_tpl->vars[{name_code}]")
}

pub fn echo_text(text: &str) -> String {
    format!("echo {};\n", quote_str(text))
}

/// Text placed inside a `/* ... */` comment; `*/` must not close it early.
pub fn comment_text(text: &str) -> String {
    text.replace("*/", "* /")
}

fn count_unescaped(body: &str, quote: char) -> usize {
    let mut count = 0;
    let mut escaped = false;
    for ch in body.chars() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == quote {
            count += 1;
        }
    }
    count
}

/// Whether `code` is one quoted string literal with nothing evaluated at run
/// time: no call parentheses, no variable dereference and, for double
/// quotes, no `{` interpolation.
pub fn is_literal_string(code: &str) -> bool {
    let code = code.trim();
    let Some(quote) = code.chars().next().filter(|c| *c == '\'' || *c == '"') else {
        return false;
    };
    if code.len() < 2 || !code.ends_with(quote) || count_unescaped(code, quote) != 2 {
        return false;
    }
    if code.contains('(') || code.contains('$') {
        return false;
    }
    !(quote == '"' && code.contains('{'))
}

/// Value of a literal string expression, with escapes resolved.
pub fn unquote_literal(code: &str) -> Option<String> {
    if !is_literal_string(code) {
        return None;
    }
    let code = code.trim();
    let quote = code.chars().next()?;
    let body = &code[1..code.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match (quote, chars.next()) {
            (_, Some('\\')) => out.push('\\'),
            (q, Some(c)) if c == q => out.push(c),
            ('"', Some('n')) => out.push('\n'),
            ('"', Some('t')) => out.push('\t'),
            ('"', Some('r')) => out.push('\r'),
            (_, Some(other)) => {
                out.push('\\');
                out.push(other);
            }
            (_, None) => out.push('\\'),
        }
    }
    Some(out)
}

pub fn parse_int_literal(code: &str) -> Option<i64> {
    code.trim().parse().ok()
}

/// String or number literal.
pub fn is_static_literal(code: &str) -> bool {
    let code = code.trim();
    is_literal_string(code) || code.parse::<f64>().is_ok_and(|n| n.is_finite())
}
