use stencil_core::{
    CompileError, CompilerConfig, DirList, Engine, FileLoader, SecurityPolicy,
};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Compile {
        dir: PathBuf,
        entry: String,
        policy: Option<PathBuf>,
        config: Option<PathBuf>,
        out: Option<PathBuf>,
    },
    CheckPolicy {
        file: PathBuf,
    },
}

pub fn run_from_env() -> Result<(), String> {
    run_from_args(env::args().skip(1).collect())
}

pub fn run_from_args(args: Vec<String>) -> Result<(), String> {
    match parse_command(args)? {
        CliCommand::Compile {
            dir,
            entry,
            policy,
            config,
            out,
        } => {
            let artifact = compile(dir, &entry, policy, config)?;
            match out {
                Some(out) => {
                    fs::write(&out, artifact)
                        .map_err(|e| format!("failed to write {}: {e}", out.display()))?;
                    println!("wrote {}", out.display());
                }
                None => print!("{artifact}"),
            }
            Ok(())
        }
        CliCommand::CheckPolicy { file } => {
            let policy = load_policy(&file)?;
            println!(
                "policy ok: {} trusted URI pattern(s), super globals {}, constants {}",
                policy.trusted_uri.len(),
                allowed(policy.allow_super_globals),
                allowed(policy.allow_constants),
            );
            Ok(())
        }
    }
}

fn allowed(flag: bool) -> &'static str {
    if flag {
        "allowed"
    } else {
        "denied"
    }
}

fn parse_command(args: Vec<String>) -> Result<CliCommand, String> {
    if args.is_empty() {
        return Err(help_text());
    }

    match args[0].as_str() {
        "compile" => parse_compile(args),
        "check-policy" => parse_check_policy(args),
        "-h" | "--help" | "help" => Err(help_text()),
        other => Err(format!("unknown command: {other}\n\n{}", help_text())),
    }
}

fn flag_value(args: &[String], i: usize, flag: &str) -> Result<PathBuf, String> {
    args.get(i)
        .map(PathBuf::from)
        .ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_compile(args: Vec<String>) -> Result<CliCommand, String> {
    let mut positional: Vec<String> = Vec::new();
    let mut policy: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut out: Option<PathBuf> = None;

    let mut i = 1usize;
    while i < args.len() {
        let token = &args[i];
        match token.as_str() {
            "--policy" => {
                i += 1;
                policy = Some(flag_value(&args, i, "--policy")?);
            }
            "--config" => {
                i += 1;
                config = Some(flag_value(&args, i, "--config")?);
            }
            "--out" => {
                i += 1;
                out = Some(flag_value(&args, i, "--out")?);
            }
            x if x.starts_with("--") => return Err(format!("unknown flag: {x}")),
            _ => positional.push(token.clone()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let dir = positional
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| "compile requires DIR".to_string())?;
    let entry = positional
        .next()
        .ok_or_else(|| "compile requires ENTRY".to_string())?;
    if positional.next().is_some() {
        return Err("compile takes exactly DIR and ENTRY".to_string());
    }

    Ok(CliCommand::Compile {
        dir,
        entry,
        policy,
        config,
        out,
    })
}

fn parse_check_policy(args: Vec<String>) -> Result<CliCommand, String> {
    match args.get(1..) {
        Some([file]) => Ok(CliCommand::CheckPolicy {
            file: PathBuf::from(file),
        }),
        _ => Err("check-policy requires exactly one FILE".to_string()),
    }
}

fn help_text() -> String {
    [
        "stencil CLI",
        "",
        "Commands:",
        "  stencil compile DIR ENTRY [--policy FILE] [--config FILE] [--out FILE]",
        "  stencil check-policy FILE",
        "",
        "Templates are JSON node documents. Set STENCIL_LOG to adjust logging.",
    ]
    .join("\n")
}

fn read(path: &PathBuf) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))
}

fn load_policy(path: &PathBuf) -> Result<SecurityPolicy, String> {
    SecurityPolicy::from_json(&read(path)?)
        .map_err(|e| format!("invalid policy {}: {e}", path.display()))
}

fn load_config(path: Option<&PathBuf>) -> Result<CompilerConfig, String> {
    match path {
        Some(path) => CompilerConfig::from_json(&read(path)?)
            .map_err(|e| format!("invalid config {}: {e}", path.display())),
        None => Ok(CompilerConfig::default()),
    }
}

fn describe(err: CompileError) -> String {
    format!("{} [{}]", err, err.code())
}

fn compile(
    dir: PathBuf,
    entry: &str,
    policy: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<String, String> {
    let mut config = load_config(config.as_ref())?;
    config.template_dirs = DirList::new(vec![dir]);

    let mut loader =
        FileLoader::new(config.template_dirs.clone()).with_config_dirs(config.config_dirs.clone());
    let policy = match policy {
        Some(path) => {
            let policy = Arc::new(load_policy(&path)?);
            loader = loader.with_policy(Arc::clone(&policy));
            Some(policy)
        }
        None => None,
    };
    debug!(entry, secured = policy.is_some(), "compiling");

    let mut engine = Engine::new(loader).with_config(config);
    if let Some(policy) = policy {
        engine = engine.with_policy(policy);
    }
    let compiled = engine.compile(entry).map_err(describe)?;
    info!(
        entry,
        merged = compiled.merged_functions.len(),
        dependencies = compiled.file_dependency.len(),
        "compiled"
    );
    Ok(compiled.render())
}
