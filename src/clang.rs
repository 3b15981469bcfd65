// src/clang.rs
//! Clang introspection: version banner and argument reification.
//!
//! Compiler drivers expand high-level flags (response files, default
//! macros, target defaults) into many low-level ones. Before executing
//! an analyzer command we ask the driver for its fully expanded argument
//! list via the `-###` dry-run flag and use that instead of the raw
//! command line.

use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, ScanwardError};

static CLANG_ERROR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^clang: error:").unwrap());
static QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^"([^"]*)"$"#).unwrap());
static CHECKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-analyzer-checker=(.*)$").unwrap());

/// Returns the first line of `clang -v`, the version banner.
///
/// # Errors
/// Returns an error when the compiler binary cannot be executed.
pub fn get_version(clang: &Path) -> Result<String> {
    let output = Command::new(clang)
        .arg("-v")
        .output()
        .map_err(|e| ScanwardError::io(e, clang.to_path_buf()))?;
    let combined = [output.stdout, output.stderr].concat();
    let text = String::from_utf8_lossy(&combined);
    text.lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| ScanwardError::Compiler("compiler version banner is empty".into()))
}

/// Reifies a driver command into its fully expanded argument vector.
///
/// The driver is invoked with `-###` inserted after the executable; the
/// last non-empty output line is the quote-escaped low-level command,
/// which is shell-tokenized and unquoted.
///
/// # Errors
/// Returns a classified error when the driver exits non-zero or prints
/// an error line; the unexpanded command is never used silently.
pub fn get_arguments(cwd: &Path, command: &[String]) -> Result<Vec<String>> {
    let Some((program, args)) = command.split_first() else {
        return Err(ScanwardError::Compiler("empty compiler command".into()));
    };

    let output = Command::new(program)
        .arg("-###")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| ScanwardError::io(e, program))?;

    let combined = [output.stdout, output.stderr].concat();
    let text = String::from_utf8_lossy(&combined);
    let last_line = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .next_back()
        .ok_or_else(|| ScanwardError::Compiler("no output from compiler dry run".into()))?;

    if !output.status.success() || CLANG_ERROR_RE.is_match(last_line) {
        return Err(ScanwardError::Compiler(last_line.to_string()));
    }

    let tokens = shell_words::split(last_line)
        .map_err(|e| ScanwardError::Compiler(format!("cannot tokenize dry-run output: {e}")))?;
    Ok(tokens.iter().map(|t| strip_quotes(t)).collect())
}

fn strip_quotes(token: &str) -> String {
    QUOTED_RE
        .captures(token)
        .map_or_else(|| token.to_string(), |c| c[1].to_string())
}

/// Queries the default checker set by reifying an `--analyze` call per
/// language and collecting the `-analyzer-checker=` arguments.
pub fn get_default_checkers(clang: &Path) -> Result<Vec<String>> {
    let mut checkers = Vec::new();
    for language in ["c", "c++", "objective-c", "objective-c++"] {
        let command = vec![
            clang.display().to_string(),
            "--analyze".into(),
            "-x".into(),
            language.into(),
            "-".into(),
        ];
        for arg in get_arguments(Path::new("."), &command)? {
            if let Some(caps) = CHECKER_RE.captures(&arg) {
                checkers.push(caps[1].to_string());
            }
        }
    }
    checkers.sort();
    checkers.dedup();
    Ok(checkers)
}
