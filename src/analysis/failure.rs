// src/analysis/failure.rs
//! Persists enough context about failed analyzer runs to reproduce and
//! file a useful report: the preprocessed source, the exact command and
//! the captured stderr, all under `<output>/failures/`.

use std::fs;
use std::io::Write;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use super::AnalysisTask;
use crate::clang;
use crate::config::AnalyzeConfig;
use crate::error::{Result, ScanwardError};

/// Records one analyzer failure. Reporting is best effort: any error
/// while writing the dossier is logged and swallowed, the analysis run
/// itself must not fail because of it.
pub fn report_failure(
    config: &AnalyzeConfig,
    task: &AnalysisTask,
    status: &ExitStatus,
    stderr: &str,
) {
    if let Err(e) = try_report(config, task, status, stderr) {
        eprintln!(
            "failed to record analyzer failure for {}: {e}",
            task.source.display()
        );
    }
}

fn try_report(
    config: &AnalyzeConfig,
    task: &AnalysisTask,
    status: &ExitStatus,
    stderr: &str,
) -> Result<()> {
    let failures = config.output_dir.join("failures");
    fs::create_dir_all(&failures).map_err(|e| ScanwardError::io(e, failures.clone()))?;

    let name = preprocessed_path(&failures, &task.language)?;
    let command = preprocess_command(config, task, &name);
    // regenerate the preprocessed source; its own failure is irrelevant
    let _ = Command::new(&command[0])
        .args(&command[1..])
        .current_dir(&task.directory)
        .output();

    let info = PathBuf::from(format!("{}.info.txt", name.display()));
    write_info(&info, task, status, &command, config)?;

    let errors = PathBuf::from(format!("{}.stderr.txt", name.display()));
    fs::write(&errors, stderr).map_err(|e| ScanwardError::io(e, errors))?;
    Ok(())
}

/// A crash is a signal-terminated analyzer; everything else failed on
/// its own terms (usually invalid input it could not parse).
#[must_use]
pub fn classify_failure(status: &ExitStatus) -> &'static str {
    if status.signal().is_some() {
        "Crash"
    } else {
        "Other Error"
    }
}

/// Unique dump file in the failures directory, named after the
/// preprocessed-source extension for the task's language.
fn preprocessed_path(failures: &Path, language: &str) -> Result<PathBuf> {
    let extension = match language {
        "objective-c++" => ".mii",
        "objective-c" => ".mi",
        "c++" => ".ii",
        _ => ".i",
    };
    let file = tempfile::Builder::new()
        .prefix("clang_crash_")
        .suffix(extension)
        .tempfile_in(failures)
        .map_err(|e| ScanwardError::io(e, failures.to_path_buf()))?;
    let (_, path) = file
        .keep()
        .map_err(|e| ScanwardError::io(e.error, failures.to_path_buf()))?;
    Ok(path)
}

fn preprocess_command(config: &AnalyzeConfig, task: &AnalysisTask, target: &Path) -> Vec<String> {
    let mut command = vec![
        config.clang.display().to_string(),
        "-fsyntax-only".to_string(),
        "-E".to_string(),
    ];
    command.extend(task.flags.iter().cloned());
    command.push(task.source.display().to_string());
    command.push("-o".to_string());
    command.push(target.display().to_string());
    command
}

fn write_info(
    path: &Path,
    task: &AnalysisTask,
    status: &ExitStatus,
    command: &[String],
    config: &AnalyzeConfig,
) -> Result<()> {
    let mut handle =
        fs::File::create(path).map_err(|e| ScanwardError::io(e, path.to_path_buf()))?;
    let write = |handle: &mut fs::File, line: &str| -> Result<()> {
        writeln!(handle, "{line}").map_err(|e| ScanwardError::io(e, path.to_path_buf()))
    };

    write(&mut handle, &task.source.display().to_string())?;
    write(&mut handle, classify_failure(status))?;
    // escaped so the reproduction command survives a copy-paste
    write(&mut handle, &crate::shell::encode(command))?;
    write(&mut handle, &uname())?;
    let version = clang::get_version(&config.clang).unwrap_or_else(|_| "unknown".to_string());
    write(&mut handle, &version)?;
    Ok(())
}

fn uname() -> String {
    Command::new("uname")
        .arg("-a")
        .output()
        .ok()
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn exit_status(ok: bool) -> ExitStatus {
        let program = if ok { "true" } else { "false" };
        Command::new(program).status().unwrap()
    }

    #[test]
    fn plain_failure_is_not_a_crash() {
        assert_eq!(classify_failure(&exit_status(false)), "Other Error");
        assert_eq!(classify_failure(&exit_status(true)), "Other Error");
    }

    #[test]
    fn signal_death_is_a_crash() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        child.kill().unwrap();
        let status = child.wait().unwrap();
        assert_eq!(classify_failure(&status), "Crash");
    }

    #[test]
    fn preprocessed_extension_follows_language() {
        let dir = tempfile::tempdir().unwrap();
        let path = preprocessed_path(dir.path(), "c++").unwrap();
        assert_eq!(path.extension().unwrap(), "ii");
        let path = preprocessed_path(dir.path(), "c").unwrap();
        assert_eq!(path.extension().unwrap(), "i");
    }
}
