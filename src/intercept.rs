// src/intercept.rs
//! Build interception: consume execution records and produce a
//! compilation database.
//!
//! The native interception shim (loaded into the build via `LD_PRELOAD`
//! or `DYLD_INSERT_LIBRARIES`) records every child process it observes
//! into `<target dir>/<pid>.cmd` files. This module runs the build with
//! that environment, parses the record files and condenses them into a
//! compilation database. The shim itself is an external collaborator;
//! only its file format is owned here.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::compilation::{Compilation, CompilationDatabase, Execution};
use crate::error::{Result, ScanwardError};

/// Group separator: terminates each execution record in a file.
pub const GS: char = '\u{1d}';
/// Record separator: between the fields of one record.
pub const RS: char = '\u{1e}';
/// Unit separator: between argv tokens inside the command field.
pub const US: char = '\u{1f}';

/// Environment variable the shim reads to find the record directory.
pub const TARGET_DIR_ENV: &str = "INTERCEPT_BUILD_TARGET_DIR";

/// Capture run configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// The build command to execute, argv style.
    pub build: Vec<String>,
    /// Where the resulting compilation database goes.
    pub cdb: PathBuf,
    /// Path to the interception shim library, when preloading is wanted.
    pub intercept_library: Option<PathBuf>,
    /// Merge entries from an existing database instead of replacing it.
    pub append: bool,
    pub verbose: u8,
}

/// Runs the build under interception and writes the compilation
/// database. Returns the build's exit code.
///
/// # Errors
/// Returns an error when the build command cannot be spawned or the
/// database cannot be written. A failing build is not an error; its
/// exit code is passed through.
pub fn capture(config: &CaptureConfig) -> Result<i32> {
    let record_dir = tempfile::Builder::new()
        .prefix("intercept-")
        .tempdir()
        .map_err(|e| ScanwardError::io(e, "<tempdir>"))?;

    let exit_code = run_build(&config.build, record_dir.path(), config)?;

    let executions = read_exec_traces(record_dir.path())?;
    let entries = post_process(&executions, config)?;
    CompilationDatabase::save(&config.cdb, &entries)?;

    if config.verbose > 0 {
        eprintln!(
            "captured {} compilation(s) into {}",
            entries.len(),
            config.cdb.display()
        );
    }
    Ok(exit_code)
}

fn run_build(build: &[String], record_dir: &Path, config: &CaptureConfig) -> Result<i32> {
    let Some((program, args)) = build.split_first() else {
        return Err(ScanwardError::Other("empty build command".into()));
    };

    let mut command = Command::new(program);
    command.args(args);
    command.env(TARGET_DIR_ENV, record_dir);
    if is_preload_disabled() {
        if config.verbose > 0 {
            eprintln!("warning: library preloading unavailable, build runs unobserved");
        }
    } else if let Some(library) = &config.intercept_library {
        if cfg!(target_os = "macos") {
            command.env("DYLD_INSERT_LIBRARIES", library);
            command.env("DYLD_FORCE_FLAT_NAMESPACE", "1");
        } else {
            command.env("LD_PRELOAD", library);
        }
    } else if config.verbose > 0 {
        eprintln!("warning: no interception library given, build runs unobserved");
    }

    let status = command
        .status()
        .map_err(|e| ScanwardError::io(e, PathBuf::from(program)))?;
    Ok(status.code().unwrap_or(1))
}

/// Reads every `*.cmd` record file under `record_dir`, sorted by name so
/// repeated runs see a stable order.
pub fn read_exec_traces(record_dir: &Path) -> Result<Vec<Execution>> {
    let mut files: Vec<PathBuf> = fs::read_dir(record_dir)
        .map_err(|e| ScanwardError::io(e, record_dir.to_path_buf()))?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|e| e == "cmd"))
        .collect();
    files.sort();

    let mut executions = Vec::new();
    for file in files {
        executions.extend(parse_exec_trace(&file)?);
    }
    Ok(executions)
}

/// Parses one record file. A single file may contain several records
/// appended by different exec calls of the same process, each terminated
/// by a group separator.
pub fn parse_exec_trace(path: &Path) -> Result<Vec<Execution>> {
    let content = fs::read_to_string(path).map_err(|e| ScanwardError::io(e, path.to_path_buf()))?;

    let mut executions = Vec::new();
    for record in content.split(GS).filter(|r| !r.is_empty()) {
        executions.push(parse_record(record, path)?);
    }
    Ok(executions)
}

fn parse_record(record: &str, path: &Path) -> Result<Execution> {
    let fields: Vec<&str> = record.split(RS).collect();
    if fields.len() < 5 {
        return Err(ScanwardError::Other(format!(
            "truncated execution record in {}",
            path.display()
        )));
    }
    let pid: u32 = fields[0].parse().map_err(|_| {
        ScanwardError::Other(format!("bad pid in execution record in {}", path.display()))
    })?;
    // fields[1] is the parent pid, fields[2] the intercepted function
    // name; neither influences database creation.
    let cwd = PathBuf::from(fields[3]);
    // every argv token ends with a unit separator, so the split leaves a
    // trailing empty token to drop
    let mut argv: Vec<String> = fields[4].split(US).map(str::to_string).collect();
    if argv.last().is_some_and(String::is_empty) {
        argv.pop();
    }
    Ok(Execution { pid, cwd, cmd: argv })
}

/// Appends one execution record to a file, mirroring the shim's writer.
/// Used by wrapper-style interception and by tests.
pub fn write_exec_trace(path: &Path, execution: &Execution, function: &str) -> Result<()> {
    let mut command = String::new();
    for token in &execution.cmd {
        command.push_str(token);
        command.push(US);
    }
    let fields = [
        execution.pid.to_string(),
        execution.pid.to_string(),
        function.to_string(),
        execution.cwd.display().to_string(),
        command,
    ];
    let mut payload = fields.join(&RS.to_string());
    payload.push(GS);

    let mut handle = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ScanwardError::io(e, path.to_path_buf()))?;
    handle
        .write_all(payload.as_bytes())
        .map_err(|e| ScanwardError::io(e, path.to_path_buf()))?;
    Ok(())
}

/// Condenses raw executions into unique compilations. Wrapper-induced
/// duplicates (same command, different compiler spelling) collapse on
/// the formatted database entry.
fn post_process(executions: &[Execution], config: &CaptureConfig) -> Result<Vec<Compilation>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut entries: Vec<Compilation> = Vec::new();

    if config.append && config.cdb.is_file() {
        for previous in CompilationDatabase::load(&config.cdb)? {
            if seen.insert(entry_key(&previous)) {
                entries.push(previous);
            }
        }
    }

    for execution in executions {
        match Compilation::from_execution(execution) {
            Ok(compilations) => {
                for compilation in compilations {
                    if seen.insert(entry_key(&compilation)) {
                        entries.push(compilation);
                    }
                }
            }
            Err(e) => {
                if config.verbose > 0 {
                    eprintln!("warning: skipping recorded execution: {e}");
                }
            }
        }
    }
    Ok(entries)
}

fn entry_key(compilation: &Compilation) -> String {
    format!(
        "{}:{}:{}",
        compilation.directory.display(),
        compilation.source.display(),
        compilation.flags.join(" ")
    )
}

/// A build whose first token looks like a configure step needs no
/// analysis; it only probes the toolchain.
#[must_use]
pub fn need_analyzer(build: &[String]) -> bool {
    build
        .first()
        .is_some_and(|first| !first.contains("configure") && !first.contains("autogen"))
}

/// True when preloading cannot work and wrapper interception is the
/// only option on this platform.
#[must_use]
pub fn is_preload_disabled() -> bool {
    cfg!(windows) || env::var_os("SCANWARD_NO_PRELOAD").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exec(dir: &Path, cmd: &[&str]) -> Execution {
        Execution {
            pid: 42,
            cwd: dir.to_path_buf(),
            cmd: cmd.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn record_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("42.cmd");
        let original = exec(dir.path(), &["cc", "-c", "main.c"]);

        write_exec_trace(&file, &original, "execve").unwrap();
        write_exec_trace(&file, &original, "execve").unwrap();

        let parsed = parse_exec_trace(&file).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].pid, 42);
        assert_eq!(parsed[0].cwd, dir.path());
        assert_eq!(parsed[0].cmd, original.cmd);
    }

    #[test]
    fn empty_argv_token_is_terminator_not_argument() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("7.cmd");
        write_exec_trace(&file, &exec(dir.path(), &["cc", "-c", "x.c"]), "posix_spawn").unwrap();
        let parsed = parse_exec_trace(&file).unwrap();
        assert_eq!(parsed[0].cmd.len(), 3);
    }

    #[test]
    fn truncated_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("9.cmd");
        fs::write(&file, format!("13{RS}12{GS}")).unwrap();
        assert!(parse_exec_trace(&file).is_err());
    }

    #[test]
    fn parses_records_as_the_shim_writes_them() {
        // byte-exact layout of the preload library's writer: fields
        // joined by RS, argv tokens each followed by US, GS terminator
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("123.cmd");
        fs::write(
            &file,
            format!("123{RS}122{RS}execve{RS}/tmp{RS}cc{US}-c{US}main.c{US}{GS}"),
        )
        .unwrap();

        let parsed = parse_exec_trace(&file).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].pid, 123);
        assert_eq!(parsed[0].cwd, Path::new("/tmp"));
        assert_eq!(parsed[0].cmd, vec!["cc", "-c", "main.c"]);
    }

    #[test]
    fn post_process_dedups_wrapper_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("main.c");
        fs::write(&source, "int main() { return 0; }\n").unwrap();

        let config = CaptureConfig {
            build: vec!["true".into()],
            cdb: dir.path().join("compile_commands.json"),
            intercept_library: None,
            append: false,
            verbose: 0,
        };
        let executions = vec![
            exec(dir.path(), &["cc", "-c", "main.c"]),
            exec(dir.path(), &["gcc", "-c", "main.c"]),
        ];
        let entries = post_process(&executions, &config).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn preload_is_disabled_by_environment_override() {
        env::set_var("SCANWARD_NO_PRELOAD", "1");
        assert!(is_preload_disabled());
        env::remove_var("SCANWARD_NO_PRELOAD");
        assert_eq!(is_preload_disabled(), cfg!(windows));
    }

    #[test]
    fn configure_builds_skip_analysis() {
        assert!(!need_analyzer(&["./configure".to_string()]));
        assert!(!need_analyzer(&["./autogen.sh".to_string()]));
        assert!(need_analyzer(&["make".to_string(), "all".to_string()]));
        assert!(!need_analyzer(&[]));
    }
}
