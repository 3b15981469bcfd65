// src/cli/handlers.rs
//! Wiring between parsed arguments and the capture/analyze machinery.

use std::fs;
use std::path::{Path, PathBuf};

use super::args::{AnalyzerArgs, CaptureArgs};
use crate::clang;
use crate::compilation::CompilationDatabase;
use crate::config::{AnalyzeConfig, AnalyzerTuning, CtuConfig};
use crate::dispatch;
use crate::error::{Result, ScanwardError};
use crate::intercept::{self, CaptureConfig};
use crate::report::{self, ReportConfig};

/// `capture`: wrap the build, write the database, pass the build's exit
/// code through.
pub fn handle_capture(args: &CaptureArgs, build: &[String], verbose: u8) -> Result<i32> {
    let config = CaptureConfig {
        build: build.to_vec(),
        cdb: args.cdb.clone(),
        intercept_library: args.intercept_library.clone(),
        append: args.append,
        verbose,
    };
    intercept::capture(&config)
}

/// `analyze`: run the analyzer over an existing compilation database.
pub fn handle_analyze(args: &AnalyzerArgs, cdb: &Path, verbose: u8) -> Result<i32> {
    if args.help_checkers {
        return list_checkers(args);
    }
    let output_dir = create_report_dir(&args.output)?;
    let config = build_config(args, &output_dir, verbose)?;
    run_analysis(args, &config, cdb)
}

/// `scan`: capture the build into the report directory, then analyze
/// the result. Configure-style builds are only wrapped, not analyzed.
pub fn handle_scan(
    capture_args: &CaptureArgs,
    analyzer_args: &AnalyzerArgs,
    build: &[String],
    verbose: u8,
) -> Result<i32> {
    if analyzer_args.help_checkers {
        return list_checkers(analyzer_args);
    }
    if !intercept::need_analyzer(build) {
        if verbose > 0 {
            eprintln!("configure-like build command, running it without analysis");
        }
        return handle_capture(capture_args, build, verbose);
    }

    let output_dir = create_report_dir(&analyzer_args.output)?;
    let cdb = output_dir.join("compile_commands.json");
    let capture_config = CaptureConfig {
        build: build.to_vec(),
        cdb: cdb.clone(),
        intercept_library: capture_args.intercept_library.clone(),
        append: false,
        verbose,
    };
    let build_exit = intercept::capture(&capture_config)?;
    if build_exit != 0 {
        eprintln!("build command failed with exit code {build_exit}, analyzing anyway");
    }

    let config = build_config(analyzer_args, &output_dir, verbose)?;
    let analysis_exit = run_analysis(analyzer_args, &config, &cdb)?;
    Ok(if analyzer_args.status_bugs {
        analysis_exit
    } else {
        build_exit
    })
}

/// Prints the checker set the configured analyzer enables by default.
fn list_checkers(args: &AnalyzerArgs) -> Result<i32> {
    let clang = args
        .use_analyzer
        .clone()
        .unwrap_or_else(|| PathBuf::from("clang"));
    for checker in clang::get_default_checkers(&clang)? {
        println!("{checker}");
    }
    Ok(0)
}

fn run_analysis(args: &AnalyzerArgs, config: &AnalyzeConfig, cdb: &Path) -> Result<i32> {
    let compilations = CompilationDatabase::load(cdb)?;
    if config.verbose > 0 {
        eprintln!("analyzing {} compilation(s)", compilations.len());
    }
    dispatch::run(config, &compilations)?;

    let clang_version =
        clang::get_version(&config.clang).unwrap_or_else(|_| "unknown".to_string());
    let report_config = ReportConfig {
        output_dir: config.output_dir.clone(),
        output_format: config.output_format,
        command_line: std::env::args().collect::<Vec<_>>().join(" "),
        clang_version,
        compilation_db: cdb.is_file().then(|| cdb.to_path_buf()),
        keep_empty: args.keep_empty,
        verbose: config.verbose,
    };
    let result = report::document(&report_config)?;

    close_report_dir(&config.output_dir, result.total(), args.keep_empty);
    Ok(if args.status_bugs && result.total() > 0 {
        1
    } else {
        0
    })
}

/// One timestamped directory per run, so consecutive runs never clobber
/// each other's reports.
pub fn create_report_dir(parent: &Path) -> Result<PathBuf> {
    fs::create_dir_all(parent).map_err(|e| ScanwardError::io(e, parent.to_path_buf()))?;
    let stamp = chrono::Local::now().format("scanward-%Y-%m-%d-%H%M%S-");
    let dir = tempfile::Builder::new()
        .prefix(&stamp.to_string())
        .tempdir_in(parent)
        .map_err(|e| ScanwardError::io(e, parent.to_path_buf()))?;
    Ok(dir.keep())
}

fn close_report_dir(dir: &Path, findings: usize, keep_empty: bool) {
    if findings > 0 {
        println!("scanward: {findings} finding(s), report directory {}", dir.display());
    } else if keep_empty {
        println!("scanward: no findings, report directory kept at {}", dir.display());
    } else {
        println!("scanward: no findings");
        if let Err(e) = fs::remove_dir_all(dir) {
            eprintln!("failed to remove empty report directory {}: {e}", dir.display());
        }
    }
}

fn build_config(args: &AnalyzerArgs, output_dir: &Path, verbose: u8) -> Result<AnalyzeConfig> {
    let tuning = AnalyzerTuning {
        store_model: args.store.clone(),
        constraints_model: args.constraints.clone(),
        internal_stats: false,
        analyze_headers: false,
        stats: false,
        maxloop: args.maxloop,
        output_format: Some(args.format),
        analyzer_config: args.analyzer_config.clone(),
        enable_checker: AnalyzerArgs::split_checkers(&args.enable_checker),
        disable_checker: AnalyzerArgs::split_checkers(&args.disable_checker),
        plugins: args.plugins.clone(),
        verbose,
    };

    let ctu = args.ctu.then(|| CtuConfig {
        dir: absolute(&args.ctu_dir),
        extdef_map_tool: args.extdef_map_tool.clone(),
    });

    Ok(AnalyzeConfig {
        clang: args
            .use_analyzer
            .clone()
            .unwrap_or_else(|| PathBuf::from("clang")),
        output_dir: output_dir.to_path_buf(),
        output_format: args.format,
        output_failures: !args.no_failure_reports,
        direct_args: tuning.direct_args(),
        force_debug: args.force_debug,
        excludes: args.excludes.iter().map(|p| absolute(p)).collect(),
        analyzer_target: args.analyzer_target.clone(),
        ctu,
        verbose,
    })
}

/// Excluded and CTU directories are compared against absolute source
/// paths; relative arguments are anchored at the current directory.
fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;

    fn analyzer_args() -> AnalyzerArgs {
        AnalyzerArgs {
            output: PathBuf::from("/tmp"),
            format: OutputFormat::Html,
            excludes: vec![],
            use_analyzer: None,
            store: None,
            constraints: None,
            maxloop: None,
            enable_checker: vec![],
            disable_checker: vec![],
            help_checkers: false,
            plugins: vec![],
            analyzer_config: None,
            analyzer_target: None,
            ctu: false,
            ctu_dir: PathBuf::from("ctu-dir"),
            extdef_map_tool: "clang-extdef-mapping".to_string(),
            force_debug: false,
            no_failure_reports: false,
            status_bugs: false,
            keep_empty: false,
        }
    }

    #[test]
    fn help_checkers_lists_and_skips_the_analysis() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cc = dir.path().join("fakecc");
        fs::write(
            &cc,
            "#!/bin/sh\necho '\"-cc1\" \"-analyzer-checker=core.DivideZero\"' >&2\nexit 0\n",
        )
        .unwrap();
        fs::set_permissions(&cc, fs::Permissions::from_mode(0o755)).unwrap();

        let mut args = analyzer_args();
        args.help_checkers = true;
        args.use_analyzer = Some(cc);
        args.output = dir.path().join("reports");

        let code = handle_analyze(&args, Path::new("/no/such/db.json"), 0).unwrap();
        assert_eq!(code, 0);
        // listing checkers must not leave a report directory behind
        assert!(!args.output.exists());
    }

    #[test]
    fn report_dir_is_timestamped_and_unique() {
        let parent = tempfile::tempdir().unwrap();
        let first = create_report_dir(parent.path()).unwrap();
        let second = create_report_dir(parent.path()).unwrap();
        assert_ne!(first, second);
        for dir in [&first, &second] {
            assert!(dir.is_dir());
            let name = dir.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("scanward-"));
        }
    }

    #[test]
    fn config_carries_tuning_into_direct_args() {
        let mut args = analyzer_args();
        args.store = Some("region".to_string());
        args.enable_checker = vec!["alpha.core,alpha.unix".to_string()];

        let dir = tempfile::tempdir().unwrap();
        let config = build_config(&args, dir.path(), 1).unwrap();
        assert!(config
            .direct_args
            .contains(&"-analyzer-store=region".to_string()));
        assert!(config
            .direct_args
            .contains(&"-analyzer-checker".to_string()));
        assert!(config
            .direct_args
            .contains(&"alpha.core,alpha.unix".to_string()));
        assert!(config.output_failures);
        assert!(config.ctu.is_none());
    }

    #[test]
    fn ctu_dir_is_anchored_absolute() {
        let mut args = analyzer_args();
        args.ctu = true;
        let dir = tempfile::tempdir().unwrap();
        let config = build_config(&args, dir.path(), 0).unwrap();
        assert!(config.ctu.unwrap().dir.is_absolute());
    }
}
