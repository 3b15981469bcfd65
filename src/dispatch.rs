// src/dispatch.rs
//! Fans analyzer tasks out over a worker pool and collects their
//! results. With CTU enabled the run happens in two full passes with a
//! hard barrier in between: every translation unit is collected before
//! the merged definition map exists, and no analysis may start earlier.

use rayon::prelude::*;

use crate::analysis::{self, AnalysisTask, TaskResult};
use crate::compilation::Compilation;
use crate::config::{AnalyzeConfig, CtuPhase};
use crate::ctu;
use crate::error::{Result, ScanwardError};

/// Runs the whole analysis for a set of compilations and returns the
/// per-task results of the final (analyze) pass.
///
/// # Errors
/// Fails on pool construction or CTU directory preparation. A
/// compilation whose flag list cannot be planned is reported and
/// skipped; individual analyzer failures are results, not errors.
pub fn run(config: &AnalyzeConfig, compilations: &[Compilation]) -> Result<Vec<TaskResult>> {
    let pool = build_pool(config)?;

    if let Some(ctu_config) = &config.ctu {
        ctu::prepare_ctu_dir(ctu_config)?;

        let collect = plan_all(config, compilations, Some(CtuPhase::Collect));
        let collect_results = run_tasks(&pool, config, &collect);
        report_results(config, &collect_results);

        let merged = ctu::merge_function_maps(&ctu_config.dir)?;
        if config.verbose > 0 {
            eprintln!("merged external definition map: {merged} symbols");
        }

        let analyze = plan_all(config, compilations, Some(CtuPhase::Analyze));
        let results = run_tasks(&pool, config, &analyze);
        report_results(config, &results);
        return Ok(results);
    }

    let tasks = plan_all(config, compilations, None);
    let results = run_tasks(&pool, config, &tasks);
    report_results(config, &results);
    Ok(results)
}

/// One worker per core, except verbose runs where interleaved output
/// would be unreadable.
fn build_pool(config: &AnalyzeConfig) -> Result<rayon::ThreadPool> {
    let threads = if config.verbose > 2 { 1 } else { 0 };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| ScanwardError::Other(format!("failed to build worker pool: {e}")))
}

/// Plans every compilation that can be planned. A compilation with a
/// malformed flag list costs one warning, never the rest of the run.
fn plan_all(
    config: &AnalyzeConfig,
    compilations: &[Compilation],
    phase: Option<CtuPhase>,
) -> Vec<AnalysisTask> {
    let mut tasks = Vec::with_capacity(compilations.len());
    for compilation in compilations {
        match analysis::plan_task(config, compilation, phase) {
            Ok(Some(task)) => tasks.push(task),
            Ok(None) => {}
            Err(e) => {
                eprintln!(
                    "warning: skipping {}: {e}",
                    compilation.source.display()
                );
            }
        }
    }
    tasks
}

fn run_tasks(
    pool: &rayon::ThreadPool,
    config: &AnalyzeConfig,
    tasks: &[AnalysisTask],
) -> Vec<TaskResult> {
    pool.install(|| {
        tasks
            .par_iter()
            .map(|task| analysis::execute(config, task))
            .collect()
    })
}

fn report_results(config: &AnalyzeConfig, results: &[TaskResult]) {
    for result in results {
        if !result.output.is_empty() && config.verbose > 0 {
            eprint!("{}", result.output);
        }
        if !result.succeeded() && config.verbose > 0 {
            eprintln!(
                "analysis of {} failed with exit code {}",
                result.source.display(),
                result.exit_code
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilation::CompilerKind;
    use crate::config::OutputFormat;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// A stand-in driver: `-###` echoes a plain `true` invocation back,
    /// so the reified command always succeeds without a real compiler.
    fn fake_clang(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("fake-clang");
        fs::write(
            &path,
            "#!/bin/sh\nfor a in \"$@\"; do\n  if [ \"$a\" = '-###' ]; then echo 'true' >&2; exit 0; fi\ndone\nexit 0\n",
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn dispatch_runs_every_planned_task() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("main.c");
        fs::write(&source, "int main(void) { return 0; }\n").unwrap();

        let config = AnalyzeConfig {
            clang: fake_clang(dir.path()),
            output_dir: dir.path().to_path_buf(),
            output_format: OutputFormat::Html,
            output_failures: false,
            direct_args: Vec::new(),
            force_debug: false,
            excludes: Vec::new(),
            analyzer_target: None,
            ctu: None,
            verbose: 0,
        };
        let compilations = vec![Compilation {
            compiler: CompilerKind::C,
            flags: vec![],
            source,
            directory: dir.path().to_path_buf(),
        }];

        let results = run(&config, &compilations).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].succeeded());
    }

    #[test]
    fn skipped_compilations_produce_no_results() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalyzeConfig {
            clang: fake_clang(dir.path()),
            output_dir: dir.path().to_path_buf(),
            output_format: OutputFormat::Html,
            output_failures: false,
            direct_args: Vec::new(),
            force_debug: false,
            excludes: vec![dir.path().to_path_buf()],
            analyzer_target: None,
            ctu: None,
            verbose: 0,
        };
        let compilations = vec![Compilation {
            compiler: CompilerKind::C,
            flags: vec![],
            source: dir.path().join("main.c"),
            directory: dir.path().to_path_buf(),
        }];

        let results = run(&config, &compilations).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn malformed_flag_list_does_not_abort_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.c");
        let bad = dir.path().join("bad.c");
        fs::write(&good, "int main(void) { return 0; }\n").unwrap();
        fs::write(&bad, "int x;\n").unwrap();

        let config = AnalyzeConfig {
            clang: fake_clang(dir.path()),
            output_dir: dir.path().to_path_buf(),
            output_format: OutputFormat::Html,
            output_failures: false,
            direct_args: Vec::new(),
            force_debug: false,
            excludes: Vec::new(),
            analyzer_target: None,
            ctu: None,
            verbose: 0,
        };
        let compilations = vec![
            Compilation {
                compiler: CompilerKind::C,
                // `-o` with no argument to consume
                flags: vec!["-o".into()],
                source: bad,
                directory: dir.path().to_path_buf(),
            },
            Compilation {
                compiler: CompilerKind::C,
                flags: vec![],
                source: good.clone(),
                directory: dir.path().to_path_buf(),
            },
        ];

        let results = run(&config, &compilations).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, good);
        assert!(results[0].succeeded());
    }
}
