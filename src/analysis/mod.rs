// src/analysis/mod.rs
//! The analysis pipeline: from one [`Compilation`] to zero or one
//! analyzer runs.
//!
//! Planning is an ordered chain of filter stages. Each stage either
//! forwards a (possibly mutated) task state or short-circuits with
//! `None`, which means "skip, not an error": excluded paths, unsupported
//! languages and disabled architectures all simply reduce the task set.

pub mod failure;

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::clang;
use crate::compilation::{classify_source, Compilation, CompilerKind};
use crate::config::{
    AnalyzeConfig, CtuPhase, DISABLED_ARCHITECTURES, IGNORED_FLAGS, SUPPORTED_LANGUAGES,
};
use crate::ctu;
use crate::error::{Result, ScanwardError};

/// Mutable per-task state threaded through the pipeline stages.
#[derive(Debug, Clone)]
pub struct TaskState {
    pub compiler: CompilerKind,
    pub directory: PathBuf,
    pub source: PathBuf,
    pub flags: Vec<String>,
    pub arch_list: Vec<String>,
    pub arch: Option<String>,
    pub language: Option<String>,
}

/// The unit handed to the dispatcher: everything needed for exactly one
/// analyzer invocation. Consumed once, discarded after its result is
/// reported.
#[derive(Debug, Clone)]
pub struct AnalysisTask {
    pub directory: PathBuf,
    pub source: PathBuf,
    pub language: String,
    pub arch: Option<String>,
    /// Compiler flags, with `-arch`/`-x`/`-target` already re-applied.
    pub flags: Vec<String>,
    pub ctu_phase: Option<CtuPhase>,
}

/// Outcome of one executed task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub source: PathBuf,
    pub exit_code: i32,
    pub output: String,
}

impl TaskResult {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

type Stage = fn(&AnalyzeConfig, TaskState) -> Result<Option<TaskState>>;

/// The pipeline, in evaluation order.
const STAGES: &[(&str, Stage)] = &[
    ("exclude", exclude),
    ("classify flags", classify_flags),
    ("target triple", target_triple),
    ("architecture", arch_check),
    ("language", language_check),
    ("force debug", force_debug),
];

/// Plans one analyzer run for a compilation, or nothing when any stage
/// decides to skip.
///
/// # Errors
/// Only malformed flag lists (truncated arity) error out; the caller
/// reports them and moves on.
pub fn plan_task(
    config: &AnalyzeConfig,
    compilation: &Compilation,
    ctu_phase: Option<CtuPhase>,
) -> Result<Option<AnalysisTask>> {
    let mut state = TaskState {
        compiler: compilation.compiler,
        directory: compilation.directory.clone(),
        source: compilation.source.clone(),
        flags: compilation.flags.clone(),
        arch_list: Vec::new(),
        arch: None,
        language: None,
    };

    for (name, stage) in STAGES {
        match stage(config, state)? {
            Some(next) => state = next,
            None => {
                if config.verbose > 1 {
                    eprintln!(
                        "skip analysis of {}: {name} stage",
                        compilation.source.display()
                    );
                }
                return Ok(None);
            }
        }
    }

    let language = state
        .language
        .clone()
        .unwrap_or_default();
    Ok(Some(AnalysisTask {
        directory: state.directory,
        source: state.source,
        language,
        arch: state.arch,
        flags: state.flags,
        ctu_phase,
    }))
}

/// Stage 1: drop sources living inside an excluded directory.
/// Containment means the relative path does not climb out via `..`.
fn exclude(config: &AnalyzeConfig, state: TaskState) -> Result<Option<TaskState>> {
    let excluded = config
        .excludes
        .iter()
        .any(|dir| contains(dir, &state.source));
    Ok(if excluded { None } else { Some(state) })
}

fn contains(directory: &Path, entry: &Path) -> bool {
    entry.strip_prefix(directory).is_ok()
}

/// Stage 2: extract `-arch`/`-x` for later stages, drop flags from the
/// ignore table (with their arguments) and suppress warning flags that
/// are not of the silencing `-Wno-` form.
fn classify_flags(_config: &AnalyzeConfig, mut state: TaskState) -> Result<Option<TaskState>> {
    let mut flags = Vec::new();
    let mut iter = state.flags.iter();
    while let Some(arg) = iter.next() {
        if arg == "-arch" {
            let value = iter.next().ok_or_else(|| truncated("-arch"))?;
            state.arch_list.push(value.clone());
        } else if arg == "-x" {
            let value = iter.next().ok_or_else(|| truncated("-x"))?;
            state.language = Some(value.clone());
        } else if let Some((flag, arity)) = IGNORED_FLAGS.iter().find(|(f, _)| f == arg) {
            for _ in 0..*arity {
                iter.next().ok_or_else(|| truncated(flag))?;
            }
        } else if arg.starts_with("-W") && !arg.starts_with("-Wno-") {
            // extra warnings don't change analysis results
        } else {
            flags.push(arg.clone());
        }
    }
    state.flags = flags;
    Ok(Some(state))
}

fn truncated(flag: &str) -> ScanwardError {
    ScanwardError::Invocation(format!("flag '{flag}' is missing its argument"))
}

/// Stage 3: prepend the requested `-target` triple, if any.
fn target_triple(config: &AnalyzeConfig, mut state: TaskState) -> Result<Option<TaskState>> {
    if let Some(triple) = &config.analyzer_target {
        let mut flags = vec!["-target".to_string(), triple.clone()];
        flags.append(&mut state.flags);
        state.flags = flags;
    }
    Ok(Some(state))
}

/// Stage 4: pick the one architecture that drives preprocessing.
///
/// Disabled architectures and stray `-arch` literals are filtered out
/// first; the last survivor wins. Multiple differing architectures
/// cannot change the preprocessing step anyway, and that is the only
/// pass before the analyzer runs.
fn arch_check(_config: &AnalyzeConfig, mut state: TaskState) -> Result<Option<TaskState>> {
    if state.arch_list.is_empty() {
        return Ok(Some(state));
    }
    let filtered: Vec<&String> = state
        .arch_list
        .iter()
        .filter(|a| a.as_str() != "-arch" && !DISABLED_ARCHITECTURES.contains(&a.as_str()))
        .collect();
    let Some(arch) = filtered.last() else {
        return Ok(None);
    };

    let mut flags = vec!["-arch".to_string(), (*arch).clone()];
    flags.append(&mut state.flags);
    state.flags = flags;
    state.arch = Some((*arch).clone());
    Ok(Some(state))
}

/// Stage 5: resolve the language from `-x` or the file extension, skip
/// unknown or unsupported ones.
fn language_check(_config: &AnalyzeConfig, mut state: TaskState) -> Result<Option<TaskState>> {
    let language = match &state.language {
        Some(given) => Some(given.clone()),
        None => {
            let name = state.source.display().to_string();
            classify_source(&name, state.compiler == CompilerKind::C).map(str::to_string)
        }
    };

    let Some(language) = language else {
        return Ok(None);
    };
    if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
        return Ok(None);
    }

    let mut flags = vec!["-x".to_string(), language.clone()];
    flags.append(&mut state.flags);
    state.flags = flags;
    state.language = Some(language);
    Ok(Some(state))
}

/// Stage 6: when requested, undefine `NDEBUG` so assertions survive
/// preprocessing. `-U` wins over any existing `-DNDEBUG`.
fn force_debug(config: &AnalyzeConfig, mut state: TaskState) -> Result<Option<TaskState>> {
    if config.force_debug {
        state.flags.push("-UNDEBUG".to_string());
    }
    Ok(Some(state))
}

/// Executes one planned task: either collect-phase CTU work or a real
/// analyzer invocation.
#[must_use]
pub fn execute(config: &AnalyzeConfig, task: &AnalysisTask) -> TaskResult {
    match run_task(config, task) {
        Ok(result) => result,
        Err(e) => TaskResult {
            source: task.source.clone(),
            exit_code: 127,
            output: e.to_string(),
        },
    }
}

fn run_task(config: &AnalyzeConfig, task: &AnalysisTask) -> Result<TaskResult> {
    if task.ctu_phase == Some(CtuPhase::Collect) {
        let ctu = config
            .ctu
            .as_ref()
            .ok_or_else(|| ScanwardError::Other("collect phase without CTU config".into()))?;
        let arch = task.arch.as_deref().unwrap_or("default");
        ctu::collect_unit(ctu, &config.clang, &task.directory, &task.flags, &task.source, arch)?;
        return Ok(TaskResult {
            source: task.source.clone(),
            exit_code: 0,
            output: String::new(),
        });
    }
    run_analyzer(config, task)
}

/// Assembles the analyzer command line, reifies it through the driver
/// and executes it, capturing combined stdout/stderr.
fn run_analyzer(config: &AnalyzeConfig, task: &AnalysisTask) -> Result<TaskResult> {
    let mut command = vec![config.clang.display().to_string(), "--analyze".to_string()];
    command.extend(config.direct_args.iter().cloned());
    if task.ctu_phase == Some(CtuPhase::Analyze) {
        if let Some(ctu) = &config.ctu {
            command.extend(ctu::analyze_phase_args(&ctu.dir));
        }
    }
    command.extend(task.flags.iter().cloned());
    command.push(task.source.display().to_string());
    command.push("-o".to_string());
    let target = output_target(config)?;
    command.push(target.display().to_string());

    let reified = clang::get_arguments(&task.directory, &command)?;
    if config.verbose > 2 {
        eprintln!(
            "exec command in {}: {}",
            task.directory.display(),
            reified.join(" ")
        );
    }

    let (program, args) = reified
        .split_first()
        .ok_or_else(|| ScanwardError::Compiler("empty reified command".into()))?;
    let output = Command::new(program)
        .args(args)
        .current_dir(&task.directory)
        .output()
        .map_err(|e| ScanwardError::io(e, PathBuf::from(program)))?;

    let combined = [output.stdout, output.stderr].concat();
    let result = TaskResult {
        source: task.source.clone(),
        exit_code: output.status.code().unwrap_or(-1),
        output: String::from_utf8_lossy(&combined).into_owned(),
    };

    if !output.status.success() && config.output_failures {
        failure::report_failure(config, task, &output.status, &result.output);
    }
    Ok(result)
}

/// Plist-style formats get their own uniquely named report file so
/// parallel workers never collide; HTML writes into the directory.
fn output_target(config: &AnalyzeConfig) -> Result<PathBuf> {
    if config.output_format.needs_output_file() {
        let file = tempfile::Builder::new()
            .prefix("report-")
            .suffix(".plist")
            .tempfile_in(&config.output_dir)
            .map_err(|e| ScanwardError::io(e, config.output_dir.clone()))?;
        let (_, path) = file
            .keep()
            .map_err(|e| ScanwardError::io(e.error, config.output_dir.clone()))?;
        Ok(path)
    } else {
        Ok(config.output_dir.clone())
    }
}
