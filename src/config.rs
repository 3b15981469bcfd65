// src/config.rs
//! Run-wide analyzer configuration.
//!
//! One immutable [`AnalyzeConfig`] is built up front from the CLI and
//! shared by every worker; per-task mutable state lives in the pipeline's
//! task builder instead, so nothing is aliased across workers.

use clap::ValueEnum;
use std::path::PathBuf;

/// Structured output format of the analyzer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Html,
    Plist,
    PlistHtml,
    PlistMultiFile,
}

impl OutputFormat {
    /// Plist-style formats write into a per-task temp file; HTML writes
    /// into the report directory directly.
    #[must_use]
    pub fn needs_output_file(self) -> bool {
        matches!(
            self,
            OutputFormat::Plist | OutputFormat::PlistHtml | OutputFormat::PlistMultiFile
        )
    }

    /// Whether individual HTML bug reports exist for the cover report.
    #[must_use]
    pub fn has_html_reports(self) -> bool {
        matches!(self, OutputFormat::Html | OutputFormat::PlistHtml)
    }

    /// The value passed to `-analyzer-output=`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Plist => "plist",
            OutputFormat::PlistHtml => "plist-html",
            OutputFormat::PlistMultiFile => "plist-multi-file",
        }
    }
}

/// Which CTU phase a task belongs to. Never both for the same task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtuPhase {
    Collect,
    Analyze,
}

/// Cross-translation-unit analysis settings.
#[derive(Debug, Clone)]
pub struct CtuConfig {
    /// Directory holding the AST dumps and the merged definition map.
    pub dir: PathBuf,
    /// External tool listing externally visible function definitions.
    pub extdef_map_tool: String,
}

/// Everything a worker needs to know about the run. Read-only after
/// construction.
#[derive(Debug, Clone)]
pub struct AnalyzeConfig {
    /// Path to the clang executable driving the analysis.
    pub clang: PathBuf,
    /// The (timestamped) report directory of this run.
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    /// Generate crash reports under `failures/` on analyzer failure.
    pub output_failures: bool,
    /// Pre-built `-Xclang`-prefixed analyzer arguments.
    pub direct_args: Vec<String>,
    /// Append `-UNDEBUG` so assert-heavy code gets analyzed.
    pub force_debug: bool,
    /// Sources inside these directories are skipped.
    pub excludes: Vec<PathBuf>,
    /// Optional `-target` triple override.
    pub analyzer_target: Option<String>,
    /// Present when CTU analysis was requested.
    pub ctu: Option<CtuConfig>,
    pub verbose: u8,
}

/// Analyzer tuning knobs that expand into direct analyzer arguments.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerTuning {
    pub store_model: Option<String>,
    pub constraints_model: Option<String>,
    pub internal_stats: bool,
    pub analyze_headers: bool,
    pub stats: bool,
    pub maxloop: Option<u32>,
    pub output_format: Option<OutputFormat>,
    pub analyzer_config: Option<String>,
    pub enable_checker: Vec<String>,
    pub disable_checker: Vec<String>,
    pub plugins: Vec<PathBuf>,
    pub verbose: u8,
}

impl AnalyzerTuning {
    /// Reifies the tuning into the `-Xclang`-prefixed argument pairs the
    /// compiler driver forwards to the analyzer.
    #[must_use]
    pub fn direct_args(&self) -> Vec<String> {
        let mut inner: Vec<String> = Vec::new();

        if let Some(model) = &self.store_model {
            inner.push(format!("-analyzer-store={model}"));
        }
        if let Some(model) = &self.constraints_model {
            inner.push(format!("-analyzer-constraints={model}"));
        }
        if self.internal_stats {
            inner.push("-analyzer-stats".into());
        }
        if self.analyze_headers {
            inner.push("-analyzer-opt-analyze-headers".into());
        }
        if self.stats {
            inner.push("-analyzer-checker=debug.Stats".into());
        }
        if let Some(maxloop) = self.maxloop {
            inner.push("-analyzer-max-loop".into());
            inner.push(maxloop.to_string());
        }
        if let Some(format) = self.output_format {
            inner.push(format!("-analyzer-output={}", format.as_str()));
        }
        if let Some(config) = &self.analyzer_config {
            inner.push("-analyzer-config".into());
            inner.push(config.clone());
        }
        if self.verbose >= 4 {
            inner.push("-analyzer-display-progress".into());
        }
        for plugin in &self.plugins {
            inner.push("-load".into());
            inner.push(plugin.display().to_string());
        }
        if !self.enable_checker.is_empty() {
            inner.push("-analyzer-checker".into());
            inner.push(self.enable_checker.join(","));
        }
        if !self.disable_checker.is_empty() {
            inner.push("-analyzer-disable-checker".into());
            inner.push(self.disable_checker.join(","));
        }

        prefix_with("-Xclang", inner)
    }
}

/// Interleaves a constant before every element:
/// `prefix_with("-X", [a, b])` is `[-X, a, -X, b]`.
fn prefix_with(constant: &str, pieces: Vec<String>) -> Vec<String> {
    pieces
        .into_iter()
        .flat_map(|piece| [constant.to_string(), piece])
        .collect()
}

/// Compiler flags ignored when building the analyzer command line, with
/// the number of following arguments each consumes. Linker flags are
/// meaningless for the analyzer; output and debug flags get replaced.
pub const IGNORED_FLAGS: &[(&str, usize)] = &[
    ("-c", 0),
    ("-fsyntax-only", 0),
    ("-o", 1),
    ("-g", 0),
    ("-save-temps", 0),
    // Darwin linker flags, inherited from the earliest tool generation
    ("-install_name", 1),
    ("-exported_symbols_list", 1),
    ("-current_version", 1),
    ("-compatibility_version", 1),
    ("-init", 1),
    ("-e", 1),
    ("-seg1addr", 1),
    ("-bundle_loader", 1),
    ("-multiply_defined", 1),
    ("-sectorder", 3),
    ("--param", 1),
    ("--serialize-diagnostics", 1),
];

/// Languages the static analyzer accepts.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "c",
    "c++",
    "objective-c",
    "objective-c++",
    "c-cpp-output",
    "c++-cpp-output",
    "objective-c-cpp-output",
];

/// Architectures the analyzer cannot target.
pub const DISABLED_ARCHITECTURES: &[&str] = &["ppc", "ppc64"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_args_are_xclang_prefixed_pairs() {
        let tuning = AnalyzerTuning {
            store_model: Some("region".into()),
            maxloop: Some(8),
            enable_checker: vec!["alpha.core".into(), "security".into()],
            ..AnalyzerTuning::default()
        };
        let args = tuning.direct_args();
        assert_eq!(args.len() % 2, 0);
        for pair in args.chunks(2) {
            assert_eq!(pair[0], "-Xclang");
        }
        assert!(args.contains(&"-analyzer-store=region".to_string()));
        assert!(args.contains(&"alpha.core,security".to_string()));
    }

    #[test]
    fn empty_tuning_expands_to_nothing() {
        assert!(AnalyzerTuning::default().direct_args().is_empty());
    }

    #[test]
    fn sectorder_arity_matches_newest_table() {
        let (_, arity) = IGNORED_FLAGS
            .iter()
            .find(|(flag, _)| *flag == "-sectorder")
            .unwrap();
        assert_eq!(*arity, 3);
    }
}
