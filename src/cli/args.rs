use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::OutputFormat;

#[derive(Parser)]
#[command(name = "scanward", version, about = "Clang static analyzer build wrapper")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
    /// Repeat for more diagnostic output
    #[arg(long, short, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a build under interception and write a compilation database
    Capture {
        #[command(flatten)]
        capture: CaptureArgs,
        /// The build command to wrap
        #[arg(trailing_var_arg = true, required = true, value_name = "COMMAND")]
        build: Vec<String>,
    },
    /// Analyze an existing compilation database
    Analyze {
        #[command(flatten)]
        analyzer: AnalyzerArgs,
        /// Compilation database to read
        #[arg(long, default_value = "compile_commands.json", value_name = "FILE")]
        cdb: PathBuf,
    },
    /// Capture a build and analyze it in one run
    Scan {
        #[command(flatten)]
        capture: CaptureArgs,
        #[command(flatten)]
        analyzer: AnalyzerArgs,
        /// The build command to wrap
        #[arg(trailing_var_arg = true, required = true, value_name = "COMMAND")]
        build: Vec<String>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct CaptureArgs {
    /// Compilation database to write
    #[arg(long, default_value = "compile_commands.json", value_name = "FILE")]
    pub cdb: PathBuf,
    /// Merge with an existing database instead of overwriting it
    #[arg(long)]
    pub append: bool,
    /// Preload library injected into the build
    #[arg(long, value_name = "LIBRARY")]
    pub intercept_library: Option<PathBuf>,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Args)]
pub struct AnalyzerArgs {
    /// Parent directory for the timestamped report directory
    #[arg(long, short, default_value = "/tmp", value_name = "DIR")]
    pub output: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Html)]
    pub format: OutputFormat,
    /// Skip sources under this directory (repeatable)
    #[arg(long = "exclude", value_name = "DIR")]
    pub excludes: Vec<PathBuf>,
    /// Analyzer executable to use instead of the clang on PATH
    #[arg(long = "use-analyzer", value_name = "PATH")]
    pub use_analyzer: Option<PathBuf>,
    /// Internal analyzer store model
    #[arg(long, value_name = "MODEL")]
    pub store: Option<String>,
    /// Internal analyzer constraints model
    #[arg(long, value_name = "MODEL")]
    pub constraints: Option<String>,
    #[arg(long, value_name = "N")]
    pub maxloop: Option<u32>,
    /// Checker to enable (repeatable, comma-splittable)
    #[arg(long = "enable-checker", value_name = "CHECKER")]
    pub enable_checker: Vec<String>,
    /// Checker to disable (repeatable, comma-splittable)
    #[arg(long = "disable-checker", value_name = "CHECKER")]
    pub disable_checker: Vec<String>,
    /// List the analyzer's default checkers and exit
    #[arg(long = "help-checkers")]
    pub help_checkers: bool,
    /// Analyzer plugin to load (repeatable)
    #[arg(long = "load-plugin", value_name = "PLUGIN")]
    pub plugins: Vec<PathBuf>,
    /// Low-level -analyzer-config options, comma separated
    #[arg(long = "analyzer-config", value_name = "OPTIONS")]
    pub analyzer_config: Option<String>,
    /// Target triple passed to every analyzer invocation
    #[arg(long = "analyzer-target", value_name = "TRIPLE")]
    pub analyzer_target: Option<String>,
    /// Enable cross-translation-unit analysis
    #[arg(long)]
    pub ctu: bool,
    /// Where CTU keeps AST dumps and the merged definition map
    #[arg(long = "ctu-dir", default_value = "ctu-dir", value_name = "DIR")]
    pub ctu_dir: PathBuf,
    /// External definition mapping tool for CTU collection
    #[arg(long = "extdef-map-tool", default_value = "clang-extdef-mapping")]
    pub extdef_map_tool: String,
    /// Undefine NDEBUG so assertions get analyzed too
    #[arg(long = "force-analyze-debug-code")]
    pub force_debug: bool,
    /// Do not write crash dossiers for failed analyzer runs
    #[arg(long = "no-failure-reports")]
    pub no_failure_reports: bool,
    /// Exit nonzero when the analysis found any bugs
    #[arg(long)]
    pub status_bugs: bool,
    /// Keep the report directory even when nothing was found
    #[arg(long)]
    pub keep_empty: bool,
}

impl AnalyzerArgs {
    /// Checker lists accept both repeated flags and comma-joined values.
    #[must_use]
    pub fn split_checkers(values: &[String]) -> Vec<String> {
        values
            .iter()
            .flat_map(|v| v.split(','))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }
}
