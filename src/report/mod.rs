// src/report/mod.rs
//! Report aggregation: scan the output directory for per-bug artifacts
//! and crash records, deduplicate, count and render the cover report.

pub mod html;
pub mod plist;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::config::OutputFormat;
use crate::error::{Result, ScanwardError};

/// One parsed finding. Two findings with the same [`BugKey`] describe
/// the same defect even when the descriptive attributes differ.
#[derive(Debug, Clone)]
pub struct Bug {
    pub category: String,
    pub bug_type: String,
    pub file: PathBuf,
    pub line: u64,
    pub path_length: u64,
    pub function: Option<String>,
    pub report_path: Option<PathBuf>,
}

pub type BugKey = (u64, u64, String, PathBuf);

impl Bug {
    #[must_use]
    pub fn key(&self) -> BugKey {
        (
            self.line,
            self.path_length,
            self.bug_type.clone(),
            self.file.clone(),
        )
    }
}

/// One failed analyzer run, read back from its `failures/` dossier.
#[derive(Debug, Clone)]
pub struct Crash {
    pub source: String,
    pub problem: String,
    pub info_path: PathBuf,
    pub stderr_path: PathBuf,
}

/// Everything the cover report needs besides the artifacts themselves.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    pub command_line: String,
    pub clang_version: String,
    /// Copied alongside the report when the run had one.
    pub compilation_db: Option<PathBuf>,
    pub keep_empty: bool,
    pub verbose: u8,
}

/// Summary of an aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentResult {
    pub bug_count: usize,
    pub crash_count: usize,
}

impl DocumentResult {
    #[must_use]
    pub fn total(&self) -> usize {
        self.bug_count + self.crash_count
    }
}

/// Aggregates one finished run into the cover report.
///
/// Bugs are deduplicated by key; crashes are never deduplicated. When
/// the format produces HTML and anything was found, `index.html` plus
/// the static resources land in the output directory.
pub fn document(config: &ReportConfig) -> Result<DocumentResult> {
    let bugs = if config.output_format.has_html_reports() {
        html::read_bugs(&config.output_dir)?
    } else {
        plist::read_bugs(&config.output_dir)?
    };

    let mut unique: BTreeMap<BugKey, Bug> = BTreeMap::new();
    for bug in bugs {
        unique.entry(bug.key()).or_insert(bug);
    }
    let bugs: Vec<Bug> = unique.into_values().collect();

    let mut crashes = read_crashes(&config.output_dir)?;
    crashes.sort_by(|a, b| a.info_path.cmp(&b.info_path));

    let result = DocumentResult {
        bug_count: bugs.len(),
        crash_count: crashes.len(),
    };

    if config.output_format.has_html_reports() && result.total() > 0 {
        html::assemble_index(config, &bugs, &crashes)?;
        html::copy_resource_files(&config.output_dir)?;
        if let Some(db) = &config.compilation_db {
            if db.is_file() {
                let target = config.output_dir.join("compile_commands.json");
                fs::copy(db, &target).map_err(|e| ScanwardError::io(e, target))?;
            }
        }
    }
    Ok(result)
}

/// Reads crash records back from `failures/*.info.txt`. A missing
/// failures directory simply means no crashes.
pub fn read_crashes(output_dir: &Path) -> Result<Vec<Crash>> {
    let failures = output_dir.join("failures");
    if !failures.is_dir() {
        return Ok(Vec::new());
    }

    let mut crashes = Vec::new();
    let entries =
        fs::read_dir(&failures).map_err(|e| ScanwardError::io(e, failures.clone()))?;
    for entry in entries {
        let entry = entry.map_err(|e| ScanwardError::io(e, failures.clone()))?;
        let path = entry.path();
        let name = path.display().to_string();
        if !name.ends_with(".info.txt") {
            continue;
        }
        let content = fs::read_to_string(&path).map_err(|e| ScanwardError::io(e, path.clone()))?;
        let mut lines = content.lines();
        let source = lines.next().unwrap_or_default().to_string();
        let problem = lines.next().unwrap_or("unknown").to_string();
        let stderr_path = PathBuf::from(name.replace(".info.txt", ".stderr.txt"));
        crashes.push(Crash {
            source,
            problem,
            info_path: path,
            stderr_path,
        });
    }
    Ok(crashes)
}

/// Per-category, per-type counts over already-deduplicated bugs.
#[must_use]
pub fn count_by_category(bugs: &[Bug]) -> BTreeMap<String, BTreeMap<String, usize>> {
    let mut counters: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for bug in bugs {
        *counters
            .entry(bug.category.clone())
            .or_default()
            .entry(bug.bug_type.clone())
            .or_default() += 1;
    }
    counters
}

/// The longest common directory prefix of a set of paths, used to chop
/// repetitive leading components out of the report tables.
#[must_use]
pub fn common_prefix<'a, I>(paths: I) -> PathBuf
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut iter = paths.into_iter();
    let Some(first) = iter.next() else {
        return PathBuf::new();
    };
    let mut prefix: Vec<Component> = first.components().collect();
    for path in iter {
        let components: Vec<Component> = path.components().collect();
        let common = prefix
            .iter()
            .zip(components.iter())
            .take_while(|(a, b)| a == b)
            .count();
        prefix.truncate(common);
    }
    // the last component is the file name unless every path was equal
    prefix.iter().collect()
}
