// src/report/plist.rs
//! Structured-output side of the aggregator: bug records from the
//! analyzer's `.plist` result files.

use std::fs;
use std::path::{Path, PathBuf};

use plist::Value;

use super::Bug;
use crate::error::{Result, ScanwardError};

/// Parses every `.plist` result file under the output directory. The
/// multi-file format nests its results, so the scan is recursive.
/// Files the analyzer left empty (no diagnostics) contribute nothing.
pub fn read_bugs(output_dir: &Path) -> Result<Vec<Bug>> {
    let mut bugs = Vec::new();
    for entry in walkdir::WalkDir::new(output_dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "plist") {
            bugs.extend(parse_file(path)?);
        }
    }
    Ok(bugs)
}

fn parse_file(path: &Path) -> Result<Vec<Bug>> {
    // a crashed analyzer leaves its pre-created output file empty
    let size = fs::metadata(path)
        .map_err(|e| ScanwardError::io(e, path.to_path_buf()))?
        .len();
    if size == 0 {
        return Ok(Vec::new());
    }
    let value = Value::from_file(path)
        .map_err(|e| ScanwardError::CompilationDb(format!("{}: {e}", path.display())))?;
    let Some(root) = value.as_dictionary() else {
        return Ok(Vec::new());
    };

    let files: Vec<PathBuf> = root
        .get("files")
        .and_then(Value::as_array)
        .map(|array| {
            array
                .iter()
                .filter_map(Value::as_string)
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default();

    let Some(diagnostics) = root.get("diagnostics").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let mut bugs = Vec::new();
    for diagnostic in diagnostics {
        let Some(dict) = diagnostic.as_dictionary() else {
            continue;
        };
        let bug_type = dict
            .get("type")
            .and_then(Value::as_string)
            .unwrap_or("unknown")
            .to_string();
        let category = dict
            .get("category")
            .and_then(Value::as_string)
            .unwrap_or("Other")
            .to_string();
        let function = dict
            .get("issue_context")
            .and_then(Value::as_string)
            .map(str::to_string);
        let path_length = dict
            .get("path")
            .and_then(Value::as_array)
            .map_or(1, |p| p.len() as u64);

        let location = dict.get("location").and_then(Value::as_dictionary);
        let line = location
            .and_then(|l| l.get("line"))
            .and_then(Value::as_unsigned_integer)
            .unwrap_or(0);
        let file = location
            .and_then(|l| l.get("file"))
            .and_then(Value::as_unsigned_integer)
            .and_then(|index| files.get(index as usize))
            .cloned()
            .unwrap_or_default();

        bugs.push(Bug {
            category,
            bug_type,
            file,
            line,
            path_length,
            function,
            report_path: Some(path.to_path_buf()),
        });
    }
    Ok(bugs)
}
