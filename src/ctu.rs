// src/ctu.rs
//! Cross-translation-unit analysis support.
//!
//! CTU runs in two phases. The collect phase dumps every unit's AST
//! under `<ctu dir>/ast/<arch>/…` and records which externally visible
//! functions the unit defines, one temp map file per unit so workers
//! never share a file. After a merge barrier condenses those maps into
//! one global definition map, the analyze phase re-runs the analyzer
//! with the CTU directory wired in so it can load other units' ASTs.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::process::Command;

use crate::config::CtuConfig;
use crate::error::{Result, ScanwardError};

pub const AST_DIR: &str = "ast";
pub const TMP_FN_MAP_DIR: &str = "tmp-fn-maps";
pub const MERGED_MAP_FILE: &str = "externalDefMap.txt";

/// Location of a unit's AST dump inside the CTU directory, keyed by
/// architecture and the unit's absolute source path.
#[must_use]
pub fn ast_path(ctu_dir: &Path, arch: &str, source: &Path) -> PathBuf {
    let mut result = ctu_dir.join(AST_DIR).join(arch);
    for component in source.components() {
        if let Component::Normal(part) = component {
            result.push(part);
        }
    }
    result.set_extension(ast_extension(source));
    result
}

fn ast_extension(source: &Path) -> String {
    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{ext}.ast"),
        None => "ast".to_string(),
    }
}

/// Rebuilds the CTU directory from scratch for a new run. The previous
/// map must never leak into this run's analyze phase.
pub fn prepare_ctu_dir(ctu: &CtuConfig) -> Result<()> {
    if ctu.dir.exists() {
        fs::remove_dir_all(&ctu.dir).map_err(|e| ScanwardError::io(e, ctu.dir.clone()))?;
    }
    fs::create_dir_all(ctu.dir.join(TMP_FN_MAP_DIR))
        .map_err(|e| ScanwardError::io(e, ctu.dir.clone()))?;
    Ok(())
}

/// Collect-phase work for one unit: emit the AST dump and write this
/// unit's function map into its own temp file.
///
/// # Errors
/// Subprocess or I/O failures surface as errors; the caller records them
/// against the task without failing the batch.
pub fn collect_unit(
    ctu: &CtuConfig,
    clang: &Path,
    cwd: &Path,
    flags: &[String],
    source: &Path,
    arch: &str,
) -> Result<()> {
    let ast = ast_path(&ctu.dir, arch, source);
    if let Some(parent) = ast.parent() {
        fs::create_dir_all(parent).map_err(|e| ScanwardError::io(e, parent.to_path_buf()))?;
    }

    let status = Command::new(clang)
        .arg("-emit-ast")
        .args(flags)
        .arg(source)
        .arg("-o")
        .arg(&ast)
        .current_dir(cwd)
        .status()
        .map_err(|e| ScanwardError::io(e, clang.to_path_buf()))?;
    if !status.success() {
        return Err(ScanwardError::Compiler(format!(
            "AST dump failed for {}",
            source.display()
        )));
    }

    let entries = map_functions(ctu, cwd, flags, source, arch)?;
    write_unit_map(ctu, &entries)
}

/// Runs the external definition-map tool and rewrites its source paths
/// into AST-dump paths relative to the CTU directory.
fn map_functions(
    ctu: &CtuConfig,
    cwd: &Path,
    flags: &[String],
    source: &Path,
    arch: &str,
) -> Result<Vec<(String, String)>> {
    let output = Command::new(&ctu.extdef_map_tool)
        .arg(source)
        .arg("--")
        .args(flags)
        .current_dir(cwd)
        .output()
        .map_err(|e| ScanwardError::io(e, PathBuf::from(&ctu.extdef_map_tool)))?;
    if !output.status.success() {
        return Err(ScanwardError::Compiler(format!(
            "definition mapping failed for {}",
            source.display()
        )));
    }

    let ast = ast_path(&ctu.dir, arch, source);
    let relative_ast = ast
        .strip_prefix(&ctu.dir)
        .unwrap_or(&ast)
        .display()
        .to_string();

    let text = String::from_utf8_lossy(&output.stdout);
    let mut entries = Vec::new();
    for line in text.lines() {
        let Some((symbol, _source_path)) = line.split_once(' ') else {
            continue;
        };
        entries.push((symbol.to_string(), relative_ast.clone()));
    }
    Ok(entries)
}

/// Writes one unit's `(symbol, ast path)` entries into a fresh temp file
/// under `tmp-fn-maps/`. Unique names keep workers contention-free.
fn write_unit_map(ctu: &CtuConfig, entries: &[(String, String)]) -> Result<()> {
    let dir = ctu.dir.join(TMP_FN_MAP_DIR);
    let mut file = tempfile::Builder::new()
        .prefix("fn-map-")
        .suffix(".txt")
        .tempfile_in(&dir)
        .map_err(|e| ScanwardError::io(e, dir.clone()))?;
    for (symbol, ast) in entries {
        writeln!(file, "{symbol} {ast}").map_err(|e| ScanwardError::io(e, dir.clone()))?;
    }
    // persist: the merge step owns the file's lifetime from here
    file.keep()
        .map_err(|e| ScanwardError::io(e.error, dir.clone()))?;
    Ok(())
}

/// Merges all per-unit maps into the global definition map.
///
/// Symbols defined in more than one AST file are dropped entirely, never
/// merged; an ambiguous definition would make the analyzer import the
/// wrong body. Returns the number of symbols written. The temp map
/// directory is removed afterwards.
pub fn merge_function_maps(ctu_dir: &Path) -> Result<usize> {
    let tmp_dir = ctu_dir.join(TMP_FN_MAP_DIR);
    let mut symbols: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    if tmp_dir.is_dir() {
        for entry in fs::read_dir(&tmp_dir).map_err(|e| ScanwardError::io(e, tmp_dir.clone()))? {
            let entry = entry.map_err(|e| ScanwardError::io(e, tmp_dir.clone()))?;
            let content = fs::read_to_string(entry.path())
                .map_err(|e| ScanwardError::io(e, entry.path()))?;
            for line in content.lines() {
                if let Some((symbol, ast)) = line.split_once(' ') {
                    symbols
                        .entry(symbol.to_string())
                        .or_default()
                        .insert(ast.to_string());
                }
            }
        }
    }

    let merged_path = ctu_dir.join(MERGED_MAP_FILE);
    let mut merged = String::new();
    let mut written = 0usize;
    for (symbol, asts) in &symbols {
        if asts.len() == 1 {
            let ast = asts.iter().next().map_or("", String::as_str);
            merged.push_str(symbol);
            merged.push(' ');
            merged.push_str(ast);
            merged.push('\n');
            written += 1;
        }
    }
    fs::write(&merged_path, merged).map_err(|e| ScanwardError::io(e, merged_path))?;

    if tmp_dir.is_dir() {
        fs::remove_dir_all(&tmp_dir).map_err(|e| ScanwardError::io(e, tmp_dir))?;
    }
    Ok(written)
}

/// Extra analyzer arguments for the analyze phase: the analyzer may load
/// other units' ASTs from the CTU directory.
#[must_use]
pub fn analyze_phase_args(ctu_dir: &Path) -> Vec<String> {
    vec![
        "-Xanalyzer".into(),
        "-analyzer-config".into(),
        "-Xanalyzer".into(),
        format!(
            "ctu-dir={},reanalyze-ctu-visited=true",
            ctu_dir.display()
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_map(dir: &Path, name: &str, lines: &[&str]) {
        fs::write(dir.join(name), lines.join("\n") + "\n").unwrap();
    }

    #[test]
    fn ambiguous_symbols_are_dropped_not_merged() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join(TMP_FN_MAP_DIR);
        fs::create_dir_all(&tmp).unwrap();
        write_map(&tmp, "u1.txt", &["f1 ast/A.c.ast", "f2 ast/B.c.ast"]);
        write_map(&tmp, "u2.txt", &["f1 ast/C.c.ast"]);

        let written = merge_function_maps(dir.path()).unwrap();
        assert_eq!(written, 1);

        let merged = fs::read_to_string(dir.path().join(MERGED_MAP_FILE)).unwrap();
        assert_eq!(merged, "f2 ast/B.c.ast\n");
        assert!(!tmp.exists(), "temp maps must be deleted after the merge");
    }

    #[test]
    fn repeated_identical_definitions_still_count_as_one_ast() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join(TMP_FN_MAP_DIR);
        fs::create_dir_all(&tmp).unwrap();
        write_map(&tmp, "u1.txt", &["f1 ast/A.c.ast"]);
        write_map(&tmp, "u2.txt", &["f1 ast/A.c.ast"]);

        let written = merge_function_maps(dir.path()).unwrap();
        assert_eq!(written, 1);
    }

    #[test]
    fn merge_without_collect_output_writes_empty_map() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(merge_function_maps(dir.path()).unwrap(), 0);
        assert!(dir.path().join(MERGED_MAP_FILE).exists());
    }

    #[test]
    fn ast_paths_are_namespaced_by_arch_and_source() {
        let ctu = Path::new("/out/ctu");
        let path = ast_path(ctu, "x86_64", Path::new("/proj/src/main.c"));
        assert_eq!(
            path,
            PathBuf::from("/out/ctu/ast/x86_64/proj/src/main.c.ast")
        );
    }

    #[test]
    fn analyze_phase_args_reference_the_ctu_dir() {
        let args = analyze_phase_args(Path::new("/out/ctu"));
        assert_eq!(args.len(), 4);
        assert!(args[3].contains("ctu-dir=/out/ctu"));
        assert!(args[3].contains("reanalyze-ctu-visited=true"));
    }
}
