// src/compilation.rs
//! Compilation database model.
//!
//! A [`Compilation`] is one source file's compile step, normalized from
//! either a compilation database entry or a captured execution record.
//! The module also owns compiler-name recognition (is this argv a C or
//! C++ compiler call at all?) and database load/save.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanwardError};
use crate::invocation::{self, ClassifiedInvocation};
use crate::shell;

/// Language family of the recognized compiler executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompilerKind {
    C,
    Cxx,
}

impl CompilerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompilerKind::C => "c",
            CompilerKind::Cxx => "c++",
        }
    }

    /// Conventional driver name for database entries.
    #[must_use]
    pub fn driver(self) -> &'static str {
        match self {
            CompilerKind::C => "cc",
            CompilerKind::Cxx => "c++",
        }
    }
}

/// One module's compile step. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compilation {
    pub compiler: CompilerKind,
    pub flags: Vec<String>,
    /// Absolute path to the source file.
    pub source: PathBuf,
    /// Absolute, normalized working directory.
    pub directory: PathBuf,
}

/// A recorded process execution: argv and working directory.
#[derive(Debug, Clone)]
pub struct Execution {
    pub pid: u32,
    pub cwd: PathBuf,
    pub cmd: Vec<String>,
}

static WRAPPER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(distcc|ccache)$").unwrap());
static MPI_WRAPPER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^mpi(cc|cxx|CC|c\+\+)$").unwrap());
static CC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^([^-]*-)*[mg]cc(-\d+(\.\d+){0,2})?$",
        r"^([^-]*-)*clang(-\d+(\.\d+){0,2})?$",
        r"^(|i)cc$",
        r"^(g|)xlc$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});
static CXX_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(c\+\+|cxx|CC)$",
        r"^([^-]*-)*[mg]\+\+(-\d+(\.\d+){0,2})?$",
        r"^([^-]*-)*clang\+\+(-\d+(\.\d+){0,2})?$",
        r"^icpc$",
        r"^(g|)xl(C|c\+\+)$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Splits an argv into (compiler kind, remaining arguments) when the
/// executable is a recognized C/C++ compiler, possibly behind `ccache`
/// or `distcc` wrappers. Wrappers may nest; a wrapper with no inner
/// compiler counts as a C compiler call.
#[must_use]
pub fn split_compiler(command: &[String]) -> Option<(CompilerKind, Vec<String>)> {
    let (first, rest) = command.split_first()?;
    let executable = Path::new(first)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())?;

    if WRAPPER_RE.is_match(&executable) {
        return Some(
            split_compiler(rest).unwrap_or_else(|| (CompilerKind::C, rest.to_vec())),
        );
    }
    // MPI wrappers forward to a real compiler with extra flags; the
    // wrapped call is close enough for classification purposes.
    if MPI_WRAPPER_RE.is_match(&executable) {
        let kind = if executable.contains("cc") {
            CompilerKind::C
        } else {
            CompilerKind::Cxx
        };
        return Some((kind, rest.to_vec()));
    }
    if CC_PATTERNS.iter().any(|p| p.is_match(&executable)) {
        return Some((CompilerKind::C, rest.to_vec()));
    }
    if CXX_PATTERNS.iter().any(|p| p.is_match(&executable)) {
        return Some((CompilerKind::Cxx, rest.to_vec()));
    }
    None
}

impl Compilation {
    /// Creates a compilation with normalized paths.
    #[must_use]
    pub fn new(compiler: CompilerKind, flags: Vec<String>, source: &Path, directory: &Path) -> Self {
        let directory = normalize(directory);
        let source = if source.is_absolute() {
            normalize(source)
        } else {
            normalize(&directory.join(source))
        };
        Compilation {
            compiler,
            flags,
            source,
            directory,
        }
    }

    /// Expands one recorded execution into zero or more compilations.
    ///
    /// Non-compiler calls, non-compile actions and source files which no
    /// longer exist on disk all produce nothing. Malformed argument lists
    /// are reported through the returned error and skipped by callers.
    pub fn from_execution(execution: &Execution) -> Result<Vec<Compilation>> {
        let Some((compiler, arguments)) = split_compiler(&execution.cmd) else {
            return Ok(Vec::new());
        };
        let mut argv = vec![compiler.driver().to_string()];
        argv.extend(arguments);
        let classified: ClassifiedInvocation = invocation::classify(&argv)?;
        if !classified.action.is_analyzable() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for file in &classified.files {
            let candidate =
                Compilation::new(compiler, rebuild_flags(&classified), file, &execution.cwd);
            if candidate.source.is_file() {
                results.push(candidate);
            }
        }
        Ok(results)
    }

    /// Creates the JSON-serializable database entry for this compilation.
    #[must_use]
    pub fn as_db_entry(&self) -> DbEntry {
        let relative = relative_to(&self.source, &self.directory);
        let mut arguments = vec![self.compiler.driver().to_string(), "-c".to_string()];
        arguments.extend(self.flags.iter().cloned());
        arguments.push(relative.display().to_string());
        DbEntry {
            file: relative.display().to_string(),
            directory: self.directory.display().to_string(),
            command: None,
            arguments: Some(arguments),
        }
    }

    /// Expands one database entry into zero or more compilations.
    pub fn from_db_entry(entry: &DbEntry) -> Result<Vec<Compilation>> {
        let cmd = match (&entry.arguments, &entry.command) {
            (Some(arguments), _) => arguments.clone(),
            (None, Some(command)) => shell::decode(command)?,
            (None, None) => {
                return Err(ScanwardError::CompilationDb(format!(
                    "entry for '{}' has neither 'command' nor 'arguments'",
                    entry.file
                )))
            }
        };
        let execution = Execution {
            pid: 0,
            cwd: PathBuf::from(&entry.directory),
            cmd,
        };
        Compilation::from_execution(&execution)
    }
}

/// Carries `-x`/`-arch` back into the flag list so a compilation keeps
/// everything the analyzer pipeline will later re-extract.
fn rebuild_flags(classified: &ClassifiedInvocation) -> Vec<String> {
    let mut flags = Vec::new();
    for arch in &classified.arch_list {
        flags.push("-arch".to_string());
        flags.push(arch.clone());
    }
    if let Some(language) = &classified.language {
        flags.push("-x".to_string());
        flags.push(language.clone());
    }
    flags.extend(classified.flags.iter().cloned());
    flags
}

/// One entry of a JSON compilation database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbEntry {
    pub file: String,
    pub directory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,
}

/// Compilation database persistence.
pub struct CompilationDatabase;

impl CompilationDatabase {
    /// Loads and expands every entry of a compilation database.
    ///
    /// Entries which fail to classify are reported on stderr and skipped;
    /// an unreadable or unparsable database is an error that aborts the
    /// run before any dispatch happens.
    pub fn load(path: &Path) -> Result<Vec<Compilation>> {
        let content =
            fs::read_to_string(path).map_err(|e| ScanwardError::io(e, path.to_path_buf()))?;
        let entries: Vec<DbEntry> = serde_json::from_str(&content).map_err(|e| {
            ScanwardError::CompilationDb(format!("cannot parse {}: {e}", path.display()))
        })?;

        let mut compilations = Vec::new();
        for entry in &entries {
            match Compilation::from_db_entry(entry) {
                Ok(mut items) => compilations.append(&mut items),
                Err(e) => eprintln!("warning: skipping entry '{}': {e}", entry.file),
            }
        }
        Ok(compilations)
    }

    /// Writes compilations as a pretty-printed JSON database.
    pub fn save(path: &Path, compilations: &[Compilation]) -> Result<()> {
        let entries: Vec<DbEntry> = compilations.iter().map(Compilation::as_db_entry).collect();
        let json = serde_json::to_string_pretty(&entries)?;
        fs::write(path, json).map_err(|e| ScanwardError::io(e, path.to_path_buf()))?;
        Ok(())
    }
}

/// Presumed source language from a file name extension. The same `.c`
/// file means C++ when a C++ compiler drives the build.
#[must_use]
pub fn classify_source(filename: &str, c_compiler: bool) -> Option<&'static str> {
    // case matters: '.C' is C++ by convention
    let extension = Path::new(filename).extension()?.to_str()?;
    match extension {
        "c" => Some(if c_compiler { "c" } else { "c++" }),
        "i" => Some(if c_compiler {
            "c-cpp-output"
        } else {
            "c++-cpp-output"
        }),
        "ii" => Some("c++-cpp-output"),
        "m" => Some("objective-c"),
        "mi" => Some("objective-c-cpp-output"),
        "mm" => Some("objective-c++"),
        "mii" => Some("objective-c++-cpp-output"),
        "C" | "cc" | "CC" | "cp" | "cpp" | "cxx" | "c++" | "C++" | "txx" => Some("c++"),
        _ => None,
    }
}

/// Lexically normalizes a path: resolves `.` and `..` segments without
/// touching the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut parts: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(parts.last(), Some(Component::Normal(_))) {
                    parts.pop();
                } else {
                    parts.push(component);
                }
            }
            other => parts.push(other),
        }
    }
    parts.iter().map(|c| c.as_os_str()).collect()
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map_or_else(|_| path.to_path_buf(), Path::to_path_buf)
}
