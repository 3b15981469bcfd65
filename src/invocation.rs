// src/invocation.rs
//! Compiler invocation classifier.
//!
//! Tokenizes a raw compiler command line into a [`ClassifiedInvocation`]:
//! what the driver was asked to do, which source files are involved, and
//! which flags survive for an analyzer run. The classifier is a fixed,
//! longest-match-first rule table: rules are tried in priority order and
//! the first match consumes the flag plus a fixed number of following
//! tokens.

use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::compilation::classify_source;
use crate::error::{Result, ScanwardError};

/// What the compiler driver was asked to do.
///
/// Later phases rank higher. The default is `Link` (a bare driver call
/// links), which ranks lowest so any phase-selecting flag overrides it;
/// among flags the most "final" action observed wins via `max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
    #[default]
    Link,
    Compile,
    Preprocess,
    Info,
    Internal,
}

impl Action {
    /// Only compile (or plain link) invocations carry analyzable sources.
    #[must_use]
    pub fn is_analyzable(self) -> bool {
        self <= Action::Compile
    }
}

/// Result of classifying one compiler argv.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedInvocation {
    pub action: Action,
    pub files: Vec<PathBuf>,
    pub language: Option<String>,
    pub arch_list: Vec<String>,
    pub output: Option<String>,
    pub flags: Vec<String>,
}

impl ClassifiedInvocation {
    fn bump_action(&mut self, action: Action) {
        self.action = self.action.max(action);
    }
}

static PREPROCESS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-(E|MM?)$").unwrap());
static MACOS_MIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-m(ios-simulator|macosx|iphoneos)-version-min").unwrap());
static OPT_LEVEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-O[1-3]$").unwrap());
static MACHINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-m.+").unwrap());
static DEFINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-[DIU](.*)$").unwrap());
static LIBRARY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-[lL]").unwrap());
static DEP_TARGET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-M[TF]$").unwrap());
static FLAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-[fF].+$").unwrap());

/// Flags that are copied verbatim and consume one extra token.
const KEPT_WITH_ARG: &[&str] = &[
    "-ftrapv-handler",
    "--sysroot",
    "-target",
    "-idirafter",
    "-imacros",
    "-iprefix",
    "-iwithprefix",
    "-iwithprefixbefore",
];

/// Dropped macOS linker flags that consume one extra token.
const DROPPED_LINKER_WITH_ARG: &[&str] = &[
    "-install_name",
    "-exported_symbols_list",
    "-current_version",
    "-compatibility_version",
    "-init",
    "-seg1addr",
    "-bundle_loader",
    "-multiply_defined",
    "--param",
    "--serialize-diagnostics",
];

/// Joined-or-separate kept flags: `-Ifoo` consumes one token, `-I foo`
/// consumes two. Prefix matched, value may be glued on.
const KEPT_JOINED: &[&str] = &["-isystem", "-iquote", "-stdlib", "-isysroot", "-include"];

/// Classifies a full compiler argv (compiler name plus arguments).
///
/// # Errors
/// Returns an error when an arity-N flag runs out of following tokens, or
/// a `-filelist` file cannot be read. Such invocations are reported and
/// treated as "not a compilation" by callers, never as fatal.
pub fn classify(argv: &[String]) -> Result<ClassifiedInvocation> {
    let mut result = ClassifiedInvocation::default();
    // Empty tokens appear in recorded argv vectors; they carry nothing.
    let tokens: Vec<&String> = argv.iter().skip(1).filter(|a| !a.is_empty()).collect();
    let mut cursor = Cursor {
        tokens: &tokens,
        index: 0,
    };

    while let Some(arg) = cursor.next() {
        classify_one(arg, &mut cursor, &mut result)?;
    }
    Ok(result)
}

struct Cursor<'a> {
    tokens: &'a [&'a String],
    index: usize,
}

impl Cursor<'_> {
    fn next(&mut self) -> Option<String> {
        let item = self.tokens.get(self.index).map(|s| (*s).clone());
        self.index += 1;
        item
    }

    /// Consumes exactly `count` following tokens for the current flag.
    fn take(&mut self, flag: &str, count: usize) -> Result<Vec<String>> {
        if self.index + count > self.tokens.len() {
            return Err(ScanwardError::Invocation(format!(
                "flag '{flag}' expects {count} following token(s), command line is truncated"
            )));
        }
        let taken = self.tokens[self.index..self.index + count]
            .iter()
            .map(|s| (*s).clone())
            .collect();
        self.index += count;
        Ok(taken)
    }
}

/// One step of the rule table. Order of the branches is the priority
/// order; the first match consumes the token (and its arity) and returns.
fn classify_one(arg: String, cursor: &mut Cursor, out: &mut ClassifiedInvocation) -> Result<()> {
    // (1) action-changing flags
    if PREPROCESS_RE.is_match(&arg) {
        out.bump_action(Action::Preprocess);
        return Ok(());
    }
    if arg == "-c" {
        out.bump_action(Action::Compile);
        return Ok(());
    }
    if arg == "-print-prog-name" {
        out.bump_action(Action::Info);
        return Ok(());
    }
    if arg == "-cc1" || arg == "-###" {
        out.bump_action(Action::Internal);
        return Ok(());
    }
    // (2) architectures, duplicates preserved
    if arg == "-arch" {
        let value = cursor.take(&arg, 1)?;
        out.arch_list.extend(value);
        return Ok(());
    }
    // (3) file lists: every line of the referenced file is a source path
    if arg == "-filelist" {
        let name = cursor.take(&arg, 1)?.remove(0);
        let content = fs::read_to_string(&name)
            .map_err(|e| ScanwardError::Invocation(format!("cannot read -filelist {name}: {e}")))?;
        out.files
            .extend(content.lines().map(|l| PathBuf::from(l.trim())));
        return Ok(());
    }
    // (4) bare tokens with a known source extension
    if !arg.starts_with('-') && classify_source(&arg, true).is_some() {
        out.files.push(PathBuf::from(&arg));
        return Ok(());
    }
    // (5) explicit language
    if arg == "-x" {
        out.language = Some(cursor.take(&arg, 1)?.remove(0));
        return Ok(());
    }
    // (6) output, informational only
    if arg == "-o" {
        out.output = Some(cursor.take(&arg, 1)?.remove(0));
        return Ok(());
    }
    // (7) pass-through compiler flags, by arity
    if arg == "-write-strings" || arg == "-v" || arg == "-nostdinc" {
        out.flags.push(arg);
        return Ok(());
    }
    if arg == "-m32" || arg == "-m64" || OPT_LEVEL_RE.is_match(&arg) || arg.starts_with("-std=") {
        out.flags.push(arg);
        return Ok(());
    }
    if arg == "-O" {
        out.flags.push("-O1".to_string());
        return Ok(());
    }
    if arg == "-Os" {
        out.flags.push("-O2".to_string());
        return Ok(());
    }
    if KEPT_WITH_ARG.contains(&arg.as_str()) {
        let mut taken = cursor.take(&arg, 1)?;
        out.flags.push(arg);
        out.flags.append(&mut taken);
        return Ok(());
    }
    if let Some(prefix) = KEPT_JOINED.iter().find(|p| arg.starts_with(**p)) {
        let glued = arg.len() > prefix.len();
        out.flags.push(arg.clone());
        if !glued {
            let mut taken = cursor.take(&arg, 1)?;
            out.flags.append(&mut taken);
        }
        return Ok(());
    }
    if MACOS_MIN_RE.is_match(&arg) {
        out.flags.push(arg);
        return Ok(());
    }
    if arg.starts_with("-Wno-") {
        out.flags.push(arg);
        return Ok(());
    }
    if DEFINE_RE.is_match(&arg) {
        // `-D NAME` and `-DNAME` are both accepted
        let glued = arg.len() > 2;
        out.flags.push(arg.clone());
        if !glued {
            let mut taken = cursor.take(&arg, 1)?;
            out.flags.append(&mut taken);
        }
        return Ok(());
    }
    // (8) dropped flags, by arity
    if arg == "-framework" {
        cursor.take(&arg, 1)?;
        return Ok(());
    }
    if arg.starts_with("-fobjc-link-runtime") {
        if arg == "-fobjc-link-runtime" {
            cursor.take(&arg, 1)?;
        }
        return Ok(());
    }
    if LIBRARY_RE.is_match(&arg) {
        return Ok(());
    }
    if DEP_TARGET_RE.is_match(&arg) || arg == "-e" || arg == "-u" {
        cursor.take(&arg, 1)?;
        return Ok(());
    }
    if arg == "-fsyntax-only" || arg == "-save-temps" {
        return Ok(());
    }
    if DROPPED_LINKER_WITH_ARG.contains(&arg.as_str()) {
        cursor.take(&arg, 1)?;
        return Ok(());
    }
    if arg == "-sectorder" {
        // linker `-sectorder segment section file`
        cursor.take(&arg, 3)?;
        return Ok(());
    }
    // (9) prefix fallbacks
    if FLAG_RE.is_match(&arg) {
        out.flags.push(arg);
        return Ok(());
    }
    if arg.starts_with("-W") {
        // extra warnings do not change analysis results; only the
        // suppressing -Wno- form (matched above) is worth keeping
        return Ok(());
    }
    if MACHINE_RE.is_match(&arg) {
        out.flags.push(arg);
        return Ok(());
    }
    if !arg.starts_with('-') {
        // bare token with an unknown extension: keep as a plain option
        out.flags.push(arg);
        return Ok(());
    }
    // unknown dash-flag: not relevant for analysis
    Ok(())
}
