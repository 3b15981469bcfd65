// src/report/html.rs
//! HTML side of the report aggregator: parse the comment markers the
//! analyzer embeds in its per-bug pages, and render the cover report.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::{common_prefix, count_by_category, Bug, Crash, ReportConfig};
use crate::error::{Result, ScanwardError};

const SCANVIEW_CSS: &str = include_str!("../../resources/scanview.css");
const SORTTABLE_JS: &str = include_str!("../../resources/sorttable.js");
const SELECTABLE_JS: &str = include_str!("../../resources/selectable.js");

static BUG_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!-- BUGTYPE (?<value>.*) -->").unwrap());
static BUG_CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!-- BUGCATEGORY (?<value>.*) -->").unwrap());
static BUG_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!-- BUGFILE (?<value>.*) -->").unwrap());
static BUG_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!-- BUGLINE (?<value>\d+) -->").unwrap());
static BUG_PATH_LENGTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!-- BUGPATHLENGTH (?<value>\d+) -->").unwrap());
static FUNCTION_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!-- FUNCTIONNAME (?<value>.*) -->").unwrap());
static META_END_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<!-- BUGMETAEND -->").unwrap());

/// Parses every per-bug HTML page in the output directory.
pub fn read_bugs(output_dir: &Path) -> Result<Vec<Bug>> {
    let mut bugs = Vec::new();
    let entries =
        fs::read_dir(output_dir).map_err(|e| ScanwardError::io(e, output_dir.to_path_buf()))?;
    for entry in entries {
        let entry = entry.map_err(|e| ScanwardError::io(e, output_dir.to_path_buf()))?;
        let path = entry.path();
        let is_report = path.extension().is_some_and(|e| e == "html")
            && path.file_name().is_some_and(|n| n != "index.html");
        if !is_report {
            continue;
        }
        if let Some(bug) = parse_bug(&path)? {
            bugs.push(bug);
        }
    }
    Ok(bugs)
}

/// Reads the marker block at the top of one report page. Pages without
/// a type or file marker are not bug reports and yield nothing.
fn parse_bug(path: &Path) -> Result<Option<Bug>> {
    let content = fs::read_to_string(path).map_err(|e| ScanwardError::io(e, path.to_path_buf()))?;

    let mut bug_type = None;
    let mut category = "Other".to_string();
    let mut file = None;
    let mut line = 0;
    let mut path_length = 1;
    let mut function = None;

    let capture = |re: &Regex, line: &str| -> Option<String> {
        re.captures(line).map(|c| c["value"].to_string())
    };

    for text in content.lines() {
        if META_END_RE.is_match(text) {
            break;
        }
        if let Some(value) = capture(&BUG_TYPE_RE, text) {
            bug_type = Some(value);
        } else if let Some(value) = capture(&BUG_CATEGORY_RE, text) {
            category = value;
        } else if let Some(value) = capture(&BUG_FILE_RE, text) {
            file = Some(PathBuf::from(value));
        } else if let Some(value) = capture(&BUG_LINE_RE, text) {
            line = value.parse().unwrap_or(0);
        } else if let Some(value) = capture(&BUG_PATH_LENGTH_RE, text) {
            path_length = value.parse().unwrap_or(1);
        } else if let Some(value) = capture(&FUNCTION_NAME_RE, text) {
            function = Some(value);
        }
    }

    let (Some(bug_type), Some(file)) = (bug_type, file) else {
        return Ok(None);
    };
    Ok(Some(Bug {
        category,
        bug_type,
        file,
        line,
        path_length,
        function,
        report_path: Some(path.to_path_buf()),
    }))
}

/// Renders `index.html`. The three tables are streamed to fragment
/// files first so large projects never hold the whole report in memory,
/// then concatenated under the header block and deleted.
pub fn assemble_index(config: &ReportConfig, bugs: &[Bug], crashes: &[Crash]) -> Result<()> {
    let prefix = common_prefix(
        bugs.iter()
            .map(|b| b.file.as_path())
            .chain(crashes.iter().map(|c| Path::new(c.source.as_str()))),
    );

    let mut fragments = Vec::new();
    if !bugs.is_empty() {
        fragments.push(summary_fragment(config, bugs)?);
        fragments.push(bug_fragment(config, bugs, &prefix)?);
    }
    if !crashes.is_empty() {
        fragments.push(crash_fragment(config, crashes, &prefix)?);
    }

    let index_path = config.output_dir.join("index.html");
    let index =
        fs::File::create(&index_path).map_err(|e| ScanwardError::io(e, index_path.clone()))?;
    let mut out = BufWriter::new(index);
    let io_err = |e: std::io::Error| ScanwardError::io(e, index_path.clone());

    write_header(&mut out, config, &prefix).map_err(io_err)?;
    for fragment in &fragments {
        let content =
            fs::read_to_string(fragment).map_err(|e| ScanwardError::io(e, fragment.clone()))?;
        out.write_all(content.as_bytes()).map_err(io_err)?;
        fs::remove_file(fragment).map_err(|e| ScanwardError::io(e, fragment.clone()))?;
    }
    writeln!(out, "</body></html>").map_err(io_err)?;
    out.flush().map_err(io_err)?;
    Ok(())
}

fn write_header(
    out: &mut impl Write,
    config: &ReportConfig,
    prefix: &Path,
) -> std::io::Result<()> {
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html><head>")?;
    writeln!(out, "<title>{}</title>", escape("scanward results"))?;
    writeln!(out, "<link type=\"text/css\" rel=\"stylesheet\" href=\"scanview.css\"/>")?;
    writeln!(out, "<script src=\"sorttable.js\"></script>")?;
    writeln!(out, "<script src=\"selectable.js\"></script>")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;
    writeln!(out, "<h1>{}</h1>", escape(&prefix.display().to_string()))?;
    writeln!(out, "<table class=\"options\">")?;
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    row(out, "User", &format!("{user}@{host}"))?;
    let cwd = std::env::current_dir().unwrap_or_default();
    row(out, "Working Directory", &cwd.display().to_string())?;
    row(out, "Command Line", &config.command_line)?;
    row(out, "Clang Version", &config.clang_version)?;
    let date = chrono::Local::now().format("%a %b %e %H:%M:%S %Y").to_string();
    row(out, "Date", &date)?;
    writeln!(out, "</table>")?;
    Ok(())
}

fn row(out: &mut impl Write, name: &str, value: &str) -> std::io::Result<()> {
    writeln!(
        out,
        "<tr><th>{}:</th><td>{}</td></tr>",
        escape(name),
        escape(value)
    )
}

/// Per-category bug counts, category order and type order both sorted.
fn summary_fragment(config: &ReportConfig, bugs: &[Bug]) -> Result<PathBuf> {
    let counters = count_by_category(bugs);
    write_fragment(config, "summary", |out| {
        writeln!(out, "<h2>Bug Summary</h2>")?;
        writeln!(out, "<table class=\"sortable\" id=\"summary\">")?;
        writeln!(out, "<thead><tr><td>Bug Type</td><td>Quantity</td></tr></thead>")?;
        writeln!(
            out,
            "<tr><th>All Bugs</th><th class=\"Q\">{}</th></tr>",
            bugs.len()
        )?;
        for (category, types) in &counters {
            writeln!(out, "<tr><th>{}</th><th></th></tr>", escape(category))?;
            for (bug_type, count) in types {
                writeln!(
                    out,
                    "<tr><td class=\"SUMM_DESC\">{}</td><td class=\"Q\">{count}</td></tr>",
                    escape(bug_type)
                )?;
            }
        }
        writeln!(out, "</table>")?;
        Ok(())
    })
}

fn bug_fragment(config: &ReportConfig, bugs: &[Bug], prefix: &Path) -> Result<PathBuf> {
    write_fragment(config, "bugs", |out| {
        writeln!(out, "<h2>Reports</h2>")?;
        writeln!(out, "<table class=\"sortable\" id=\"reports\">")?;
        writeln!(
            out,
            "<thead><tr>\
             <td>Bug Group</td><td>Bug Type</td><td>File</td><td>Function</td>\
             <td>Line</td><td>Path Length</td><td></td></tr></thead>"
        )?;
        for bug in bugs {
            let file = chop(prefix, &bug.file);
            let function = bug.function.as_deref().unwrap_or("n/a");
            let link = bug
                .report_path
                .as_deref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            writeln!(
                out,
                "<tr>\
                 <td class=\"DESC\">{}</td><td class=\"DESC\">{}</td>\
                 <td>{}</td><td class=\"DESC\">{}</td>\
                 <td class=\"Q\">{}</td><td class=\"Q\">{}</td>\
                 <td><a href=\"{}#EndPath\">View Report</a></td></tr>",
                escape(&bug.category),
                escape(&bug.bug_type),
                escape(&file),
                escape(function),
                bug.line,
                bug.path_length,
                escape(&link)
            )?;
        }
        writeln!(out, "</table>")?;
        Ok(())
    })
}

fn crash_fragment(config: &ReportConfig, crashes: &[Crash], prefix: &Path) -> Result<PathBuf> {
    write_fragment(config, "crashes", |out| {
        writeln!(out, "<h2>Analyzer Failures</h2>")?;
        writeln!(out, "<table class=\"sortable\" id=\"crashes\">")?;
        writeln!(
            out,
            "<thead><tr><td>Problem</td><td>Source File</td>\
             <td>Preprocessed File</td><td>STDERR Output</td></tr></thead>"
        )?;
        for crash in crashes {
            let source = chop(prefix, Path::new(&crash.source));
            let info = relative_link(&config.output_dir, &crash.info_path);
            let stderr = relative_link(&config.output_dir, &crash.stderr_path);
            writeln!(
                out,
                "<tr><td>{}</td><td>{}</td>\
                 <td><a href=\"{}\">info</a></td>\
                 <td><a href=\"{}\">stderr</a></td></tr>",
                escape(&crash.problem),
                escape(&source),
                escape(&info),
                escape(&stderr)
            )?;
        }
        writeln!(out, "</table>")?;
        Ok(())
    })
}

fn write_fragment<F>(config: &ReportConfig, kind: &str, render: F) -> Result<PathBuf>
where
    F: FnOnce(&mut BufWriter<&mut fs::File>) -> std::io::Result<()>,
{
    let file = tempfile::Builder::new()
        .prefix(&format!("fragment-{kind}-"))
        .suffix(".html")
        .tempfile_in(&config.output_dir)
        .map_err(|e| ScanwardError::io(e, config.output_dir.clone()))?;
    let (mut handle, path) = file
        .keep()
        .map_err(|e| ScanwardError::io(e.error, config.output_dir.clone()))?;
    let mut out = BufWriter::new(&mut handle);
    render(&mut out).map_err(|e| ScanwardError::io(e, path.clone()))?;
    out.flush().map_err(|e| ScanwardError::io(e, path.clone()))?;
    drop(out);
    Ok(path)
}

/// Installs the static stylesheet and scripts next to the report.
pub fn copy_resource_files(output_dir: &Path) -> Result<()> {
    for (name, content) in [
        ("scanview.css", SCANVIEW_CSS),
        ("sorttable.js", SORTTABLE_JS),
        ("selectable.js", SELECTABLE_JS),
    ] {
        let path = output_dir.join(name);
        fs::write(&path, content).map_err(|e| ScanwardError::io(e, path))?;
    }
    Ok(())
}

fn chop(prefix: &Path, path: &Path) -> String {
    path.strip_prefix(prefix)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn relative_link(output_dir: &Path, path: &Path) -> String {
    chop(output_dir, path)
}

/// Minimal HTML escaping for text and attribute positions.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;

    const REPORT: &str = "\
<!DOCTYPE html>
<html><head></head>
<!-- BUGDESC Dereference of null pointer -->
<!-- BUGTYPE Dereference of null pointer -->
<!-- BUGCATEGORY Logic error -->
<!-- BUGFILE /proj/src/a.c -->
<!-- BUGLINE 42 -->
<!-- BUGPATHLENGTH 6 -->
<!-- FUNCTIONNAME broken -->
<!-- BUGMETAEND -->
<body>report body</body></html>
";

    fn config(dir: &Path) -> ReportConfig {
        ReportConfig {
            output_dir: dir.to_path_buf(),
            output_format: OutputFormat::Html,
            command_line: "scanward scan -- make".to_string(),
            clang_version: "clang version 17.0.0".to_string(),
            compilation_db: None,
            keep_empty: false,
            verbose: 0,
        }
    }

    #[test]
    fn parses_marker_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report-1234.html");
        fs::write(&path, REPORT).unwrap();

        let bugs = read_bugs(dir.path()).unwrap();
        assert_eq!(bugs.len(), 1);
        let bug = &bugs[0];
        assert_eq!(bug.bug_type, "Dereference of null pointer");
        assert_eq!(bug.category, "Logic error");
        assert_eq!(bug.file, PathBuf::from("/proj/src/a.c"));
        assert_eq!(bug.line, 42);
        assert_eq!(bug.path_length, 6);
        assert_eq!(bug.function.as_deref(), Some("broken"));
    }

    #[test]
    fn index_and_pages_without_markers_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), REPORT).unwrap();
        fs::write(dir.path().join("other.html"), "<html></html>").unwrap();
        assert!(read_bugs(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn assemble_writes_index_and_removes_fragments() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let bugs = vec![Bug {
            category: "Logic error".to_string(),
            bug_type: "Leak".to_string(),
            file: PathBuf::from("/proj/src/a.c"),
            line: 3,
            path_length: 2,
            function: Some("f".to_string()),
            report_path: Some(dir.path().join("report-1.html")),
        }];

        assemble_index(&config, &bugs, &[]).unwrap();

        let index = fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert!(index.contains("Bug Summary"));
        assert!(index.contains("report-1.html#EndPath"));
        assert!(index.contains("</body></html>"));

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("fragment-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn index_is_stable_apart_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let mut bugs = vec![
            Bug {
                category: "Memory".to_string(),
                bug_type: "Leak".to_string(),
                file: PathBuf::from("/proj/a.c"),
                line: 1,
                path_length: 1,
                function: None,
                report_path: None,
            },
            Bug {
                category: "Logic error".to_string(),
                bug_type: "Null deref".to_string(),
                file: PathBuf::from("/proj/b.c"),
                line: 2,
                path_length: 4,
                function: None,
                report_path: None,
            },
        ];

        let body_of = |content: &str| {
            content
                .split("</table>")
                .skip(1)
                .collect::<Vec<_>>()
                .join("</table>")
        };

        assemble_index(&config, &bugs, &[]).unwrap();
        let first = body_of(&fs::read_to_string(dir.path().join("index.html")).unwrap());

        bugs.reverse();
        // the caller feeds sorted bugs; sort here the way document() does
        bugs.sort_by_key(Bug::key);
        assemble_index(&config, &bugs, &[]).unwrap();
        let second = body_of(&fs::read_to_string(dir.path().join("index.html")).unwrap());

        assert_eq!(first, second);
    }

    #[test]
    fn escape_covers_markup_characters() {
        assert_eq!(escape("a < b & c > \"d\""), "a &lt; b &amp; c &gt; &quot;d&quot;");
    }
}
