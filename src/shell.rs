// src/shell.rs
//! Shell escaping and unescaping for compilation database commands.
//!
//! A `command` entry in a compilation database is a single shell-escaped
//! string. These helpers convert between that form and an argv vector,
//! matching the quoting rules build tools actually emit: double-quoted
//! tokens protect `"` and `\` with backslashes, unquoted tokens escape
//! shell metacharacters individually.

/// Shell metacharacters that force an argument into double quotes.
const RESERVED: &str = " $%&()[]{}*|<>@?!";

/// Takes a command as an argv list and returns one escaped string.
#[must_use]
pub fn encode(command: &[String]) -> String {
    command
        .iter()
        .map(|arg| escape(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Takes an escaped command string and returns the argv list.
///
/// # Errors
/// Returns an error when the string has unbalanced quoting.
pub fn decode(string: &str) -> crate::error::Result<Vec<String>> {
    let tokens = split_keep_quotes(string)
        .map_err(crate::error::ScanwardError::Invocation)?;
    Ok(tokens.iter().map(|t| unescape(t)).collect())
}

fn escape(arg: &str) -> String {
    let escaped: String = arg
        .chars()
        .flat_map(|c| match c {
            '\\' => vec!['\\', '\\'],
            '"' => vec!['\\', '"'],
            other => vec![other],
        })
        .collect();

    if needs_quote(arg) {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

/// Runs a small state machine over the argument to decide whether it must
/// be protected by quotes. Escaped or quoted metacharacters do not count.
fn needs_quote(arg: &str) -> bool {
    #[derive(PartialEq)]
    enum State {
        Plain,
        Escaped,
        DoubleQuoted,
        SingleQuoted,
    }

    let mut state = State::Plain;
    for c in arg.chars() {
        state = match state {
            State::Plain if RESERVED.contains(c) => return true,
            State::Plain if c == '\\' => State::Escaped,
            State::Plain if c == '"' => State::DoubleQuoted,
            State::Plain if c == '\'' => State::SingleQuoted,
            State::Escaped if RESERVED.contains(c) || c == '\\' => State::Plain,
            State::DoubleQuoted if c == '"' => State::Plain,
            State::SingleQuoted if c == '\'' => State::Plain,
            other => other,
        };
    }
    state != State::Plain
}

fn unescape(arg: &str) -> String {
    // A fully double-quoted token only protects `"` and `\`.
    if arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"') {
        let inner = &arg[1..arg.len() - 1];
        return unescape_chars(inner, "\"\\");
    }
    let mut metachars = String::from("\\");
    metachars.push_str(RESERVED);
    unescape_chars(arg, &metachars)
}

fn unescape_chars(arg: &str, allowed: &str) -> String {
    let mut result = String::with_capacity(arg.len());
    let mut chars = arg.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(&next) if allowed.contains(next) => {
                    result.push(next);
                    chars.next();
                }
                _ => result.push(c),
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Whitespace tokenizer that keeps quote characters in place so that
/// `unescape` can tell quoted tokens from bare ones. `shell_words::split`
/// is not usable here because it strips the quotes it consumes.
fn split_keep_quotes(string: &str) -> std::result::Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in string.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if quote != Some('\'') => {
                current.push(c);
                escaped = true;
            }
            '"' | '\'' => {
                current.push(c);
                quote = match quote {
                    None => Some(c),
                    Some(q) if q == c => None,
                    Some(q) => Some(q),
                };
            }
            c if c.is_whitespace() && quote.is_none() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if escaped || quote.is_some() {
        return Err(format!("unbalanced quoting in command: {string}"));
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}
