use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

/// Matches `{{ env.VAR }}` and `{{ env.VAR | default("fallback") }}`
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).unwrap()
});

/// Failure while substituting placeholders in the raw config text
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    /// Variable is unset and the placeholder has no default
    #[error("environment variable not found: `{0}` (line {1})")]
    Missing(String, usize),

    /// Placeholder is not of the form `env.NAME`
    #[error("only `env.` placeholders are supported, found `{0}` (line {1})")]
    UnsupportedScope(String, usize),
}

/// Substitute environment placeholders in a raw TOML document
///
/// Comment lines are copied verbatim, so a commented-out secret never
/// has to be present in the environment.
pub fn expand_env(input: &str) -> Result<String, ExpandError> {
    let mut lines = Vec::new();

    for (index, line) in input.lines().enumerate() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
        } else {
            lines.push(expand_line(line, index + 1)?);
        }
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str, line_number: usize) -> Result<String, ExpandError> {
    let mut expanded = String::with_capacity(line.len());
    let mut cursor = 0;

    for captures in PLACEHOLDER_RE.captures_iter(line) {
        let Some(whole) = captures.get(0) else {
            continue;
        };

        expanded.push_str(&line[cursor..whole.start()]);
        expanded.push_str(&resolve(&captures, line_number)?);
        cursor = whole.end();
    }

    expanded.push_str(&line[cursor..]);
    Ok(expanded)
}

fn resolve(captures: &Captures<'_>, line_number: usize) -> Result<String, ExpandError> {
    let key = captures.get(1).map_or("", |m| m.as_str());
    let fallback = captures.get(2).map(|m| m.as_str().to_owned());

    let Some(name) = key.strip_prefix("env.").filter(|n| !n.is_empty() && !n.contains('.')) else {
        return Err(ExpandError::UnsupportedScope(key.to_owned(), line_number));
    };

    std::env::var(name)
        .ok()
        .or(fallback)
        .ok_or_else(|| ExpandError::Missing(name.to_owned(), line_number))
}
