//! INI-style unit file parser
//!
//! Reads unit file text into an ordered list of section/name/value options.
//! Comments, blank lines and key ordering carry no meaning for the
//! configuration, so they are not preserved.

use std::collections::HashSet;
use std::path::Path;

/// One `Name=Value` assignment inside a `[Section]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOption {
    pub section: String,
    pub name: String,
    pub value: String,
}

impl UnitOption {
    pub fn new(
        section: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            section: section.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Section '{0}' appears more than once")]
    DuplicateSection(String),

    #[error("Malformed section header on line {0}: {1}")]
    MalformedSection(usize, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse unit file text into options, in file order
pub fn parse_file(content: &str) -> Result<Vec<UnitOption>, ParseError> {
    let mut options = Vec::new();
    let mut seen = HashSet::new();
    let mut section: Option<String> = None;

    for (number, line) in logical_lines(content) {
        // Skip comments and empty lines
        if line.starts_with('#') || line.starts_with(';') || line.is_empty() {
            continue;
        }

        if line.starts_with('[') {
            let name = line
                .strip_prefix('[')
                .and_then(|l| l.strip_suffix(']'))
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| ParseError::MalformedSection(number, line.clone()))?;
            if !seen.insert(name.to_string()) {
                return Err(ParseError::DuplicateSection(name.to_string()));
            }
            section = Some(name.to_string());
            continue;
        }

        // Lines before the first section are ignored
        let Some(current) = &section else {
            continue;
        };

        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() || value.is_empty() {
            continue;
        }
        options.push(UnitOption::new(current.as_str(), name, value));
    }

    Ok(options)
}

/// Join backslash-continued lines, keeping the 1-based number of the first one
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        let (start, mut text) = match pending.take() {
            Some((start, mut acc)) => {
                acc.push(' ');
                acc.push_str(trimmed);
                (start, acc)
            }
            None => (idx + 1, trimmed.to_string()),
        };

        if text.ends_with('\\') && !text.starts_with('#') && !text.starts_with(';') {
            text.pop();
            pending = Some((start, text.trim_end().to_string()));
        } else {
            lines.push((start, text));
        }
    }
    if let Some(rest) = pending {
        lines.push(rest);
    }

    lines
}

/// Parse a unit file from disk
pub async fn parse_unit_file(path: &Path) -> Result<Vec<UnitOption>, ParseError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_file(&content)
}

/// Parse an `Environment=` value using shell-like quoting
pub fn parse_environment(raw: &str) -> Option<Vec<(String, String)>> {
    let parts = shlex::split(raw)?;
    Some(
        parts
            .into_iter()
            .filter_map(|pair| {
                pair.split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect(),
    )
}
