//! Common types and utilities for atrace commands.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AtraceError, Result};

// ============================================================================
// Output Format
// ============================================================================

/// Report layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Header line, then one tab-separated row per key sorted by key
    #[default]
    Tsv,
    /// Rows by descending count with an average age column
    Summary,
    /// A single JSON document
    Json,
}

// ============================================================================
// Key Lists
// ============================================================================

/// Split a `--keys` value such as `path,type` into field names.
///
/// Blank entries are skipped, so an empty string yields no fields.
pub fn split_keys(keys: &str) -> Vec<String> {
    keys.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// Input and Output
// ============================================================================

/// Open an event stream; `-` reads standard input.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>> {
    if path == Path::new("-") {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }

    let file = File::open(path).map_err(|e| {
        AtraceError::Validation(format!("Cannot open event stream {}: {}", path.display(), e))
    })?;
    Ok(Box::new(BufReader::new(file)))
}

/// Open the report destination; `None` writes to standard output.
pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Ok(Box::new(BufWriter::new(File::create(path)?)))
        },
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keys() {
        assert_eq!(split_keys("path, type"), vec!["path", "type"]);
        assert_eq!(split_keys("class,,line"), vec!["class", "line"]);
        assert!(split_keys("").is_empty());
    }

    #[test]
    fn test_output_format_serde() {
        let format: OutputFormat = serde_json::from_str("\"summary\"").unwrap();
        assert_eq!(format, OutputFormat::Summary);
        assert_eq!(serde_json::to_string(&OutputFormat::Json).unwrap(), "\"json\"");
    }

    #[test]
    fn test_open_missing_input() {
        let err = open_input(Path::new("/nonexistent/events.jsonl"))
            .err()
            .expect("missing file must fail");
        assert!(matches!(err, AtraceError::Validation(_)));
    }
}
