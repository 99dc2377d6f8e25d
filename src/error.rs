//! Centralized error types for drsreport.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the drsreport library.
#[derive(Error, Debug)]
pub enum ReportError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file or directory does not exist.
    #[error("Not found: {0}")]
    FileNotFound(PathBuf),

    /// A report file could not be parsed as tab-delimited text.
    #[error("Parse error in '{path}': {reason}")]
    ParseError { path: PathBuf, reason: String },

    /// A report matched MP3 rows but lacks columns needed to group them.
    #[error("Report '{path}' is missing required column(s): {}", columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    /// A date string could not be parsed.
    #[error("Invalid date '{0}' (expected YYYY/MM/DD or YYYY-MM-DD)")]
    InvalidDate(String),

    /// The end of a date range lies before its start.
    #[error("Invalid date range: end {end} is before start {start}")]
    InvalidDateRange { start: String, end: String },

    /// The configuration is incomplete or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Obtaining or refreshing mailbox credentials failed.
    #[error("Authorization failed: {0}")]
    Auth(String),

    /// The HTTP transport failed before a response was received.
    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    /// The mailbox API answered with a non-success status.
    #[error("Mailbox API returned {status} for {url}: {body}")]
    Api {
        url: String,
        status: u16,
        body: String,
    },

    /// A response or credential file had an unexpected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A message or attachment id is unknown to the mailbox.
    #[error("Not found in mailbox: {0}")]
    MissingMessage(String),

    /// A declared attachment filename does not name a file.
    #[error("Unusable attachment filename '{0}'")]
    InvalidFilename(String),

    /// Attachment content could not be decoded.
    #[error("Failed to decode attachment '{filename}': {reason}")]
    Decode { filename: String, reason: String },
}

/// Convenience alias for `Result<T, ReportError>`.
pub type Result<T> = std::result::Result<T, ReportError>;

impl ReportError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `ParseError` for a report file.
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare; prefer `ReportError::io`).
impl From<std::io::Error> for ReportError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_columns() {
        let err = ReportError::MissingColumns {
            path: PathBuf::from("a.txt"),
            columns: vec!["OBJ-ID".into(), "FILE-URN".into()],
        };
        assert_eq!(
            err.to_string(),
            "Report 'a.txt' is missing required column(s): OBJ-ID, FILE-URN"
        );
    }

    #[test]
    fn test_io_helper_keeps_path() {
        let err = ReportError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        );
        assert!(err.to_string().contains("/tmp/x"));
    }
}
