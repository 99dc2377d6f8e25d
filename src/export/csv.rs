//! Write the MP3 summary table as CSV.
//!
//! Comma-delimited, one header row, no index column, `\n` line endings.

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{ReportError, Result};
use crate::model::report::{AggregateRow, FILE_URNS, OBJ_ID, OBJ_OSN, OBJ_URN};

/// Write summary rows to `output_path`, replacing any existing file.
///
/// Columns: OBJ-ID, OBJ-URN, OBJ-OSN, FILE-URNs
pub fn write_summary(rows: &[AggregateRow], output_path: &Path) -> Result<()> {
    let io_err = |e: std::io::Error| ReportError::io(output_path, e);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ReportError::io(parent, e))?;
    }

    let file = std::fs::File::create(output_path).map_err(io_err)?;
    let mut out = BufWriter::new(file);

    writeln!(out, "{OBJ_ID},{OBJ_URN},{OBJ_OSN},{FILE_URNS}").map_err(io_err)?;
    for row in rows {
        writeln!(
            out,
            "{},{},{},{}",
            csv_escape(&row.key.id),
            csv_escape(&row.key.urn),
            csv_escape(&row.key.osn),
            csv_escape(&row.file_urns),
        )
        .map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;

    tracing::info!(path = %output_path.display(), rows = rows.len(), "Wrote summary");
    Ok(())
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::report::ObjectKey;

    #[test]
    fn test_csv_escape_simple() {
        assert_eq!(csv_escape("hello"), "hello");
    }

    #[test]
    fn test_csv_escape_comma() {
        assert_eq!(csv_escape("F2, F3"), "\"F2, F3\"");
    }

    #[test]
    fn test_csv_escape_quotes() {
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_escape_newline() {
        assert_eq!(csv_escape("line1\nline2"), "\"line1\nline2\"");
    }

    #[test]
    fn test_write_summary_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("summary.csv");
        let rows = vec![AggregateRow {
            key: ObjectKey {
                id: "2".into(),
                urn: "U2".into(),
                osn: "S2".into(),
            },
            file_urns: "F2, F3".into(),
        }];
        write_summary(&rows, &path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "OBJ-ID,OBJ-URN,OBJ-OSN,FILE-URNs\n2,U2,S2,\"F2, F3\"\n"
        );
    }
}
