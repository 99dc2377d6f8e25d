//! Extract MP3 objects from a directory of load reports.
//!
//! Each report is filtered independently, its MP3 rows are grouped by the
//! (OBJ-ID, OBJ-URN, OBJ-OSN) triple, and the per-report groups are
//! concatenated in file-name order. The same triple in two reports yields
//! two output rows.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ReportError, Result};
use crate::export::csv::write_summary;
use crate::model::report::{
    AggregateRow, ObjectKey, ReportTable, FILE_FORMAT, FILE_ORIGPATH, FILE_URN, OBJ_ID, OBJ_OSN,
    OBJ_URN, REQUIRED_COLUMNS,
};
use crate::parser::report::read_report;
use crate::retrieve::is_report_filename;

/// Result of scanning a report directory.
#[derive(Debug, Default)]
pub struct Aggregation {
    /// Summary rows in output order.
    pub rows: Vec<AggregateRow>,
    /// Report files examined.
    pub files_scanned: usize,
    /// Reports skipped because they could not be parsed, with the reason.
    pub files_skipped: Vec<(PathBuf, String)>,
    /// Reports that contributed at least one row.
    pub files_contributing: usize,
}

/// Whether a row describes MP3 media.
///
/// True if the original path contains `.mp3` or the declared format
/// contains `mp3`, ignoring case. Missing values never match.
pub fn is_mp3(orig_path: Option<&str>, format: Option<&str>) -> bool {
    let path_match = orig_path.is_some_and(|p| p.to_lowercase().contains(".mp3"));
    let format_match = format.is_some_and(|f| f.to_lowercase().contains("mp3"));
    path_match || format_match
}

/// Group the MP3 rows of one report.
///
/// Groups come out in ascending key order; file URNs keep row order. Rows
/// with an empty key component are not grouped, and empty file URNs are
/// left out of the joined string.
///
/// Fails with [`ReportError::MissingColumns`] if MP3 rows exist but a
/// column needed for grouping does not.
pub fn group_report(table: &ReportTable, path: &Path) -> Result<Vec<AggregateRow>> {
    let orig_col = table.column(FILE_ORIGPATH);
    let format_col = table.column(FILE_FORMAT);

    let selected: Vec<&Vec<Option<String>>> = table
        .rows
        .iter()
        .filter(|row| is_mp3(table.value(row, orig_col), table.value(row, format_col)))
        .collect();

    if selected.is_empty() {
        return Ok(Vec::new());
    }

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| table.column(c).is_none())
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ReportError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing,
        });
    }

    let id_col = table.column(OBJ_ID);
    let urn_col = table.column(OBJ_URN);
    let osn_col = table.column(OBJ_OSN);
    let file_urn_col = table.column(FILE_URN);

    let mut groups: BTreeMap<ObjectKey, Vec<String>> = BTreeMap::new();
    for row in selected {
        let (Some(id), Some(urn), Some(osn)) = (
            table.value(row, id_col),
            table.value(row, urn_col),
            table.value(row, osn_col),
        ) else {
            tracing::debug!(path = %path.display(), "Skipping MP3 row with incomplete object key");
            continue;
        };

        let urns = groups
            .entry(ObjectKey {
                id: id.to_string(),
                urn: urn.to_string(),
                osn: osn.to_string(),
            })
            .or_default();
        if let Some(file_urn) = table.value(row, file_urn_col) {
            urns.push(file_urn.to_string());
        }
    }

    Ok(groups
        .into_iter()
        .map(|(key, urns)| AggregateRow::new(key, &urns))
        .collect())
}

/// Report files in `dir`, sorted by file name.
pub fn report_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ReportError::FileNotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| ReportError::io(dir, e))? {
        let entry = entry.map_err(|e| ReportError::io(dir, e))?;
        let path = entry.path();
        let is_report = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_report_filename);
        if is_report && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Aggregate every report in `dir`.
///
/// Unparseable reports are logged and skipped. A report with MP3 rows but
/// without the grouping columns aborts the whole run.
///
/// The progress callback receives `(current, total)`.
pub fn aggregate_directory(dir: &Path, progress: &dyn Fn(usize, usize)) -> Result<Aggregation> {
    let files = report_files(dir)?;
    let total = files.len();
    let mut result = Aggregation {
        files_scanned: total,
        ..Aggregation::default()
    };

    for (i, path) in files.iter().enumerate() {
        progress(i, total);

        let table = match read_report(path) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable report");
                result.files_skipped.push((path.clone(), e.to_string()));
                continue;
            }
        };

        let rows = group_report(&table, path)?;
        tracing::debug!(path = %path.display(), groups = rows.len(), "Processed report");
        if !rows.is_empty() {
            result.files_contributing += 1;
            result.rows.extend(rows);
        }
    }
    progress(total, total);

    Ok(result)
}

/// Aggregate `dir` and write the summary to `output` if any MP3 rows exist.
///
/// When the returned aggregation has no rows, nothing was written.
pub fn summarize_directory(
    dir: &Path,
    output: &Path,
    progress: &dyn Fn(usize, usize),
) -> Result<Aggregation> {
    let aggregation = aggregate_directory(dir, progress)?;
    if aggregation.rows.is_empty() {
        tracing::info!(dir = %dir.display(), "No MP3 rows found");
    } else {
        write_summary(&aggregation.rows, output)?;
    }
    Ok(aggregation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::report::parse_report;

    const HEADER: &str = "OBJ-ID\tOBJ-URN\tOBJ-OSN\tFILE-ORIGPATH\tFILE-FORMAT\tFILE-URN\n";

    fn group(text: &str) -> Result<Vec<AggregateRow>> {
        let table = parse_report(text).unwrap();
        group_report(&table, Path::new("test.txt"))
    }

    #[test]
    fn test_is_mp3() {
        assert!(is_mp3(Some("audio/Track01.MP3"), None));
        assert!(is_mp3(None, Some("MP3")));
        assert!(is_mp3(Some("x.wav"), Some("audio/mp3")));
        assert!(!is_mp3(Some("mp3/readme.txt"), Some("text")));
        assert!(!is_mp3(None, None));
        assert!(!is_mp3(Some(""), Some("")));
    }

    #[test]
    fn test_group_preserves_row_order() {
        let text = format!(
            "{HEADER}7\tU\tS\ta.mp3\t\tC\n7\tU\tS\tb.mp3\t\tA\n7\tU\tS\tc.mp3\t\tB\n"
        );
        let rows = group(&text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_urns, "C, A, B");
    }

    #[test]
    fn test_group_orders_keys() {
        let text = format!("{HEADER}9\tU9\tS\ta.mp3\t\tF9\n10\tU10\tS\tb.mp3\t\tF10\n");
        let rows = group(&text).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.key.id.as_str()).collect();
        // Keys compare as text.
        assert_eq!(ids, vec!["10", "9"]);
    }

    #[test]
    fn test_group_ignores_non_mp3_rows() {
        let text = format!("{HEADER}1\tU\tS\tdoc.pdf\tPDF\tF1\n");
        assert!(group(&text).unwrap().is_empty());
    }

    #[test]
    fn test_missing_filter_columns_do_not_match() {
        let rows = group("OBJ-ID\tOBJ-URN\tOBJ-OSN\tFILE-URN\n1\tU\tS\tF\n").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_missing_required_column_is_fatal_only_with_matches() {
        let text = "OBJ-ID\tOBJ-URN\tFILE-FORMAT\tFILE-URN\n1\tU\tmp3\tF\n";
        match group(text) {
            Err(ReportError::MissingColumns { columns, .. }) => {
                assert_eq!(columns, vec!["OBJ-OSN".to_string()]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
        assert!(group("OBJ-ID\tFILE-FORMAT\n1\tpdf\n").unwrap().is_empty());
    }

    #[test]
    fn test_incomplete_keys_and_empty_urns() {
        let text = format!(
            "{HEADER}1\tU\t\ta.mp3\t\tF0\n2\tU\tS\tb.mp3\t\t\n2\tU\tS\tc.mp3\t\tF2\n"
        );
        let rows = group(&text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key.id, "2");
        assert_eq!(rows[0].file_urns, "F2");
    }
}
