//! Report rows and the aggregated summary rows built from them.

/// Object identifier column.
pub const OBJ_ID: &str = "OBJ-ID";
/// Object URN column.
pub const OBJ_URN: &str = "OBJ-URN";
/// Object sequence (OSN) column.
pub const OBJ_OSN: &str = "OBJ-OSN";
/// Original path of the file inside the deposit.
pub const FILE_ORIGPATH: &str = "FILE-ORIGPATH";
/// Declared format of the file.
pub const FILE_FORMAT: &str = "FILE-FORMAT";
/// File URN column.
pub const FILE_URN: &str = "FILE-URN";
/// Output column holding the joined file URNs.
pub const FILE_URNS: &str = "FILE-URNs";

/// Columns that must be present once a report contributes MP3 rows.
pub const REQUIRED_COLUMNS: [&str; 4] = [OBJ_ID, OBJ_URN, OBJ_OSN, FILE_URN];

/// Separator placed between file URNs of one object.
pub const URN_SEPARATOR: &str = ", ";

/// A parsed tab-delimited report.
///
/// Values are kept verbatim as text. Empty fields and fields missing from
/// short rows are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportTable {
    /// Column headers, whitespace-trimmed.
    pub headers: Vec<String>,
    /// Data rows, each padded to `headers.len()`.
    pub rows: Vec<Vec<Option<String>>>,
}

impl ReportTable {
    /// Position of a column by exact header name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Value of `column` in `row`, treating absent columns as empty.
    pub fn value<'a>(&self, row: &'a [Option<String>], column: Option<usize>) -> Option<&'a str> {
        column
            .and_then(|idx| row.get(idx))
            .and_then(|v| v.as_deref())
    }
}

/// The (id, URN, OSN) triple identifying one logical media object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub id: String,
    pub urn: String,
    pub osn: String,
}

/// One line of the summary table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateRow {
    pub key: ObjectKey,
    /// File URNs in original row order, joined with [`URN_SEPARATOR`].
    pub file_urns: String,
}

impl AggregateRow {
    /// Build a row from a key and the file URNs collected for it.
    pub fn new(key: ObjectKey, urns: &[String]) -> Self {
        Self {
            key,
            file_urns: urns.join(URN_SEPARATOR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_absent_column_is_none() {
        let table = ReportTable {
            headers: vec!["A".into()],
            rows: vec![vec![Some("x".into())]],
        };
        let row = &table.rows[0];
        assert_eq!(table.value(row, table.column("A")), Some("x"));
        assert_eq!(table.value(row, table.column("B")), None);
    }

    #[test]
    fn test_aggregate_row_joins_in_order() {
        let key = ObjectKey {
            id: "1".into(),
            urn: "U".into(),
            osn: "S".into(),
        };
        let row = AggregateRow::new(key, &["C".into(), "A".into(), "B".into()]);
        assert_eq!(row.file_urns, "C, A, B");
    }
}
