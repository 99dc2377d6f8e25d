//! Parser for tab-delimited DRS load reports.
//!
//! Reports are exported as UTF-8 text with one header row. Fields may be
//! wrapped in double quotes (with `""` as an escaped quote), which also
//! allows tabs and line breaks inside a field. Blank lines are ignored.

use std::path::Path;

use crate::error::{ReportError, Result};
use crate::model::report::ReportTable;

/// Read and parse a report file.
///
/// A leading UTF-8 byte-order mark is ignored. Invalid UTF-8 is an error.
pub fn read_report(path: &Path) -> Result<ReportTable> {
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ReportError::FileNotFound(path.to_path_buf())
        } else {
            ReportError::io(path, e)
        }
    })?;

    let (text, had_errors) = encoding_rs::UTF_8.decode_with_bom_removal(&data);
    if had_errors {
        return Err(ReportError::parse(path, "file is not valid UTF-8"));
    }

    parse_report(&text).map_err(|reason| ReportError::parse(path, reason))
}

/// Parse report text into a [`ReportTable`].
///
/// Fails if there is no header row, a quote is left open, or a data row has
/// more fields than the header. Short rows are padded with `None`.
pub fn parse_report(text: &str) -> std::result::Result<ReportTable, String> {
    let mut records = split_records(text)?.into_iter();

    let headers: Vec<String> = match records.next() {
        Some((_, fields)) => fields.iter().map(|h| h.trim().to_string()).collect(),
        None => return Err("no columns to parse from file".into()),
    };

    let mut rows = Vec::new();
    for (line, fields) in records {
        if fields.len() > headers.len() {
            return Err(format!(
                "expected {} fields in line {line}, saw {}",
                headers.len(),
                fields.len()
            ));
        }
        let mut row: Vec<Option<String>> = fields
            .into_iter()
            .map(|f| if f.is_empty() { None } else { Some(f) })
            .collect();
        row.resize(headers.len(), None);
        rows.push(row);
    }

    Ok(ReportTable { headers, rows })
}

/// Split text into records of raw fields, tagged with their starting line.
fn split_records(text: &str) -> std::result::Result<Vec<(usize, Vec<String>)>, String> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut was_quoted = false;
    let mut line = 1usize;
    let mut record_line = 1usize;

    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => {
                    if ch == '\n' {
                        line += 1;
                    }
                    field.push(ch);
                }
            }
            continue;
        }

        match ch {
            '"' if field.is_empty() && !was_quoted => {
                in_quotes = true;
                was_quoted = true;
            }
            '\t' => {
                record.push(std::mem::take(&mut field));
                was_quoted = false;
            }
            '\r' | '\n' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                finish_record(&mut records, &mut record, &mut field, was_quoted, record_line);
                was_quoted = false;
                line += 1;
                record_line = line;
            }
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err(format!("unterminated quoted field starting in line {record_line}"));
    }
    finish_record(&mut records, &mut record, &mut field, was_quoted, record_line);

    Ok(records)
}

/// Close the current record, dropping it if it is a blank line.
fn finish_record(
    records: &mut Vec<(usize, Vec<String>)>,
    record: &mut Vec<String>,
    field: &mut String,
    was_quoted: bool,
    line: usize,
) {
    let blank = record.is_empty() && field.is_empty() && !was_quoted;
    record.push(std::mem::take(field));
    let fields = std::mem::take(record);
    if !blank {
        records.push((line, fields));
    }
}
