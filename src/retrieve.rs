//! Download report attachments from the mailbox.
//!
//! Every message received in the requested date range is fetched, its MIME
//! tree is walked to any depth (forwarded reports are often nested several
//! levels down), and each leaf whose filename ends in `.txt` is decoded and
//! written to the destination directory under its declared name. Existing
//! files with the same name are overwritten.

use std::path::{Path, PathBuf};

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::error::{ReportError, Result};
use crate::mailbox::query::DateRange;
use crate::mailbox::Mailbox;
use crate::model::message::Part;

/// Extension identifying report attachments (compared case-insensitively).
pub const REPORT_EXTENSION: &str = ".txt";

/// URL-safe base64 that accepts bodies with or without padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Progress notifications emitted while retrieving.
#[derive(Debug)]
pub enum RetrieveEvent<'a> {
    /// The search finished; this many messages will be processed.
    Found(usize),
    /// Processing of message `current` (0-based) of `total` starts.
    Message { current: usize, total: usize },
    /// An attachment was written to this path.
    Saved(&'a Path),
}

/// Outcome of a retrieval run.
#[derive(Debug, Default)]
pub struct RetrieveStats {
    /// Messages returned by the search.
    pub messages_found: usize,
    /// Messages that could not be fetched.
    pub messages_failed: usize,
    /// Qualifying attachments that could not be fetched, decoded, or written.
    pub attachments_failed: usize,
    /// Paths written, in processing order (may repeat on name collisions).
    pub saved: Vec<PathBuf>,
    /// Total decoded bytes written.
    pub bytes_written: u64,
}

/// Whether `name` ends in the report extension, ignoring case.
pub fn is_report_filename(name: &str) -> bool {
    name.to_lowercase().ends_with(REPORT_EXTENSION)
}

/// Visit every leaf below `part`, depth-first in document order.
pub fn walk_parts<'a>(part: &'a Part, visit: &mut dyn FnMut(&'a Part)) {
    match part {
        Part::Container { parts } => {
            for child in parts {
                walk_parts(child, visit);
            }
        }
        Part::Leaf { .. } => visit(part),
    }
}

/// `(filename, attachment_id)` of every report attachment in a part tree.
pub fn report_attachments<'a>(root: &'a Part) -> Vec<(&'a str, &'a str)> {
    let mut found = Vec::new();
    walk_parts(root, &mut |leaf: &'a Part| {
        if let Part::Leaf {
            filename: Some(name),
            attachment_id: Some(id),
        } = leaf
        {
            if is_report_filename(name) {
                found.push((name.as_str(), id.as_str()));
            }
        }
    });
    found
}

/// Decode an attachment body from URL-safe base64.
pub fn decode_attachment(filename: &str, data: &str) -> Result<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(data.trim())
        .map_err(|e| ReportError::Decode {
            filename: filename.to_string(),
            reason: e.to_string(),
        })
}

/// Reduce a declared filename to its last path component.
///
/// Returns `None` for names that would not denote a file inside the
/// destination directory.
pub fn safe_filename(declared: &str) -> Option<&str> {
    let name = declared
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(declared)
        .trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name),
    }
}

/// Download every report attachment from messages received in `range`.
///
/// Listing failures abort the run. A message or attachment that fails is
/// logged, counted in the returned stats, and skipped.
pub fn retrieve_attachments(
    mailbox: &dyn Mailbox,
    range: &DateRange,
    dest: &Path,
    progress: &mut dyn FnMut(RetrieveEvent<'_>),
) -> Result<RetrieveStats> {
    std::fs::create_dir_all(dest).map_err(|e| ReportError::io(dest, e))?;

    let query = range.to_query().to_string();
    tracing::info!(query = %query, dest = %dest.display(), "Searching mailbox");

    let ids = mailbox.list_messages(&query)?;
    let mut stats = RetrieveStats {
        messages_found: ids.len(),
        ..RetrieveStats::default()
    };
    progress(RetrieveEvent::Found(ids.len()));

    let total = ids.len();
    for (i, id) in ids.iter().enumerate() {
        progress(RetrieveEvent::Message { current: i, total });

        let message = match mailbox.get_message(id) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(message_id = %id, error = %e, "Failed to fetch message");
                stats.messages_failed += 1;
                continue;
            }
        };

        for (declared, attachment_id) in report_attachments(&message.payload) {
            match save_attachment(mailbox, id, declared, attachment_id, dest) {
                Ok((path, bytes)) => {
                    tracing::info!(path = %path.display(), bytes, "Saved attachment");
                    progress(RetrieveEvent::Saved(&path));
                    stats.bytes_written += bytes;
                    stats.saved.push(path);
                }
                Err(e) => {
                    tracing::warn!(
                        message_id = %id,
                        filename = %declared,
                        error = %e,
                        "Failed to save attachment"
                    );
                    stats.attachments_failed += 1;
                }
            }
        }
    }

    Ok(stats)
}

/// Fetch, decode, and write one attachment. Returns the path and byte count.
fn save_attachment(
    mailbox: &dyn Mailbox,
    message_id: &str,
    declared: &str,
    attachment_id: &str,
    dest: &Path,
) -> Result<(PathBuf, u64)> {
    let filename =
        safe_filename(declared).ok_or_else(|| ReportError::InvalidFilename(declared.to_string()))?;

    let encoded = mailbox.get_attachment(message_id, attachment_id)?;
    let data = decode_attachment(filename, &encoded)?;

    let path = dest.join(filename);
    std::fs::write(&path, &data).map_err(|e| ReportError::io(&path, e))?;
    Ok((path, data.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};

    #[test]
    fn test_is_report_filename_case_insensitive() {
        assert!(is_report_filename("report.txt"));
        assert!(is_report_filename("Report.TXT"));
        assert!(!is_report_filename("report.txtx"));
        assert!(!is_report_filename("report.csv"));
        assert!(!is_report_filename("txt"));
    }

    #[test]
    fn test_report_attachments_nested() {
        let tree = Part::container(vec![
            Part::inline(),
            Part::attachment("a.txt", "1"),
            Part::container(vec![
                Part::attachment("image.png", "2"),
                Part::container(vec![Part::attachment("B.TXT", "3")]),
            ]),
            Part::Leaf {
                filename: Some("no-ref.txt".into()),
                attachment_id: None,
            },
        ]);
        assert_eq!(report_attachments(&tree), vec![("a.txt", "1"), ("B.TXT", "3")]);
    }

    #[test]
    fn test_walk_parts_visits_every_leaf() {
        let mut tree = Part::attachment("deep.txt", "x");
        for _ in 0..50 {
            tree = Part::container(vec![Part::inline(), tree]);
        }
        let mut leaves = 0;
        walk_parts(&tree, &mut |_: &Part| leaves += 1);
        assert_eq!(leaves, 51);
    }

    #[test]
    fn test_decode_with_and_without_padding() {
        let content = b"OBJ-ID\tFILE-URN\n1\t?~>\n";
        assert_eq!(
            decode_attachment("r.txt", &URL_SAFE.encode(content)).unwrap(),
            content
        );
        assert_eq!(
            decode_attachment("r.txt", &URL_SAFE_NO_PAD.encode(content)).unwrap(),
            content
        );
        assert!(decode_attachment("r.txt", "not base64!").is_err());
    }

    #[test]
    fn test_unusable_filename_is_reported_as_such() {
        let dir = tempfile::tempdir().unwrap();
        let mut mailbox = crate::mailbox::memory::MemoryMailbox::new();
        mailbox.add_attachment("m", "a", b"data");

        let err = save_attachment(&mailbox, "m", "reports/..", "a", dir.path()).unwrap_err();
        assert!(matches!(err, ReportError::InvalidFilename(ref name) if name == "reports/.."));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_safe_filename() {
        assert_eq!(safe_filename("report.txt"), Some("report.txt"));
        assert_eq!(safe_filename("../../etc/x.txt"), Some("x.txt"));
        assert_eq!(safe_filename("C:\\dir\\y.TXT"), Some("y.TXT"));
        assert_eq!(safe_filename("dir/.."), None);
        assert_eq!(safe_filename(""), None);
    }
}
