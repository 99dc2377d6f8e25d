//! Mailbox message structure.
//!
//! Only the parts of a message needed to locate attachments are modeled:
//! the identifier, the received time, and the tree of MIME parts.

use chrono::{DateTime, Utc};

/// A message fetched from the mailbox.
#[derive(Debug, Clone)]
pub struct Message {
    /// Opaque mailbox identifier.
    pub id: String,

    /// When the mailbox received the message, if known.
    pub received: Option<DateTime<Utc>>,

    /// Root of the MIME part tree.
    pub payload: Part,
}

/// One node of a message's MIME tree.
///
/// Attachment data only ever hangs off a [`Part::Leaf`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// A multipart container (e.g. `multipart/mixed`, a forwarded message).
    Container { parts: Vec<Part> },

    /// A single body part.
    Leaf {
        /// Declared filename, empty names are normalized to `None`.
        filename: Option<String>,
        /// Reference used to fetch the attachment body.
        attachment_id: Option<String>,
    },
}

impl Part {
    /// Build a container part.
    pub fn container(parts: Vec<Part>) -> Self {
        Self::Container { parts }
    }

    /// Build a leaf carrying an attachment.
    pub fn attachment(filename: impl Into<String>, attachment_id: impl Into<String>) -> Self {
        Self::Leaf {
            filename: Some(filename.into()),
            attachment_id: Some(attachment_id.into()),
        }
    }

    /// Build an inline leaf (no filename, no attachment reference).
    pub fn inline() -> Self {
        Self::Leaf {
            filename: None,
            attachment_id: None,
        }
    }

    /// Number of leaves below (and including) this part.
    pub fn leaf_count(&self) -> usize {
        match self {
            Part::Container { parts } => parts.iter().map(Part::leaf_count).sum(),
            Part::Leaf { .. } => 1,
        }
    }
}
