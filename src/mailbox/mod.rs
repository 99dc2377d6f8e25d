//! Mailbox access: search, message structure, and attachment bodies.

pub mod auth;
pub mod gmail;
pub mod memory;
pub mod query;

use crate::error::Result;
use crate::model::message::Message;

/// Read-only view of a mailbox.
///
/// Implementations return attachment bodies still transport-encoded
/// (URL-safe base64); callers decode them.
pub trait Mailbox {
    /// Identifiers of messages matching a free-text search expression.
    fn list_messages(&self, query: &str) -> Result<Vec<String>>;

    /// Fetch the full part structure of a message.
    fn get_message(&self, id: &str) -> Result<Message>;

    /// Fetch the encoded body of one attachment.
    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<String>;
}
