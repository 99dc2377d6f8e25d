//! In-process mailbox for tests and benchmarks.
//!
//! Messages are held in insertion order. Searches understand the same
//! `after:`/`before:` operators as the real mailbox; messages without a
//! received date never match a dated query.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, Utc};

use super::query::MailQuery;
use super::Mailbox;
use crate::error::{ReportError, Result};
use crate::model::message::{Message, Part};

/// A mailbox backed by plain collections.
#[derive(Debug, Default)]
pub struct MemoryMailbox {
    messages: Vec<Message>,
    attachments: HashMap<(String, String), String>,
}

impl MemoryMailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message with the given part tree.
    pub fn add_message(&mut self, id: &str, received: DateTime<Utc>, payload: Part) {
        self.messages.push(Message {
            id: id.to_string(),
            received: Some(received),
            payload,
        });
    }

    /// Register attachment content, stored URL-safe base64 encoded.
    pub fn add_attachment(&mut self, message_id: &str, attachment_id: &str, content: &[u8]) {
        self.insert_encoded_attachment(message_id, attachment_id, URL_SAFE.encode(content));
    }

    /// Register an attachment body exactly as the mailbox would return it.
    pub fn insert_encoded_attachment(
        &mut self,
        message_id: &str,
        attachment_id: &str,
        encoded: String,
    ) {
        self.attachments
            .insert((message_id.to_string(), attachment_id.to_string()), encoded);
    }

    /// Number of stored messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the mailbox holds no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Mailbox for MemoryMailbox {
    fn list_messages(&self, query: &str) -> Result<Vec<String>> {
        let query = MailQuery::parse(query);
        let dated = query.after.is_some() || query.before.is_some();

        Ok(self
            .messages
            .iter()
            .filter(|m| match m.received {
                Some(ts) => query.matches(ts.date_naive()),
                None => !dated,
            })
            .map(|m| m.id.clone())
            .collect())
    }

    fn get_message(&self, id: &str) -> Result<Message> {
        self.messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| ReportError::MissingMessage(format!("message {id}")))
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<String> {
        self.attachments
            .get(&(message_id.to_string(), attachment_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                ReportError::MissingMessage(format!(
                    "attachment {attachment_id} of message {message_id}"
                ))
            })
    }
}
