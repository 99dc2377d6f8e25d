//! Gmail REST API mailbox.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::Mailbox;
use crate::error::{ReportError, Result};
use crate::model::message::{Message, Part};

/// Base URL of the authenticated user's mailbox.
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Blocking Gmail API client holding a bearer token.
pub struct GmailClient {
    http: reqwest::blocking::Client,
    base_url: String,
    access_token: String,
}

impl GmailClient {
    /// Create a client for `base_url` authorized with `access_token`.
    pub fn new(base_url: &str, access_token: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::Http {
                url: base_url.to_string(),
                source: e,
            })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "GET");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .map_err(|e| ReportError::Http {
                url: url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ReportError::Api {
                url,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .map_err(|e| ReportError::InvalidResponse(format!("{url}: {e}")))
    }
}

impl Mailbox for GmailClient {
    fn list_messages(&self, query: &str) -> Result<Vec<String>> {
        collect_pages(|page_token| {
            let mut params = vec![("q", query)];
            if let Some(token) = page_token {
                params.push(("pageToken", token));
            }
            self.get_json("/messages", &params)
        })
    }

    fn get_message(&self, id: &str) -> Result<Message> {
        let raw: GmailMessage =
            self.get_json(&format!("/messages/{id}"), &[("format", "full")])?;
        Ok(raw.into_message())
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<String> {
        let body: AttachmentBody = self.get_json(
            &format!("/messages/{message_id}/attachments/{attachment_id}"),
            &[],
        )?;
        body.data.ok_or_else(|| {
            ReportError::InvalidResponse(format!(
                "attachment {attachment_id} of message {message_id} has no data"
            ))
        })
    }
}

/// Accumulate message ids across result pages.
///
/// `fetch_page` receives the token of the page to fetch (`None` for the
/// first). Stops when a page has no next token or a token repeats.
fn collect_pages(
    mut fetch_page: impl FnMut(Option<&str>) -> Result<ListResponse>,
) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = fetch_page(page_token.as_deref())?;
        ids.extend(page.messages.into_iter().map(|m| m.id));

        match page.next_page_token {
            Some(next) if !next.is_empty() => {
                if !seen.insert(next.clone()) {
                    tracing::warn!(page_token = %next, "Result page token repeated; stopping");
                    break;
                }
                tracing::debug!(collected = ids.len(), "Fetching next result page");
                page_token = Some(next);
            }
            _ => break,
        }
    }

    Ok(ids)
}

// ── Wire types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    /// Milliseconds since the epoch, as a decimal string.
    internal_date: Option<String>,
    payload: Option<GmailPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailPart {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    body: Option<GmailBody>,
    parts: Option<Vec<GmailPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailBody {
    attachment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttachmentBody {
    data: Option<String>,
}

impl GmailMessage {
    fn into_message(self) -> Message {
        let received = self
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        Message {
            id: self.id,
            received,
            payload: self
                .payload
                .map(Part::from)
                .unwrap_or_else(|| Part::container(Vec::new())),
        }
    }
}

impl From<GmailPart> for Part {
    fn from(part: GmailPart) -> Self {
        match part.parts {
            Some(children) => Part::container(children.into_iter().map(Part::from).collect()),
            None => Part::Leaf {
                filename: part.filename.filter(|f| !f.is_empty()),
                attachment_id: part.body.and_then(|b| b.attachment_id),
            },
        }
    }
}
