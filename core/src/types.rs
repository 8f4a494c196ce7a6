//! Request payloads, filters and result types for the Groove API.
//!
//! # Design
//! Tickets and messages are owned by the remote service, so records coming
//! back are relayed as `serde_json::Value` rather than modeled here. What is
//! typed is what the client sends: each filter and payload has named
//! optional fields for the options the API documents, plus an `extra` map
//! for anything newer the API grows. Every filter value is rendered to text
//! by an explicit rule in `to_query`, not by a blanket stringify step.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Lifecycle state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketState {
    Unread,
    Opened,
    Pending,
    Closed,
    Spam,
}

impl TicketState {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketState::Unread => "unread",
            TicketState::Opened => "opened",
            TicketState::Pending => "pending",
            TicketState::Closed => "closed",
            TicketState::Spam => "spam",
        }
    }
}

/// Sender or recipient of a new ticket: an email address, or a map of
/// customer attributes (`email`, `name`, `company_name`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Party {
    Email(String),
    Attributes(Map<String, Value>),
}

impl From<&str> for Party {
    fn from(email: &str) -> Self {
        Party::Email(email.to_string())
    }
}

impl From<String> for Party {
    fn from(email: String) -> Self {
        Party::Email(email)
    }
}

/// Options for `list_tickets`. All fields are optional; an all-default
/// filter sends no query string at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketFilter {
    /// Agent email.
    pub assignee: Option<String>,
    /// Customer email or ID.
    pub customer: Option<String>,
    /// Folder ID.
    pub folder: Option<String>,
    pub state: Option<TicketState>,
    pub page: Option<u32>,
    /// Server default is 25.
    pub per_page: Option<u32>,
    /// Forwarded verbatim after the known options.
    pub extra: BTreeMap<String, String>,
}

impl TicketFilter {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        push(&mut query, "assignee", self.assignee.clone());
        push(&mut query, "customer", self.customer.clone());
        push(&mut query, "folder", self.folder.clone());
        push(&mut query, "state", self.state.map(|s| s.as_str().to_string()));
        push(&mut query, "page", self.page.map(|n| n.to_string()));
        push(&mut query, "per_page", self.per_page.map(|n| n.to_string()));
        extend_extra(&mut query, &self.extra);
        query
    }
}

/// Pagination options for `get_messages`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub extra: BTreeMap<String, String>,
}

impl MessageFilter {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        push(&mut query, "page", self.page.map(|n| n.to_string()));
        push(&mut query, "per_page", self.per_page.map(|n| n.to_string()));
        extend_extra(&mut query, &self.extra);
        query
    }
}

fn push(query: &mut Vec<(String, String)>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        query.push((key.to_string(), value));
    }
}

fn extend_extra(query: &mut Vec<(String, String)>, extra: &BTreeMap<String, String>) {
    query.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
}

/// Request payload for creating a ticket together with its first message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTicket {
    pub body: String,
    pub from: Party,
    pub to: Party,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_group: Option<String>,
    /// Agent email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Backdates the ticket. Sent in RFC 2822 form.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_rfc2822"
    )]
    pub sent_at: Option<DateTime<FixedOffset>>,
    /// Agent-created tickets only: add the body as a private note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<bool>,
    /// Agent-created tickets only: email the body to the customer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_copy_to_customer: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TicketState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Merged into the top level of the payload by [`NewTicket::to_payload`].
    /// A key that collides with a typed field replaces it.
    #[serde(skip)]
    pub extra: Map<String, Value>,
}

impl NewTicket {
    pub fn new(body: impl Into<String>, from: impl Into<Party>, to: impl Into<Party>) -> Self {
        Self {
            body: body.into(),
            from: from.into(),
            to: to.into(),
            assigned_group: None,
            assignee: None,
            sent_at: None,
            note: None,
            send_copy_to_customer: None,
            state: None,
            subject: None,
            tags: None,
            extra: Map::new(),
        }
    }

    /// JSON object sent to the API: the typed fields, then `extra` on top.
    pub fn to_payload(&self) -> serde_json::Result<Map<String, Value>> {
        let mut payload = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        payload.extend(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(payload)
    }
}

fn serialize_rfc2822<S>(value: &Option<DateTime<FixedOffset>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(at) => serializer.serialize_str(&at.to_rfc2822()),
        None => serializer.serialize_none(),
    }
}

/// Request payload for adding a message to an existing ticket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMessage {
    /// Email of the message owner.
    pub author: String,
    pub body: String,
    /// `true` keeps the message private to agents.
    pub note: bool,
}

impl NewMessage {
    /// A private note. Use [`NewMessage::with_note`] to address the customer.
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
            note: true,
        }
    }

    pub fn with_note(mut self, note: bool) -> Self {
        self.note = note;
        self
    }
}

/// Body returned by ticket creation. Falls back to the raw bytes when the
/// server's answer is not JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum TicketResponse {
    Json(Value),
    Raw(Vec<u8>),
}

impl TicketResponse {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            TicketResponse::Json(value) => Some(value),
            TicketResponse::Raw(_) => None,
        }
    }
}
