//! Stateless HTTP request builder and response parser for the Groove API.
//!
//! # Design
//! `GrooveApi` holds only the base URL and the bearer token and carries no
//! mutable state between calls. Each operation is split into a `build_*`
//! method that produces an `HttpRequest` and a `parse_*` method that
//! consumes an `HttpResponse`. `GrooveClient` glues the two together over
//! a real HTTP session; tests drive them separately.

use serde_json::Value;
use tracing::warn;

use crate::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{MessageFilter, NewMessage, NewTicket, TicketFilter, TicketResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.groovehq.com/v1";

/// Request builder and response parser for the Groove REST API.
#[derive(Clone)]
pub struct GrooveApi {
    base_url: String,
    api_token: String,
}

impl GrooveApi {
    pub fn new(api_token: &str) -> Self {
        Self::with_base_url(api_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_token: &str, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_list_tickets(&self, filter: &TicketFilter) -> HttpRequest {
        self.get(format!("{}/tickets", self.base_url), filter.to_query())
    }

    pub fn build_create_ticket(&self, ticket: &NewTicket) -> Result<HttpRequest> {
        let body = ticket
            .to_payload()
            .and_then(|payload| serde_json::to_string(&payload))
            .map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(self.post(format!("{}/tickets", self.base_url), body))
    }

    pub fn build_get_messages(&self, ticket_number: u64, filter: &MessageFilter) -> HttpRequest {
        self.get(self.messages_url(ticket_number), filter.to_query())
    }

    pub fn build_create_message(&self, ticket_number: u64, message: &NewMessage) -> Result<HttpRequest> {
        let body = serde_json::to_string(message).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(self.post(self.messages_url(ticket_number), body))
    }

    pub fn parse_list_tickets(&self, response: HttpResponse) -> Result<Vec<Value>> {
        take_array(response, "tickets")
    }

    /// Never fails: a body that is not JSON comes back as raw bytes, and the
    /// status is returned as-is for the caller to judge.
    pub fn parse_create_ticket(&self, response: HttpResponse) -> (u16, TicketResponse) {
        let body = match serde_json::from_slice(&response.body) {
            Ok(value) => TicketResponse::Json(value),
            Err(e) => {
                warn!(status = response.status, error = %e, "ticket response is not JSON, returning raw body");
                TicketResponse::Raw(response.body)
            }
        };
        (response.status, body)
    }

    pub fn parse_get_messages(&self, response: HttpResponse) -> Result<Vec<Value>> {
        take_array(response, "messages")
    }

    /// Returns the id of the new message, taken from the last run of digits
    /// in `message.href`. `None` if the href is missing or has no digits.
    pub fn parse_create_message(&self, response: HttpResponse) -> Result<Option<u64>> {
        let value = parse_json(&response)?;
        let Some(href) = value.pointer("/message/href").and_then(Value::as_str) else {
            warn!("message response has no message.href");
            return Ok(None);
        };
        let id = trailing_number(href);
        if id.is_none() {
            warn!(href, "no message id in href");
        }
        Ok(id)
    }

    fn messages_url(&self, ticket_number: u64) -> String {
        format!("{}/tickets/{ticket_number}/messages", self.base_url)
    }

    fn get(&self, url: String, query: Vec<(String, String)>) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url,
            query,
            headers: self.headers(),
            body: None,
        }
    }

    fn post(&self, url: String, body: String) -> HttpRequest {
        let mut headers = self.headers();
        headers.push(("content-type".to_string(), "application/json".to_string()));
        HttpRequest {
            method: HttpMethod::Post,
            url,
            query: Vec::new(),
            headers,
            body: Some(body),
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("authorization".to_string(), format!("Bearer {}", self.api_token)),
            ("accept".to_string(), "application/json".to_string()),
        ]
    }
}

// Keep the token out of logs and panic messages.
impl std::fmt::Debug for GrooveApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrooveApi")
            .field("base_url", &self.base_url)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::Http {
        status: response.status,
        body: response.body_text(),
    })
}

fn parse_json(response: &HttpResponse) -> Result<Value> {
    check_status(response)?;
    serde_json::from_slice(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
}

fn take_array(response: HttpResponse, field: &'static str) -> Result<Vec<Value>> {
    match parse_json(&response)? {
        Value::Object(mut map) => match map.remove(field) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ApiError::MissingField(field)),
        },
        _ => Err(ApiError::MissingField(field)),
    }
}

/// Last run of ASCII digits in `s`, if it fits in a `u64`.
fn trailing_number(s: &str) -> Option<u64> {
    s.rsplit(|c: char| !c.is_ascii_digit())
        .find(|run| !run.is_empty())
        .and_then(|run| run.parse().ok())
}
