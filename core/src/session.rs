//! Blocking Groove client backed by a `ureq` agent.
//!
//! # Design
//! `GrooveClient` is the host half of the host-does-IO split: it asks
//! `GrooveApi` for an `HttpRequest`, executes it on a long-lived
//! `ureq::Agent` (which owns connection pooling and keep-alive), and hands
//! the `HttpResponse` back to `GrooveApi` for parsing. One call, one
//! request, no retries.
//!
//! `ureq::Agent` is `Send + Sync` and cheap to clone, so a `GrooveClient`
//! can be shared between threads; every call is independent. Timeouts and
//! proxies are configured on the agent passed to
//! [`GrooveClient::with_agent`].

use serde_json::Value;
use tracing::debug;
use ureq::Agent;

use crate::client::{GrooveApi, DEFAULT_BASE_URL};
use crate::error::Result;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{MessageFilter, NewMessage, NewTicket, TicketFilter, TicketResponse};

/// Authenticated, blocking client for the Groove REST API.
#[derive(Clone)]
pub struct GrooveClient {
    api: GrooveApi,
    agent: Agent,
}

impl GrooveClient {
    /// Client for the public Groove API.
    pub fn new(api_token: &str) -> Self {
        Self::with_base_url(api_token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_token: &str, base_url: &str) -> Self {
        Self::with_agent(api_token, base_url, default_agent())
    }

    /// Use a caller-configured agent. It should keep
    /// `http_status_as_error(false)`, otherwise non-2xx answers surface as
    /// `ApiError::Transport` instead of carrying their status.
    pub fn with_agent(api_token: &str, base_url: &str, agent: Agent) -> Self {
        Self {
            api: GrooveApi::with_base_url(api_token, base_url),
            agent,
        }
    }

    /// The request builder/parser this client drives.
    pub fn api(&self) -> &GrooveApi {
        &self.api
    }

    /// Tickets matching `filter`, in the order the server returned them.
    pub fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Value>> {
        let response = self.execute(self.api.build_list_tickets(filter))?;
        self.api.parse_list_tickets(response)
    }

    /// Create a ticket and its first message. Not idempotent.
    ///
    /// Returns the response status with the parsed body, or the raw body
    /// bytes when the server did not answer with JSON.
    pub fn create_ticket(&self, ticket: &NewTicket) -> Result<(u16, TicketResponse)> {
        let response = self.execute(self.api.build_create_ticket(ticket)?)?;
        Ok(self.api.parse_create_ticket(response))
    }

    pub fn get_messages(&self, ticket_number: u64, filter: &MessageFilter) -> Result<Vec<Value>> {
        let response = self.execute(self.api.build_get_messages(ticket_number, filter))?;
        self.api.parse_get_messages(response)
    }

    /// Add a message to a ticket and return its id, if the response names
    /// one.
    pub fn create_message(&self, ticket_number: u64, message: &NewMessage) -> Result<Option<u64>> {
        let response = self.execute(self.api.build_create_message(ticket_number, message)?)?;
        self.api.parse_create_message(response)
    }

    fn execute(&self, req: HttpRequest) -> Result<HttpResponse> {
        debug!(method = req.method.as_str(), url = %req.url, query = ?req.query, "groove request");

        let mut response = match req.method {
            HttpMethod::Get => {
                let mut builder = self.agent.get(&req.url);
                for (k, v) in &req.headers {
                    builder = builder.header(k.as_str(), v.as_str());
                }
                if !req.query.is_empty() {
                    builder = builder.query_pairs(req.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                }
                builder.call()?
            }
            HttpMethod::Post => {
                let mut builder = self.agent.post(&req.url);
                for (k, v) in &req.headers {
                    builder = builder.header(k.as_str(), v.as_str());
                }
                builder.send(req.body.unwrap_or_default())?
            }
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response.body_mut().read_to_vec()?;
        debug!(status, bytes = body.len(), "groove response");

        Ok(HttpResponse { status, headers, body })
    }
}

impl std::fmt::Debug for GrooveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrooveClient").field("api", &self.api).finish_non_exhaustive()
    }
}

fn default_agent() -> Agent {
    Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .new_agent()
}
