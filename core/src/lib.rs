//! Blocking client for the Groove helpdesk REST API (tickets and messages).
//!
//! # Overview
//! `GrooveApi` builds `HttpRequest` values and parses `HttpResponse` values
//! without touching the network (host-does-IO pattern). `GrooveClient`
//! executes those requests over a reusable `ureq` agent and is what most
//! callers want.
//!
//! # Design
//! - The API token is fixed at construction and sent as
//!   `Authorization: Bearer <token>` on every request.
//! - Ticket and message records are relayed as `serde_json::Value`; only the
//!   outgoing filters and payloads are typed.
//! - Parse contracts differ per operation: list calls fail loudly on a
//!   missing array, ticket creation degrades to raw bytes, message creation
//!   degrades to `None` when no id can be found.

pub mod client;
pub mod error;
pub mod http;
pub mod session;
pub mod types;

pub use client::{GrooveApi, DEFAULT_BASE_URL};
pub use error::{ApiError, Result};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::GrooveClient;
pub use types::{MessageFilter, NewMessage, NewTicket, Party, TicketFilter, TicketResponse, TicketState};
