//! In-memory stand-in for the Groove ticket and message endpoints.
//!
//! Serves the `/v1/tickets` and `/v1/tickets/{number}/messages` routes with
//! bearer-token auth, and records every request it sees so tests can assert
//! on exactly what went over the wire.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;

const DEFAULT_PER_PAGE: usize = 25;
const MAX_RECORDED_BODY: usize = 1 << 20;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ticket {
    pub number: u64,
    pub state: String,
    pub title: Option<String>,
    pub assignee: Option<String>,
    pub customer: String,
    pub folder: Option<String>,
    pub tags: Vec<String>,
    pub href: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub author: String,
    pub body: String,
    pub note: bool,
    pub href: String,
}

#[derive(Deserialize)]
pub struct CreateTicket {
    pub body: String,
    pub from: Value,
    pub to: Value,
    pub assignee: Option<String>,
    pub state: Option<String>,
    pub subject: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Stores the body as a private note.
    #[serde(default)]
    pub note: bool,
}

#[derive(Deserialize)]
pub struct CreateMessage {
    pub author: String,
    pub body: String,
    #[serde(default = "default_note")]
    pub note: bool,
}

fn default_note() -> bool {
    true
}

/// One request as received by the server.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[derive(Default)]
struct Store {
    tickets: Vec<Ticket>,
    messages: HashMap<u64, Vec<Message>>,
    next_message_id: u64,
}

/// Shared server state. Clone it before handing it to [`app`] to keep a
/// handle on the request log.
#[derive(Clone)]
pub struct MockState {
    token: Arc<str>,
    store: Arc<RwLock<Store>>,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockState {
    pub fn new(token: &str) -> Self {
        Self {
            token: Arc::from(token),
            store: Arc::new(RwLock::new(Store::default())),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Snapshot of every request received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

pub fn app(state: MockState) -> Router {
    Router::new()
        .route("/v1/tickets", get(list_tickets).post(create_ticket))
        .route(
            "/v1/tickets/{number}/messages",
            get(list_messages).post(create_message),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: MockState) -> Result<(), std::io::Error> {
    axum::serve(listener, app(state)).await
}

async fn record(State(state): State<MockState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_RECORDED_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let recorded = RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        authorization: parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: bytes.to_vec(),
    };
    debug!(method = %recorded.method, path = %recorded.path, query = ?recorded.query, "recorded request");
    if let Ok(mut log) = state.log.lock() {
        log.push(recorded);
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn require_token(State(state): State<MockState>, request: Request, next: Next) -> Response {
    match authorize(&state, request.headers()) {
        Ok(()) => next.run(request).await,
        Err(rejection) => rejection,
    }
}

fn authorize(state: &MockState, headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {}", state.token);
    match headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"errors": ["invalid access token"]})),
        )
            .into_response()),
    }
}

fn base_href(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}/v1")
}

fn parse_count(params: &HashMap<String, String>, key: &str, default: usize) -> Result<usize, Response> {
    match params.get(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"errors": [format!("{key} must be a positive integer")]})),
            )
                .into_response()),
        },
    }
}

fn paginate<T: Clone>(items: &[T], params: &HashMap<String, String>) -> Result<(Vec<T>, Value), Response> {
    let page = parse_count(params, "page", 1)?;
    let per_page = parse_count(params, "per_page", DEFAULT_PER_PAGE)?;
    let total_pages = items.len().div_ceil(per_page);
    let slice = items
        .iter()
        .skip((page - 1).saturating_mul(per_page))
        .take(per_page)
        .cloned()
        .collect();
    let meta = json!({
        "pagination": {
            "current_page": page,
            "total_pages": total_pages,
            "total_count": items.len(),
        }
    });
    Ok((slice, meta))
}

/// Email of a party that may be a plain address or an attribute map.
fn party_email(party: &Value) -> String {
    match party {
        Value::String(email) => email.clone(),
        other => other
            .get("email")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

async fn list_tickets(
    State(state): State<MockState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, Response> {
    let store = state.store.read().await;
    let matching: Vec<Ticket> = store
        .tickets
        .iter()
        .filter(|t| params.get("state").map_or(true, |s| &t.state == s))
        .filter(|t| params.get("assignee").map_or(true, |a| t.assignee.as_ref() == Some(a)))
        .filter(|t| params.get("customer").map_or(true, |c| &t.customer == c))
        .filter(|t| params.get("folder").map_or(true, |f| t.folder.as_ref() == Some(f)))
        .cloned()
        .collect();
    let (tickets, meta) = paginate(&matching, &params)?;
    Ok(Json(json!({"tickets": tickets, "meta": meta})))
}

async fn create_ticket(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(input): Json<CreateTicket>,
) -> Result<(StatusCode, Json<Value>), Response> {
    let base = base_href(&headers);
    let mut store = state.store.write().await;

    let number = store.tickets.len() as u64 + 1;
    let ticket = Ticket {
        number,
        state: input.state.unwrap_or_else(|| "unread".to_string()),
        title: input.subject,
        assignee: input.assignee,
        customer: party_email(&input.from),
        folder: None,
        tags: input.tags,
        href: format!("{base}/tickets/{number}"),
    };
    store.tickets.push(ticket.clone());

    store.next_message_id += 1;
    let first = Message {
        id: store.next_message_id,
        author: party_email(&input.from),
        body: input.body,
        note: input.note,
        href: format!("{base}/messages/{}", store.next_message_id),
    };
    store.messages.entry(number).or_default().push(first);

    Ok((StatusCode::CREATED, Json(json!({"ticket": ticket}))))
}

async fn list_messages(
    State(state): State<MockState>,
    Path(number): Path<u64>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, Response> {
    let store = state.store.read().await;
    let messages = store
        .messages
        .get(&number)
        .ok_or_else(|| StatusCode::NOT_FOUND.into_response())?;
    let (messages, meta) = paginate(messages, &params)?;
    Ok(Json(json!({"messages": messages, "meta": meta})))
}

async fn create_message(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(number): Path<u64>,
    Json(input): Json<CreateMessage>,
) -> Result<(StatusCode, Json<Value>), Response> {
    let base = base_href(&headers);
    let mut store = state.store.write().await;
    if !store.messages.contains_key(&number) {
        return Err(StatusCode::NOT_FOUND.into_response());
    }

    store.next_message_id += 1;
    let id = store.next_message_id;
    let message = Message {
        id,
        author: input.author,
        body: input.body,
        note: input.note,
        href: format!("{base}/messages/{id}"),
    };
    store.messages.entry(number).or_default().push(message.clone());

    Ok((StatusCode::CREATED, Json(json!({"message": message}))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_email_accepts_string_or_attributes() {
        assert_eq!(party_email(&json!("a@x.com")), "a@x.com");
        assert_eq!(party_email(&json!({"email": "b@y.com", "name": "B"})), "b@y.com");
        assert_eq!(party_email(&json!({"name": "nobody"})), "");
    }

    #[test]
    fn paginate_defaults_and_slices() {
        let items: Vec<u32> = (1..=30).collect();
        let (page, meta) = paginate(&items, &HashMap::new()).unwrap();
        assert_eq!(page.len(), 25);
        assert_eq!(meta["pagination"]["total_pages"], 2);

        let params = HashMap::from([
            ("page".to_string(), "2".to_string()),
            ("per_page".to_string(), "10".to_string()),
        ]);
        let (page, meta) = paginate(&items, &params).unwrap();
        assert_eq!(page, (11..=20).collect::<Vec<_>>());
        assert_eq!(meta["pagination"]["current_page"], 2);
    }

    #[test]
    fn paginate_rejects_zero_page() {
        let params = HashMap::from([("page".to_string(), "0".to_string())]);
        assert!(paginate(&[1, 2, 3], &params).is_err());
    }

    #[test]
    fn create_message_defaults_note_to_true() {
        let input: CreateMessage = serde_json::from_str(r#"{"author":"a@x.com","body":"hi"}"#).unwrap();
        assert!(input.note);
    }

    #[test]
    fn create_ticket_note_defaults_to_false() {
        let input: CreateTicket =
            serde_json::from_str(r#"{"body":"b","from":"a@x.com","to":"c@y.com"}"#).unwrap();
        assert!(!input.note);
    }

    #[test]
    fn create_ticket_rejects_missing_recipient() {
        let result: Result<CreateTicket, _> = serde_json::from_str(r#"{"body":"b","from":"a@x.com"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn authorize_checks_bearer_token() {
        let state = MockState::new("tok");
        let mut headers = HeaderMap::new();
        assert!(authorize(&state, &headers).is_err());
        headers.insert(header::AUTHORIZATION, "Bearer tok".parse().unwrap());
        assert!(authorize(&state, &headers).is_ok());
        headers.insert(header::AUTHORIZATION, "Bearer other".parse().unwrap());
        assert!(authorize(&state, &headers).is_err());
    }
}
