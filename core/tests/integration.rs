//! End-to-end tests of `GrooveClient` over real HTTP.
//!
//! # Design
//! Starts the mock server on a random port in a background runtime, then
//! drives every client operation against it with the blocking client. The
//! mock server's request log lets each test assert on what actually went
//! over the wire.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::time::Duration;

use groove_core::{
    ApiError, GrooveClient, MessageFilter, NewMessage, NewTicket, TicketFilter, TicketResponse,
    TicketState,
};
use mock_server::MockState;

const TOKEN: &str = "integration-token";

fn spawn_mock() -> (SocketAddr, MockState) {
    let std_listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    let state = MockState::new(TOKEN);
    let server_state = state.clone();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, server_state).await
        })
        .unwrap();
    });

    (addr, state)
}

fn client_for(addr: SocketAddr, token: &str) -> GrooveClient {
    GrooveClient::with_base_url(token, &format!("http://{addr}/v1"))
}

/// Serve exactly one request with a canned response, for bodies the mock
/// server never produces.
fn spawn_canned(status_line: &'static str, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        // Read headers and body before answering so the client is not reset.
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&received).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let content_length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        if name.eq_ignore_ascii_case("content-length") {
                            value.trim().parse::<usize>().ok()
                        } else {
                            None
                        }
                    })
                    .unwrap_or(0);
                if received.len() >= end + 4 + content_length {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: text/plain\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).unwrap();
    });
    addr
}

#[test]
fn ticket_and_message_lifecycle() {
    let (addr, state) = spawn_mock();
    let client = client_for(addr, TOKEN);

    // Step 1: nothing yet.
    let tickets = client.list_tickets(&TicketFilter::default()).unwrap();
    assert!(tickets.is_empty(), "expected empty list");

    // Step 2: create a ticket.
    let (status, body) = client
        .create_ticket(&NewTicket::new("hello", "a@x.com", "b@y.com"))
        .unwrap();
    assert_eq!(status, 201);
    let ticket = &body.as_json().expect("json body")["ticket"];
    assert_eq!(ticket["number"], 1);
    assert_eq!(ticket["customer"], "a@x.com");

    // Step 3: it shows up in the listing.
    let tickets = client.list_tickets(&TicketFilter::default()).unwrap();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0]["number"], 1);

    // Step 4: the ticket body is its first message.
    let messages = client.get_messages(1, &MessageFilter::default()).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["body"], "hello");

    // Step 5: add a customer-visible reply.
    let reply = NewMessage::new("agent@b.com", "hi").with_note(false);
    let id = client.create_message(1, &reply).unwrap();
    assert_eq!(id, Some(2));

    // Step 6: and a private note by default.
    let id = client.create_message(1, &NewMessage::new("agent@b.com", "psst")).unwrap();
    assert_eq!(id, Some(3));

    let messages = client.get_messages(1, &MessageFilter::default()).unwrap();
    let notes: Vec<_> = messages.iter().map(|m| m["note"].as_bool().unwrap()).collect();
    assert_eq!(notes, vec![false, false, true]);

    // Every request carried the token.
    let requests = state.requests();
    assert_eq!(requests.len(), 7);
    for req in &requests {
        assert_eq!(
            req.authorization.as_deref(),
            Some("Bearer integration-token"),
            "{} {}",
            req.method,
            req.path
        );
    }

    // Wire format of the message POST.
    let post = &requests[4];
    assert_eq!(post.method, "POST");
    assert_eq!(post.path, "/v1/tickets/1/messages");
    assert_eq!(
        post.body_json().unwrap(),
        serde_json::json!({"author": "agent@b.com", "body": "hi", "note": false})
    );
}

#[test]
fn list_tickets_sends_filters_as_query() {
    let (addr, state) = spawn_mock();
    let client = client_for(addr, TOKEN);

    let filter = TicketFilter {
        state: Some(TicketState::Closed),
        page: Some(2),
        ..Default::default()
    };
    let tickets = client.list_tickets(&filter).unwrap();
    assert!(tickets.is_empty());

    client.list_tickets(&TicketFilter::default()).unwrap();

    let requests = state.requests();
    assert_eq!(requests[0].query.as_deref(), Some("state=closed&page=2"));
    assert_eq!(requests[1].query, None);
}

#[test]
fn get_messages_paginates() {
    let (addr, state) = spawn_mock();
    let client = client_for(addr, TOKEN);

    client
        .create_ticket(&NewTicket::new("one", "a@x.com", "b@y.com"))
        .unwrap();
    client.create_message(1, &NewMessage::new("a@x.com", "two")).unwrap();
    client.create_message(1, &NewMessage::new("a@x.com", "three")).unwrap();

    let filter = MessageFilter {
        page: Some(2),
        per_page: Some(2),
        ..Default::default()
    };
    let messages = client.get_messages(1, &filter).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["body"], "three");

    let last = state.requests().pop().unwrap();
    assert_eq!(last.path, "/v1/tickets/1/messages");
    assert_eq!(last.query.as_deref(), Some("page=2&per_page=2"));
}

#[test]
fn wrong_token_is_an_http_error() {
    let (addr, _state) = spawn_mock();
    let client = client_for(addr, "wrong");

    let err = client.list_tickets(&TicketFilter::default()).unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 401, .. }), "{err}");

    let err = client.get_messages(1, &MessageFilter::default()).unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 401, .. }), "{err}");

    // Ticket creation hands the status back instead of failing.
    let (status, body) = client
        .create_ticket(&NewTicket::new("b", "a@x.com", "c@y.com"))
        .unwrap();
    assert_eq!(status, 401);
    assert_eq!(body.as_json().unwrap()["errors"][0], "invalid access token");
}

#[test]
fn create_message_on_unknown_ticket() {
    let (addr, _state) = spawn_mock();
    let client = client_for(addr, TOKEN);

    let err = client
        .create_message(99, &NewMessage::new("a@x.com", "hi"))
        .unwrap_err();
    assert!(matches!(err, ApiError::Http { status: 404, .. }));
}

#[test]
fn create_ticket_returns_raw_body_when_not_json() {
    let addr = spawn_canned("201 Created", "not json");
    let client = client_for(addr, TOKEN);

    let (status, body) = client
        .create_ticket(&NewTicket::new("hello", "a@x.com", "b@y.com"))
        .unwrap();
    assert_eq!(status, 201);
    assert_eq!(body, TicketResponse::Raw(b"not json".to_vec()));
}

#[test]
fn create_message_without_id_in_href() {
    let addr = spawn_canned("201 Created", r#"{"message":{"href":"https://api.groovehq.com/v/messages/latest"}}"#);
    let client = client_for(addr, TOKEN);

    let id = client.create_message(42, &NewMessage::new("a@x.com", "hi")).unwrap();
    assert_eq!(id, None);
}

#[test]
fn list_tickets_rejects_non_json() {
    let addr = spawn_canned("200 OK", "<html>maintenance</html>");
    let client = client_for(addr, TOKEN);

    let err = client.list_tickets(&TicketFilter::default()).unwrap_err();
    assert!(matches!(err, ApiError::Deserialization(_)));
}

#[test]
fn unreachable_server_is_a_transport_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let client = client_for(addr, TOKEN);

    let err = client.list_tickets(&TicketFilter::default()).unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)), "{err}");
}

#[test]
fn caller_configured_agent_is_used() {
    let (addr, state) = spawn_mock();
    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(Duration::from_secs(5)))
        .build()
        .new_agent();
    let client = GrooveClient::with_agent(TOKEN, &format!("http://{addr}/v1/"), agent);
    assert_eq!(client.api().base_url(), format!("http://{addr}/v1"));

    let tickets = client.list_tickets(&TicketFilter::default()).unwrap();
    assert!(tickets.is_empty());
    assert_eq!(state.requests()[0].path, "/v1/tickets");
}

#[test]
fn agent_timeout_is_a_transport_error() {
    // Accepts the connection and never answers.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (_stream, _) = listener.accept().unwrap();
        std::thread::sleep(Duration::from_secs(3));
    });

    let agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(Duration::from_millis(200)))
        .build()
        .new_agent();
    let client = GrooveClient::with_agent(TOKEN, &format!("http://{addr}/v1"), agent);

    let err = client.list_tickets(&TicketFilter::default()).unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)), "{err}");
}

#[test]
fn client_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<GrooveClient>();
}
