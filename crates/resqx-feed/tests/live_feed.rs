//! Integration tests for `LiveFeedClient` against an in-process Socket.IO
//! server built on tokio-tungstenite.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use resqx_core::ProfessionalType;
use resqx_feed::{FeedConfig, FeedIssue, FeedStatus, FeedUpdate, LiveFeedClient, ReconnectPolicy};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use url::Url;

const OPEN_FRAME: &str =
    r#"0{"sid":"test-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

/// Advertises a 100 ms heartbeat window.
const SHORT_HEARTBEAT_OPEN_FRAME: &str =
    r#"0{"sid":"test-sid","upgrades":[],"pingInterval":50,"pingTimeout":50,"maxPayload":1000000}"#;

struct MockFeed {
    base_url: Url,
    connections: mpsc::UnboundedReceiver<MockConnection>,
}

struct MockConnection {
    uri: String,
    ws: WebSocketStream<TcpStream>,
}

impl MockFeed {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, connections) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let mut uri = String::new();
                let accepted = tokio_tungstenite::accept_hdr_async(
                    stream,
                    |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        uri = req.uri().to_string();
                        Ok(resp)
                    },
                )
                .await;
                if let Ok(ws) = accepted {
                    if tx.send(MockConnection { uri, ws }).is_err() {
                        break;
                    }
                }
            }
        });
        Self {
            base_url: Url::parse(&format!("http://{addr}")).unwrap(),
            connections,
        }
    }

    async fn next_connection(&mut self) -> MockConnection {
        tokio::time::timeout(Duration::from_secs(5), self.connections.recv())
            .await
            .expect("timed out waiting for a client connection")
            .expect("mock server stopped")
    }

    fn config(&self) -> FeedConfig {
        let mut config = FeedConfig::new(self.base_url.clone());
        config.connect_timeout = Duration::from_secs(2);
        config.reconnect = ReconnectPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(20),
            max_attempts: 0,
        };
        config
    }
}

impl MockConnection {
    async fn send(&mut self, frame: &str) {
        self.ws.send(Message::Text(frame.to_owned())).await.unwrap();
    }

    async fn recv_text(&mut self) -> String {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("timed out waiting for a client frame")
                .expect("client closed the socket")
                .expect("socket error");
            if let Message::Text(text) = msg {
                return text;
            }
        }
    }

    /// Sends the open packet, expects the namespace connect and acknowledges it.
    async fn accept_session(&mut self) {
        self.accept_session_with(OPEN_FRAME).await;
    }

    async fn accept_session_with(&mut self, open_frame: &str) {
        self.send(open_frame).await;
        assert_eq!(self.recv_text().await, "40");
        self.send(r#"40{"sid":"ns-sid"}"#).await;
    }

    async fn push_snapshot(&mut self, payload: &serde_json::Value) {
        let frame = format!(
            "42{}",
            serde_json::json!(["liveProfessionals", payload])
        );
        self.send(&frame).await;
    }
}

async fn wait_for<F>(rx: &mut watch::Receiver<FeedUpdate>, pred: F) -> FeedUpdate
where
    F: Fn(&FeedUpdate) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            {
                let update = rx.borrow_and_update();
                if pred(&update) {
                    return update.clone();
                }
            }
            rx.changed().await.expect("feed channel closed early");
        }
    })
    .await
    .expect("timed out waiting for feed update")
}

fn scenario_a() -> serde_json::Value {
    serde_json::json!({
        "professionals": [
            { "id": "1", "name": "Ada", "latitude": 6.52, "longitude": 3.37, "professionalType": "TOW" }
        ],
        "firstResponders": []
    })
}

#[tokio::test]
async fn publishes_validated_snapshot() {
    let mut server = MockFeed::start().await;
    let client = LiveFeedClient::new(server.config());
    let handle = client.connect("viewer-1");
    let mut rx = handle.subscribe();

    let mut conn = server.next_connection().await;
    assert!(conn.uri.contains("EIO=4"), "uri: {}", conn.uri);
    assert!(conn.uri.contains("userId=viewer-1"), "uri: {}", conn.uri);
    conn.accept_session().await;
    wait_for(&mut rx, |u| u.status.is_live()).await;

    conn.push_snapshot(&scenario_a()).await;
    let update = wait_for(&mut rx, |u| u.batch_seq == 1).await;

    assert_eq!(update.records.len(), 1);
    assert_eq!(update.records[0].id, "1");
    assert_eq!(update.records[0].professional_type, ProfessionalType::TowTruck);
    assert!(update.received_at.is_some());
    assert_eq!(update.status, FeedStatus::Connected);
}

#[tokio::test]
async fn bad_coordinates_are_hidden_without_error() {
    let mut server = MockFeed::start().await;
    let client = LiveFeedClient::new(server.config());
    let handle = client.connect("viewer-1");
    let mut rx = handle.subscribe();

    let mut conn = server.next_connection().await;
    conn.accept_session().await;
    conn.push_snapshot(&serde_json::json!({
        "professionals": [{ "id": "1", "latitude": "abc", "longitude": 3.37 }],
        "firstResponders": []
    }))
    .await;

    let update = wait_for(&mut rx, |u| u.batch_seq == 1).await;
    assert!(update.records.is_empty());
    assert_eq!(update.hidden.invalid_coordinates, 1);
    assert_eq!(update.status, FeedStatus::Connected);
}

#[tokio::test]
async fn malformed_payload_keeps_last_good_records() {
    let mut server = MockFeed::start().await;
    let client = LiveFeedClient::new(server.config());
    let handle = client.connect("viewer-1");
    let mut rx = handle.subscribe();

    let mut conn = server.next_connection().await;
    conn.accept_session().await;
    conn.push_snapshot(&scenario_a()).await;
    wait_for(&mut rx, |u| u.batch_seq == 1).await;

    conn.push_snapshot(&serde_json::json!({ "professionals": [] })).await;
    let update = wait_for(&mut rx, |u| matches!(u.status, FeedStatus::Error(_))).await;

    assert!(matches!(
        update.status,
        FeedStatus::Error(FeedIssue::MalformedPayload(_))
    ));
    assert_eq!(update.records.len(), 1, "good records must survive");
    assert_eq!(update.batch_seq, 1);

    conn.push_snapshot(&scenario_a()).await;
    let update = wait_for(&mut rx, |u| u.batch_seq == 2).await;
    assert_eq!(update.status, FeedStatus::Connected);
}

#[tokio::test]
async fn truncated_event_frame_is_reported_as_malformed_payload() {
    let mut server = MockFeed::start().await;
    let client = LiveFeedClient::new(server.config());
    let handle = client.connect("viewer-1");
    let mut rx = handle.subscribe();

    let mut conn = server.next_connection().await;
    conn.accept_session().await;
    conn.push_snapshot(&scenario_a()).await;
    wait_for(&mut rx, |u| u.batch_seq == 1).await;

    conn.send(r#"42["liveProfessionals",{"professionals":[{"id":"1""#).await;
    let update = wait_for(&mut rx, |u| matches!(u.status, FeedStatus::Error(_))).await;

    assert!(matches!(
        update.status,
        FeedStatus::Error(FeedIssue::MalformedPayload(_))
    ));
    assert_eq!(update.records.len(), 1, "good records must survive");

    conn.push_snapshot(&scenario_a()).await;
    let update = wait_for(&mut rx, |u| u.batch_seq == 2).await;
    assert_eq!(update.status, FeedStatus::Connected);
}

#[tokio::test]
async fn unrelated_events_are_ignored() {
    let mut server = MockFeed::start().await;
    let client = LiveFeedClient::new(server.config());
    let handle = client.connect("viewer-1");
    let mut rx = handle.subscribe();

    let mut conn = server.next_connection().await;
    conn.accept_session().await;
    conn.send(r#"42["chatMessage",{"text":"hi"}]"#).await;
    conn.push_snapshot(&scenario_a()).await;

    let update = wait_for(&mut rx, |u| u.batch_seq >= 1).await;
    assert_eq!(update.batch_seq, 1);
    assert_eq!(update.status, FeedStatus::Connected);
}

#[tokio::test]
async fn answers_heartbeat_ping() {
    let mut server = MockFeed::start().await;
    let client = LiveFeedClient::new(server.config());
    let _handle = client.connect("viewer-1");

    let mut conn = server.next_connection().await;
    conn.accept_session().await;
    conn.send("2").await;
    assert_eq!(conn.recv_text().await, "3");
}

#[tokio::test]
async fn reconnects_after_server_drop() {
    let mut server = MockFeed::start().await;
    let client = LiveFeedClient::new(server.config());
    let handle = client.connect("viewer-1");
    let mut rx = handle.subscribe();

    let mut first = server.next_connection().await;
    first.accept_session().await;
    first.push_snapshot(&scenario_a()).await;
    wait_for(&mut rx, |u| u.batch_seq == 1).await;

    first.ws.close(None).await.unwrap();
    drop(first);

    let mut second = server.next_connection().await;
    assert!(second.uri.contains("userId=viewer-1"));
    second.accept_session().await;
    second
        .push_snapshot(&serde_json::json!({
            "professionals": [],
            "firstResponders": [{ "id": "7", "latitude": 6.6, "longitude": 3.4 }]
        }))
        .await;

    let update = wait_for(&mut rx, |u| u.batch_seq == 2).await;
    assert_eq!(update.records.len(), 1);
    assert_eq!(update.records[0].id, "7");
    assert!(handle.is_active());
}

#[tokio::test]
async fn missed_heartbeat_counts_as_lost_connection() {
    let mut server = MockFeed::start().await;
    let client = LiveFeedClient::new(server.config());
    let handle = client.connect("viewer-1");
    let mut rx = handle.subscribe();

    // Keep the first socket open but silent.
    let mut first = server.next_connection().await;
    first.accept_session_with(SHORT_HEARTBEAT_OPEN_FRAME).await;

    let update = wait_for(&mut rx, |u| {
        matches!(u.status, FeedStatus::Reconnecting { .. })
    })
    .await;
    assert!(matches!(
        update.status,
        FeedStatus::Reconnecting {
            last_issue: FeedIssue::ConnectionLost(_),
            ..
        }
    ));

    let mut second = server.next_connection().await;
    second.accept_session().await;
    wait_for(&mut rx, |u| u.status.is_live()).await;
    drop(first);
}

#[tokio::test]
async fn namespace_disconnect_from_server_triggers_reconnect() {
    let mut server = MockFeed::start().await;
    let client = LiveFeedClient::new(server.config());
    let _handle = client.connect("viewer-1");

    let mut first = server.next_connection().await;
    first.accept_session().await;
    first.send("41").await;

    let mut second = server.next_connection().await;
    second.accept_session().await;
}

#[tokio::test]
async fn viewer_disconnect_stops_everything() {
    let mut server = MockFeed::start().await;
    let client = LiveFeedClient::new(server.config());
    let mut handle = client.connect("viewer-1");
    let mut rx = handle.subscribe();

    let mut conn = server.next_connection().await;
    conn.accept_session().await;
    wait_for(&mut rx, |u| u.status.is_live()).await;

    handle.disconnect();
    assert_eq!(handle.latest().status, FeedStatus::Disconnected);
    assert!(!handle.is_active());

    // Anything the server pushes now must not reach subscribers.
    let _ = conn.ws.send(Message::Text("42[\"liveProfessionals\",{}]".to_owned())).await;
    assert!(rx.changed().await.is_ok(), "final Disconnected value is unseen");
    assert!(rx.changed().await.is_err(), "channel closes after disconnect");
    assert_eq!(rx.borrow().batch_seq, 0);

    let reconnect = tokio::time::timeout(Duration::from_millis(300), server.connections.recv())
        .await;
    assert!(reconnect.is_err(), "no reconnection after viewer disconnect");
}

#[tokio::test]
async fn rejected_connection_is_terminal() {
    let mut server = MockFeed::start().await;
    let client = LiveFeedClient::new(server.config());
    let handle = client.connect("viewer-1");
    let mut rx = handle.subscribe();

    let mut conn = server.next_connection().await;
    conn.send(OPEN_FRAME).await;
    assert_eq!(conn.recv_text().await, "40");
    conn.send(r#"44{"message":"Not authorized"}"#).await;

    let update = wait_for(&mut rx, |u| u.status.is_terminal()).await;
    assert_eq!(
        update.status,
        FeedStatus::Error(FeedIssue::Rejected("Not authorized".to_owned()))
    );

    let reconnect = tokio::time::timeout(Duration::from_millis(300), server.connections.recv())
        .await;
    assert!(reconnect.is_err(), "rejections are not retried");
}

#[tokio::test]
async fn gives_up_after_max_attempts_on_handshake_timeouts() {
    let mut server = MockFeed::start().await;
    let mut config = server.config();
    config.connect_timeout = Duration::from_millis(150);
    config.reconnect.max_attempts = 1;
    let client = LiveFeedClient::new(config);
    let handle = client.connect("viewer-1");
    let mut rx = handle.subscribe();

    // Accept sockets but never send the open packet.
    let _first = server.next_connection().await;
    let _second = server.next_connection().await;

    let update = wait_for(&mut rx, |u| u.status.is_terminal()).await;
    assert_eq!(
        update.status,
        FeedStatus::Error(FeedIssue::ReconnectExhausted { attempts: 1 })
    );
    assert!(update.records.is_empty());
}

#[tokio::test]
async fn failed_tls_handshake_is_reported_not_panicked() {
    let mut server = MockFeed::start().await;
    let mut config = server.config();
    config
        .base_url
        .set_scheme("https")
        .expect("http and https are both special schemes");
    config.reconnect.max_attempts = 1;
    let client = LiveFeedClient::new(config);
    let handle = client.connect("viewer-1");
    let mut rx = handle.subscribe();

    // The mock only speaks plain WebSocket, so every TLS handshake fails.
    let update = wait_for(&mut rx, |u| u.status.is_terminal()).await;
    assert_eq!(
        update.status,
        FeedStatus::Error(FeedIssue::ReconnectExhausted { attempts: 1 })
    );
    assert!(rx.changed().await.is_err(), "channel closes once the feed stops");

    let accepted = tokio::time::timeout(Duration::from_millis(100), server.connections.recv())
        .await;
    assert!(
        !matches!(accepted, Ok(Some(_))),
        "no plain WebSocket session was established"
    );
}
