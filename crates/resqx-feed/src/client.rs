//! Socket.IO client for the live professional feed.
//!
//! [`LiveFeedClient::connect`] spawns one task per viewer. The task runs the
//! Engine.IO handshake, answers heartbeats, validates every snapshot event and
//! publishes the outcome on a watch channel. Remote drops are followed by
//! reconnection under the configured [`ReconnectPolicy`]; a viewer-initiated
//! [`FeedHandle::disconnect`] ends everything at once.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::{FutureExt, SinkExt, StreamExt};
use resqx_core::AppConfig;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::backoff::{is_reconnectable, ReconnectPolicy};
use crate::error::{FeedError, PayloadError};
use crate::payload::{parse_snapshot, Batch};
use crate::protocol::{self, EnginePacket, OpenInfo, SocketPacket};
use crate::status::{FeedIssue, FeedStatus, FeedUpdate};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Query parameter carrying the viewer id on the connect URL.
const VIEWER_QUERY_PARAM: &str = "userId";

/// Connection settings for [`LiveFeedClient`].
#[derive(Clone)]
pub struct FeedConfig {
    /// Base URL of the feed service (`http`, `https`, `ws` or `wss`).
    pub base_url: Url,
    /// Name of the push event carrying snapshots.
    pub event: String,
    pub namespace: String,
    pub auth_token: Option<String>,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
}

impl FeedConfig {
    /// Settings with the default event, namespace, timeout and back-off.
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            event: "liveProfessionals".to_owned(),
            namespace: "/".to_owned(),
            auth_token: None,
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.feed_url.clone(),
            event: config.feed_event.clone(),
            namespace: config.feed_namespace.clone(),
            auth_token: config.feed_auth_token.clone(),
            connect_timeout: Duration::from_secs(config.feed_connect_timeout_secs),
            reconnect: ReconnectPolicy {
                base: Duration::from_millis(config.feed_reconnect_base_ms),
                max: Duration::from_millis(config.feed_reconnect_max_ms),
                max_attempts: config.feed_max_reconnect_attempts,
            },
        }
    }

    /// Builds the WebSocket endpoint for one viewer.
    ///
    /// `http` maps to `ws` and `https` to `wss`; the Socket.IO path is
    /// appended to whatever path the base URL already has.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidEndpoint`] for schemes other than
    /// `http`, `https`, `ws` and `wss`.
    pub fn endpoint(&self, viewer_id: &str) -> Result<Url, FeedError> {
        let mut url = self.base_url.clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(FeedError::InvalidEndpoint(format!(
                    "unsupported scheme '{other}'"
                )))
            }
        };
        url.set_scheme(scheme).map_err(|()| {
            FeedError::InvalidEndpoint(format!("cannot switch '{}' to {scheme}", self.base_url))
        })?;

        let path = format!("{}/socket.io/", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("EIO", "4")
            .append_pair("transport", "websocket")
            .append_pair(VIEWER_QUERY_PARAM, viewer_id);
        Ok(url)
    }
}

impl std::fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConfig")
            .field("base_url", &self.base_url.as_str())
            .field("event", &self.event)
            .field("namespace", &self.namespace)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[redacted]"))
            .field("connect_timeout", &self.connect_timeout)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

/// Factory for per-viewer feed connections.
#[derive(Debug, Clone)]
pub struct LiveFeedClient {
    config: Arc<FeedConfig>,
}

impl LiveFeedClient {
    #[must_use]
    pub fn new(config: FeedConfig) -> Self {
        install_crypto_provider();
        Self {
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Opens the live feed for `viewer_id`.
    ///
    /// A blank viewer id never touches the network: the returned handle is
    /// already in the terminal [`FeedStatus::NotConnected`] state and its
    /// channel is closed.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, since the connection task
    /// is spawned onto the current runtime.
    #[must_use]
    pub fn connect(&self, viewer_id: &str) -> FeedHandle {
        let viewer_id = viewer_id.trim().to_owned();
        if viewer_id.is_empty() {
            tracing::warn!("no viewer id given; live feed not connected");
            let (tx, updates) = watch::channel(FeedUpdate::initial(FeedStatus::NotConnected));
            drop(tx);
            return FeedHandle {
                viewer_id,
                updates,
                publisher: Publisher::closed(),
                task: None,
            };
        }

        let (tx, updates) = watch::channel(FeedUpdate::initial(FeedStatus::Connecting));
        let publisher = Publisher::new(tx);
        let task = tokio::spawn(supervise(
            run_feed(
                Arc::clone(&self.config),
                viewer_id.clone(),
                publisher.clone(),
            ),
            publisher.clone(),
        ));
        FeedHandle {
            viewer_id,
            updates,
            publisher,
            task: Some(task),
        }
    }
}

/// One viewer's live connection.
///
/// Dropping the handle disconnects it.
pub struct FeedHandle {
    viewer_id: String,
    updates: watch::Receiver<FeedUpdate>,
    publisher: Publisher,
    task: Option<JoinHandle<()>>,
}

impl FeedHandle {
    #[must_use]
    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    /// A receiver for the published updates. The channel closes once the
    /// feed is disconnected or has stopped for good.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedUpdate> {
        self.updates.clone()
    }

    /// The most recently published update.
    #[must_use]
    pub fn latest(&self) -> FeedUpdate {
        self.updates.borrow().clone()
    }

    /// `true` while the connection task is still running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Tears the connection down without further reconnection attempts.
    ///
    /// Once this returns nothing else is published: the final status is
    /// [`FeedStatus::Disconnected`] and subscribers see the channel close.
    pub fn disconnect(&mut self) {
        if let Some(task) = self.task.take() {
            let was_running = !task.is_finished();
            self.publisher.finish(FeedStatus::Disconnected);
            task.abort();
            if was_running {
                tracing::info!(viewer = %self.viewer_id, "live feed disconnected by viewer");
            }
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedHandle")
            .field("viewer_id", &self.viewer_id)
            .field("status", &self.updates.borrow().status)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Write side of the watch channel.
///
/// Every publish takes the same lock that [`Publisher::finish`] uses to drop
/// the sender, so nothing is published after a disconnect returns.
#[derive(Clone)]
struct Publisher {
    tx: Arc<Mutex<Option<watch::Sender<FeedUpdate>>>>,
}

impl Publisher {
    fn new(tx: watch::Sender<FeedUpdate>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    fn closed() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns `false` once the feed has been torn down.
    fn status(&self, status: FeedStatus) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        tx.send_if_modified(|update| {
            if update.status == status {
                false
            } else {
                update.status = status;
                true
            }
        });
        true
    }

    fn batch(&self, batch: Batch) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        tx.send_modify(|update| {
            update.records = Arc::from(batch.records);
            update.hidden = batch.hidden;
            update.received_at = Some(Utc::now());
            update.batch_seq += 1;
            update.status = FeedStatus::Connected;
        });
        true
    }

    /// Publishes `status` as the final value and closes the channel.
    fn finish(&self, status: FeedStatus) {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.take() {
            tx.send_modify(|update| update.status = status);
        }
    }
}

/// rustls needs a process-wide crypto provider before the first `wss`
/// handshake.
fn install_crypto_provider() {
    // Err means a provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Runs the connection task, turning a panic into a terminal status so
/// subscribers never wait on a dead task.
async fn supervise<F>(task: F, publisher: Publisher)
where
    F: Future<Output = ()>,
{
    if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
        let reason = panic_message(panic.as_ref());
        tracing::error!(reason = %reason, "live feed task panicked");
        publisher.finish(FeedStatus::Error(FeedIssue::TaskFailed(reason)));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

enum SessionEnd {
    /// Failed before the namespace connection was acknowledged.
    HandshakeFailed(FeedError),
    /// Ended after a successful handshake.
    Dropped(FeedError),
}

async fn run_feed(config: Arc<FeedConfig>, viewer_id: String, publisher: Publisher) {
    let endpoint = match config.endpoint(&viewer_id) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(viewer = %viewer_id, error = %e, "cannot build live feed endpoint");
            publisher.finish(FeedStatus::Error(issue_for(&e)));
            return;
        }
    };

    let mut attempt = 0u32;
    loop {
        let err = match run_session(&config, &endpoint, &publisher).await {
            SessionEnd::Dropped(err) => {
                attempt = 0;
                err
            }
            SessionEnd::HandshakeFailed(err) => err,
        };

        if !is_reconnectable(&err) {
            tracing::error!(viewer = %viewer_id, error = %err, "live feed stopped");
            publisher.finish(FeedStatus::Error(issue_for(&err)));
            return;
        }

        attempt = attempt.saturating_add(1);
        if config.reconnect.exhausted(attempt) {
            let attempts = attempt - 1;
            tracing::error!(
                viewer = %viewer_id,
                attempts,
                error = %err,
                "live feed reconnection attempts exhausted"
            );
            publisher.finish(FeedStatus::Error(FeedIssue::ReconnectExhausted { attempts }));
            return;
        }

        let delay = config.reconnect.jittered_delay(attempt);
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        tracing::warn!(
            viewer = %viewer_id,
            attempt,
            delay_ms,
            error = %err,
            "live feed dropped, reconnecting after back-off"
        );
        let reconnecting = FeedStatus::Reconnecting {
            attempt,
            last_issue: issue_for(&err),
        };
        if !publisher.status(reconnecting) {
            return;
        }
        tokio::time::sleep(delay).await;
    }
}

async fn run_session(config: &FeedConfig, endpoint: &Url, publisher: &Publisher) -> SessionEnd {
    let (mut ws, open) =
        match tokio::time::timeout(config.connect_timeout, handshake(config, endpoint)).await {
            Err(_) => {
                return SessionEnd::HandshakeFailed(FeedError::ConnectTimeout(
                    config.connect_timeout,
                ))
            }
            Ok(Err(e)) => return SessionEnd::HandshakeFailed(e),
            Ok(Ok(pair)) => pair,
        };

    tracing::info!(sid = %open.sid, namespace = %config.namespace, "live feed connected");
    if !publisher.status(FeedStatus::Connected) {
        return SessionEnd::Dropped(FeedError::Closed("viewer disconnected".to_owned()));
    }

    let err = pump(&mut ws, config, &open, publisher).await;
    // Best effort: the peer may already be gone.
    let _ = ws.close(None).await;
    SessionEnd::Dropped(err)
}

/// Opens the socket, waits for the Engine.IO open packet and connects the
/// namespace.
async fn handshake(config: &FeedConfig, endpoint: &Url) -> Result<(WsStream, OpenInfo), FeedError> {
    let (mut ws, _response) = tokio_tungstenite::connect_async(endpoint.as_str()).await?;

    let open = loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Open(info) => break info,
            other => tracing::debug!(packet = ?other, "ignoring packet before open"),
        }
    };

    let connect = protocol::encode_connect(&config.namespace, config.auth_token.as_deref());
    ws.send(Message::Text(connect)).await?;

    loop {
        match next_packet(&mut ws).await? {
            EnginePacket::Ping(data) => ws.send(Message::Text(protocol::encode_pong(&data))).await?,
            EnginePacket::Message(SocketPacket::Connect { namespace })
                if namespace == config.namespace =>
            {
                return Ok((ws, open));
            }
            EnginePacket::Message(SocketPacket::ConnectError { namespace, message })
                if namespace == config.namespace =>
            {
                return Err(FeedError::Rejected(message));
            }
            EnginePacket::Close => {
                return Err(FeedError::Closed("engine.io close during handshake".to_owned()))
            }
            other => tracing::debug!(packet = ?other, "ignoring packet during handshake"),
        }
    }
}

async fn next_packet(ws: &mut WsStream) -> Result<EnginePacket, FeedError> {
    loop {
        let msg = ws
            .next()
            .await
            .ok_or_else(|| FeedError::Closed("stream ended".to_owned()))??;
        match msg {
            Message::Text(text) => return protocol::decode(&text).map_err(FeedError::from),
            Message::Close(frame) => return Err(FeedError::Closed(close_reason(frame.as_ref()))),
            _ => {}
        }
    }
}

/// Reads packets until the session ends and returns why it ended.
async fn pump(
    ws: &mut WsStream,
    config: &FeedConfig,
    open: &OpenInfo,
    publisher: &Publisher,
) -> FeedError {
    let window = open.heartbeat_window();
    loop {
        let msg = match tokio::time::timeout(window, ws.next()).await {
            Err(_) => return FeedError::HeartbeatTimeout(window),
            Ok(None) => return FeedError::Closed("stream ended".to_owned()),
            Ok(Some(Err(e))) => return e.into(),
            Ok(Some(Ok(msg))) => msg,
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(frame) => return FeedError::Closed(close_reason(frame.as_ref())),
            _ => continue,
        };
        let packet = match protocol::decode(&text) {
            Ok(packet) => packet,
            Err(e) if protocol::event_namespace(&text) == Some(config.namespace.as_str()) => {
                tracing::warn!(
                    error = %e,
                    "undecodable live feed event; keeping last good snapshot"
                );
                let issue = FeedIssue::MalformedPayload(e.to_string());
                if !publisher.status(FeedStatus::Error(issue)) {
                    return FeedError::Closed("viewer disconnected".to_owned());
                }
                continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable live feed frame");
                continue;
            }
        };

        match packet {
            EnginePacket::Ping(data) => {
                if let Err(e) = ws.send(Message::Text(protocol::encode_pong(&data))).await {
                    return e.into();
                }
            }
            EnginePacket::Close => {
                return FeedError::Closed("engine.io close packet".to_owned());
            }
            EnginePacket::Message(SocketPacket::Event {
                namespace,
                name,
                args,
            }) => {
                if namespace != config.namespace || name != config.event {
                    tracing::debug!(%namespace, event = %name, "ignoring unrelated event");
                    continue;
                }
                if !apply_snapshot(args.first(), publisher) {
                    return FeedError::Closed("viewer disconnected".to_owned());
                }
            }
            EnginePacket::Message(SocketPacket::Disconnect { namespace })
                if namespace == config.namespace =>
            {
                return FeedError::Closed("namespace disconnected by server".to_owned());
            }
            EnginePacket::Message(SocketPacket::ConnectError { namespace, message })
                if namespace == config.namespace =>
            {
                return FeedError::Rejected(message);
            }
            other => tracing::debug!(packet = ?other, "ignoring packet"),
        }
    }
}

/// Validates one snapshot and publishes it, or flags the payload as
/// malformed while keeping the last good records. Returns `false` once the
/// feed has been torn down.
fn apply_snapshot(payload: Option<&Value>, publisher: &Publisher) -> bool {
    match payload
        .ok_or(PayloadError::MissingArgument)
        .and_then(parse_snapshot)
    {
        Ok(batch) => {
            tracing::debug!(
                records = batch.records.len(),
                hidden = batch.hidden.total(),
                "live feed snapshot accepted"
            );
            publisher.batch(batch)
        }
        Err(e) => {
            tracing::warn!(error = %e, "malformed live feed payload; keeping last good snapshot");
            publisher.status(FeedStatus::Error(FeedIssue::MalformedPayload(
                e.to_string(),
            )))
        }
    }
}

fn close_reason(frame: Option<&CloseFrame<'_>>) -> String {
    match frame {
        Some(f) if !f.reason.is_empty() => f.reason.to_string(),
        Some(f) => format!("close code {}", u16::from(f.code)),
        None => "close frame".to_owned(),
    }
}

fn issue_for(err: &FeedError) -> FeedIssue {
    match err {
        FeedError::ConnectTimeout(_) => FeedIssue::ConnectTimeout,
        FeedError::Rejected(reason) => FeedIssue::Rejected(reason.clone()),
        FeedError::InvalidEndpoint(reason) => FeedIssue::InvalidEndpoint(reason.clone()),
        other => FeedIssue::ConnectionLost(other.to_string()),
    }
}
