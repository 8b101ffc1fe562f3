use std::time::Duration;

use thiserror::Error;

/// Errors that end one feed session.
///
/// These never reach consumers directly: the client maps them onto
/// [`crate::FeedIssue`] values inside the published status.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport failure from the WebSocket layer.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be decoded during the handshake.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The handshake did not finish before the deadline.
    #[error("handshake timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No packet arrived within the negotiated heartbeat window.
    #[error("no heartbeat within {0:?}")]
    HeartbeatTimeout(Duration),

    /// The server ended the session.
    #[error("connection closed by server: {0}")]
    Closed(String),

    /// The server refused the namespace connection.
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// The configured feed URL cannot be turned into a WebSocket endpoint.
    #[error("invalid feed endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Engine.IO / Socket.IO frame decoding errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,

    #[error("unknown {layer} packet type '{kind}'")]
    UnknownPacketType { layer: &'static str, kind: char },

    #[error("invalid JSON in {context}: {source}")]
    InvalidJson {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

/// Whole-payload shape errors. A batch failing here is dropped as a unit
/// and the previous record set stays published.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no event argument")]
    MissingArgument,

    #[error("payload field '{0}' is missing or not an array")]
    MissingArray(&'static str),
}
