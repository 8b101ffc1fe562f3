//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Only the subset the feed needs: open/close/ping/pong on the Engine.IO
//! layer, and connect/disconnect/event/connect-error on the Socket.IO layer.
//! Binary attachments are not supported; they decode as
//! [`SocketPacket::Other`] and are ignored.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ProtocolError;

/// Parameters from the Engine.IO open packet.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OpenInfo {
    pub sid: String,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}

impl OpenInfo {
    /// Longest silence tolerated before the connection is considered dead.
    pub(crate) fn heartbeat_window(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

#[derive(Debug)]
pub(crate) enum EnginePacket {
    Open(OpenInfo),
    Close,
    Ping(String),
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, PartialEq)]
pub(crate) enum SocketPacket {
    Connect {
        namespace: String,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        name: String,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
    /// Acks and binary packets.
    Other {
        namespace: String,
        kind: char,
    },
}

pub(crate) fn decode(frame: &str) -> Result<EnginePacket, ProtocolError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let rest = chars.as_str();
    match kind {
        '0' => serde_json::from_str(rest)
            .map(EnginePacket::Open)
            .map_err(|source| ProtocolError::InvalidJson {
                context: "open packet",
                source,
            }),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping(rest.to_owned())),
        '3' => Ok(EnginePacket::Pong),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(ProtocolError::UnknownPacketType {
            layer: "engine.io",
            kind: other,
        }),
    }
}

fn decode_socket(body: &str) -> Result<SocketPacket, ProtocolError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let mut rest = chars.as_str();

    let namespace = if rest.starts_with('/') {
        match rest.split_once(',') {
            Some((ns, tail)) => {
                rest = tail;
                ns.to_owned()
            }
            None => {
                let ns = rest.to_owned();
                rest = "";
                ns
            }
        }
    } else {
        "/".to_owned()
    };

    // Optional ack id; the feed never acknowledges, so it is skipped.
    let data = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let value: Value =
                serde_json::from_str(data).map_err(|source| ProtocolError::InvalidJson {
                    context: "event packet",
                    source,
                })?;
            let Value::Array(mut items) = value else {
                return Err(ProtocolError::MalformedEvent(
                    "event data is not an array".to_owned(),
                ));
            };
            if items.is_empty() {
                return Err(ProtocolError::MalformedEvent("event has no name".to_owned()));
            }
            let Value::String(name) = items.remove(0) else {
                return Err(ProtocolError::MalformedEvent(
                    "event name is not a string".to_owned(),
                ));
            };
            Ok(SocketPacket::Event {
                namespace,
                name,
                args: items,
            })
        }
        '4' => Ok(SocketPacket::ConnectError {
            namespace,
            message: connect_error_message(data),
        }),
        '3' | '5' | '6' => Ok(SocketPacket::Other { namespace, kind }),
        other => Err(ProtocolError::UnknownPacketType {
            layer: "socket.io",
            kind: other,
        }),
    }
}

fn connect_error_message(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_owned(),
        Ok(Value::String(s)) => s,
        _ if data.is_empty() => "unknown error".to_owned(),
        _ => data.to_owned(),
    }
}

/// Namespace of a Socket.IO event frame, read without decoding its body.
///
/// Returns `None` for frames that are not events.
pub(crate) fn event_namespace(frame: &str) -> Option<&str> {
    let rest = frame.strip_prefix("42")?;
    if rest.starts_with('/') {
        Some(rest.split_once(',').map_or(rest, |(ns, _)| ns))
    } else {
        Some("/")
    }
}

/// Socket.IO connect packet for `namespace`, optionally carrying an auth token.
pub(crate) fn encode_connect(namespace: &str, auth_token: Option<&str>) -> String {
    let mut frame = String::from("40");
    if namespace != "/" {
        frame.push_str(namespace);
        frame.push(',');
    }
    if let Some(token) = auth_token {
        frame.push_str(&serde_json::json!({ "token": token }).to_string());
    }
    frame
}

pub(crate) fn encode_pong(data: &str) -> String {
    format!("3{data}")
}
