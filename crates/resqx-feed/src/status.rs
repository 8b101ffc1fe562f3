//! Published feed state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use resqx_core::ProfessionalRecord;

/// A problem reported through [`FeedStatus`] instead of being returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedIssue {
    ConnectTimeout,
    ConnectionLost(String),
    /// The server answered the namespace connect with an error packet.
    Rejected(String),
    MalformedPayload(String),
    InvalidEndpoint(String),
    ReconnectExhausted { attempts: u32 },
    /// The connection task died without reporting why.
    TaskFailed(String),
}

impl FeedIssue {
    /// Fatal issues stop the client; it will not reconnect after them.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Rejected(_)
                | Self::InvalidEndpoint(_)
                | Self::ReconnectExhausted { .. }
                | Self::TaskFailed(_)
        )
    }
}

impl std::fmt::Display for FeedIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectTimeout => write!(f, "connection timed out"),
            Self::ConnectionLost(reason) => write!(f, "connection lost: {reason}"),
            Self::Rejected(reason) => write!(f, "connection rejected: {reason}"),
            Self::MalformedPayload(reason) => write!(f, "malformed payload: {reason}"),
            Self::InvalidEndpoint(reason) => write!(f, "invalid endpoint: {reason}"),
            Self::ReconnectExhausted { attempts } => {
                write!(f, "gave up after {attempts} reconnection attempts")
            }
            Self::TaskFailed(reason) => write!(f, "feed task failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Connecting,
    Connected,
    Reconnecting { attempt: u32, last_issue: FeedIssue },
    /// The viewer disconnected; terminal.
    Disconnected,
    /// No viewer id was given, so no connection was attempted; terminal.
    NotConnected,
    Error(FeedIssue),
}

impl FeedStatus {
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Connected)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Disconnected | Self::NotConnected => true,
            Self::Error(issue) => issue.is_fatal(),
            Self::Connecting | Self::Connected | Self::Reconnecting { .. } => false,
        }
    }
}

/// Records dropped from the last accepted batch, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HiddenCounts {
    pub invalid_coordinates: usize,
    pub malformed: usize,
    pub unrecognized_category: usize,
}

impl HiddenCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.invalid_coordinates + self.malformed + self.unrecognized_category
    }
}

/// The value carried by the feed's watch channel.
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    /// Last known good record set.
    pub records: Arc<[ProfessionalRecord]>,
    pub status: FeedStatus,
    pub hidden: HiddenCounts,
    /// When the current record set arrived; `None` before the first batch.
    pub received_at: Option<DateTime<Utc>>,
    /// Incremented once per accepted batch.
    pub batch_seq: u64,
}

impl FeedUpdate {
    #[must_use]
    pub fn initial(status: FeedStatus) -> Self {
        Self {
            records: Arc::from(Vec::new()),
            status,
            hidden: HiddenCounts::default(),
            received_at: None,
            batch_seq: 0,
        }
    }
}
