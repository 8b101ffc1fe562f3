//! Live professional-location feed.
//!
//! [`LiveFeedClient`] holds one Socket.IO connection per viewer, validates
//! every pushed snapshot and publishes the result on a
//! [`tokio::sync::watch`] channel as a [`FeedUpdate`]. Transport failures,
//! malformed payloads and reconnection progress show up in
//! [`FeedUpdate::status`]; the last good record set is never cleared by them.

pub mod backoff;
pub mod client;
pub mod error;
pub mod payload;
pub(crate) mod protocol;
pub mod status;

pub use backoff::ReconnectPolicy;
pub use client::{FeedConfig, FeedHandle, LiveFeedClient};
pub use error::{FeedError, PayloadError, ProtocolError};
pub use payload::{parse_snapshot, validate_record, Batch, RecordRejection};
pub use status::{FeedIssue, FeedStatus, FeedUpdate, HiddenCounts};
