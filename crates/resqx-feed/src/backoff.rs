//! Reconnection back-off for the live feed.
//!
//! [`ReconnectPolicy`] decides how long to wait before the next attempt and
//! when to stop. [`is_reconnectable`] separates remote drops, which are worth
//! another attempt, from rejections that will not change on retry.

use std::time::Duration;

use crate::error::FeedError;

/// Returns `true` for session endings that warrant a reconnection attempt.
///
/// **Reconnectable:** transport errors, timeouts, server-side closes and
/// protocol errors during the handshake.
///
/// **Not reconnectable:**
/// - [`FeedError::Rejected`]: the server refused this viewer.
/// - [`FeedError::InvalidEndpoint`]: configuration problem.
pub(crate) fn is_reconnectable(err: &FeedError) -> bool {
    match err {
        FeedError::WebSocket(_)
        | FeedError::Protocol(_)
        | FeedError::ConnectTimeout(_)
        | FeedError::HeartbeatTimeout(_)
        | FeedError::Closed(_) => true,
        FeedError::Rejected(_) | FeedError::InvalidEndpoint(_) => false,
    }
}

/// Exponential back-off with jitter.
///
/// Schedule with `base = 1 s`, `max = 5 s`:
///
/// | Attempt | Delay before attempt        |
/// |---------|-----------------------------|
/// | 1       | 1 s × 2⁰ ± 25 % jitter      |
/// | 2       | 1 s × 2¹ ± 25 % jitter      |
/// | 3       | 1 s × 2² ± 25 % jitter      |
/// | 4+      | capped at 5 s               |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
    /// Consecutive attempts allowed; `0` means unlimited.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5),
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    /// `true` once `attempt` (1-based) exceeds the allowed number of attempts.
    #[must_use]
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt > self.max_attempts
    }

    /// Delay before `attempt` (1-based), without jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << exponent).min(self.max)
    }

    /// Delay before `attempt` with ±25 % jitter, never above `max`.
    #[must_use]
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let factor = rand::random::<f64>() * 0.5 + 0.75;
        self.base_delay(attempt).mul_f64(factor).min(self.max)
    }
}
