//! Screen-lifetime binding between a feed subscription and a presenter.

use std::fmt;

use resqx_feed::{FeedHandle, FeedStatus, FeedUpdate, HiddenCounts};
use tokio::sync::watch;

use crate::presenter::{MapPresenter, RenderStats};
use crate::surface::MapSurface;

/// Connection indicator shown next to the map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusIndicator {
    Connecting,
    Live,
    Reconnecting { attempt: u32 },
    Offline,
    Error(String),
}

impl From<&FeedStatus> for StatusIndicator {
    fn from(status: &FeedStatus) -> Self {
        match status {
            FeedStatus::Connecting => Self::Connecting,
            FeedStatus::Connected => Self::Live,
            FeedStatus::Reconnecting { attempt, .. } => Self::Reconnecting { attempt: *attempt },
            FeedStatus::Disconnected | FeedStatus::NotConnected => Self::Offline,
            FeedStatus::Error(issue) => Self::Error(issue.to_string()),
        }
    }
}

impl fmt::Display for StatusIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Live => write!(f, "live"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Offline => write!(f, "offline"),
            Self::Error(text) => write!(f, "error: {text}"),
        }
    }
}

/// A mounted live-tracking map.
///
/// Snapshots are applied in arrival order. After [`TrackingScreen::unmount`]
/// the feed is gone and later updates never reach the presenter.
pub struct TrackingScreen<S: MapSurface> {
    presenter: MapPresenter<S>,
    feed: Option<FeedHandle>,
    updates: watch::Receiver<FeedUpdate>,
    status: FeedStatus,
    hidden: HiddenCounts,
    applied_seq: u64,
    mounted: bool,
}

impl<S: MapSurface> TrackingScreen<S> {
    /// Subscribes `presenter` to `feed` and applies the current snapshot.
    pub fn mount(presenter: MapPresenter<S>, feed: FeedHandle) -> Self {
        let mut updates = feed.subscribe();
        let initial = updates.borrow_and_update().clone();
        tracing::info!(viewer = feed.viewer_id(), "tracking screen mounted");
        let mut screen = Self {
            presenter,
            status: initial.status.clone(),
            feed: Some(feed),
            updates,
            hidden: HiddenCounts::default(),
            applied_seq: 0,
            mounted: true,
        };
        screen.apply(&initial);
        screen
    }

    /// Applies one feed update.
    ///
    /// Status-only updates leave the markers alone, so the last known
    /// positions stay visible while the feed is reconnecting. Returns the
    /// render stats when a new batch was drawn.
    pub fn apply(&mut self, update: &FeedUpdate) -> Option<RenderStats> {
        if !self.mounted {
            tracing::debug!(batch = update.batch_seq, "dropping feed update after unmount");
            return None;
        }
        if self.status != update.status {
            tracing::info!(status = %StatusIndicator::from(&update.status), "feed status changed");
        }
        self.status = update.status.clone();
        if update.batch_seq == self.applied_seq {
            return None;
        }
        self.applied_seq = update.batch_seq;
        self.hidden = update.hidden;
        Some(self.presenter.render(&update.records))
    }

    /// Applies updates as they arrive until unmount or until the feed closes.
    pub async fn run(&mut self) {
        while self.mounted {
            if self.updates.changed().await.is_err() {
                tracing::debug!("feed channel closed");
                break;
            }
            let update = self.updates.borrow_and_update().clone();
            self.apply(&update);
        }
    }

    /// Tears the feed down. Idempotent.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;
        if let Some(mut feed) = self.feed.take() {
            feed.disconnect();
        }
        tracing::info!("tracking screen unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn indicator(&self) -> StatusIndicator {
        StatusIndicator::from(&self.status)
    }

    /// Records hidden from the last drawn batch.
    pub fn hidden(&self) -> HiddenCounts {
        self.hidden
    }

    pub fn presenter(&self) -> &MapPresenter<S> {
        &self.presenter
    }

    /// Selection and filter changes go through the presenter directly.
    pub fn presenter_mut(&mut self) -> &mut MapPresenter<S> {
        &mut self.presenter
    }
}

impl<S: MapSurface> Drop for TrackingScreen<S> {
    fn drop(&mut self) {
        self.unmount();
    }
}
