//! `watch`: mounts a tracking screen over a logging map surface.

use anyhow::Context;
use resqx_core::{AppConfig, Coordinates};
use resqx_feed::{FeedConfig, LiveFeedClient};
use resqx_map::{
    Callout, MapPresenter, MapSurface, MarkerFilter, MarkerView, StatusIndicator, TrackingScreen,
};

/// Map surface that writes every marker call to the log.
#[derive(Debug, Default)]
pub(crate) struct TracingSurface {
    markers: usize,
}

impl MapSurface for TracingSurface {
    fn create_marker(&mut self, id: &str, marker: &MarkerView) {
        self.markers += 1;
        tracing::info!(
            id,
            title = %marker.title,
            icon = marker.icon.asset_name(),
            lat = marker.position.latitude(),
            lng = marker.position.longitude(),
            total = self.markers,
            "marker added"
        );
    }

    fn update_marker(&mut self, id: &str, marker: &MarkerView) {
        tracing::info!(
            id,
            icon = marker.icon.asset_name(),
            lat = marker.position.latitude(),
            lng = marker.position.longitude(),
            "marker moved"
        );
    }

    fn remove_marker(&mut self, id: &str) {
        self.markers = self.markers.saturating_sub(1);
        tracing::info!(id, total = self.markers, "marker removed");
    }

    fn open_callout(&mut self, id: &str, anchor: Coordinates, callout: &Callout) {
        tracing::debug!(
            id,
            title = %callout.title,
            lat = anchor.latitude(),
            lng = anchor.longitude(),
            "callout opened"
        );
    }

    fn close_callout(&mut self) {
        tracing::debug!("callout closed");
    }
}

/// Follows the feed until Ctrl-C/SIGTERM or until the feed stops for good.
///
/// # Errors
///
/// Returns an error if no viewer id is available or the feed ends in an
/// error state.
pub(crate) async fn run_watch(
    config: &AppConfig,
    viewer: Option<String>,
    event: Option<String>,
    online_only: bool,
) -> anyhow::Result<()> {
    let viewer = viewer
        .or_else(|| config.viewer_id.clone())
        .filter(|v| !v.trim().is_empty())
        .context("no viewer id: pass --viewer or set RESQX_VIEWER_ID")?;

    let mut feed_config = FeedConfig::from_app_config(config);
    if let Some(event) = event {
        feed_config.event = event;
    }
    tracing::info!(viewer = %viewer, feed = ?feed_config, "starting live tracking");
    let client = LiveFeedClient::new(feed_config);

    let mut presenter = MapPresenter::new(TracingSurface::default(), config.detail_route.clone());
    if online_only {
        presenter.set_filter(MarkerFilter {
            online_only: true,
            ..MarkerFilter::default()
        });
    }
    let mut screen = TrackingScreen::mount(presenter, client.connect(&viewer));

    let feed_ended = tokio::select! {
        () = screen.run() => true,
        () = shutdown_signal() => false,
    };
    let indicator = screen.indicator();
    let hidden = screen.hidden();
    let markers = screen.presenter().marker_count();
    screen.unmount();

    tracing::info!(
        markers,
        hidden = hidden.total(),
        status = %indicator,
        "live tracking stopped"
    );
    if feed_ended {
        if let StatusIndicator::Error(reason) = indicator {
            anyhow::bail!("live feed stopped: {reason}");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, stopping live tracking");
}
