//! Map presentation of the live professional feed.
//!
//! [`MapPresenter`] reconciles snapshots against the markers it already drew
//! on a [`MapSurface`] and owns the single-selection callout.
//! [`TrackingScreen`] binds a presenter to a feed for the lifetime of a
//! screen.

pub mod icon;
pub mod presenter;
pub mod screen;
pub mod surface;

pub use icon::MarkerIcon;
pub use presenter::{Bounds, MapPresenter, MarkerFilter, RenderStats, Selection};
pub use screen::{StatusIndicator, TrackingScreen};
pub use surface::{Callout, MapSurface, MarkerView, Navigator};
