//! Marker reconciliation and the single-selection callout.

use std::collections::HashMap;

use resqx_core::{expand_detail_route, Coordinates, ProfessionalRecord, ProfessionalType};

use crate::surface::{Callout, MapSurface, MarkerView, Navigator};

/// Selection state of the detail callout.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    Idle,
    Selected(String),
}

/// Which records make it onto the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerFilter {
    pub tow_trucks: bool,
    pub first_responders: bool,
    /// Hide professionals that are not currently online.
    pub online_only: bool,
    /// Draw records of unknown categories with the neutral icon.
    pub show_unrecognized: bool,
}

impl Default for MarkerFilter {
    fn default() -> Self {
        Self {
            tow_trucks: true,
            first_responders: true,
            online_only: false,
            show_unrecognized: false,
        }
    }
}

impl MarkerFilter {
    #[must_use]
    pub fn admits(&self, record: &ProfessionalRecord) -> bool {
        if self.online_only && !record.is_online {
            return false;
        }
        match record.professional_type {
            ProfessionalType::TowTruck => self.tow_trucks,
            ProfessionalType::FirstResponder => self.first_responders,
            ProfessionalType::Unrecognized(_) => self.show_unrecognized,
        }
    }
}

/// Surface work done by one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl RenderStats {
    /// `true` when the pass made no marker calls.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Bounding box of the rendered markers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl Bounds {
    fn around(point: Coordinates) -> Self {
        Self {
            south: point.latitude(),
            west: point.longitude(),
            north: point.latitude(),
            east: point.longitude(),
        }
    }

    fn extend(&mut self, point: Coordinates) {
        self.south = self.south.min(point.latitude());
        self.north = self.north.max(point.latitude());
        self.west = self.west.min(point.longitude());
        self.east = self.east.max(point.longitude());
    }
}

#[derive(Debug, Clone, PartialEq)]
struct RenderedMarker {
    view: MarkerView,
    callout: Callout,
}

/// Renders professional records as markers on a [`MapSurface`].
///
/// The presenter remembers what it last drew and only issues the surface
/// calls needed to move from that state to the new one.
#[derive(Debug)]
pub struct MapPresenter<S> {
    surface: S,
    markers: HashMap<String, RenderedMarker>,
    last_input: Vec<ProfessionalRecord>,
    filter: MarkerFilter,
    selection: Selection,
    /// Id, anchor and content of the callout currently open on the surface.
    open_callout: Option<(String, Coordinates, Callout)>,
    detail_route: String,
}

impl<S: MapSurface> MapPresenter<S> {
    /// `detail_route` is a template such as `/professionals/{id}`.
    pub fn new(surface: S, detail_route: impl Into<String>) -> Self {
        Self {
            surface,
            markers: HashMap::new(),
            last_input: Vec::new(),
            filter: MarkerFilter::default(),
            selection: Selection::Idle,
            open_callout: None,
            detail_route: detail_route.into(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn has_marker(&self, id: &str) -> bool {
        self.markers.contains_key(id)
    }

    /// The marker currently drawn for `id`.
    pub fn marker(&self, id: &str) -> Option<&MarkerView> {
        self.markers.get(id).map(|m| &m.view)
    }

    /// Reconciles the map against `records`.
    ///
    /// Calling this twice with the same records makes no surface calls the
    /// second time. When the input repeats an id, the last occurrence wins.
    pub fn render(&mut self, records: &[ProfessionalRecord]) -> RenderStats {
        self.last_input = records.to_vec();
        self.reconcile()
    }

    /// Replaces the filter and re-renders the last input with it.
    pub fn set_filter(&mut self, filter: MarkerFilter) -> RenderStats {
        if filter == self.filter {
            return RenderStats::default();
        }
        self.filter = filter;
        self.reconcile()
    }

    /// Opens the callout for `id`. Unknown ids are ignored.
    pub fn select_marker(&mut self, id: &str) -> bool {
        if !self.markers.contains_key(id) {
            tracing::debug!(id, "ignoring selection of unknown marker");
            return false;
        }
        self.selection = Selection::Selected(id.to_owned());
        self.sync_callout();
        true
    }

    /// Background click: closes the callout if one is open.
    pub fn clear_selection(&mut self) {
        self.selection = Selection::Idle;
        self.sync_callout();
    }

    /// Navigates to the detail route of the selected professional.
    ///
    /// Returns the pushed route, or `None` when nothing is selected.
    pub fn activate_callout(&mut self, navigator: &mut dyn Navigator) -> Option<String> {
        let Selection::Selected(id) = &self.selection else {
            return None;
        };
        let route = expand_detail_route(&self.detail_route, id);
        tracing::debug!(id = %id, route = %route, "navigating to professional detail");
        navigator.push(&route);
        Some(route)
    }

    /// Smallest box containing every rendered marker.
    pub fn bounds(&self) -> Option<Bounds> {
        let mut positions = self.markers.values().map(|m| m.view.position);
        let mut bounds = Bounds::around(positions.next()?);
        for position in positions {
            bounds.extend(position);
        }
        Some(bounds)
    }

    fn reconcile(&mut self) -> RenderStats {
        let input = std::mem::take(&mut self.last_input);

        let mut latest: HashMap<&str, &ProfessionalRecord> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for record in input.iter().filter(|r| self.filter.admits(r)) {
            if latest.insert(record.id.as_str(), record).is_none() {
                order.push(record.id.as_str());
            }
        }

        let mut stats = RenderStats::default();

        let mut stale: Vec<String> = self
            .markers
            .keys()
            .filter(|id| !latest.contains_key(id.as_str()))
            .cloned()
            .collect();
        stale.sort();
        for id in stale {
            self.markers.remove(&id);
            self.surface.remove_marker(&id);
            stats.removed += 1;
        }

        for id in order {
            let record = latest[id];
            let next = RenderedMarker {
                view: MarkerView::for_record(record),
                callout: Callout::for_record(record),
            };
            match self.markers.get_mut(id) {
                Some(current) => {
                    if current.view == next.view {
                        stats.unchanged += 1;
                    } else {
                        self.surface.update_marker(id, &next.view);
                        stats.updated += 1;
                    }
                    *current = next;
                }
                None => {
                    self.surface.create_marker(id, &next.view);
                    self.markers.insert(id.to_owned(), next);
                    stats.created += 1;
                }
            }
        }

        self.last_input = input;
        self.sync_callout();

        if !stats.is_noop() {
            tracing::debug!(
                created = stats.created,
                updated = stats.updated,
                removed = stats.removed,
                unchanged = stats.unchanged,
                "reconciled markers"
            );
        }
        stats
    }

    /// Brings the surface callout in line with the selection.
    fn sync_callout(&mut self) {
        let wanted = match &self.selection {
            Selection::Idle => None,
            Selection::Selected(id) => match self.markers.get(id) {
                Some(marker) => Some((id.clone(), marker.view.position, marker.callout.clone())),
                None => {
                    tracing::debug!(id = %id, "selected professional vanished, closing callout");
                    self.selection = Selection::Idle;
                    None
                }
            },
        };

        match wanted {
            Some((id, anchor, callout)) => {
                let already_open = self
                    .open_callout
                    .as_ref()
                    .is_some_and(|(i, a, c)| *i == id && *a == anchor && *c == callout);
                if !already_open {
                    self.surface.open_callout(&id, anchor, &callout);
                    self.open_callout = Some((id, anchor, callout));
                }
            }
            None => {
                if self.open_callout.take().is_some() {
                    self.surface.close_callout();
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "presenter_test.rs"]
mod tests;
