//! Seams to the map SDK and the navigation shell.

use resqx_core::{Coordinates, ProfessionalRecord};

use crate::icon::MarkerIcon;

/// What a marker looks like on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerView {
    pub position: Coordinates,
    pub icon: MarkerIcon,
    pub title: String,
}

impl MarkerView {
    #[must_use]
    pub fn for_record(record: &ProfessionalRecord) -> Self {
        Self {
            position: record.coordinates,
            icon: MarkerIcon::for_type(&record.professional_type),
            title: display_title(record),
        }
    }
}

/// Content of the detail popup anchored to a selected marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callout {
    pub title: String,
    pub subtitle: String,
    pub online: bool,
    pub status: Option<String>,
    pub service: Option<String>,
    pub location: Option<String>,
}

impl Callout {
    #[must_use]
    pub fn for_record(record: &ProfessionalRecord) -> Self {
        Self {
            title: display_title(record),
            subtitle: MarkerIcon::for_type(&record.professional_type)
                .label()
                .to_owned(),
            online: record.is_online,
            status: record.status().map(str::to_owned),
            service: record.service().map(str::to_owned),
            location: record.location_label().map(str::to_owned),
        }
    }
}

fn display_title(record: &ProfessionalRecord) -> String {
    if record.name.trim().is_empty() {
        record.id.clone()
    } else {
        record.name.clone()
    }
}

/// The map SDK surface the presenter draws on.
///
/// Implementations only execute the calls; deciding which calls to make is
/// the presenter's job.
pub trait MapSurface {
    fn create_marker(&mut self, id: &str, marker: &MarkerView);
    fn update_marker(&mut self, id: &str, marker: &MarkerView);
    fn remove_marker(&mut self, id: &str);
    fn open_callout(&mut self, id: &str, anchor: Coordinates, callout: &Callout);
    fn close_callout(&mut self);
}

/// Route-push capability of the application shell.
pub trait Navigator {
    fn push(&mut self, route: &str);
}
