//! Field-professional records as published by the live feed.
//!
//! A [`ProfessionalRecord`] always carries finite coordinates: the only way
//! to build [`Coordinates`] is through [`Coordinates::new`], which refuses
//! NaN and infinities. Everything the map layer does not interpret stays in
//! [`ProfessionalRecord::details`] untouched.

use serde::Serialize;
use serde_json::{Map, Value};

/// A finite latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    /// Returns `None` unless both values are finite.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        (latitude.is_finite() && longitude.is_finite()).then_some(Self {
            latitude,
            longitude,
        })
    }

    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Reads one coordinate from a raw JSON value.
///
/// Accepts JSON numbers and numeric strings (surrounding whitespace ignored).
/// Returns `None` for anything that does not end up as a finite `f64`,
/// including `"abc"`, `null`, `"NaN"` and `"inf"`.
#[must_use]
pub fn parse_coordinate(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Category of a field professional.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProfessionalType {
    TowTruck,
    FirstResponder,
    /// A tag the dashboard does not know; carries the raw tag for logging.
    Unrecognized(String),
}

impl ProfessionalType {
    /// Normalizes a raw category tag.
    ///
    /// Matching ignores ASCII case, `-`, `_` and spaces, so `"TOW"`,
    /// `"tow_truck"` and `"Tow Truck"` all map to [`ProfessionalType::TowTruck`].
    #[must_use]
    pub fn from_tag(raw: &str) -> Self {
        let key: String = raw
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_uppercase();
        match key.as_str() {
            "TOW" | "TOWTRUCK" | "TOWING" => Self::TowTruck,
            "FIRSTRESPONDER" | "RESPONDER" | "FR" => Self::FirstResponder,
            _ => Self::Unrecognized(raw.to_owned()),
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl std::fmt::Display for ProfessionalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TowTruck => write!(f, "TOW_TRUCK"),
            Self::FirstResponder => write!(f, "FIRST_RESPONDER"),
            Self::Unrecognized(raw) => write!(f, "{raw}"),
        }
    }
}

impl Serialize for ProfessionalType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One field professional as last reported by the feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessionalRecord {
    pub id: String,
    pub name: String,
    pub professional_type: ProfessionalType,
    pub is_online: bool,
    pub coordinates: Coordinates,
    /// Free-form fields (service, status, location label, vehicle, bank and
    /// identification sub-records) passed through unmodified.
    pub details: Map<String, Value>,
}

impl ProfessionalRecord {
    /// Creates an offline record with no extra details.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        professional_type: ProfessionalType,
        coordinates: Coordinates,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            professional_type,
            is_online: false,
            coordinates,
            details: Map::new(),
        }
    }

    #[must_use]
    pub fn with_online(mut self, is_online: bool) -> Self {
        self.is_online = is_online;
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_owned(), value);
        self
    }

    /// Returns a detail field when it is a non-empty string.
    #[must_use]
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.detail_str("status")
    }

    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.detail_str("service")
    }

    #[must_use]
    pub fn location_label(&self) -> Option<&str> {
        self.detail_str("location")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn coordinates_reject_non_finite() {
        assert!(Coordinates::new(f64::NAN, 3.37).is_none());
        assert!(Coordinates::new(6.52, f64::INFINITY).is_none());
        assert!(Coordinates::new(6.52, 3.37).is_some());
    }

    #[test]
    fn parse_coordinate_accepts_numbers_and_numeric_strings() {
        assert_eq!(parse_coordinate(&json!(6.52)), Some(6.52));
        assert_eq!(parse_coordinate(&json!(" 3.37 ")), Some(3.37));
        assert_eq!(parse_coordinate(&json!(-12)), Some(-12.0));
    }

    #[test]
    fn parse_coordinate_rejects_garbage() {
        assert_eq!(parse_coordinate(&json!("abc")), None);
        assert_eq!(parse_coordinate(&json!("")), None);
        assert_eq!(parse_coordinate(&json!("NaN")), None);
        assert_eq!(parse_coordinate(&json!("inf")), None);
        assert_eq!(parse_coordinate(&Value::Null), None);
        assert_eq!(parse_coordinate(&json!(true)), None);
        assert_eq!(parse_coordinate(&json!([6.52])), None);
    }

    #[test]
    fn from_tag_normalizes_tow_variants() {
        for tag in ["TOW", "tow", "TOW_TRUCK", "tow-truck", "Tow Truck", "towing"] {
            assert_eq!(ProfessionalType::from_tag(tag), ProfessionalType::TowTruck, "{tag}");
        }
    }

    #[test]
    fn from_tag_normalizes_responder_variants() {
        for tag in ["FIRST_RESPONDER", "firstResponder", "responder", "FR"] {
            assert_eq!(
                ProfessionalType::from_tag(tag),
                ProfessionalType::FirstResponder,
                "{tag}"
            );
        }
    }

    #[test]
    fn from_tag_keeps_unknown_tag() {
        let kind = ProfessionalType::from_tag("MECHANIC");
        assert_eq!(kind, ProfessionalType::Unrecognized("MECHANIC".to_owned()));
        assert!(!kind.is_known());
        assert_eq!(kind.to_string(), "MECHANIC");
    }

    #[test]
    fn detail_accessors_skip_blank_values() {
        let coords = Coordinates::new(6.52, 3.37).unwrap();
        let record = ProfessionalRecord::new("1", "Ada", ProfessionalType::TowTruck, coords)
            .with_detail("status", json!("EN_ROUTE"))
            .with_detail("service", json!("  "))
            .with_detail("location", json!(42));
        assert_eq!(record.status(), Some("EN_ROUTE"));
        assert_eq!(record.service(), None);
        assert_eq!(record.location_label(), None);
    }

    #[test]
    fn record_serializes_camel_case_with_type_tag() {
        let coords = Coordinates::new(6.52, 3.37).unwrap();
        let record = ProfessionalRecord::new("1", "Ada", ProfessionalType::TowTruck, coords)
            .with_online(true);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["professionalType"], "TOW_TRUCK");
        assert_eq!(value["isOnline"], true);
        assert_eq!(value["coordinates"]["latitude"], 6.52);
    }
}
