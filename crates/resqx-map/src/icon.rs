use resqx_core::ProfessionalType;

/// Marker image for a professional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerIcon {
    TowTruck,
    FirstResponder,
    /// Fallback for categories the dashboard does not know.
    Neutral,
}

impl MarkerIcon {
    #[must_use]
    pub fn for_type(professional_type: &ProfessionalType) -> Self {
        match professional_type {
            ProfessionalType::TowTruck => Self::TowTruck,
            ProfessionalType::FirstResponder => Self::FirstResponder,
            ProfessionalType::Unrecognized(_) => Self::Neutral,
        }
    }

    #[must_use]
    pub fn asset_name(self) -> &'static str {
        match self {
            Self::TowTruck => "tow-truck.png",
            Self::FirstResponder => "first-responder.png",
            Self::Neutral => "marker-neutral.png",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::TowTruck => "Tow truck",
            Self::FirstResponder => "First responder",
            Self::Neutral => "Professional",
        }
    }
}
