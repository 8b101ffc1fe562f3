pub mod app_config;
pub mod config;
pub mod professional;

pub use app_config::{expand_detail_route, AppConfig, Environment, DETAIL_ROUTE_PLACEHOLDER};
pub use config::{load_app_config, load_app_config_from_env};
pub use professional::{parse_coordinate, Coordinates, ProfessionalRecord, ProfessionalType};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
