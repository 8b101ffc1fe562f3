use url::Url;

use crate::app_config::{AppConfig, Environment, DETAIL_ROUTE_PLACEHOLDER};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation live here, decoupled from the process environment,
/// so tests can drive it with a plain `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let raw_feed_url = require("RESQX_FEED_URL")?;
    let feed_url =
        parse_feed_url(&raw_feed_url).map_err(|reason| invalid("RESQX_FEED_URL", reason))?;

    let env = parse_environment(&or_default("RESQX_ENV", "development"))?;
    let log_level = or_default("RESQX_LOG_LEVEL", "info");
    let viewer_id = optional("RESQX_VIEWER_ID");
    let feed_auth_token = optional("RESQX_FEED_AUTH_TOKEN");

    let feed_event = or_default("RESQX_FEED_EVENT", "liveProfessionals");
    if feed_event.trim().is_empty() {
        return Err(invalid("RESQX_FEED_EVENT", "event name is empty".to_string()));
    }

    let feed_namespace = or_default("RESQX_FEED_NAMESPACE", "/");
    if !feed_namespace.starts_with('/') {
        return Err(invalid(
            "RESQX_FEED_NAMESPACE",
            format!("namespace '{feed_namespace}' must start with '/'"),
        ));
    }

    let feed_connect_timeout_secs = parse_u64("RESQX_FEED_CONNECT_TIMEOUT_SECS", "10")?;
    if feed_connect_timeout_secs == 0 {
        return Err(invalid(
            "RESQX_FEED_CONNECT_TIMEOUT_SECS",
            "timeout must be at least 1 second".to_string(),
        ));
    }

    let feed_reconnect_base_ms = parse_u64("RESQX_FEED_RECONNECT_BASE_MS", "1000")?;
    let feed_reconnect_max_ms = parse_u64("RESQX_FEED_RECONNECT_MAX_MS", "5000")?;
    if feed_reconnect_max_ms < feed_reconnect_base_ms {
        return Err(invalid(
            "RESQX_FEED_RECONNECT_MAX_MS",
            format!(
                "max delay {feed_reconnect_max_ms}ms is below base delay {feed_reconnect_base_ms}ms"
            ),
        ));
    }
    let feed_max_reconnect_attempts = parse_u32("RESQX_FEED_MAX_RECONNECT_ATTEMPTS", "0")?;

    let detail_route = or_default("RESQX_DETAIL_ROUTE", "/professionals/{id}");
    if !detail_route.contains(DETAIL_ROUTE_PLACEHOLDER) {
        return Err(invalid(
            "RESQX_DETAIL_ROUTE",
            format!("route '{detail_route}' has no {{id}} placeholder"),
        ));
    }

    Ok(AppConfig {
        env,
        log_level,
        feed_url,
        viewer_id,
        feed_auth_token,
        feed_event,
        feed_namespace,
        feed_connect_timeout_secs,
        feed_reconnect_base_ms,
        feed_reconnect_max_ms,
        feed_max_reconnect_attempts,
        detail_route,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "RESQX_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_feed_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => {}
        other => return Err(format!("unsupported scheme '{other}'")),
    }
    if url.host_str().is_none() {
        return Err("URL has no host".to_string());
    }
    Ok(url)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
