use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub log_level: String,
    pub feed_url: Url,
    pub viewer_id: Option<String>,
    pub feed_auth_token: Option<String>,
    pub feed_event: String,
    pub feed_namespace: String,
    pub feed_connect_timeout_secs: u64,
    pub feed_reconnect_base_ms: u64,
    pub feed_reconnect_max_ms: u64,
    /// Consecutive reconnection attempts before giving up; `0` means unlimited.
    pub feed_max_reconnect_attempts: u32,
    /// Route template for the professional detail screen; contains `{id}`.
    pub detail_route: String,
}

/// Placeholder replaced by the professional id in a detail route template.
pub const DETAIL_ROUTE_PLACEHOLDER: &str = "{id}";

/// Expands a detail route template such as `/professionals/{id}`.
#[must_use]
pub fn expand_detail_route(template: &str, id: &str) -> String {
    template.replace(DETAIL_ROUTE_PLACEHOLDER, id)
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("feed_url", &self.feed_url.as_str())
            .field("viewer_id", &self.viewer_id)
            .field(
                "feed_auth_token",
                &self.feed_auth_token.as_ref().map(|_| "[redacted]"),
            )
            .field("feed_event", &self.feed_event)
            .field("feed_namespace", &self.feed_namespace)
            .field("feed_connect_timeout_secs", &self.feed_connect_timeout_secs)
            .field("feed_reconnect_base_ms", &self.feed_reconnect_base_ms)
            .field("feed_reconnect_max_ms", &self.feed_reconnect_max_ms)
            .field(
                "feed_max_reconnect_attempts",
                &self.feed_max_reconnect_attempts,
            )
            .field("detail_route", &self.detail_route)
            .finish()
    }
}
