//! CalDAV transport configuration.

use std::time::Duration;
use url::Url;

use super::auth::Credentials;

/// Configuration for the CalDAV transport.
#[derive(Debug, Clone)]
pub struct CalDavConfig {
    /// Base URL of the server; resource paths are resolved against it.
    pub url: Url,

    /// Path of the user's calendar home, used to resolve calendar ids.
    pub calendar_home: String,

    pub credentials: Option<Credentials>,

    /// Ask the server to defer modifications and deletions behind a grace
    /// period.
    pub deferred_writes: bool,

    /// Path of the grace period task API, relative to `url`.
    pub grace_period_api_path: String,

    /// Whether to verify TLS certificates.
    pub verify_tls: bool,

    /// Request timeout.
    pub timeout: Duration,

    pub user_agent: String,
}

impl CalDavConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub const DEFAULT_GRACE_PERIOD_API_PATH: &'static str = "graceperiod/api/tasks";

    /// Creates a new CalDAV configuration with the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        let mut parsed = Url::parse(url.as_ref())?;
        if !parsed.path().ends_with('/') {
            let path = format!("{}/", parsed.path());
            parsed.set_path(&path);
        }
        Ok(Self {
            url: parsed,
            calendar_home: "/calendars/".to_string(),
            credentials: None,
            deferred_writes: true,
            grace_period_api_path: Self::DEFAULT_GRACE_PERIOD_API_PATH.to_string(),
            verify_tls: true,
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calsync/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_calendar_home(mut self, home: impl Into<String>) -> Self {
        self.calendar_home = home.into();
        self
    }

    /// Sends modifications and deletions as immediate writes.
    pub fn with_immediate_writes(mut self) -> Self {
        self.deferred_writes = false;
        self
    }

    pub fn with_grace_period_api_path(mut self, path: impl Into<String>) -> Self {
        self.grace_period_api_path = path.into();
        self
    }

    /// Disables TLS verification (for testing only).
    pub fn with_insecure_tls(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Resolves a server path (absolute or relative) against the base URL.
    pub fn resolve(&self, path: &str) -> Result<Url, url::ParseError> {
        self.url.join(path.trim_start_matches('/'))
    }

    /// Returns the collection path of a calendar id.
    pub fn calendar_path(&self, calendar_id: &str) -> String {
        format!(
            "{}/{}/",
            self.calendar_home.trim_end_matches('/'),
            calendar_id.trim_matches('/')
        )
    }

    /// Returns the URL of a grace period task.
    pub fn task_url(&self, task_id: &str) -> Result<Url, url::ParseError> {
        self.resolve(&format!(
            "{}/{}",
            self.grace_period_api_path.trim_end_matches('/'),
            urlencoding::encode(task_id)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_creation() {
        let config = CalDavConfig::new("https://dav.example.com/dav").unwrap();
        assert_eq!(config.url.as_str(), "https://dav.example.com/dav/");
        assert!(config.credentials.is_none());
        assert!(config.deferred_writes);
        assert!(config.verify_tls);
    }

    #[test]
    fn resolve_paths_under_base() {
        let config = CalDavConfig::new("https://dav.example.com/dav/").unwrap();
        assert_eq!(
            config.resolve("/calendars/home1/default/abc.ics").unwrap().as_str(),
            "https://dav.example.com/dav/calendars/home1/default/abc.ics"
        );
    }

    #[test]
    fn calendar_and_task_locations() {
        let config = CalDavConfig::new("https://dav.example.com/")
            .unwrap()
            .with_calendar_home("/calendars/home1/");

        assert_eq!(config.calendar_path("default"), "/calendars/home1/default/");
        assert_eq!(
            config.task_url("T 1").unwrap().as_str(),
            "https://dav.example.com/graceperiod/api/tasks/T%201"
        );
    }

    #[test]
    fn config_builder_methods() {
        let config = CalDavConfig::new("https://dav.example.com/")
            .unwrap()
            .with_credentials(Credentials::basic("user", "pass"))
            .with_immediate_writes()
            .with_insecure_tls()
            .with_timeout(Duration::from_secs(60));

        assert!(config.credentials.is_some());
        assert!(!config.deferred_writes);
        assert!(!config.verify_tls);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn invalid_url_returns_error() {
        assert!(CalDavConfig::new("not a valid url").is_err());
    }
}
