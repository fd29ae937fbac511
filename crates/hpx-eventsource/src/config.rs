//! Event source configuration.

use std::time::Duration;

/// Default reconnect delay, used until the server sends a `retry` field.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(3000);

/// Configuration for an [`EventSource`](crate::EventSource).
///
/// Provides sensible defaults and chainable setter methods.
#[derive(Clone, Debug)]
pub struct EventSourceConfig {
    /// Event stream URL.
    pub url: String,
    /// Additional HTTP headers to include with every request.
    pub headers: http::HeaderMap,
    /// Delay before reconnecting after a failure. The server may change it
    /// per connection with a `retry` field.
    pub retry_interval: Duration,
    /// Time allowed to receive response headers.
    pub connect_timeout: Duration,
    /// Maximum silence between body chunks (None = unbounded).
    pub read_timeout: Option<Duration>,
    /// Event id to resume from on the first request.
    pub last_event_id: Option<String>,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: http::HeaderMap::new(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            connect_timeout: Duration::from_secs(10),
            read_timeout: None,
            last_event_id: None,
        }
    }
}

impl EventSourceConfig {
    /// Create a new configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set additional HTTP headers.
    #[must_use]
    pub fn headers(mut self, headers: http::HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the initial reconnect delay.
    #[must_use]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Resume from the given event id.
    #[must_use]
    pub fn last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = Some(id.into());
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message string if any field has an invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        let url = url::Url::parse(&self.url).map_err(|e| format!("Invalid URL: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Unsupported URL scheme: {}", url.scheme()));
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        if self.read_timeout.is_some_and(|t| t.is_zero()) {
            return Err("Read timeout must be > 0".to_string());
        }
        if let Some(id) = &self.last_event_id
            && http::HeaderValue::from_str(id).is_err()
        {
            return Err("Last event id is not a valid header value".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EventSourceConfig::default();
        assert!(config.url.is_empty());
        assert!(config.headers.is_empty());
        assert_eq!(config.retry_interval, Duration::from_millis(3000));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.read_timeout.is_none());
        assert!(config.last_event_id.is_none());
    }

    #[test]
    fn test_new_sets_url() {
        let config = EventSourceConfig::new("https://api.example.com/stream");
        assert_eq!(config.url, "https://api.example.com/stream");
        assert_eq!(config.retry_interval, DEFAULT_RETRY_INTERVAL);
    }

    #[test]
    fn test_all_builder_methods() {
        let mut headers = http::HeaderMap::new();
        headers.insert("X-Api-Key", "test-key".parse().expect("valid header value"));

        let config = EventSourceConfig::new("https://api.example.com/stream")
            .headers(headers)
            .retry_interval(Duration::from_millis(500))
            .connect_timeout(Duration::from_secs(30))
            .read_timeout(Some(Duration::from_secs(45)))
            .last_event_id("evt-9");

        assert_eq!(
            config
                .headers
                .get("X-Api-Key")
                .map(|v| v.to_str().expect("valid str")),
            Some("test-key")
        );
        assert_eq!(config.retry_interval, Duration::from_millis(500));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Some(Duration::from_secs(45)));
        assert_eq!(config.last_event_id.as_deref(), Some("evt-9"));
    }

    #[test]
    fn test_validation_empty_url() {
        let result = EventSourceConfig::default().validate();
        assert_eq!(result.expect_err("should fail"), "URL cannot be empty");
    }

    #[test]
    fn test_validation_unparseable_url() {
        let result = EventSourceConfig::new("not a url").validate();
        assert!(result.expect_err("should fail").starts_with("Invalid URL"));
    }

    #[test]
    fn test_validation_scheme() {
        let result = EventSourceConfig::new("ftp://example.com/stream").validate();
        assert_eq!(result.expect_err("should fail"), "Unsupported URL scheme: ftp");
    }

    #[test]
    fn test_validation_zero_timeouts() {
        let config = EventSourceConfig::new("https://example.com").connect_timeout(Duration::ZERO);
        assert_eq!(
            config.validate().expect_err("should fail"),
            "Connect timeout must be > 0"
        );

        let config = EventSourceConfig::new("https://example.com").read_timeout(Some(Duration::ZERO));
        assert_eq!(
            config.validate().expect_err("should fail"),
            "Read timeout must be > 0"
        );
    }

    #[test]
    fn test_validation_last_event_id() {
        let config = EventSourceConfig::new("https://example.com").last_event_id("bad\nid");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_valid_config() {
        let config = EventSourceConfig::new("http://127.0.0.1:8080/stream")
            .retry_interval(Duration::ZERO);
        assert!(config.validate().is_ok());
    }
}
