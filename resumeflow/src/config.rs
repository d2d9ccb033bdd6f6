//! Configuration types for the pipeline and its HTTP service.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Longest dependency wait a configuration may ask for.
pub const MAX_DEPENDENCY_WAIT: Duration = Duration::from_secs(3600);

/// Configuration for the pipeline controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Browsing session that scopes every storage key.
    #[serde(default = "default_session_id")]
    pub session_id: String,
    /// Bounded wait for a missing dependency during recovery, in seconds.
    /// At most [`MAX_DEPENDENCY_WAIT`].
    #[serde(default = "default_dependency_wait")]
    pub dependency_wait_seconds: f64,
    /// Score displayed when a score stage failed or returned invalid data.
    #[serde(default)]
    pub fallback_score_percent: u8,
    /// File used for durable checkpoints; in-memory storage when unset.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    /// Remote service configuration.
    #[serde(default)]
    pub http: HttpConfig,
}

fn default_session_id() -> String {
    "default".to_string()
}

fn default_dependency_wait() -> f64 {
    30.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session_id: default_session_id(),
            dependency_wait_seconds: default_dependency_wait(),
            fallback_score_percent: 0,
            storage_path: None,
            http: HttpConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the session id.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Sets the dependency wait.
    #[must_use]
    pub fn with_dependency_wait(mut self, wait: Duration) -> Self {
        self.dependency_wait_seconds = wait.as_secs_f64();
        self
    }

    /// Sets the fallback score.
    #[must_use]
    pub fn with_fallback_score(mut self, percent: u8) -> Self {
        self.fallback_score_percent = percent.min(100);
        self
    }

    /// Sets the durable storage path.
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Sets the HTTP configuration.
    #[must_use]
    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Gets the dependency wait as a Duration, saturating at
    /// [`MAX_DEPENDENCY_WAIT`]. Negative and NaN values mean no wait.
    #[must_use]
    pub fn dependency_wait(&self) -> Duration {
        let seconds = self
            .dependency_wait_seconds
            .clamp(0.0, MAX_DEPENDENCY_WAIT.as_secs_f64());
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }

    /// Parses a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from `RESUMEFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(session_id) = lookup("RESUMEFLOW_SESSION_ID") {
            config.session_id = session_id;
        }
        if let Some(wait) = parse_var::<f64>(&lookup, "RESUMEFLOW_DEPENDENCY_WAIT_SECONDS")? {
            config.dependency_wait_seconds = wait;
        }
        if let Some(score) = parse_var::<u8>(&lookup, "RESUMEFLOW_FALLBACK_SCORE")? {
            config.fallback_score_percent = score;
        }
        if let Some(path) = lookup("RESUMEFLOW_STORAGE_PATH") {
            config.storage_path = Some(PathBuf::from(path));
        }
        if let Some(base_url) = lookup("RESUMEFLOW_BASE_URL") {
            config.http.base_url = base_url;
        }
        if let Some(timeout) = parse_var::<f64>(&lookup, "RESUMEFLOW_TIMEOUT_SECONDS")? {
            config.http.timeout_seconds = timeout;
        }
        if let Some(token) = lookup("RESUMEFLOW_TOKEN") {
            config.http.bearer_token = Some(token);
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_id.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "session_id",
                &self.session_id,
                "must not be empty",
            ));
        }
        let max_wait = MAX_DEPENDENCY_WAIT.as_secs_f64();
        if !(0.0..=max_wait).contains(&self.dependency_wait_seconds) {
            return Err(ConfigError::invalid_value(
                "dependency_wait_seconds",
                self.dependency_wait_seconds.to_string(),
                format!("must be between 0 and {max_wait}"),
            ));
        }
        if self.fallback_score_percent > 100 {
            return Err(ConfigError::invalid_value(
                "fallback_score_percent",
                self.fallback_score_percent.to_string(),
                "must be at most 100",
            ));
        }
        self.http.validate()
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::invalid_value(key, &raw, e.to_string()))
        })
        .transpose()
}

/// Configuration for the HTTP enhancement service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Base URL of the resume API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Bearer token sent with every request.
    #[serde(default, skip_serializing)]
    pub bearer_token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_timeout() -> f64 {
    // Generation renders a PDF server-side and routinely takes minutes.
    300.0
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            bearer_token: None,
        }
    }
}

impl HttpConfig {
    /// Creates a new HTTP configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Gets timeout as Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_seconds).unwrap_or(Duration::ZERO)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::invalid_value(
                "base_url",
                &self.base_url,
                "must be an http(s) URL",
            ));
        }
        if !self.timeout_seconds.is_finite() || self.timeout_seconds <= 0.0 {
            return Err(ConfigError::invalid_value(
                "timeout_seconds",
                self.timeout_seconds.to_string(),
                "must be a positive number",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.session_id, "default");
        assert_eq!(config.dependency_wait(), Duration::from_secs(30));
        assert_eq!(config.fallback_score_percent, 0);
        assert!(config.storage_path.is_none());
        assert_eq!(config.http.base_url, "http://localhost:8001");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("RESUMEFLOW_SESSION_ID", "tab-7"),
            ("RESUMEFLOW_DEPENDENCY_WAIT_SECONDS", "2.5"),
            ("RESUMEFLOW_FALLBACK_SCORE", "50"),
            ("RESUMEFLOW_BASE_URL", "https://api.example.com"),
            ("RESUMEFLOW_TOKEN", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.session_id, "tab-7");
        assert_eq!(config.dependency_wait(), Duration::from_millis(2500));
        assert_eq!(config.fallback_score_percent, 50);
        assert_eq!(config.http.base_url, "https://api.example.com");
        assert_eq!(config.http.bearer_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_from_lookup_rejects_bad_number() {
        let err = PipelineConfig::from_lookup(lookup_from(&[(
            "RESUMEFLOW_DEPENDENCY_WAIT_SECONDS",
            "soon",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "RESUMEFLOW_DEPENDENCY_WAIT_SECONDS"));
    }

    #[test]
    fn test_dependency_wait_is_capped() {
        for raw in ["3600.5", "1e300", "-1", "NaN", "inf"] {
            let result = PipelineConfig::from_lookup(lookup_from(&[(
                "RESUMEFLOW_DEPENDENCY_WAIT_SECONDS",
                raw,
            )]));
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { ref key, .. }) if key == "dependency_wait_seconds"),
                "{raw} accepted"
            );
        }

        let config = PipelineConfig::from_lookup(lookup_from(&[(
            "RESUMEFLOW_DEPENDENCY_WAIT_SECONDS",
            "3600",
        )]))
        .unwrap();
        assert_eq!(config.dependency_wait(), MAX_DEPENDENCY_WAIT);

        // Values set around validation saturate instead of collapsing to zero.
        let mut config = PipelineConfig::new();
        config.dependency_wait_seconds = 1e300;
        assert_eq!(config.dependency_wait(), MAX_DEPENDENCY_WAIT);
        config.dependency_wait_seconds = f64::INFINITY;
        assert_eq!(config.dependency_wait(), MAX_DEPENDENCY_WAIT);
        config.dependency_wait_seconds = f64::NAN;
        assert_eq!(config.dependency_wait(), Duration::ZERO);
        let config = PipelineConfig::new().with_dependency_wait(Duration::MAX);
        assert_eq!(config.dependency_wait(), MAX_DEPENDENCY_WAIT);
    }

    #[test]
    fn test_from_lookup_rejects_out_of_range_fallback() {
        let result = PipelineConfig::from_lookup(lookup_from(&[("RESUMEFLOW_FALLBACK_SCORE", "150")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_str_fills_defaults() {
        let config = PipelineConfig::from_json_str(r#"{"session_id": "abc", "http": {"timeout_seconds": 10}}"#)
            .unwrap();
        assert_eq!(config.session_id, "abc");
        assert_eq!(config.http.timeout(), Duration::from_secs(10));
        assert_eq!(config.http.base_url, "http://localhost:8001");
    }

    #[test]
    fn test_http_validate_rejects_non_http_url() {
        let config = HttpConfig::new().with_base_url("ftp://example.com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bearer_token_not_serialized() {
        let config = HttpConfig::new().with_bearer_token("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
