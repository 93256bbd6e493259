//! Client configuration.
//!
//! `ClientConfig` can be built in code, parsed from TOML, or read from the
//! environment. Fields missing from a file fall back to defaults; only the
//! API key is required.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ApiError;

pub const DEFAULT_BASE_URL: &str = "https://api.crowdflower.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_KEY: &str = "CROWDFLOWER_API_KEY";
pub const ENV_BASE_URL: &str = "CROWDFLOWER_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "CROWDFLOWER_TIMEOUT_SECS";

#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Deadline for a whole request, in seconds. Must be at least 1.
    #[serde(default = "default_timeout_secs", alias = "timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the request deadline. Sub-second parts round up to the next
    /// whole second.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ApiError> {
        let config: ClientConfig =
            toml::from_str(contents).map_err(|e| ApiError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Load a TOML config file, then let `CROWDFLOWER_*` variables override it.
    pub fn load_with_env(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ApiError::Config(format!("{}: {e}", path.display())))?;
        let mut config: ClientConfig =
            toml::from_str(&contents).map_err(|e| ApiError::Config(e.to_string()))?;
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config purely from `CROWDFLOWER_*` environment variables.
    pub fn from_env() -> Result<Self, ApiError> {
        let mut config = Self::new(String::new());
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ApiError> {
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.api_key = key;
        }
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = url;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS).filter(|v| !v.is_empty()) {
            self.timeout_secs = raw
                .parse()
                .map_err(|_| ApiError::Config(format!("{ENV_TIMEOUT_SECS}: invalid number '{raw}'")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ApiError> {
        if self.api_key.trim().is_empty() {
            return Err(ApiError::Config("api_key is required".to_string()));
        }
        if self.base_url.trim().is_empty() {
            return Err(ApiError::Config("base_url must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ApiError::Config("timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn new_uses_defaults() {
        let config = ClientConfig::new("abc");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn deserialize_partial_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            api_key = "k-123"
            timeout_secs = 5
        "#,
        )
        .unwrap();
        assert_eq!(config.api_key, "k-123");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn sub_second_timeout_rounds_up() {
        let config = ClientConfig::new("k").with_timeout(Duration::from_millis(800));
        assert_eq!(config.timeout(), Duration::from_secs(1));
        assert!(config.validate().is_ok());

        let config = ClientConfig::new("k").with_timeout(Duration::from_millis(2500));
        assert_eq!(config.timeout(), Duration::from_secs(3));

        let config = ClientConfig::new("k").with_timeout(Duration::from_secs(4));
        assert_eq!(config.timeout(), Duration::from_secs(4));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ClientConfig::from_toml_str(
            r#"
            api_key = "k"
            timeout_secs = 0
        "#,
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));

        let mut config = ClientConfig::new("k");
        config
            .apply_env(|name| (name == ENV_TIMEOUT_SECS).then(|| "0".to_string()))
            .unwrap();
        assert!(matches!(config.validate().unwrap_err(), ApiError::Config(_)));

        let config = ClientConfig::new("k").with_timeout(Duration::ZERO);
        assert!(matches!(config.validate().unwrap_err(), ApiError::Config(_)));
    }

    #[test]
    fn timeout_key_is_accepted() {
        let config = ClientConfig::from_toml_str(
            r#"
            api_key = "k"
            timeout = 12
        "#,
        )
        .unwrap();
        assert_eq!(config.timeout_secs, 12);
    }

    #[test]
    fn missing_key_is_rejected() {
        let err = ClientConfig::from_toml_str(r#"base_url = "http://localhost""#).unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "from-env"),
            (ENV_BASE_URL, "http://127.0.0.1:3000/v1"),
            (ENV_TIMEOUT_SECS, ""),
        ]
        .into_iter()
        .collect();
        let mut config = ClientConfig::new("from-file");
        config
            .apply_env(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.base_url, "http://127.0.0.1:3000/v1");
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn bad_timeout_in_env_is_a_config_error() {
        let mut config = ClientConfig::new("k");
        let err = config
            .apply_env(|name| (name == ENV_TIMEOUT_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn debug_hides_api_key() {
        let printed = format!("{:?}", ClientConfig::new("super-secret"));
        assert!(!printed.contains("super-secret"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ClientConfig::load("/nonexistent/crowdflower.toml").unwrap_err();
        assert!(matches!(err, ApiError::Config(_)));
    }
}
