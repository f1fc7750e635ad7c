//! Connection configuration

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};

/// Where and how to reach the generation backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Backend base URL (`http://`, `https://`, `ws://` or `wss://`)
    pub api_url: String,

    /// Path of the generation socket endpoint
    pub ws_path: String,

    /// Transport open timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            ws_path: "/ws/generate".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

impl SessionConfig {
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_ws_path(mut self, ws_path: impl Into<String>) -> Self {
        self.ws_path = ws_path.into();
        self
    }

    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Socket URL: the base URL with `http` rewritten to `ws`, plus `ws_path`
    pub fn ws_url(&self) -> String {
        let base = self.api_url.trim_end_matches('/');
        let base = match base.strip_prefix("http") {
            Some(rest) => format!("ws{}", rest),
            None => base.to_string(),
        };

        if self.ws_path.is_empty() || self.ws_path.starts_with('/') {
            format!("{}{}", base, self.ws_path)
        } else {
            format!("{}/{}", base, self.ws_path)
        }
    }

    /// Reject configurations that can never connect
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(SessionError::Config("api_url must not be empty".to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(SessionError::Config(
                "connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ws_url() {
        let config = SessionConfig::default();
        assert_eq!(config.ws_url(), "ws://localhost:8000/ws/generate");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_https_becomes_wss() {
        let config = SessionConfig::default().with_api_url("https://api.example.com/");
        assert_eq!(config.ws_url(), "wss://api.example.com/ws/generate");
    }

    #[test]
    fn test_ws_url_kept() {
        let config = SessionConfig::default()
            .with_api_url("ws://10.0.0.5:9000")
            .with_ws_path("stream");
        assert_eq!(config.ws_url(), "ws://10.0.0.5:9000/stream");
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let empty = SessionConfig::default().with_api_url("  ");
        assert!(matches!(empty.validate(), Err(SessionError::Config(_))));

        let no_timeout = SessionConfig::default().with_connect_timeout_secs(0);
        assert!(matches!(no_timeout.validate(), Err(SessionError::Config(_))));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"apiUrl": "https://stories.example.org"}"#).unwrap();
        assert_eq!(config.ws_path, "/ws/generate");
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.ws_url(), "wss://stories.example.org/ws/generate");
    }
}
