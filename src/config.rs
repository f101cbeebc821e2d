//! Client configuration: an optional TOML file layered under CLI flags.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DevroomError;

pub const DEFAULT_CHAT_URL: &str = "ws://localhost:5000/ws";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Settings shared by the chat and analysis clients.
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// usable config pointed at a local server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the chat server.
    pub chat_url: String,
    /// Base URL of the analysis HTTP API (`/analyze`, `/statistics` hang off it).
    pub api_base_url: String,
    pub connect_timeout_secs: u64,
    /// Upper bound on a single analysis round trip.
    pub request_timeout_secs: u64,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Execute the code after static validation.
    pub execute: bool,
    /// Ask the backend to store classified errors in its history.
    pub save_history: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chat_url: DEFAULT_CHAT_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            connect_timeout_secs: 3,
            request_timeout_secs: 30,
            log_level: "warn".to_string(),
            execute: true,
            save_history: true,
        }
    }
}

impl ClientConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, DevroomError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config file. A missing file is an error; use [`load_or_default`]
    /// when the file is optional.
    ///
    /// [`load_or_default`]: ClientConfig::load_or_default
    pub fn load(path: &Path) -> Result<Self, DevroomError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Load `path` when given, otherwise return the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, DevroomError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Apply CLI overrides on top of the file values.
    pub fn with_overrides(mut self, chat_url: Option<String>, api_base_url: Option<String>) -> Self {
        if let Some(url) = chat_url {
            self.chat_url = url;
        }
        if let Some(url) = api_base_url {
            self.api_base_url = url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_point_at_local_server() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.chat_url, "ws://localhost:5000/ws");
        assert_eq!(cfg.api_base_url, "http://localhost:5000/api");
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert!(cfg.execute);
        assert!(cfg.save_history);
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = ClientConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg = ClientConfig::from_toml_str(
            r#"
api_base_url = "https://analyzer.internal/api"
request_timeout_secs = 5
execute = false
"#,
        )
        .unwrap();
        assert_eq!(cfg.api_base_url, "https://analyzer.internal/api");
        assert_eq!(cfg.request_timeout(), Duration::from_secs(5));
        assert!(!cfg.execute);
        assert_eq!(cfg.chat_url, DEFAULT_CHAT_URL);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = ClientConfig::from_toml_str("request_timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, DevroomError::Config(_)));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chat_url = \"ws://chat.example:9000/ws\"").unwrap();
        let cfg = ClientConfig::load(file.path()).unwrap();
        assert_eq!(cfg.chat_url, "ws://chat.example:9000/ws");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, DevroomError::Io(_)));
    }

    #[test]
    fn load_or_default_without_path() {
        assert_eq!(ClientConfig::load_or_default(None).unwrap(), ClientConfig::default());
    }

    #[test]
    fn overrides_replace_file_values_and_trim_slash() {
        let cfg = ClientConfig::default().with_overrides(
            Some("ws://other/ws".to_string()),
            Some("http://other/api/".to_string()),
        );
        assert_eq!(cfg.chat_url, "ws://other/ws");
        assert_eq!(cfg.api_base_url, "http://other/api");
    }

    #[test]
    fn overrides_none_keeps_values() {
        let cfg = ClientConfig::default().with_overrides(None, None);
        assert_eq!(cfg, ClientConfig::default());
    }
}
