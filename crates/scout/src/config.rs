use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{ClientError, ClientResult};
use crate::session::connect::{ConnectType, ConnectionSpec};

/// The JSON request/response shape an LLM endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    #[default]
    OpenaiCompatible,
    Custom,
}

/// Configuration for the language model endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "default".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f32 {
    0.7
}

/// Top-level configuration file: one tool backend, one LLM endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ConnectionSpec,
    pub llm: LlmConfig,
}

/// Load the configuration from a JSON file.
///
/// A missing API key is a warning, not an error: some endpoints are
/// unauthenticated.
pub fn load_config<P: AsRef<Path>>(path: P) -> ClientResult<AppConfig> {
    let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        ClientError::Validation(format!(
            "could not read config {}: {e}",
            path.as_ref().display()
        ))
    })?;
    let mut config: AppConfig = serde_json::from_str(&raw)
        .map_err(|e| ClientError::Parse(format!("invalid config: {e}")))?;

    if config.server.connect_type == ConnectType::Http {
        config.server.host.get_or_insert_with(|| "127.0.0.1".to_string());
        config.server.port.get_or_insert(8080);
    }

    if config.llm.api_key.is_none() {
        warn!("no api key configured for the LLM endpoint");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_config_defaults() {
        let file = write_config(
            r#"{
                "server": {"connect_type": "http"},
                "llm": {"api_url": "http://localhost:9000/v1/chat/completions"}
            }"#,
        );
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.server.port, Some(8080));
        assert_eq!(config.llm.model, "default");
        assert_eq!(config.llm.max_tokens, 1000);
        assert_eq!(config.llm.dialect, Dialect::OpenaiCompatible);
    }

    #[test]
    fn test_load_config_custom_dialect() {
        let file = write_config(
            r#"{
                "server": {"connect_type": "executable", "executable": "server", "args": []},
                "llm": {"api_url": "http://localhost:9000/generate", "dialect": "custom", "temperature": 0.2}
            }"#,
        );
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.llm.dialect, Dialect::Custom);
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_load_config_rejects_malformed_json() {
        let file = write_config("{not json");
        assert!(matches!(
            load_config(file.path()),
            Err(ClientError::Parse(_))
        ));
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(matches!(
            load_config("/nonexistent/config.json"),
            Err(ClientError::Validation(_))
        ));
    }
}
