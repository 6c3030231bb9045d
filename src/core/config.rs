//! Configuration management for the gateway.
//!
//! Configuration is loaded from a YAML file with support for environment
//! variable expansion, so API keys can be kept out of the file itself.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream accounts, tried in declaration order on failover
    pub accounts: Vec<AccountConfig>,

    /// Server configuration (host, port, auth)
    #[serde(default)]
    pub server: ServerConfig,

    /// Streaming gateway tunables
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Whether to verify SSL certificates for upstream requests
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    /// Upstream request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// A single OpenAI-compatible upstream account.
///
/// Any endpoint that speaks Chat Completions works here: OpenRouter, LiteLLM,
/// vLLM, One API and friends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account name, used as its identifier in logs and concurrency tracking
    pub name: String,

    /// Base URL of the upstream API (without the /chat/completions suffix)
    pub base_url: String,

    /// API key sent as a Bearer token
    pub api_key: String,

    /// Optional outbound proxy URL for this account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,

    /// Model name mappings (client model -> upstream model)
    #[serde(default)]
    pub model_mapping: HashMap<String, String>,

    /// Maximum in-flight upstream requests for this account (0 = unlimited)
    #[serde(default)]
    pub concurrency: u32,
}

impl AccountConfig {
    /// Resolve the upstream model for a client-supplied model name.
    ///
    /// Returns the original name when no mapping entry applies.
    pub fn mapped_model(&self, model: &str) -> String {
        self.model_mapping
            .get(model)
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional master API key for authenticating clients
    pub master_api_key: Option<String>,
}

/// Tunables for the streaming gateway loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Maximum accepted length of a single upstream SSE line, in bytes
    #[serde(default = "default_max_line_size")]
    pub max_line_size: usize,

    /// Seconds without upstream data before the stream is force-terminated.
    /// Zero or negative disables the watchdog.
    #[serde(default)]
    pub stream_data_interval_timeout: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            master_api_key: None,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_line_size: default_max_line_size(),
            stream_data_interval_timeout: 0,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    18100
}

fn default_verify_ssl() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_max_line_size() -> usize {
    1024 * 1024
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use claude_compat_gateway::core::config::AppConfig;
    ///
    /// let config = AppConfig::load("config.yaml").expect("Failed to load config");
    /// ```
    pub fn load(path: &str) -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        // Expand environment variables
        let expanded = expand_env_vars(&content);

        let mut config: AppConfig = serde_yaml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        if let Ok(verify_ssl_str) = std::env::var("VERIFY_SSL") {
            config.verify_ssl = str_to_bool(&verify_ssl_str);
        }

        // Convert empty master_api_key to None
        if let Some(ref key) = config.server.master_api_key {
            if key.trim().is_empty() {
                config.server.master_api_key = None;
            }
        }

        Ok(config)
    }
}

/// Substitute `${VAR}`, `${VAR:-default}` and `${VAR:default}` references
/// with values from the environment.
fn expand_env_vars(raw: &str) -> String {
    let pattern =
        Regex::new(r"\$\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?::-?(?P<default>[^}]*))?\}")
            .expect("static pattern");

    pattern
        .replace_all(raw, |caps: &regex::Captures| match std::env::var(&caps["name"]) {
            Ok(value) => value,
            Err(_) => caps
                .name("default")
                .map(|default| default.as_str().to_string())
                .unwrap_or_default(),
        })
        .into_owned()
}

/// Parse a permissive boolean: "true", "1", "yes" or "on", any case.
fn str_to_bool(raw: &str) -> bool {
    ["true", "1", "yes", "on"]
        .iter()
        .any(|accepted| raw.eq_ignore_ascii_case(accepted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("GW_TEST_VAR", "test_value");
        let input = "api_key: ${GW_TEST_VAR}";
        let output = expand_env_vars(input);
        assert_eq!(output, "api_key: test_value");
        std::env::remove_var("GW_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("GW_MISSING_VAR");
        let input = "api_key: ${GW_MISSING_VAR:-default_value}";
        let output = expand_env_vars(input);
        assert_eq!(output, "api_key: default_value");
    }

    #[test]
    fn test_expand_env_vars_with_colon_default() {
        std::env::remove_var("GW_MISSING_VAR2");
        let input = "api_key: ${GW_MISSING_VAR2:default_value}";
        let output = expand_env_vars(input);
        assert_eq!(output, "api_key: default_value");
    }

    #[test]
    fn test_str_to_bool() {
        assert!(str_to_bool("true"));
        assert!(str_to_bool("True"));
        assert!(str_to_bool("1"));
        assert!(str_to_bool("yes"));
        assert!(str_to_bool("on"));
        assert!(!str_to_bool("false"));
        assert!(!str_to_bool("0"));
        assert!(!str_to_bool("no"));
        assert!(!str_to_bool(""));
        assert!(!str_to_bool("invalid"));
    }

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 18100);
        assert!(server.master_api_key.is_none());

        let gateway = GatewayConfig::default();
        assert_eq!(gateway.max_line_size, 1024 * 1024);
        assert_eq!(gateway.stream_data_interval_timeout, 0);
    }

    #[test]
    fn test_mapped_model() {
        let mut mapping = HashMap::new();
        mapping.insert("claude-x".to_string(), "deepseek-chat".to_string());
        let account = AccountConfig {
            name: "acc".to_string(),
            base_url: "http://localhost".to_string(),
            api_key: "k".to_string(),
            proxy_url: None,
            model_mapping: mapping,
            concurrency: 0,
        };
        assert_eq!(account.mapped_model("claude-x"), "deepseek-chat");
        assert_eq!(account.mapped_model("claude-y"), "claude-y");
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
accounts:
  - name: primary
    base_url: http://localhost:8000/v1
    api_key: test_key
    concurrency: 4
    model_mapping:
      claude-sonnet: glm-4.6

server:
  host: 127.0.0.1
  port: 8080
  master_api_key: master_key

gateway:
  max_line_size: 262144
  stream_data_interval_timeout: 60

verify_ssl: false
"#;
        temp_file.write_all(config_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = AppConfig::load(temp_file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.accounts[0].name, "primary");
        assert_eq!(config.accounts[0].base_url, "http://localhost:8000/v1");
        assert_eq!(config.accounts[0].concurrency, 4);
        assert_eq!(
            config.accounts[0].model_mapping.get("claude-sonnet").unwrap(),
            "glm-4.6"
        );

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.master_api_key.as_ref().unwrap(), "master_key");

        assert_eq!(config.gateway.max_line_size, 262144);
        assert_eq!(config.gateway.stream_data_interval_timeout, 60);

        assert!(!config.verify_ssl);
    }

    #[test]
    fn test_load_config_with_env_vars() {
        std::env::set_var("GW_TEST_API_KEY", "env_api_key");

        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
accounts:
  - name: primary
    base_url: http://localhost:8000
    api_key: ${GW_TEST_API_KEY}
"#;
        temp_file.write_all(config_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = AppConfig::load(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.accounts[0].api_key, "env_api_key");

        std::env::remove_var("GW_TEST_API_KEY");
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = AppConfig::load("nonexistent_file.yaml");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_master_api_key_becomes_none() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
accounts:
  - name: primary
    base_url: http://localhost:8000
    api_key: test_key

server:
  master_api_key: "   "
"#;
        temp_file.write_all(config_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = AppConfig::load(temp_file.path().to_str().unwrap()).unwrap();
        assert!(config.server.master_api_key.is_none());
    }
}
