//! Configuration record for the gateway core.
//!
//! This is deliberately not a general TOML config file loader -- that's the
//! out-of-scope HTTP-listener collaborator's job. `GatewayConfig` only
//! carries what the core itself needs to boot: where the account-pool file
//! lives, how to reach the OAuth token endpoint, and the logging posture a
//! collaborator should configure its subscriber with. Follows the teacher's
//! `Config`-with-`#[serde(default = "...")]` idiom, trimmed to this crate's
//! scope, including the same `GAUD_*`-style env var override mechanism.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::auth::OAuthConfig;
use crate::auth::oauth::DEFAULT_CALLBACK_PORT;

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings were overridden by an env var, so a
/// collaborator exposing a settings UI can show that input as locked.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub oauth: OAuthSection,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            oauth: OAuthSection::default(),
            logging: LoggingConfig::default(),
            env_overrides: EnvOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Path to the persisted `{accounts, settings, activeIndex}` JSON file.
    #[serde(default = "default_accounts_path")]
    pub accounts_path: PathBuf,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            accounts_path: default_accounts_path(),
        }
    }
}

/// OAuth client parameters for the Cloud Code token endpoint. `client_id`
/// and `client_secret` default to Google's public Antigravity client, the
/// same pair `OAuthConfig::new` hardcodes; only set these to point at a
/// different OAuth client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OAuthSection {
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

impl Default for OAuthSection {
    fn default() -> Self {
        Self {
            callback_port: default_callback_port(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl OAuthSection {
    pub fn to_oauth_config(&self) -> OAuthConfig {
        let mut config = OAuthConfig::new(self.callback_port);
        if let Some(client_id) = &self.client_id {
            config.client_id = client_id.clone();
        }
        if let Some(client_secret) = &self.client_secret {
            config.client_secret = client_secret.clone();
        }
        config
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

fn default_accounts_path() -> PathBuf {
    data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cloudcode-gateway")
        .join("accounts.json")
}

const fn default_callback_port() -> u16 {
    DEFAULT_CALLBACK_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn data_local_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share")))
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

impl GatewayConfig {
    /// Apply `CLOUDCODE_GATEWAY_*` env var overrides on top of whatever
    /// values are already set (file-loaded or default), recording each hit
    /// in `env_overrides` so a collaborator's settings UI can mark it locked.
    pub fn apply_env_overrides(&mut self) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    }
                }
            };
        }
        macro_rules! env_path {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = PathBuf::from(val);
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_opt_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Ok(val) = std::env::var($env) {
                    $field = if val.is_empty() { None } else { Some(val) };
                    ov.record($key, $env);
                }
            };
        }

        env_path!(
            "pool.accounts_path",
            "CLOUDCODE_GATEWAY_ACCOUNTS_PATH",
            self.pool.accounts_path
        );
        env_parse!(
            "oauth.callback_port",
            "CLOUDCODE_GATEWAY_OAUTH_CALLBACK_PORT",
            self.oauth.callback_port
        );
        env_opt_str!(
            "oauth.client_id",
            "CLOUDCODE_GATEWAY_OAUTH_CLIENT_ID",
            self.oauth.client_id
        );
        env_opt_str!(
            "oauth.client_secret",
            "CLOUDCODE_GATEWAY_OAUTH_CLIENT_SECRET",
            self.oauth.client_secret
        );
        env_str!("logging.level", "CLOUDCODE_GATEWAY_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "CLOUDCODE_GATEWAY_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.oauth.callback_port, DEFAULT_CALLBACK_PORT);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.pool.accounts_path.ends_with("accounts.json"));
    }

    #[test]
    fn test_oauth_section_overrides_client_id() {
        let mut section = OAuthSection::default();
        section.client_id = Some("custom-id".to_string());
        let oauth_config = section.to_oauth_config();
        assert_eq!(oauth_config.client_id, "custom-id");
    }

    #[test]
    fn test_env_override_accounts_path() {
        std::env::set_var("CLOUDCODE_GATEWAY_ACCOUNTS_PATH", "/tmp/test-accounts.json");
        let mut config = GatewayConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.pool.accounts_path, PathBuf::from("/tmp/test-accounts.json"));
        assert!(config.env_overrides.is_overridden("pool.accounts_path"));
        std::env::remove_var("CLOUDCODE_GATEWAY_ACCOUNTS_PATH");
    }

    #[test]
    fn test_env_override_log_json() {
        std::env::set_var("CLOUDCODE_GATEWAY_LOG_JSON", "true");
        let mut config = GatewayConfig::default();
        config.apply_env_overrides();
        assert!(config.logging.json);
        std::env::remove_var("CLOUDCODE_GATEWAY_LOG_JSON");
    }
}
