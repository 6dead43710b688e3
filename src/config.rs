//! Application configuration: a TOML file for non-secret settings,
//! environment variables for credentials and trading gates. Mirrors the
//! teacher's `app::config::Config::load`/`validate` split, but secrets never
//! touch the file at all (teacher idiom: `WALLET_PRIVATE_KEY` is read from
//! the environment even though the rest of `Config` is file-backed).

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::domain::Environment;
use crate::error::{ConfigError, Result};

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

/// `tracing`/`tracing-subscriber` initialization settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Install the global subscriber. `RUST_LOG` overrides `level` when set,
    /// per the standard `EnvFilter` convention.
    pub fn init(&self) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        match self.format.as_str() {
            "json" => {
                fmt().json().with_env_filter(filter).init();
            }
            _ => {
                fmt().with_env_filter(filter).init();
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    logging: LoggingConfig,
}

/// API key plus private-key file path for one environment. Absence of
/// either environment variable means that environment is left
/// `NotConfigured`: its `RestClient`/`KalshiWebSocketClient` are still
/// built, just never given credentials.
#[derive(Debug, Clone)]
pub struct EnvironmentCredentials {
    pub api_key: String,
    pub private_key_path: String,
}

/// Fully resolved application configuration: `config.toml` for logging and
/// any future non-secret settings, the environment for everything that must
/// never land in a file on disk.
#[derive(Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub database_path: Option<String>,
    pub active_environment: Environment,
    pub global_trading_enabled: bool,
    pub live_credentials: Option<EnvironmentCredentials>,
    pub demo_credentials: Option<EnvironmentCredentials>,
}

impl Config {
    /// Load `path` for non-secret settings (falling back to defaults if the
    /// file doesn't exist — every field it can supply has a sane default),
    /// then overlay the environment variables that carry credentials and
    /// trading gates.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file: FileConfig = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse)?,
            Err(_) => FileConfig::default(),
        };

        let active_environment = match std::env::var("ACTIVE_ENVIRONMENT") {
            Ok(v) => Environment::from_str(&v).map_err(|reason| ConfigError::InvalidValue {
                field: "ACTIVE_ENVIRONMENT",
                reason,
            })?,
            Err(_) => Environment::Demo,
        };

        let global_trading_enabled = std::env::var("GLOBAL_TRADING_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let config = Self {
            logging: file.logging,
            database_path: std::env::var("DATABASE_PATH").ok(),
            active_environment,
            global_trading_enabled,
            live_credentials: env_credentials("KALSHI_LIVE_API_KEY", "KALSHI_LIVE_PRIVATE_KEY_PATH"),
            demo_credentials: env_credentials("KALSHI_DEMO_API_KEY", "KALSHI_DEMO_PRIVATE_KEY_PATH"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "logging.level",
            }
            .into());
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::InvalidValue {
                field: "logging.format",
                reason: "must be \"pretty\" or \"json\"".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }

    #[must_use]
    pub fn credentials_for(&self, environment: Environment) -> Option<&EnvironmentCredentials> {
        match environment {
            Environment::Live => self.live_credentials.as_ref(),
            Environment::Demo => self.demo_credentials.as_ref(),
        }
    }
}

fn env_credentials(api_key_var: &str, private_key_path_var: &str) -> Option<EnvironmentCredentials> {
    let api_key = std::env::var(api_key_var).ok()?;
    let private_key_path = std::env::var(private_key_path_var).ok()?;
    Some(EnvironmentCredentials {
        api_key,
        private_key_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Config::load reads process-wide environment variables; serialize
    // tests that touch them so they don't race each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "ACTIVE_ENVIRONMENT",
            "GLOBAL_TRADING_ENABLED",
            "DATABASE_PATH",
            "KALSHI_LIVE_API_KEY",
            "KALSHI_LIVE_PRIVATE_KEY_PATH",
            "KALSHI_DEMO_API_KEY",
            "KALSHI_DEMO_PRIVATE_KEY_PATH",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let config = Config::load("/nonexistent/config.toml").expect("defaults are valid");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.active_environment, Environment::Demo);
        assert!(!config.global_trading_enabled);
        assert!(config.live_credentials.is_none());
        assert!(config.demo_credentials.is_none());
    }

    #[test]
    fn credentials_require_both_env_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("KALSHI_DEMO_API_KEY", "key123");
        let config = Config::load("/nonexistent/config.toml").expect("defaults are valid");
        assert!(config.demo_credentials.is_none());
        std::env::set_var("KALSHI_DEMO_PRIVATE_KEY_PATH", "/tmp/demo.pem");
        let config = Config::load("/nonexistent/config.toml").expect("defaults are valid");
        assert!(config.demo_credentials.is_some());
        clear_env();
    }

    #[test]
    fn invalid_active_environment_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("ACTIVE_ENVIRONMENT", "staging");
        let result = Config::load("/nonexistent/config.toml");
        assert!(result.is_err());
        clear_env();
    }

    #[test]
    fn global_trading_enabled_parses_case_insensitively() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GLOBAL_TRADING_ENABLED", "TRUE");
        let config = Config::load("/nonexistent/config.toml").expect("defaults are valid");
        assert!(config.global_trading_enabled);
        clear_env();
    }
}
