//! Crate-wide error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("connection pool error: {0}")]
    Connection(String),

    #[error("environment not configured: no credentials loaded")]
    NotConfigured,

    #[error("client error: {status} {body}")]
    ClientError { status: u16, body: String },

    #[error("unauthorized: exchange credentials rejected, environment halted")]
    Unauthorized,

    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("orderbook sequence gap on {ticker}: expected {expected}, got {got}")]
    SequenceGap {
        ticker: String,
        expected: u64,
        got: u64,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("execution error: {0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
