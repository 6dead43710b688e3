//! Signed REST client: one instance per environment.
//!
//! Retry classification follows the table pinned by the design: 429 backs
//! off exponentially, 500/503 back off on a fixed delay, network/timeout
//! errors retry a handful of times, 400/404 fail immediately, 401 is fatal
//! for the environment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use rsa::RsaPrivateKey;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::sleep;
use tracing::warn;

use super::rate_limit::RateLimiter;
use crate::core::auth;
use crate::core::domain::Environment;
use crate::error::{Error, Result};

const TOTAL_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const API_PREFIX: &str = "/trade-api/v2";

/// Per-environment Kalshi credentials. Absence means the environment is
/// `NotConfigured` and every call fails fast without touching the network.
pub struct Credentials {
    pub api_key: String,
    pub private_key: RsaPrivateKey,
}

/// Which retry policy applies to a given outcome.
enum Outcome<T> {
    Success(T),
    ClientError(u16, String),
    Unauthorized,
    NotConfigured,
    RetryExponential { base_secs: f64 },
    RetryFixed { delay_secs: f64 },
    Fatal(String),
}

pub struct RestClient {
    http: Client,
    environment: Environment,
    base_url: String,
    credentials: parking_lot::RwLock<Option<Credentials>>,
    rate_limiter: RateLimiter,
    unauthorized: AtomicBool,
}

impl RestClient {
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        let http = Client::builder()
            .timeout(TOTAL_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("reqwest client builds with static configuration");
        let root = environment
            .rest_base_url()
            .trim_end_matches(API_PREFIX)
            .to_string();
        Self {
            http,
            environment,
            base_url: root,
            credentials: parking_lot::RwLock::new(None),
            rate_limiter: RateLimiter::new(),
            unauthorized: AtomicBool::new(false),
        }
    }

    /// Build a client pointed at an arbitrary base URL instead of Kalshi's
    /// real `live`/`demo` hosts. Only exposed to tests: integration tests
    /// need to drive this client against a local scripted HTTP double.
    #[cfg(any(test, feature = "testkit"))]
    #[must_use]
    pub fn with_base_url(environment: Environment, base_url: String) -> Self {
        let http = Client::builder()
            .timeout(TOTAL_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("reqwest client builds with static configuration");
        Self {
            http,
            environment,
            base_url,
            credentials: parking_lot::RwLock::new(None),
            rate_limiter: RateLimiter::new(),
            unauthorized: AtomicBool::new(false),
        }
    }

    pub fn configure(&self, api_key: String, private_key: RsaPrivateKey) {
        *self.credentials.write() = Some(Credentials {
            api_key,
            private_key,
        });
        self.unauthorized.store(false, Ordering::SeqCst);
    }

    pub fn clear_credentials(&self) {
        *self.credentials.write() = None;
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.credentials.read().is_some()
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.unauthorized.load(Ordering::SeqCst)
    }

    /// Issue a signed request against `endpoint` (e.g. `/markets`), which is
    /// appended to the fixed `/trade-api/v2` prefix. `query` is appended to
    /// the request URL but excluded from the signed message, per protocol.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<T> {
        if self.is_halted() {
            return Err(Error::Unauthorized);
        }

        let is_write = method != Method::GET;
        if is_write {
            self.rate_limiter.acquire_write().await;
        } else {
            self.rate_limiter.acquire_read().await;
        }

        let path = format!("{API_PREFIX}{endpoint}");
        let mut last_error = String::new();
        let mut rate_limited_attempts = 0u32;
        let mut transient_attempts = 0u32;

        loop {
            let outcome = self.try_once::<T>(&method, &path, query, body.clone()).await;
            match outcome {
                Outcome::Success(value) => return Ok(value),
                Outcome::ClientError(status, msg) => return Err(Error::ClientError { status, body: msg }),
                Outcome::Unauthorized => {
                    self.unauthorized.store(true, Ordering::SeqCst);
                    return Err(Error::Unauthorized);
                }
                Outcome::NotConfigured => return Err(Error::NotConfigured),
                Outcome::Fatal(msg) => return Err(Error::Exhausted { attempts: 1, last_error: msg }),
                Outcome::RetryExponential { base_secs } => {
                    rate_limited_attempts += 1;
                    if rate_limited_attempts > 5 {
                        return Err(Error::Exhausted {
                            attempts: rate_limited_attempts,
                            last_error: last_error.clone(),
                        });
                    }
                    last_error = format!("429 rate limited (attempt {rate_limited_attempts})");
                    let delay = base_secs * 2f64.powi((rate_limited_attempts - 1) as i32);
                    warn!(endpoint, attempt = rate_limited_attempts, delay_secs = delay, "retrying after 429");
                    sleep(Duration::from_secs_f64(delay)).await;
                }
                Outcome::RetryFixed { delay_secs } => {
                    transient_attempts += 1;
                    if transient_attempts > 3 {
                        return Err(Error::Exhausted {
                            attempts: transient_attempts,
                            last_error: last_error.clone(),
                        });
                    }
                    last_error = format!("transient failure (attempt {transient_attempts})");
                    warn!(endpoint, attempt = transient_attempts, delay_secs, "retrying after transient failure");
                    sleep(Duration::from_secs_f64(delay_secs)).await;
                }
            }
        }
    }

    async fn try_once<T: DeserializeOwned>(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Outcome<T> {
        let Some(headers) = self.sign(method, path) else {
            return Outcome::NotConfigured;
        };
        let headers = match headers {
            Ok(h) => h,
            Err(e) => return Outcome::Fatal(e.to_string()),
        };

        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method.clone(), &url)
            .header("KALSHI-ACCESS-KEY", headers.access_key)
            .header("KALSHI-ACCESS-SIGNATURE", headers.access_signature)
            .header("KALSHI-ACCESS-TIMESTAMP", headers.access_timestamp)
            .header("Content-Type", "application/json")
            .query(query);
        if let Some(b) = body {
            req = req.json(&b);
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() || e.is_connect() => {
                return Outcome::RetryFixed { delay_secs: 0.25 };
            }
            Err(e) => return Outcome::Fatal(e.to_string()),
        };

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => match response.json::<T>().await {
                Ok(value) => Outcome::Success(value),
                Err(e) => Outcome::Fatal(e.to_string()),
            },
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Outcome::ClientError(status, body)
            }
            StatusCode::UNAUTHORIZED => Outcome::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => Outcome::RetryExponential { base_secs: 0.1 },
            StatusCode::INTERNAL_SERVER_ERROR => Outcome::RetryFixed { delay_secs: 0.5 },
            StatusCode::SERVICE_UNAVAILABLE => Outcome::RetryFixed { delay_secs: 1.0 },
            other => {
                let body = response.text().await.unwrap_or_default();
                Outcome::Fatal(format!("unexpected status {other}: {body}"))
            }
        }
    }

    fn sign(
        &self,
        method: &Method,
        path: &str,
    ) -> Option<Result<auth::SignedHeaders>> {
        let guard = self.credentials.read();
        let creds = guard.as_ref()?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        Some(auth::build_headers(
            &creds.api_key,
            &creds.private_key,
            method.as_str(),
            path,
            now_ms,
        ))
    }

    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_configured_fails_fast_before_any_network_call() {
        let client = RestClient::new(Environment::Demo);
        assert!(!client.is_configured());
    }

    #[test]
    fn configure_clears_halted_flag() {
        let client = RestClient::new(Environment::Demo);
        client.unauthorized.store(true, Ordering::SeqCst);
        let mut rng = rand_core::OsRng;
        let key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        client.configure("k".into(), key);
        assert!(!client.is_halted());
        assert!(client.is_configured());
    }
}
