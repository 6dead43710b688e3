//! The two isolated trading environments: `live` and `demo`. Each owns its
//! own credentials, REST/WebSocket endpoints and persisted rows; they share
//! only the in-process market cache.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Live,
    Demo,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Demo => "demo",
        }
    }

    #[must_use]
    pub const fn rest_base_url(self) -> &'static str {
        match self {
            Self::Live => "https://api.elections.kalshi.com/trade-api/v2",
            Self::Demo => "https://demo-api.kalshi.co/trade-api/v2",
        }
    }

    #[must_use]
    pub const fn ws_url(self) -> &'static str {
        match self {
            Self::Live => "wss://api.elections.kalshi.com/trade-api/ws/v2",
            Self::Demo => "wss://demo-api.kalshi.co/trade-api/ws/v2",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Self::Live),
            "demo" => Ok(Self::Demo),
            other => Err(format!("unknown environment '{other}', expected live|demo")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_environments() {
        assert_eq!("live".parse::<Environment>().unwrap(), Environment::Live);
        assert_eq!("demo".parse::<Environment>().unwrap(), Environment::Demo);
    }

    #[test]
    fn rejects_unknown_environment() {
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn live_and_demo_urls_differ() {
        assert_ne!(
            Environment::Live.rest_base_url(),
            Environment::Demo.rest_base_url()
        );
    }
}
