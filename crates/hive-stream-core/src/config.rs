//! Connection settings for managed sessions.

use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

/// Default agent server address.
pub const DEFAULT_API_URL: &str = "http://localhost:8123";

/// Environment variable overriding [`ClientConfig::api_url`].
pub const API_URL_ENV: &str = "HIVE_API_URL";

/// Environment variable supplying [`ClientConfig::api_key`].
pub const API_KEY_ENV: &str = "HIVE_API_KEY";

/// How a managed session reaches the agent server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the agent server, without a trailing slash.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API key sent as `x-api-key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Extra headers attached to every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Per-request timeout. Streams are not subject to it once established.
    #[serde(default, with = "timeout_secs", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            headers: HashMap::new(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Create a config pointing at `api_url`.
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Build a config from `HIVE_API_URL` / `HIVE_API_KEY`, defaulting the rest.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(API_URL_ENV).filter(|u| !u.trim().is_empty()) {
            config.api_url = url;
        }
        config.api_key = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty());
        config
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Add an extra header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Join `path` onto the base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

mod timeout_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => ser.serialize_some(&d.as_secs_f64()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(de)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
