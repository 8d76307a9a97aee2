//! Configuration types for lmchat.
//!
//! `ChatConfig` is the top-level `config.toml`. It selects the backend
//! variant and the URLs of LM Studio and of the persistence proxy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which persistence/transport combination is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local SQLite store, requests posted directly to LM Studio.
    #[default]
    Local,
    /// Everything goes through an `lmchat serve` proxy.
    Proxy,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Proxy => write!(f, "proxy"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "proxy" | "python" => Ok(BackendKind::Proxy),
            other => Err(format!("invalid backend: '{other}'")),
        }
    }
}

/// Top-level configuration. All fields have defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub backend: BackendKind,

    /// Base URL of the OpenAI-compatible LM Studio API.
    #[serde(default = "default_lm_studio_url")]
    pub lm_studio_url: String,

    /// Base URL of the persistence proxy.
    #[serde(default = "default_proxy_url")]
    pub proxy_url: String,

    /// Upper bound for a single request, including the streamed body.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_lm_studio_url() -> String {
    "http://localhost:1234/v1".to_string()
}

fn default_proxy_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            lm_studio_url: default_lm_studio_url(),
            proxy_url: default_proxy_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
