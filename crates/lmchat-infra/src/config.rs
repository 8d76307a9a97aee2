//! Configuration loader for lmchat.
//!
//! Reads `config.toml` from the data directory (`~/.lmchat/` in production)
//! and deserializes it into [`ChatConfig`]. Falls back to defaults when the
//! file is missing or malformed. `LMCHAT_*` environment variables override
//! individual fields.

use std::path::{Path, PathBuf};

use lmchat_types::config::{BackendKind, ChatConfig};

pub const DATA_DIR_ENV: &str = "LMCHAT_DATA_DIR";
pub const BACKEND_ENV: &str = "LMCHAT_BACKEND";
pub const LM_STUDIO_URL_ENV: &str = "LMCHAT_LM_STUDIO_URL";
pub const PROXY_URL_ENV: &str = "LMCHAT_PROXY_URL";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `LMCHAT_DATA_DIR` environment variable
/// 2. `~/.lmchat`
/// 3. `./.lmchat`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".lmchat");
    }

    PathBuf::from(".lmchat")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`ChatConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> ChatConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return ChatConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return ChatConfig::default();
        }
    };

    match toml::from_str::<ChatConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            ChatConfig::default()
        }
    }
}

/// Apply `LMCHAT_*` overrides read through `lookup`.
///
/// An unrecognised backend name is ignored with a warning.
pub fn apply_overrides<F>(mut config: ChatConfig, lookup: F) -> ChatConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(BACKEND_ENV) {
        match value.parse::<BackendKind>() {
            Ok(backend) => config.backend = backend,
            Err(err) => tracing::warn!("Ignoring {BACKEND_ENV}: {err}"),
        }
    }
    if let Some(url) = lookup(LM_STUDIO_URL_ENV) {
        config.lm_studio_url = url;
    }
    if let Some(url) = lookup(PROXY_URL_ENV) {
        config.proxy_url = url;
    }
    config
}

/// `config.toml` plus the process environment.
pub async fn load_effective_config(data_dir: &Path) -> ChatConfig {
    apply_overrides(load_config(data_dir).await, |key| std::env::var(key).ok())
}
