//! Environment overrides on top of [`BridgeConfig::default`].

use std::fmt::Display;
use std::str::FromStr;

use audio_bridge_core::{BridgeConfig, BridgeError};

const DEFAULT_LOG_LEVEL: &str = "info";

/// Build the bridge configuration from the process environment.
pub fn from_env() -> Result<BridgeConfig, BridgeError> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Apply overrides read through `lookup`, then validate.
///
/// | Variable            | Field                   |
/// |---------------------|-------------------------|
/// | `AUDIO_BITRATE`     | `target_bitrate_kbps`   |
/// | `AUDIO_BUFFER_SIZE` | `buffer_capacity_bytes` |
/// | `MAX_LATENCY_MS`    | `max_latency_ms`        |
/// | `HTTP_HOST`         | `http_host`             |
/// | `HTTP_PORT`         | `http_port`             |
pub fn from_lookup<F>(lookup: F) -> Result<BridgeConfig, BridgeError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = BridgeConfig::default();

    if let Some(kbps) = parse_var(&lookup, "AUDIO_BITRATE")? {
        config.target_bitrate_kbps = kbps;
    }
    if let Some(bytes) = parse_var(&lookup, "AUDIO_BUFFER_SIZE")? {
        config.buffer_capacity_bytes = bytes;
    }
    if let Some(ms) = parse_var(&lookup, "MAX_LATENCY_MS")? {
        config.max_latency_ms = ms;
    }
    if let Some(host) = lookup("HTTP_HOST").filter(|h| !h.trim().is_empty()) {
        config.http_host = host.trim().to_string();
    }
    if let Some(port) = parse_var(&lookup, "HTTP_PORT")? {
        config.http_port = port;
    }

    config.validate().map_err(BridgeError::InvalidConfiguration)?;
    Ok(config)
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, BridgeError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| BridgeError::InvalidConfiguration(format!("{}={:?}: {}", key, raw, e))),
    }
}

/// Initialize `env_logger`. `RUST_LOG` wins, then `LOG_LEVEL`, then `info`.
pub fn init_logging() {
    let level = std::env::var("LOG_LEVEL")
        .map(|l| l.to_lowercase())
        .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}
