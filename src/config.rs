//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory (or
//! the path given with `-f`), then applies `PORT`, `HOST`, `MODEL_URL` and
//! `PREDICT_LOG_LEVEL` env overrides. Without a config file the built-in
//! defaults apply, so a bare `PORT=8080 MODEL_URL=... predict-server` works.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port. `0` asks the OS for an ephemeral port.
    pub port: u16,
    /// Largest accepted request body; bigger bodies are rejected with 413.
    pub body_limit_bytes: usize,
}

impl ServerConfig {
    /// `host:port` string handed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Model acquisition configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Location of the model manifest (URL or filesystem path).
    pub url: Option<String>,
    /// Upper bound on acquisition. `None` waits indefinitely.
    pub load_timeout: Option<Duration>,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub server: ServerConfig,
    pub model: ModelConfig,
}

/// Values taken from the process environment. Tests build this directly
/// instead of mutating env vars.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub port: Option<String>,
    pub host: Option<String>,
    pub model_url: Option<String>,
    pub log_level: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT").ok(),
            host: env::var("HOST").ok(),
            model_url: env::var("MODEL_URL").ok(),
            log_level: env::var("PREDICT_LOG_LEVEL").ok(),
        }
    }
}

/// Raw TOML shape: `serde` target before resolution.
#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    model: RawModel,
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_body_limit_bytes")]
    body_limit_bytes: usize,
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit_bytes(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawModel {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    load_timeout_secs: Option<u64>,
}

fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 3000 }
fn default_body_limit_bytes() -> usize { 1_000_000 }
fn default_log_level() -> String { "info".to_string() }

/// Load config from the given path, or `config/default.toml` when it exists,
/// then apply env-var overrides.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = EnvOverrides::from_env();

    if let Some(path) = config_path {
        return load_from(Path::new(path), &overrides);
    }

    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        load_from(default_path, &overrides)
    } else {
        resolve(RawConfig::default(), &overrides)
    }
}

/// Load from an explicit path with explicit overrides.
pub fn load_from(path: &Path, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    resolve(parsed, overrides)
}

/// Built-in defaults with overrides applied; what `load` falls back to.
pub fn defaults(overrides: &EnvOverrides) -> Result<Config, AppError> {
    resolve(RawConfig::default(), overrides)
}

fn resolve(parsed: RawConfig, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let s = parsed.server;

    let port = match overrides.port.as_deref().map(str::trim) {
        Some("") | None => s.port,
        Some(p) => p
            .parse::<u16>()
            .map_err(|e| AppError::Config(format!("invalid PORT '{p}': {e}")))?,
    };

    if s.body_limit_bytes == 0 {
        return Err(AppError::Config("server.body_limit_bytes must be positive".into()));
    }

    let url = overrides
        .model_url
        .clone()
        .or(parsed.model.url)
        .filter(|u| !u.trim().is_empty());

    Ok(Config {
        log_level: overrides.log_level.clone().unwrap_or(s.log_level),
        server: ServerConfig {
            host: overrides.host.clone().unwrap_or(s.host),
            port,
            body_limit_bytes: s.body_limit_bytes,
        },
        model: ModelConfig {
            url,
            load_timeout: parsed.model.load_timeout_secs.map(Duration::from_secs),
        },
    })
}

// ── test helpers ──────────────────────────────────────────────────────────────

#[cfg(test)]
impl Config {
    /// Loopback, ephemeral port, no model location.
    pub fn test_default() -> Self {
        Self {
            log_level: "info".into(),
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
                body_limit_bytes: 1024,
            },
            model: ModelConfig { url: None, load_timeout: None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_TOML: &str = r#"
[server]
host = "127.0.0.1"
port = 8080
body_limit_bytes = 2048
log_level = "debug"

[model]
url = "file:///srv/model/model.json"
load_timeout_secs = 30
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn parse_full_config() {
        let f = write_toml(FULL_TOML);
        let cfg = load_from(f.path(), &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.server.bind_addr(), "127.0.0.1:8080");
        assert_eq!(cfg.server.body_limit_bytes, 2048);
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.model.url.as_deref(), Some("file:///srv/model/model.json"));
        assert_eq!(cfg.model.load_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let f = write_toml("");
        let cfg = load_from(f.path(), &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.server.bind_addr(), "0.0.0.0:3000");
        assert_eq!(cfg.server.body_limit_bytes, 1_000_000);
        assert!(cfg.model.url.is_none());
        assert!(cfg.model.load_timeout.is_none());
    }

    #[test]
    fn env_overrides_win() {
        let f = write_toml(FULL_TOML);
        let overrides = EnvOverrides {
            port: Some("9000".into()),
            host: Some("0.0.0.0".into()),
            model_url: Some("https://models.example.com/model.json".into()),
            log_level: Some("warn".into()),
        };
        let cfg = load_from(f.path(), &overrides).unwrap();
        assert_eq!(cfg.server.bind_addr(), "0.0.0.0:9000");
        assert_eq!(cfg.model.url.as_deref(), Some("https://models.example.com/model.json"));
        assert_eq!(cfg.log_level, "warn");
    }

    #[test]
    fn blank_port_falls_back_to_default() {
        let overrides = EnvOverrides { port: Some("  ".into()), ..Default::default() };
        let cfg = defaults(&overrides).unwrap();
        assert_eq!(cfg.server.port, 3000);
    }

    #[test]
    fn bad_port_is_config_error() {
        let overrides = EnvOverrides { port: Some("http".into()), ..Default::default() };
        let err = defaults(&overrides).unwrap_err();
        assert!(err.to_string().contains("invalid PORT"));
    }

    #[test]
    fn blank_model_url_is_unset() {
        let overrides = EnvOverrides { model_url: Some("".into()), ..Default::default() };
        assert!(defaults(&overrides).unwrap().model.url.is_none());
    }

    #[test]
    fn zero_body_limit_rejected() {
        let f = write_toml("[server]\nbody_limit_bytes = 0\n");
        assert!(load_from(f.path(), &EnvOverrides::default()).is_err());
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), &EnvOverrides::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }
}
