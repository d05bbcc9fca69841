//! Shared configuration for the zwjs tools.
//!
//! TOML profiles (one per Z-Wave JS server), layered as built-in defaults
//! <- config file <- `ZWJS_` environment, and translation to
//! `zwjs_api::ClientConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use zwjs_api::ClientConfig;

pub const DEFAULT_SERVER: &str = "localhost:3000";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String, available: Vec<String> },

    #[error("profile '{profile}' is disabled")]
    Disabled { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is requested explicitly.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named server profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Seconds to wait for a command result. 0 waits forever.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            output: default_output(),
        }
    }
}

fn default_request_timeout() -> u64 {
    30
}
fn default_output() -> String {
    "json".into()
}

/// A named Z-Wave JS server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// `host:port` or a full `ws://` / `wss://` URL.
    #[serde(default = "default_server")]
    pub server: String,

    /// A disabled profile is kept in the file but never connected to.
    #[serde(default)]
    pub disabled: bool,

    /// Override `defaults.request_timeout`.
    pub request_timeout: Option<u64>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            server: default_server(),
            disabled: false,
            request_timeout: None,
        }
    }
}

fn default_server() -> String {
    DEFAULT_SERVER.into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "parrotha", "zwjs").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("zwjs");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. A missing file yields the defaults.
///
/// Environment overrides use `ZWJS_` and `__` as the nesting separator,
/// e.g. `ZWJS_DEFAULTS__REQUEST_TIMEOUT=5`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("ZWJS_").split("__"));

    Ok(figment.extract()?)
}

/// Load config, returning a default if the file is absent or broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Profile resolution ──────────────────────────────────────────────

impl Config {
    /// Name of the profile to use: the requested one, else the file's
    /// default, else `"default"`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(String::from)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    /// Look up a profile by name.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles.get(name).ok_or_else(|| {
            let mut available: Vec<String> = self.profiles.keys().cloned().collect();
            available.sort();
            ConfigError::ProfileNotFound {
                name: name.into(),
                available,
            }
        })
    }

    /// Effective request timeout for `profile`. Zero disables the bound.
    pub fn request_timeout(&self, profile: &Profile) -> Option<Duration> {
        match profile.request_timeout.unwrap_or(self.defaults.request_timeout) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Build a `ClientConfig` from a profile.
pub fn profile_to_client_config(
    cfg: &Config,
    profile: &Profile,
    profile_name: &str,
) -> Result<ClientConfig, ConfigError> {
    if profile.disabled {
        return Err(ConfigError::Disabled {
            profile: profile_name.into(),
        });
    }

    let client = ClientConfig::from_address(&profile.server).map_err(|e| {
        ConfigError::Validation {
            field: "server".into(),
            reason: format!("{}: {e}", profile.server),
        }
    })?;

    Ok(client.with_request_timeout(cfg.request_timeout(profile)))
}

// ── Tests ────────────────────────────────────────────────────────────
