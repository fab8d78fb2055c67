//! Configuration loading.
//!
//! Read from `<config_dir>/vfs-hook/config.toml` unless a path is given.
//! A missing file yields defaults.

mod schema;

pub use schema::{Config, DiagnosticsConfig, HookConfig, ShareConfig};

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable that replaces `[hook].script`.
pub const SCRIPT_ENV: &str = "VFS_HOOK_SCRIPT";

/// Default config file location, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "vfs-hook").map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    /// Load from `path` (or the default location), then apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        let mut config = match &path {
            Some(p) => match std::fs::read_to_string(p) {
                Ok(content) => Self::from_toml(&content)
                    .with_context(|| format!("Failed to parse config {}", p.display()))?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", p.display()))
                }
            },
            None => Self::default(),
        };
        config.config_path = path;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid config TOML")
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` in place of the process environment.
    pub fn apply_env_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(script) = lookup(SCRIPT_ENV).filter(|s| !s.trim().is_empty()) {
            self.hook.script = Some(script);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.hook.invoke_timeout_secs == 0 {
            bail!("[hook].invoke_timeout_secs must be greater than zero");
        }
        if self.share.name.trim().is_empty() {
            bail!("[share].name must not be empty");
        }
        Ok(())
    }

    /// JSON Schema of the config file.
    pub fn json_schema() -> Result<String> {
        let schema = schemars::schema_for!(Config);
        serde_json::to_string_pretty(&schema).context("Failed to serialize config schema")
    }
}
