use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::hooks::{ReloadPolicy, Verdict};

fn default_invoke_timeout_secs() -> u64 {
    30
}

fn default_load_failure() -> Verdict {
    Verdict::Allow
}

fn default_invoke_failure() -> Verdict {
    Verdict::Deny
}

fn default_share_name() -> String {
    "share".to_string()
}

/// Top-level `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Config {
    pub hook: HookConfig,
    pub share: ShareConfig,
    pub diagnostics: DiagnosticsConfig,

    /// Where this config was read from. Not serialized.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

/// `[hook]`: which script gates operations and how failures are treated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct HookConfig {
    /// Path to the hook script. `~` and `$VARS` are expanded.
    pub script: Option<String>,
    /// Reload the script before every dispatch instead of once.
    pub always_reload: bool,
    /// Budget for one hook invocation, in seconds.
    pub invoke_timeout_secs: u64,
    /// Verdict when no script is configured or it fails to load.
    pub load_failure: Verdict,
    /// Verdict when a hook function errors, times out or panics.
    pub invoke_failure: Verdict,
    pub skip_security_audit: bool,
    /// Directory watched for reload stamps.
    pub reload_stamp_dir: Option<String>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            script: None,
            always_reload: false,
            invoke_timeout_secs: default_invoke_timeout_secs(),
            load_failure: default_load_failure(),
            invoke_failure: default_invoke_failure(),
            skip_security_audit: false,
            reload_stamp_dir: None,
        }
    }
}

impl HookConfig {
    pub fn script_path(&self) -> Option<PathBuf> {
        self.script
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(expand_path)
    }

    pub fn reload_policy(&self) -> ReloadPolicy {
        ReloadPolicy::from_always_reload(self.always_reload)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }

    pub fn reload_stamp_dir(&self) -> Option<PathBuf> {
        self.reload_stamp_dir
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(expand_path)
    }
}

/// `[share]`: the share served by the local forwarder.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ShareConfig {
    #[serde(default = "default_share_name")]
    pub name: String,
    pub path: Option<String>,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            name: default_share_name(),
            path: None,
        }
    }
}

impl ShareConfig {
    pub fn root(&self) -> Option<PathBuf> {
        self.path
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(expand_path)
    }
}

/// `[diagnostics]`: the append-only resolution log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub log_file: Option<String>,
    /// Identity written on each line. Defaults to `$USER`.
    pub identity: Option<String>,
}

impl DiagnosticsConfig {
    pub fn log_file_path(&self) -> Option<PathBuf> {
        self.log_file
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(expand_path)
    }
}

pub(crate) fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}
