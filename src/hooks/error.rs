use std::path::PathBuf;
use std::time::Duration;

/// Why a hook script could not be made resident.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("no hook script configured (set `script` under [hook])")]
    NoScriptConfigured,

    #[error("failed to read hook script {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid hook script {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("hook script {} failed security audit: {summary}", .path.display())]
    Audit { path: PathBuf, summary: String },
}

/// Why a resolved hook function produced no return value.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("failed to spawn hook command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("hook command exited abnormally ({status}): {stderr}")]
    Exit { status: String, stderr: String },

    #[error("hook HTTP request failed: {0}")]
    Http(String),

    #[error("hook timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),

    #[error("hook panicked")]
    Panicked,
}
