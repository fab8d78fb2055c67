//! Diagnostic side channel for hook resolution.
//!
//! Every way a dispatch can end up at "allow" without a hook saying so
//! (no script configured, load failure, missing function, non-callable
//! entry) produces its own event, so operators can tell them apart.

use parking_lot::Mutex;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::DiagnosticsConfig;
use crate::hooks::Verdict;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    SourceLoaded { path: PathBuf },
    LoadFailed { path: PathBuf, error: String },
    NoScriptConfigured,
    HookAbsent { hook: String },
    HookNotCallable { hook: String, reason: String },
    InvokeFailed { hook: String, error: String },
    Decided { hook: String, verdict: Verdict },
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticEvent::SourceLoaded { path } => {
                write!(f, "loaded hook script {}", path.display())
            }
            DiagnosticEvent::LoadFailed { path, error } => {
                write!(f, "failed to load hook script {}: {error}", path.display())
            }
            DiagnosticEvent::NoScriptConfigured => write!(f, "no hook script configured"),
            DiagnosticEvent::HookAbsent { hook } => write!(f, "no `{hook}` hook defined"),
            DiagnosticEvent::HookNotCallable { hook, reason } => {
                write!(f, "`{hook}` is defined but not callable: {reason}")
            }
            DiagnosticEvent::InvokeFailed { hook, error } => {
                write!(f, "`{hook}` hook failed: {error}")
            }
            DiagnosticEvent::Decided { hook, verdict } => {
                let verdict = match verdict {
                    Verdict::Allow => "allow",
                    Verdict::Deny => "deny",
                };
                write!(f, "`{hook}` hook returned {verdict}")
            }
        }
    }
}

pub trait DiagnosticSink: Send + Sync {
    fn record(&self, event: &DiagnosticEvent);
}

impl DiagnosticSink for Vec<Arc<dyn DiagnosticSink>> {
    fn record(&self, event: &DiagnosticEvent) {
        for sink in self {
            sink.record(event);
        }
    }
}

/// Emits every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::SourceLoaded { path } => {
                info!(path = %path.display(), "hook script loaded")
            }
            DiagnosticEvent::LoadFailed { path, error } => {
                warn!(path = %path.display(), "hook script load failed: {error}")
            }
            DiagnosticEvent::NoScriptConfigured => warn!("no hook script configured"),
            DiagnosticEvent::HookAbsent { hook } => {
                debug!(hook = hook.as_str(), "no hook defined; allowing")
            }
            DiagnosticEvent::HookNotCallable { hook, reason } => {
                warn!(hook = hook.as_str(), "hook is not callable: {reason}")
            }
            DiagnosticEvent::InvokeFailed { hook, error } => {
                error!(hook = hook.as_str(), "hook invocation failed: {error}")
            }
            DiagnosticEvent::Decided { hook, verdict } => {
                debug!(hook = hook.as_str(), ?verdict, "hook decided")
            }
        }
    }
}

/// Appends one line per event to a log file, keyed by the acting identity.
pub struct FileSink {
    path: PathBuf,
    identity: String,
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_identity(path, ambient_identity())
    }

    pub fn with_identity(path: impl Into<PathBuf>, identity: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            identity: identity.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &DiagnosticEvent) -> std::io::Result<()> {
        let _guard = self.write_lock.lock();
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(
            file,
            "{} VFS-HOOK ({}): {event}",
            chrono::Local::now().to_rfc3339(),
            self.identity
        )
    }
}

impl DiagnosticSink for FileSink {
    fn record(&self, event: &DiagnosticEvent) {
        TracingSink.record(event);
        if let Err(e) = self.append(event) {
            warn!(path = %self.path.display(), "failed to write diagnostic log: {e}");
        }
    }
}

/// Keeps events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&DiagnosticEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, event: &DiagnosticEvent) {
        self.events.lock().push(event.clone());
    }
}

/// The acting user, taken from `USER`.
pub fn ambient_identity() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Build the sink described by `[diagnostics]`.
pub fn sink_from_config(config: &DiagnosticsConfig) -> Arc<dyn DiagnosticSink> {
    match config.log_file_path() {
        Some(path) => {
            let identity = config.identity.clone().unwrap_or_else(ambient_identity);
            Arc::new(FileSink::with_identity(path, identity))
        }
        None => Arc::new(TracingSink),
    }
}
