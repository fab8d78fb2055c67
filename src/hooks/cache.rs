use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::error::HookError;
use super::loader::HookLoader;
use super::reload::StampWatch;
use super::source::HookSource;
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, TracingSink};

/// Whether the hook script is reloaded before every dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadPolicy {
    LoadOnce,
    AlwaysReload,
}

impl ReloadPolicy {
    pub fn from_always_reload(always_reload: bool) -> Self {
        if always_reload {
            ReloadPolicy::AlwaysReload
        } else {
            ReloadPolicy::LoadOnce
        }
    }
}

#[derive(Default)]
struct Resident {
    source: Option<Arc<dyn HookSource>>,
    stamp: Option<StampWatch>,
}

/// Holds at most one resident hook source.
///
/// Check-and-replace runs under one lock, so concurrent dispatches never
/// observe two sources or load the same script twice for one decision.
pub struct ModuleCache {
    loader: Arc<dyn HookLoader>,
    always_reload: AtomicBool,
    reload_requested: AtomicBool,
    state: Mutex<Resident>,
    load_attempts: AtomicU64,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl ModuleCache {
    pub fn new(loader: Arc<dyn HookLoader>, policy: ReloadPolicy) -> Self {
        Self {
            loader,
            always_reload: AtomicBool::new(policy == ReloadPolicy::AlwaysReload),
            reload_requested: AtomicBool::new(false),
            state: Mutex::new(Resident::default()),
            load_attempts: AtomicU64::new(0),
            diagnostics: Arc::new(TracingSink),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Watch `dir` for reload stamps; an advancing stamp forces one reload.
    pub fn with_reload_stamp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state.get_mut().stamp = Some(StampWatch::new(dir));
        self
    }

    pub fn policy(&self) -> ReloadPolicy {
        ReloadPolicy::from_always_reload(self.always_reload.load(Ordering::Acquire))
    }

    pub fn set_policy(&self, policy: ReloadPolicy) {
        self.always_reload
            .store(policy == ReloadPolicy::AlwaysReload, Ordering::Release);
    }

    /// Force a fresh load on the next dispatch.
    pub fn request_reload(&self) {
        self.reload_requested.store(true, Ordering::Release);
    }

    /// Number of load attempts made so far, successful or not.
    pub fn load_count(&self) -> u64 {
        self.load_attempts.load(Ordering::Acquire)
    }

    pub fn resident(&self) -> Option<Arc<dyn HookSource>> {
        self.state.lock().source.clone()
    }

    pub fn evict(&self) {
        self.state.lock().source = None;
    }

    /// Return the resident source, loading `path` first when nothing is
    /// resident, the policy or a reload request demands it, or the resident
    /// source came from a different path.
    ///
    /// A failed load evicts whatever was resident; the cache never falls
    /// back to a stale source. Blocks on disk I/O while holding the lock.
    pub fn ensure_loaded(&self, path: Option<&Path>) -> Result<Arc<dyn HookSource>, HookError> {
        let mut state = self.state.lock();

        // Always poll the stamp so a bump seen under AlwaysReload is not
        // replayed later.
        let stamped = state.stamp.as_mut().is_some_and(StampWatch::advanced);
        let force = self.reload_requested.swap(false, Ordering::AcqRel)
            || self.policy() == ReloadPolicy::AlwaysReload
            || stamped;

        if !force {
            if let Some(source) = &state.source {
                if path.is_none_or(|p| source.path() == p) {
                    return Ok(Arc::clone(source));
                }
            }
        }

        state.source = None;
        let Some(path) = path else {
            self.diagnostics.record(&DiagnosticEvent::NoScriptConfigured);
            return Err(HookError::NoScriptConfigured);
        };

        self.load_attempts.fetch_add(1, Ordering::AcqRel);
        match self.loader.load(path) {
            Ok(source) => {
                self.diagnostics.record(&DiagnosticEvent::SourceLoaded {
                    path: path.to_path_buf(),
                });
                state.source = Some(Arc::clone(&source));
                Ok(source)
            }
            Err(e) => {
                self.diagnostics.record(&DiagnosticEvent::LoadFailed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
