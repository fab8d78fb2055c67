use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::error::VfsResult;
use super::traits::VfsHandler;
use super::types::{CreateFileRequest, FileHandle, SmbFilename};
use crate::config::{Config, HookConfig};
use crate::diagnostics::{sink_from_config, DiagnosticEvent, DiagnosticSink, TracingSink};
use crate::hooks::{invoke, ModuleCache, OperationContext, Resolution, ScriptLoader, Verdict};

/// Per-layer dispatch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSettings {
    pub script: Option<PathBuf>,
    pub invoke_timeout: Duration,
    /// Verdict when no script is configured or loading fails.
    pub load_failure: Verdict,
    /// Verdict when a resolved hook errors, times out or panics.
    pub invoke_failure: Verdict,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            script: None,
            invoke_timeout: Duration::from_secs(30),
            load_failure: Verdict::Allow,
            invoke_failure: Verdict::Deny,
        }
    }
}

impl From<&HookConfig> for LayerSettings {
    fn from(config: &HookConfig) -> Self {
        Self {
            script: config.script_path(),
            invoke_timeout: config.invoke_timeout(),
            load_failure: config.load_failure,
            invoke_failure: config.invoke_failure,
        }
    }
}

/// Gates six operations of the next handler on the hook script's verdict.
///
/// Every gated call walks the same path: make a source resident, resolve
/// the operation's hook, invoke it, then either forward the original
/// arguments to `next` or fail with the operation's fixed denial.
/// Nothing the script does escapes as anything other than allow or deny.
pub struct HookLayer<N> {
    next: N,
    cache: Arc<ModuleCache>,
    settings: LayerSettings,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl<N: VfsHandler> HookLayer<N> {
    pub fn new(next: N, cache: Arc<ModuleCache>, settings: LayerSettings) -> Self {
        Self {
            next,
            cache,
            settings,
            diagnostics: Arc::new(TracingSink),
        }
    }

    /// Build a layer, its cache and its diagnostic sink from `config`.
    pub fn from_config(next: N, config: &Config) -> Self {
        Self::from_config_with_sink(next, config, sink_from_config(&config.diagnostics))
    }

    pub fn from_config_with_sink(
        next: N,
        config: &Config,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        let loader = Arc::new(ScriptLoader::new(config.hook.skip_security_audit));
        let mut cache = ModuleCache::new(loader, config.hook.reload_policy())
            .with_diagnostics(Arc::clone(&diagnostics));
        if let Some(dir) = config.hook.reload_stamp_dir() {
            cache = cache.with_reload_stamp_dir(dir);
        }
        Self::new(next, Arc::new(cache), LayerSettings::from(&config.hook))
            .with_diagnostics(diagnostics)
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Decide whether `ctx` may proceed.
    pub async fn authorize(&self, ctx: OperationContext<'_>) -> Verdict {
        let hook = ctx.operation().hook_name();

        // Loading reads the stamp and the script from disk under the cache
        // lock; keep that off the async workers.
        let cache = Arc::clone(&self.cache);
        let script = self.settings.script.clone();
        let loaded =
            tokio::task::spawn_blocking(move || cache.ensure_loaded(script.as_deref())).await;
        let source = match loaded {
            Ok(Ok(source)) => source,
            // The cache already recorded why.
            Ok(Err(_)) => return self.settings.load_failure,
            Err(e) => {
                self.diagnostics.record(&DiagnosticEvent::LoadFailed {
                    path: self.settings.script.clone().unwrap_or_default(),
                    error: e.to_string(),
                });
                return self.settings.load_failure;
            }
        };

        let handle = match source.resolve(hook) {
            Resolution::Found(handle) => handle,
            Resolution::Missing => {
                self.diagnostics.record(&DiagnosticEvent::HookAbsent {
                    hook: hook.to_string(),
                });
                return Verdict::Allow;
            }
            Resolution::NotCallable { reason } => {
                self.diagnostics.record(&DiagnosticEvent::HookNotCallable {
                    hook: hook.to_string(),
                    reason,
                });
                return Verdict::Allow;
            }
        };
        drop(source);

        match invoke(handle, ctx.hook_args(), self.settings.invoke_timeout).await {
            Ok(verdict) => {
                self.diagnostics.record(&DiagnosticEvent::Decided {
                    hook: hook.to_string(),
                    verdict,
                });
                verdict
            }
            Err(e) => {
                self.diagnostics.record(&DiagnosticEvent::InvokeFailed {
                    hook: hook.to_string(),
                    error: e.to_string(),
                });
                self.settings.invoke_failure
            }
        }
    }

    async fn gate(&self, ctx: OperationContext<'_>) -> VfsResult<()> {
        match self.authorize(ctx).await {
            Verdict::Allow => Ok(()),
            Verdict::Deny => Err(ctx.operation().denial()),
        }
    }
}

#[async_trait]
impl<N: VfsHandler> VfsHandler for HookLayer<N> {
    async fn connect(&self, service: &str, user: &str) -> VfsResult<()> {
        self.gate(OperationContext::Connect { service, user }).await?;
        self.next.connect(service, user).await
    }

    async fn disconnect(&self) {
        self.next.disconnect().await
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        self.gate(OperationContext::Mkdir { path, mode }).await?;
        self.next.mkdir(path, mode).await
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        self.gate(OperationContext::Rmdir { path }).await?;
        self.next.rmdir(path).await
    }

    async fn create_file(&self, request: &CreateFileRequest) -> VfsResult<FileHandle> {
        self.gate(OperationContext::CreateFile { request }).await?;
        self.next.create_file(request).await
    }

    async fn rename(&self, src: &SmbFilename, dst: &SmbFilename) -> VfsResult<()> {
        self.gate(OperationContext::Rename { src, dst }).await?;
        self.next.rename(src, dst).await
    }

    async fn unlink(&self, fname: &SmbFilename) -> VfsResult<()> {
        self.gate(OperationContext::Unlink { fname }).await?;
        self.next.unlink(fname).await
    }
}
