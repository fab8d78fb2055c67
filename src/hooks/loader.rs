use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use super::audit::{audit_script_content, audit_script_file, HookAuditReport};
use super::dynamic::ScriptSource;
use super::error::HookError;
use super::script::{Attribute, HookScript};
use super::source::HookSource;

/// Turns a script path into a resident hook source.
///
/// The module cache owns exactly one loader; tests substitute their own to
/// observe or fake loads.
pub trait HookLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn HookSource>, HookError>;
}

/// Loads TOML hook scripts from disk.
#[derive(Debug, Clone, Default)]
pub struct ScriptLoader {
    pub skip_security_audit: bool,
}

impl ScriptLoader {
    pub fn new(skip_security_audit: bool) -> Self {
        Self {
            skip_security_audit,
        }
    }
}

impl HookLoader for ScriptLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn HookSource>, HookError> {
        let script = load_hook_script(path, self.skip_security_audit)?;
        Ok(Arc::new(ScriptSource::new(script)))
    }
}

/// Read, audit and parse one hook script. The file is read once.
pub fn load_hook_script(path: &Path, skip_security_audit: bool) -> Result<HookScript, HookError> {
    let content = std::fs::read_to_string(path).map_err(|source| HookError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if !skip_security_audit {
        let report = audit_script_file(path).map_err(|e| HookError::Audit {
            path: path.to_path_buf(),
            summary: format!("{e:#}"),
        })?;
        ensure_clean(path, &report)?;
    }
    parse_hook_script(path, &content, skip_security_audit)
}

/// Audit `content` read from `path`, then parse that same text.
pub fn parse_hook_script(
    path: &Path,
    content: &str,
    skip_security_audit: bool,
) -> Result<HookScript, HookError> {
    if !skip_security_audit {
        let mut report = HookAuditReport::default();
        audit_script_content(path, content, &mut report);
        ensure_clean(path, &report)?;
    }

    let script = HookScript::from_toml(path, content)?;
    for (name, attribute) in &script.attributes {
        if let Attribute::NotCallable(reason) = attribute {
            warn!(
                hook = name.as_str(),
                path = %path.display(),
                "hook script entry is not callable: {reason}"
            );
        }
    }
    Ok(script)
}

fn ensure_clean(path: &Path, report: &HookAuditReport) -> Result<(), HookError> {
    if report.is_clean() {
        return Ok(());
    }
    Err(HookError::Audit {
        path: path.to_path_buf(),
        summary: report.summary(),
    })
}
