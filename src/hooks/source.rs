use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use super::error::InvokeError;
use super::marshal::HookArgs;

/// Raw value a hook function hands back before truthiness reduction.
pub type ReturnValue = serde_json::Value;

/// Something a hook source can call.
#[async_trait]
pub trait HookCallable: Send + Sync {
    async fn call(&self, args: &HookArgs) -> Result<ReturnValue, InvokeError>;

    /// Execution budget declared by the function itself, if any. Takes
    /// precedence over the layer-wide budget.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// A callable resolved for exactly one dispatch.
///
/// Handles are produced fresh by [`HookSource::resolve`] on every call and
/// consumed by [`super::marshal::invoke`]; nothing stores them.
pub struct HookHandle {
    name: String,
    callable: Box<dyn HookCallable>,
}

impl HookHandle {
    pub fn new(name: impl Into<String>, callable: Box<dyn HookCallable>) -> Self {
        Self {
            name: name.into(),
            callable,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.callable.timeout()
    }

    pub(crate) fn callable(&self) -> &dyn HookCallable {
        self.callable.as_ref()
    }
}

impl fmt::Debug for HookHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Outcome of looking a name up in a hook source.
#[derive(Debug)]
pub enum Resolution {
    Found(HookHandle),
    /// No attribute of that name.
    Missing,
    /// The name exists but does not describe anything callable.
    NotCallable { reason: String },
}

/// A loaded hook script. Identity is the path it was loaded from.
pub trait HookSource: Send + Sync + fmt::Debug {
    fn path(&self) -> &Path;

    fn resolve(&self, name: &str) -> Resolution;

    /// Names of every attribute the source exposes, callable or not.
    fn attribute_names(&self) -> Vec<String> {
        Vec::new()
    }
}
