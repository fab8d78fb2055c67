//! Script-gated interception layer for a chain of filesystem operation handlers.
//!
//! A [`vfs::HookLayer`] sits in front of the next [`vfs::VfsHandler`] in the
//! chain. For `connect`, `mkdir`, `rmdir`, `create_file`, `rename` and
//! `unlink` it loads the configured hook script through a
//! [`hooks::ModuleCache`], resolves the function named after the operation,
//! and forwards the call only when that function returns a truthy value.
//! A missing function is an implicit allow.

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod hooks;
pub mod vfs;

pub use cli::{Commands, ExecOp};
pub use diagnostics::{DiagnosticEvent, DiagnosticSink, FileSink, MemorySink, TracingSink};
pub use hooks::{
    HookError, HookLoader, HookSource, InvokeError, ModuleCache, ReloadPolicy, Resolution,
    ScriptLoader, Verdict,
};
pub use vfs::{HookLayer, LayerSettings, LocalFs, Operation, VfsError, VfsHandler, VfsResult};
