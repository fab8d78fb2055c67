pub mod audit;
pub mod cache;
pub mod dynamic;
mod error;
pub mod loader;
pub mod marshal;
pub mod reload;
pub mod script;
mod source;

pub use cache::{ModuleCache, ReloadPolicy};
pub use dynamic::*;
pub use error::{HookError, InvokeError};
pub use loader::*;
pub use marshal::{invoke, truthy, HookArgs, OperationContext, Verdict};
pub use script::{Attribute, FunctionDef, HookScript, ScriptMeta};
pub use source::{HookCallable, HookHandle, HookSource, Resolution, ReturnValue};
