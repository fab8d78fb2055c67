use futures_util::FutureExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use super::error::InvokeError;
use super::source::HookHandle;
use crate::vfs::{CreateFileRequest, Operation, SmbFilename};

/// Allow/deny outcome of one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub fn from_bool(allow: bool) -> Self {
        if allow {
            Verdict::Allow
        } else {
            Verdict::Deny
        }
    }
}

/// Positional text arguments handed to a hook function.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HookArgs(Vec<String>);

impl HookArgs {
    pub fn new(args: Vec<String>) -> Self {
        Self(args)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn to_json(&self) -> Value {
        Value::from(self.0.clone())
    }
}

/// Borrowed arguments of one intercepted call.
#[derive(Debug, Clone, Copy)]
pub enum OperationContext<'a> {
    Connect { service: &'a str, user: &'a str },
    Mkdir { path: &'a str, mode: u32 },
    Rmdir { path: &'a str },
    CreateFile { request: &'a CreateFileRequest },
    Rename { src: &'a SmbFilename, dst: &'a SmbFilename },
    Unlink { fname: &'a SmbFilename },
}

impl OperationContext<'_> {
    pub fn operation(&self) -> Operation {
        match self {
            OperationContext::Connect { .. } => Operation::Connect,
            OperationContext::Mkdir { .. } => Operation::Mkdir,
            OperationContext::Rmdir { .. } => Operation::Rmdir,
            OperationContext::CreateFile { .. } => Operation::CreateFile,
            OperationContext::Rename { .. } => Operation::Rename,
            OperationContext::Unlink { .. } => Operation::Unlink,
        }
    }

    /// Project the call onto the arguments its hook receives. Modes,
    /// stream names and create parameters never reach the hook.
    pub fn hook_args(&self) -> HookArgs {
        let args = match self {
            OperationContext::Connect { service, user } => {
                vec![service.to_string(), user.to_string()]
            }
            OperationContext::Mkdir { path, .. } | OperationContext::Rmdir { path } => {
                vec![path.to_string()]
            }
            OperationContext::CreateFile { request } => vec![request.fname.base_name.clone()],
            OperationContext::Rename { src, dst } => {
                vec![src.base_name.clone(), dst.base_name.clone()]
            }
            OperationContext::Unlink { fname } => vec![fname.base_name.clone()],
        };
        HookArgs(args)
    }
}

/// Truthiness of a hook return value: `null`, `false`, zero, and empty
/// strings, arrays and objects are falsy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Call a resolved hook and reduce its return value to a verdict.
///
/// The handle and the argument container are consumed; both are dropped
/// before this returns on every path. Errors, panics and budget overruns
/// are reported as `InvokeError` and never unwind into the caller.
pub async fn invoke(
    handle: HookHandle,
    args: HookArgs,
    budget: Duration,
) -> Result<Verdict, InvokeError> {
    let limit = handle.timeout().unwrap_or(budget);
    let call = AssertUnwindSafe(handle.callable().call(&args)).catch_unwind();

    match tokio::time::timeout(limit, call).await {
        Ok(Ok(Ok(value))) => Ok(Verdict::from_bool(truthy(&value))),
        Ok(Ok(Err(err))) => Err(err),
        Ok(Err(_panic)) => Err(InvokeError::Panicked),
        Err(_elapsed) => Err(InvokeError::TimedOut(limit)),
    }
}
