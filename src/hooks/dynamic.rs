use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

use super::error::InvokeError;
use super::marshal::HookArgs;
use super::script::{Attribute, FunctionDef, HookScript};
use super::source::{HookCallable, HookHandle, HookSource, Resolution, ReturnValue};

/// A hook source backed by a hook script loaded from disk.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    script: HookScript,
}

impl ScriptSource {
    pub fn new(script: HookScript) -> Self {
        Self { script }
    }
}

impl HookSource for ScriptSource {
    fn path(&self) -> &Path {
        &self.script.path
    }

    fn resolve(&self, name: &str) -> Resolution {
        match self.script.attribute(name) {
            None => Resolution::Missing,
            Some(Attribute::NotCallable(reason)) => Resolution::NotCallable {
                reason: reason.clone(),
            },
            Some(Attribute::Function(def)) => {
                let timeout_secs = def.timeout_secs().or(self.script.meta.timeout_secs);
                let function = ScriptFunction {
                    name: name.to_string(),
                    def: def.clone(),
                    workdir: self.script.base_dir().to_path_buf(),
                    timeout: timeout_secs.map(Duration::from_secs),
                };
                Resolution::Found(HookHandle::new(name, Box::new(function)))
            }
        }
    }

    fn attribute_names(&self) -> Vec<String> {
        self.script.attributes.keys().cloned().collect()
    }
}

/// One function of a hook script, bound for a single call.
#[derive(Debug, Clone)]
pub struct ScriptFunction {
    name: String,
    def: FunctionDef,
    workdir: PathBuf,
    timeout: Option<Duration>,
}

impl ScriptFunction {
    /// Build the process for a shell function.
    ///
    /// Every platform gets `VFS_HOOK_ARGS` (a JSON array) and one
    /// `VFS_HOOK_ARG_<n>` per argument, counting from 1. Positional `$1`
    /// style arguments are only bound by `sh -c`; `cmd /C` has no such
    /// binding, so on Windows the environment is the only channel.
    fn shell_command(&self, command: &str, args: &HookArgs) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(shell_program());
        cmd.arg(shell_flag());
        cmd.arg(command);
        if cfg!(not(target_os = "windows")) {
            // `sh -c cmd name a b` binds $0=name, $1=a, $2=b.
            cmd.arg(&self.name);
            cmd.args(args.iter());
        }
        cmd.current_dir(&self.workdir);
        cmd.env("VFS_HOOK_FUNCTION", &self.name);
        cmd.env("VFS_HOOK_ARGS", args.to_json().to_string());
        for (i, arg) in args.iter().enumerate() {
            cmd.env(format!("VFS_HOOK_ARG_{}", i + 1), arg);
        }
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run a shell function. Exit 0 returns the parsed stdout (or `true`
    /// when silent), exit 1 returns `false`, anything else is a failure.
    async fn execute_shell(&self, command: &str, args: &HookArgs) -> Result<Value, InvokeError> {
        let output = self
            .shell_command(command, args)
            .output()
            .await
            .map_err(InvokeError::Spawn)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        match output.status.code() {
            Some(0) => Ok(parse_return_text(&stdout)),
            Some(1) => Ok(Value::Bool(false)),
            _ => Err(InvokeError::Exit {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    /// Send the call to an HTTP endpoint. Any non-success status is a failure.
    async fn execute_http(
        &self,
        url: &str,
        method: Option<&str>,
        headers: Option<&HashMap<String, String>>,
        args: &HookArgs,
    ) -> Result<Value, InvokeError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| InvokeError::Http(format!("failed to build HTTP client: {e}")))?;

        let method_str = method.unwrap_or("POST");
        let req_method = method_str
            .parse::<reqwest::Method>()
            .map_err(|e| InvokeError::Http(format!("invalid HTTP method '{method_str}': {e}")))?;

        let mut req = client
            .request(req_method, url)
            .json(&json!({ "function": self.name, "args": args.as_slice() }));
        if let Some(hdrs) = headers {
            for (k, v) in hdrs {
                req = req.header(k.as_str(), v.as_str());
            }
        }

        let resp = req
            .send()
            .await
            .map_err(|e| InvokeError::Http(format!("request to {url} failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(InvokeError::Http(format!("{url} returned {status}")));
        }
        let text = resp
            .text()
            .await
            .map_err(|e| InvokeError::Http(format!("failed to read response: {e}")))?;
        Ok(parse_return_text(&text))
    }
}

#[async_trait]
impl HookCallable for ScriptFunction {
    async fn call(&self, args: &HookArgs) -> Result<ReturnValue, InvokeError> {
        debug!(hook = self.name.as_str(), kind = self.def.kind(), "calling hook function");
        match &self.def {
            FunctionDef::Shell { command, .. } => self.execute_shell(command, args).await,
            FunctionDef::Http {
                url,
                method,
                headers,
                ..
            } => {
                self.execute_http(url, method.as_deref(), headers.as_ref(), args)
                    .await
            }
            FunctionDef::Value(value) => Ok(value.clone()),
        }
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Interpret text produced by a shell or HTTP function.
///
/// Empty output means the function succeeded without saying more, so it is
/// `true`. JSON is taken as-is; `True`/`False`/`None` are accepted for
/// scripts written in Python style; anything else is a plain string.
pub fn parse_return_text(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Bool(true);
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return value;
    }
    match trimmed {
        "True" => Value::Bool(true),
        "False" => Value::Bool(false),
        "None" => Value::Null,
        other => Value::String(other.to_string()),
    }
}

#[cfg(target_os = "windows")]
fn shell_program() -> &'static str {
    "cmd"
}

#[cfg(target_os = "windows")]
fn shell_flag() -> &'static str {
    "/C"
}

#[cfg(not(target_os = "windows"))]
fn shell_program() -> &'static str {
    "sh"
}

#[cfg(not(target_os = "windows"))]
fn shell_flag() -> &'static str {
    "-c"
}
