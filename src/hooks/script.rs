use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use super::error::HookError;

/// Body of one hook function in a hook script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionDef {
    /// Run a shell command. Call arguments arrive as `VFS_HOOK_ARG_1`, ...
    /// everywhere, and also as `$1`, `$2`, ... under `sh`.
    Shell {
        command: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    /// POST the call as JSON; the response body is the return value.
    Http {
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        headers: Option<HashMap<String, String>>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    /// Constant return value.
    Value(serde_json::Value),
}

impl FunctionDef {
    pub fn kind(&self) -> &'static str {
        match self {
            FunctionDef::Shell { .. } => "shell",
            FunctionDef::Http { .. } => "http",
            FunctionDef::Value(_) => "value",
        }
    }

    pub fn timeout_secs(&self) -> Option<u64> {
        match self {
            FunctionDef::Shell { timeout_secs, .. } | FunctionDef::Http { timeout_secs, .. } => {
                *timeout_secs
            }
            FunctionDef::Value(_) => None,
        }
    }

    /// Check the fields a definition needs to be callable.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            FunctionDef::Shell {
                command,
                timeout_secs,
            } => {
                if command.trim().is_empty() {
                    return Err("shell command must not be empty".into());
                }
                if *timeout_secs == Some(0) {
                    return Err("shell timeout_secs must be > 0".into());
                }
            }
            FunctionDef::Http {
                url, timeout_secs, ..
            } => {
                if url.trim().is_empty() {
                    return Err("http url must not be empty".into());
                }
                if *timeout_secs == Some(0) {
                    return Err("http timeout_secs must be > 0".into());
                }
            }
            FunctionDef::Value(_) => {}
        }
        Ok(())
    }
}

/// An entry of the `[functions]` table.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Function(FunctionDef),
    NotCallable(String),
}

impl Attribute {
    pub fn is_callable(&self) -> bool {
        matches!(self, Attribute::Function(_))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Function(def) => write!(f, "{}", def.kind()),
            Attribute::NotCallable(reason) => write!(f, "not callable ({reason})"),
        }
    }
}

/// Optional `[script]` header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptMeta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Default budget for this script's functions, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ScriptFile {
    #[serde(default)]
    script: ScriptMeta,
    #[serde(default)]
    functions: toml::Table,
}

/// Parsed hook script.
#[derive(Debug, Clone, PartialEq)]
pub struct HookScript {
    pub path: PathBuf,
    pub meta: ScriptMeta,
    pub attributes: BTreeMap<String, Attribute>,
}

impl HookScript {
    /// Parse hook script text loaded from `path`.
    ///
    /// Malformed TOML or a malformed `[script]` header fails the whole
    /// script. A malformed function entry does not: it is kept as a
    /// not-callable attribute so lookups can report it.
    pub fn from_toml(path: &Path, content: &str) -> Result<Self, HookError> {
        let parse_error = |reason: String| HookError::Parse {
            path: path.to_path_buf(),
            reason,
        };

        let file: ScriptFile = toml::from_str(content).map_err(|e| parse_error(e.to_string()))?;
        if file.script.timeout_secs == Some(0) {
            return Err(parse_error("script timeout_secs must be > 0".into()));
        }

        let attributes = file
            .functions
            .into_iter()
            .map(|(name, raw)| {
                let attribute = match raw.try_into::<FunctionDef>() {
                    Ok(def) => match def.validate() {
                        Ok(()) => Attribute::Function(def),
                        Err(reason) => Attribute::NotCallable(reason),
                    },
                    Err(e) => Attribute::NotCallable(format!("not a function definition: {e}")),
                };
                (name, attribute)
            })
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            meta: file.script,
            attributes,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Directory shell functions run in.
    pub fn base_dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }
}
