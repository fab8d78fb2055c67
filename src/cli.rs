use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::diagnostics::{ambient_identity, sink_from_config, DiagnosticSink, MemorySink};
use crate::hooks::audit::audit_hook_script;
use crate::hooks::reload::{delete_reload_stamp, write_reload_stamp};
use crate::hooks::{load_hook_script, Attribute};
use crate::vfs::{
    CreateDisposition, CreateFileRequest, HookLayer, LocalFs, Operation, SmbFilename, VfsError,
    VfsHandler, FILE_DIRECTORY_FILE,
};

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Load the configured hook script and list its functions
    Check,

    /// Run the security audit on a hook script
    Audit {
        /// Path to the hook script
        script: PathBuf,
    },

    /// Scaffold a new hook script
    Init {
        /// Where to write the script
        script: PathBuf,
    },

    /// Ask running layers to reload the hook script
    Reload {
        /// Stamp directory (defaults to [hook].reload_stamp_dir)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Remove the stamp instead of writing it
        #[arg(long)]
        clear: bool,
    },

    /// Run one operation through the hook layer against the configured share
    Exec {
        /// Acting user (defaults to $USER)
        #[arg(long)]
        user: Option<String>,

        #[command(subcommand)]
        op: ExecOp,
    },

    /// Print the configuration JSON Schema
    Schema,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ExecOp {
    Connect {
        /// Service name (defaults to [share].name)
        service: Option<String>,
    },
    Mkdir {
        path: String,
        /// Octal permission bits
        #[arg(long, default_value = "755", value_parser = parse_mode)]
        mode: u32,
    },
    Rmdir {
        path: String,
    },
    CreateFile {
        path: String,
        #[arg(long, value_enum, default_value_t = DispositionArg::OpenIf)]
        disposition: DispositionArg,
        /// Create or open a directory
        #[arg(long)]
        directory: bool,
    },
    Rename {
        src: String,
        dst: String,
    },
    Unlink {
        path: String,
    },
}

impl ExecOp {
    pub fn operation(&self) -> Operation {
        match self {
            ExecOp::Connect { .. } => Operation::Connect,
            ExecOp::Mkdir { .. } => Operation::Mkdir,
            ExecOp::Rmdir { .. } => Operation::Rmdir,
            ExecOp::CreateFile { .. } => Operation::CreateFile,
            ExecOp::Rename { .. } => Operation::Rename,
            ExecOp::Unlink { .. } => Operation::Unlink,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DispositionArg {
    Supersede,
    Open,
    Create,
    OpenIf,
    Overwrite,
    OverwriteIf,
}

impl From<DispositionArg> for CreateDisposition {
    fn from(arg: DispositionArg) -> Self {
        match arg {
            DispositionArg::Supersede => CreateDisposition::Supersede,
            DispositionArg::Open => CreateDisposition::Open,
            DispositionArg::Create => CreateDisposition::Create,
            DispositionArg::OpenIf => CreateDisposition::OpenIf,
            DispositionArg::Overwrite => CreateDisposition::Overwrite,
            DispositionArg::OverwriteIf => CreateDisposition::OverwriteIf,
        }
    }
}

fn parse_mode(raw: &str) -> Result<u32, String> {
    u32::from_str_radix(raw.trim_start_matches("0o"), 8)
        .map_err(|e| format!("invalid octal mode '{raw}': {e}"))
}

/// Handle one `vfs-hook` subcommand.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Check => handle_check(config),
        Commands::Audit { script } => handle_audit(&script),
        Commands::Init { script } => handle_init(&script),
        Commands::Reload { dir, clear } => handle_reload(dir, clear, config),
        Commands::Exec { user, op } => handle_exec(user, op, config).await,
        Commands::Schema => {
            println!("{}", Config::json_schema()?);
            Ok(())
        }
    }
}

/// `vfs-hook check`: list what each operation resolves to.
fn handle_check(config: &Config) -> Result<()> {
    if let Some(path) = &config.config_path {
        println!("Config: {}", path.display());
    }
    let Some(script_path) = config.hook.script_path() else {
        bail!("No hook script configured: set `script` under [hook] or VFS_HOOK_SCRIPT");
    };

    let script = load_hook_script(&script_path, config.hook.skip_security_audit)?;
    println!(
        "  {} Loaded {}",
        console::style("\u{2713}").green().bold(),
        script_path.display()
    );
    if let Some(name) = &script.meta.name {
        println!("  Name: {name}");
    }
    if let Some(description) = &script.meta.description {
        println!("  Description: {description}");
    }
    println!();
    println!("  {:<14} {:<8} STATUS", "OPERATION", "KIND");
    println!("  {}", "-".repeat(50));
    for op in Operation::ALL {
        let (kind, status) = match script.attribute(op.hook_name()) {
            None => ("-", "absent (allow)".to_string()),
            Some(Attribute::Function(def)) => (def.kind(), "callable".to_string()),
            Some(Attribute::NotCallable(reason)) => {
                ("-", format!("not callable (allow): {reason}"))
            }
        };
        println!("  {:<14} {:<8} {status}", op.hook_name(), kind);
    }

    let unused: Vec<&str> = script
        .attributes
        .keys()
        .map(String::as_str)
        .filter(|name| !Operation::ALL.iter().any(|op| op.hook_name() == *name))
        .collect();
    if !unused.is_empty() {
        println!();
        println!("  Unused entries: {}", unused.join(", "));
    }
    Ok(())
}

/// `vfs-hook audit <script>`: always audits, regardless of config.
fn handle_audit(script: &Path) -> Result<()> {
    let report = audit_hook_script(script, false)?;
    if report.is_clean() {
        println!(
            "  {} Audit passed for {}.",
            console::style("\u{2713}").green().bold(),
            script.display(),
        );
    } else {
        println!(
            "  {} Audit failed for {}",
            console::style("\u{2717}").red().bold(),
            script.display(),
        );
        for finding in &report.findings {
            println!("    - {finding}");
        }
    }
    Ok(())
}

/// `vfs-hook init <script>`: write a commented starter script.
fn handle_init(script: &Path) -> Result<()> {
    if script.exists() {
        bail!("Hook script already exists: {}", script.display());
    }
    let name = script
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("hooks");

    if let Some(parent) = script.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(script, init_template(name))
        .with_context(|| format!("Failed to write {}", script.display()))?;
    println!("Created hook script: {}", script.display());
    Ok(())
}

fn init_template(name: &str) -> String {
    format!(
        r#"[script]
name = "{name}"
description = "Gate filesystem operations on this share"
timeout_secs = 5

# Entries under [functions] are named after the operation they gate:
# connect, mkdir, rmdir, create_file, rename, unlink.
# An operation without an entry is allowed.

# Shell functions get the operation arguments as $1, $2.
# Exit 0 allows, exit 1 denies.
[functions.mkdir.shell]
command = '[ "$1" != "/forbidden" ]'

# [functions.unlink]
# value = false

# [functions.rename.http]
# url = "http://127.0.0.1:9000/authorize"
"#
    )
}

/// `vfs-hook reload`: write (or clear) the reload stamp.
fn handle_reload(dir: Option<PathBuf>, clear: bool, config: &Config) -> Result<()> {
    let Some(dir) = dir.or_else(|| config.hook.reload_stamp_dir()) else {
        bail!("No stamp directory: pass --dir or set reload_stamp_dir under [hook]");
    };
    if clear {
        delete_reload_stamp(&dir)?;
        println!("Reload stamp cleared in {}.", dir.display());
    } else {
        write_reload_stamp(&dir)?;
        println!(
            "Reload stamp written to {}. Layers reload the script on their next operation.",
            dir.display()
        );
    }
    Ok(())
}

/// `vfs-hook exec`: one operation through the layer over the local share.
///
/// A denied or failed operation is returned as an error so the exit status
/// reflects it.
async fn handle_exec(user: Option<String>, op: ExecOp, config: &Config) -> Result<()> {
    let Some(root) = config.share.root() else {
        bail!("No share configured: set `path` under [share]");
    };
    let user = user.unwrap_or_else(ambient_identity);
    let service = config.share.name.clone();

    let trace = Arc::new(MemorySink::new());
    let sinks: Vec<Arc<dyn DiagnosticSink>> =
        vec![sink_from_config(&config.diagnostics), trace.clone()];
    let layer = HookLayer::from_config_with_sink(
        LocalFs::new(service.clone(), root),
        config,
        Arc::new(sinks),
    );

    let operation = op.operation();
    let result = match op {
        ExecOp::Connect { service: requested } => {
            let requested = requested.unwrap_or(service);
            layer.connect(&requested, &user).await.map(|()| String::new())
        }
        op => match layer.connect(&service, &user).await {
            Err(e) => Err(e),
            Ok(()) => run_gated(&layer, op).await,
        },
    };
    layer.disconnect().await;

    match &result {
        Ok(detail) => println!(
            "  {} {operation} allowed{detail}",
            console::style("\u{2713}").green().bold(),
        ),
        Err(_) => println!(
            "  {} {operation} refused",
            console::style("\u{2717}").red().bold(),
        ),
    }

    let events = trace.events();
    if !events.is_empty() {
        println!();
        println!("  Trace:");
        for event in events {
            println!("    - {event}");
        }
    }

    if let Err(e) = result {
        bail!(
            "{operation} failed: {e} (errno {}, {})",
            e.errno(),
            e.nt_status()
        );
    }
    Ok(())
}

async fn run_gated(layer: &HookLayer<LocalFs>, op: ExecOp) -> Result<String, VfsError> {
    match op {
        ExecOp::Connect { .. } => Ok(String::new()),
        ExecOp::Mkdir { path, mode } => layer.mkdir(&path, mode).await.map(|()| String::new()),
        ExecOp::Rmdir { path } => layer.rmdir(&path).await.map(|()| String::new()),
        ExecOp::CreateFile {
            path,
            disposition,
            directory,
        } => {
            let mut request = CreateFileRequest::new(SmbFilename::new(path), disposition.into());
            if directory {
                request.create_options |= FILE_DIRECTORY_FILE;
            }
            let handle = layer.create_file(&request).await?;
            Ok(format!(": {:?} {}", handle.action, handle.path.display()))
        }
        ExecOp::Rename { src, dst } => layer
            .rename(&SmbFilename::new(src), &SmbFilename::new(dst))
            .await
            .map(|()| String::new()),
        ExecOp::Unlink { path } => layer
            .unlink(&SmbFilename::new(path))
            .await
            .map(|()| String::new()),
    }
}
