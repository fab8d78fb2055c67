use anyhow::{bail, Context, Result};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

const MAX_SCRIPT_BYTES: u64 = 512 * 1024;

#[derive(Debug, Clone, Default)]
pub struct HookAuditReport {
    pub files_scanned: usize,
    pub findings: Vec<String>,
}

impl HookAuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn summary(&self) -> String {
        self.findings.join("; ")
    }
}

/// Statically audit a hook script on disk.
///
/// Errors only when the script cannot be inspected at all; problems with
/// its content are collected as findings.
pub fn audit_hook_script(script_path: &Path, skip_security_audit: bool) -> Result<HookAuditReport> {
    if skip_security_audit {
        return Ok(HookAuditReport::default());
    }

    let mut report = audit_script_file(script_path)?;
    if !report.is_clean() {
        return Ok(report);
    }
    let content = fs::read_to_string(script_path)
        .with_context(|| format!("failed to read hook script {}", script_path.display()))?;
    audit_script_content(script_path, &content, &mut report);
    Ok(report)
}

/// Check what the path itself is: a regular file, not a symlink, small
/// enough to audit. Does not read the content.
pub fn audit_script_file(script_path: &Path) -> Result<HookAuditReport> {
    let metadata = fs::symlink_metadata(script_path)
        .with_context(|| format!("failed to read metadata for {}", script_path.display()))?;
    let mut report = HookAuditReport {
        files_scanned: 1,
        ..Default::default()
    };
    let rel = file_display(script_path);

    if metadata.file_type().is_symlink() {
        report
            .findings
            .push(format!("{rel}: hook scripts must not be symlinks."));
        return Ok(report);
    }
    if !metadata.is_file() {
        bail!("hook script must be a regular file: {}", script_path.display());
    }
    if metadata.len() > MAX_SCRIPT_BYTES {
        report.findings.push(format!(
            "{rel}: file is too large for static audit (>{MAX_SCRIPT_BYTES} bytes)."
        ));
    }
    Ok(report)
}

/// Audit script text already read from `script_path`.
///
/// The loader parses exactly the text it hands in here, so a file swapped
/// between audit and parse cannot slip past.
pub fn audit_script_content(script_path: &Path, content: &str, report: &mut HookAuditReport) {
    let rel = file_display(script_path);
    if content.len() as u64 > MAX_SCRIPT_BYTES {
        report.findings.push(format!(
            "{rel}: file is too large for static audit (>{MAX_SCRIPT_BYTES} bytes)."
        ));
        return;
    }
    if content.contains('\0') {
        report
            .findings
            .push(format!("{rel}: contains null bytes (potential injection)."));
        return;
    }

    // Parse errors are reported by the loader with better context.
    let Ok(parsed) = toml::from_str::<toml::Table>(content) else {
        return;
    };

    let Some(functions) = parsed.get("functions").and_then(toml::Value::as_table) else {
        return;
    };
    for (name, function) in functions {
        if let Some(command) = function
            .get("shell")
            .and_then(|shell| shell.get("command"))
            .and_then(toml::Value::as_str)
        {
            audit_shell_command(command, &format!("{rel}: functions.{name}.shell.command"), report);
        }
    }
}

fn audit_shell_command(command: &str, context: &str, report: &mut HookAuditReport) {
    if command.contains('\0') {
        report
            .findings
            .push(format!("{context}: contains null byte injection."));
    }
    if let Some(pattern) = detect_dangerous_pattern(command) {
        report.findings.push(format!(
            "{context}: detected dangerous shell pattern ({pattern})."
        ));
    }
    if contains_dangerous_chaining(command) {
        report.findings.push(format!(
            "{context}: shell chaining to potentially dangerous commands is blocked."
        ));
    }
}

fn detect_dangerous_pattern(content: &str) -> Option<&'static str> {
    static DANGEROUS_PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let patterns = DANGEROUS_PATTERNS.get_or_init(|| {
        vec![
            (
                Regex::new(r"(?im):\(\)\s*\{\s*:\|:&\s*\};:").expect("regex"),
                "fork-bomb",
            ),
            (
                Regex::new(r"(?im)/dev/tcp/").expect("regex"),
                "reverse-shell-dev-tcp",
            ),
            (
                Regex::new(r"(?im)\bnc(?:at)?\b[^\n]{0,120}\s-e\b").expect("regex"),
                "netcat-reverse-shell",
            ),
            (
                Regex::new(r"(?im)\bbash\s+-i\b").expect("regex"),
                "interactive-bash-reverse-shell",
            ),
            (
                Regex::new(r"(?im)\bcurl\b[^\n|]{0,200}\|\s*(?:sh|bash|zsh)\b").expect("regex"),
                "curl-pipe-shell",
            ),
            (
                Regex::new(r"(?im)\bwget\b[^\n|]{0,200}\|\s*(?:sh|bash|zsh)\b").expect("regex"),
                "wget-pipe-shell",
            ),
            (
                Regex::new(r"(?im)\brm\s+-rf\s+/").expect("regex"),
                "destructive-rm-rf-root",
            ),
            (
                Regex::new(r"(?im)\bmkfs(?:\.[a-z0-9]+)?\b").expect("regex"),
                "filesystem-format",
            ),
            (
                Regex::new(r"(?im)\bdd\s+if=").expect("regex"),
                "disk-overwrite-dd",
            ),
        ]
    });

    patterns
        .iter()
        .find_map(|(regex, label)| regex.is_match(content).then_some(*label))
}

fn contains_dangerous_chaining(command: &str) -> bool {
    static CHAINING_RE: OnceLock<Regex> = OnceLock::new();
    let regex = CHAINING_RE.get_or_init(|| {
        Regex::new(r"(?im)(&&|\|\||;|\|)\s*(?:rm\s+-rf|mkfs|dd\s+if=|curl.*\|\s*(?:sh|bash)|wget.*\|\s*(?:sh|bash))")
            .expect("chaining regex")
    });
    regex.is_match(command)
}

fn file_display(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
