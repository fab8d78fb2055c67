//! Reload stamps: a file holding a Unix timestamp that `vfs-hook reload`
//! bumps and every module cache watching the directory compares against
//! the last value it acted on.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const RELOAD_STAMP: &str = ".vfs-hook-reload-stamp";

pub fn stamp_path(dir: &Path) -> PathBuf {
    dir.join(RELOAD_STAMP)
}

/// Current stamp value, if a readable one exists.
pub fn read_reload_stamp(dir: &Path) -> Option<u64> {
    std::fs::read_to_string(stamp_path(dir))
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Bump the stamp in `dir`, creating the directory if needed.
///
/// The written value is the current time in seconds, or one past the
/// existing value when that is not older, so two reloads inside the same
/// second are both observed.
pub fn write_reload_stamp(dir: &Path) -> Result<u64> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create stamp directory {}", dir.display()))?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let next = match read_reload_stamp(dir) {
        Some(prev) if prev >= now => prev + 1,
        _ => now,
    };
    let path = stamp_path(dir);
    std::fs::write(&path, next.to_string())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(next)
}

/// Remove the stamp. A missing stamp is not an error.
pub fn delete_reload_stamp(dir: &Path) -> Result<()> {
    let path = stamp_path(dir);
    match std::fs::remove_file(&path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(e).with_context(|| format!("Failed to remove {}", path.display()))
        }
        _ => Ok(()),
    }
}

/// The last stamp one cache acted on.
#[derive(Debug, Clone)]
pub struct StampWatch {
    dir: PathBuf,
    seen: Option<u64>,
}

impl StampWatch {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seen: None,
        }
    }

    /// True once per stamp value newer than the last one seen. Missing or
    /// garbage stamps never trigger.
    pub fn advanced(&mut self) -> bool {
        let Some(current) = read_reload_stamp(&self.dir) else {
            return false;
        };
        if self.seen.is_some_and(|seen| current <= seen) {
            return false;
        }
        self.seen = Some(current);
        true
    }
}
