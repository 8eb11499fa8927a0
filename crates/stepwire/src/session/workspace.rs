//! Per-session output directories and created-file tracking.
//!
//! Each session may own a directory the agent loop writes artifacts into.
//! [`FileTracker`] remembers what was already there when the session was
//! created and reports anything new on each scan.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::id::SessionId;

/// Metadata about one file the agent produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Absolute path on disk.
    pub path: String,
    /// Path relative to the session output directory.
    pub relative_path: String,
    pub name: String,
    pub size: u64,
    /// RFC 3339 creation time, when the platform reports one.
    pub created: Option<String>,
    /// RFC 3339 modification time.
    pub modified: Option<String>,
}

impl FileInfo {
    fn from_path(root: &Path, path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        let relative_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_string_lossy().into_owned(),
            relative_path,
            name,
            size: meta.len(),
            created: meta.created().ok().map(rfc3339),
            modified: meta.modified().ok().map(rfc3339),
        })
    }
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}

/// Create `{root}/{version_folder}_{session_id}_{run}` and return its
/// absolute path. `run` is 8 hex digits unique to this call.
pub fn provision_output_dir(
    root: &Path,
    version_folder: &str,
    session_id: &SessionId,
) -> io::Result<PathBuf> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let suffix = format!("{:08x}", (nanos as u64 ^ (nanos >> 64) as u64) as u32);
    let dir = root.join(format!("{version_folder}_{session_id}_{suffix}"));
    fs::create_dir_all(&dir)?;
    let dir = std::path::absolute(&dir)?;
    debug!("Provisioned output directory {}", dir.display());
    Ok(dir)
}

/// Tracks files that appear in an output directory after creation.
#[derive(Debug)]
pub struct FileTracker {
    root: PathBuf,
    initial: HashSet<PathBuf>,
    created: Vec<FileInfo>,
}

impl FileTracker {
    /// Start tracking `root`. Files already present are never reported.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let initial = walk_files(&root).into_iter().collect();
        Self {
            root,
            initial,
            created: Vec::new(),
        }
    }

    /// Every file reported so far, in discovery order.
    pub fn created_files(&self) -> &[FileInfo] {
        &self.created
    }

    /// Rescan the directory and return files not seen before.
    pub fn scan_for_new(&mut self) -> Vec<FileInfo> {
        let known: HashSet<&str> = self.created.iter().map(|f| f.path.as_str()).collect();
        let mut fresh = Vec::new();
        for path in walk_files(&self.root) {
            if self.initial.contains(&path) || known.contains(path.to_string_lossy().as_ref()) {
                continue;
            }
            match FileInfo::from_path(&self.root, &path) {
                Ok(info) => fresh.push(info),
                // Removed between listing and stat.
                Err(e) => debug!("Skipping {}: {e}", path.display()),
            }
        }
        self.created.extend(fresh.iter().cloned());
        fresh
    }
}

/// All regular files under `root`, sorted. Unreadable directories are
/// logged and skipped.
fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!("Failed to scan {}: {e}", dir.display());
                continue;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => pending.push(path),
                Ok(ft) if ft.is_file() => files.push(path),
                _ => {}
            }
        }
    }
    files.sort();
    files
}
