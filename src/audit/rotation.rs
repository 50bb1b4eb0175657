//! Size-capped audit file with timestamped rotation.
//!
//! Files are named `<stem>_<YYYY-MM-DD_HHMMSSmmm><ext>` beside the configured
//! base path, so lexical order is creation order.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDateTime};
use tracing::{debug, error, warn};

use crate::error::{Result, SqlGateError};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H%M%S%3f";

/// Current audit file handle plus its running byte count.
#[derive(Debug)]
pub struct RotatingFile {
    dir: PathBuf,
    stem: String,
    ext: String,
    max_bytes: u64,
    file: File,
    path: PathBuf,
    current_size: u64,
}

impl RotatingFile {
    /// Opens the newest existing rotation file under the cap, or creates a new one.
    pub fn open(base_path: &Path, max_bytes: u64) -> Result<Self> {
        let dir = match base_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stem = base_path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("audit")
            .to_string();
        let ext = base_path
            .extension()
            .and_then(|s| s.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_else(|| ".log".to_string());

        fs::create_dir_all(&dir).map_err(|e| {
            SqlGateError::audit(format!("Failed to create audit directory {}: {e}", dir.display()))
        })?;

        if let Some((path, size)) = newest_under_cap(&dir, &stem, &ext, max_bytes) {
            match OpenOptions::new().append(true).open(&path) {
                Ok(file) => {
                    debug!("Reusing audit file {}", path.display());
                    return Ok(Self {
                        dir,
                        stem,
                        ext,
                        max_bytes,
                        file,
                        path,
                        current_size: size,
                    });
                }
                Err(e) => warn!("Cannot reopen audit file {}: {e}", path.display()),
            }
        }

        let path = next_path(&dir, &stem, &ext, None);
        let (file, current_size) = create(&path)?;
        debug!("Created audit file {}", path.display());
        Ok(Self {
            dir,
            stem,
            ext,
            max_bytes,
            file,
            path,
            current_size,
        })
    }

    /// The file currently written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written to the current file so far.
    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    /// Appends one entry and syncs it to disk.
    ///
    /// Rotates first when the entry would bring a non-empty file to or over
    /// the cap. If rotation fails the entry goes to the current file.
    pub fn append(&mut self, entry: &[u8]) -> Result<()> {
        let size = entry.len() as u64;
        if self.current_size > 0 && self.current_size + size >= self.max_bytes {
            if let Err(e) = self.rotate() {
                error!("Audit rotation failed, writing to {}: {e}", self.path.display());
            }
        }

        self.file.write_all(entry).map_err(|e| {
            SqlGateError::audit(format!("Failed to write audit file {}: {e}", self.path.display()))
        })?;
        self.current_size += size;
        self.file.sync_data().map_err(|e| {
            SqlGateError::audit(format!("Failed to sync audit file {}: {e}", self.path.display()))
        })
    }

    fn rotate(&mut self) -> Result<()> {
        let path = next_path(&self.dir, &self.stem, &self.ext, Some(&self.path));
        let (file, size) = create(&path)?;
        debug!("Rotated audit file to {}", path.display());
        self.file = file;
        self.path = path;
        self.current_size = size;
        Ok(())
    }
}

fn create(path: &Path) -> Result<(File, u64)> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            SqlGateError::audit(format!("Failed to open audit log file {}: {e}", path.display()))
        })?;
    let size = file
        .metadata()
        .map_err(|e| SqlGateError::audit(format!("Failed to stat audit log file: {e}")))?
        .len();
    Ok((file, size))
}

fn file_name(stem: &str, ext: &str, at: NaiveDateTime) -> String {
    format!("{stem}_{}{ext}", at.format(TIMESTAMP_FORMAT))
}

fn parse_timestamp(name: &str, stem: &str, ext: &str) -> Option<NaiveDateTime> {
    let stamp = name.strip_prefix(stem)?.strip_prefix('_')?.strip_suffix(ext)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

/// Builds a fresh rotation path that sorts after `current` and does not exist yet.
fn next_path(dir: &Path, stem: &str, ext: &str, current: Option<&Path>) -> PathBuf {
    let current_name = current
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .map(str::to_string);

    let mut at = Local::now().naive_local();
    if let Some(previous) = current_name
        .as_deref()
        .and_then(|name| parse_timestamp(name, stem, ext))
    {
        if at <= previous {
            at = previous + Duration::milliseconds(1);
        }
    }

    loop {
        let name = file_name(stem, ext, at);
        let path = dir.join(&name);
        let after_current = current_name.as_deref().map_or(true, |cur| name.as_str() > cur);
        if after_current && !path.exists() {
            return path;
        }
        at += Duration::milliseconds(1);
    }
}

/// Finds the lexically newest `<stem>_*<ext>` file smaller than `max_bytes`.
fn newest_under_cap(dir: &Path, stem: &str, ext: &str, max_bytes: u64) -> Option<(PathBuf, u64)> {
    let prefix = format!("{stem}_");
    let mut candidates: Vec<(String, PathBuf, u64)> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            if !name.starts_with(&prefix) || !name.ends_with(ext) {
                return None;
            }
            let meta = entry.metadata().ok()?;
            meta.is_file().then(|| (name, entry.path(), meta.len()))
        })
        .collect();

    candidates.sort_by(|a, b| b.0.cmp(&a.0));
    candidates
        .into_iter()
        .find(|(_, _, size)| *size < max_bytes)
        .map(|(_, path, size)| (path, size))
}
