//! Timestamped backup copies taken before a workbook is mutated.

use crate::error::{NetNetError, Result};
use crate::workbook::Workbook;
use chrono::{Local, NaiveDateTime};
use log::info;
use std::path::{Path, PathBuf};

/// Most sequence suffixes tried before giving up on a free backup name.
const MAX_SEQUENCE: u32 = 999;

/// Backup name for `path` at `timestamp`: `{stem}_backup_{YYYYMMDD_HHMMSS}{.ext}`,
/// placed next to the original.
pub fn backup_path_for(path: &Path, timestamp: NaiveDateTime) -> PathBuf {
    backup_candidate(path, timestamp, None)
}

fn backup_candidate(path: &Path, timestamp: NaiveDateTime, seq: Option<u32>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workbook".to_string());
    let stamp = timestamp.format("%Y%m%d_%H%M%S");
    let suffix = seq.map(|n| format!("-{n:03}")).unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_backup_{stamp}{suffix}{extension}"))
}

/// First backup name that does not exist yet. A numeric suffix is added when two
/// backups land in the same second.
fn free_backup_path(path: &Path, timestamp: NaiveDateTime) -> Result<PathBuf> {
    let first = backup_candidate(path, timestamp, None);
    if !first.exists() {
        return Ok(first);
    }
    (1..=MAX_SEQUENCE)
        .map(|seq| backup_candidate(path, timestamp, Some(seq)))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| NetNetError::BackupFailure {
            path: first.clone(),
            source: Box::new(NetNetError::IoError(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free backup name left for this timestamp",
            ))),
        })
}

/// Copies the workbook's current state next to `path` and returns where it went.
/// Any failure is reported as [`NetNetError::BackupFailure`].
pub fn create_backup<W: Workbook + ?Sized>(workbook: &W, path: &Path) -> Result<PathBuf> {
    let target = free_backup_path(path, Local::now().naive_local())?;
    workbook
        .copy_to(&target)
        .map_err(|source| NetNetError::BackupFailure {
            path: target.clone(),
            source: Box::new(source),
        })?;
    info!("Backup written to {}", target.display());
    Ok(target)
}
