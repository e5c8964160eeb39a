use crate::error::PipelineError;
use crate::postal::util::{file_hash, sha256_hex};
use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

// Nothing, `_HHMMSS`, or `_HHMMSS_N`.
static SUFFIX_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:_\d{6}(?:_\d+)?)?$").expect("valid snapshot suffix regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotTarget {
    pub date: NaiveDate,
    pub file_name: String,
    pub working_path: PathBuf,
    pub archive_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub working_path: PathBuf,
    pub archive_path: PathBuf,
    pub bytes: usize,
    pub sha256: String,
}

pub fn snapshot_file_name(prefix: &str, date: NaiveDate, suffix: Option<&str>) -> String {
    match suffix {
        Some(suffix) => format!("{prefix}_{}_{suffix}.csv", date.format("%Y-%m-%d")),
        None => format!("{prefix}_{}.csv", date.format("%Y-%m-%d")),
    }
}

pub fn parse_snapshot_date(prefix: &str, file_name: &str) -> Option<NaiveDate> {
    let stem = file_name
        .strip_prefix(prefix)?
        .strip_prefix('_')?
        .strip_suffix(".csv")?;
    let date_part = stem.get(..10)?;
    if !SUFFIX_REGEX.is_match(stem.get(10..)?) {
        return None;
    }
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn name_taken(dirs: &[&Path], indexed: &BTreeSet<String>, file_name: &str) -> bool {
    indexed.contains(file_name) || dirs.iter().any(|dir| dir.join(file_name).exists())
}

/// Pick a file name for `now`'s snapshot that is neither on disk in the
/// working or snapshot directory nor already listed in the index. The bare
/// dated name is preferred, then an `_HHMMSS` suffix, then a counter.
pub fn pick_target(
    prefix: &str,
    now: NaiveDateTime,
    work_dir: &Path,
    snapshots_dir: &Path,
    indexed: &BTreeSet<String>,
) -> SnapshotTarget {
    let date = now.date();
    let dirs = [work_dir, snapshots_dir];

    let mut file_name = snapshot_file_name(prefix, date, None);
    if name_taken(&dirs, indexed, &file_name) {
        let stamp = now.format("%H%M%S").to_string();
        file_name = snapshot_file_name(prefix, date, Some(&stamp));
        let mut counter = 2u32;
        while name_taken(&dirs, indexed, &file_name) {
            file_name = snapshot_file_name(prefix, date, Some(&format!("{stamp}_{counter}")));
            counter += 1;
        }
    }

    SnapshotTarget {
        date,
        working_path: work_dir.join(&file_name),
        archive_path: snapshots_dir.join(&file_name),
        file_name,
    }
}

fn write_error(path: &Path, reason: impl Into<String>) -> PipelineError {
    PipelineError::Write {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

fn write_new(path: &Path, bytes: &[u8], digest: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| write_error(parent, err.to_string()))?;
    }

    match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(bytes)
                .and_then(|_| file.sync_all())
                .map_err(|err| write_error(path, err.to_string()))?;
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            let existing = file_hash(path)?;
            if existing == digest {
                log::debug!("{} already holds this snapshot", path.display());
                return Ok(());
            }
            Err(write_error(path, "refusing to overwrite an existing file with different content").into())
        }
        Err(err) => Err(write_error(path, err.to_string()).into()),
    }
}

pub fn write_snapshot(target: &SnapshotTarget, text: &str) -> Result<SnapshotOutcome> {
    let bytes = text.as_bytes();
    let digest = sha256_hex(bytes);

    write_new(&target.working_path, bytes, &digest)
        .with_context(|| format!("failed to write snapshot {}", target.working_path.display()))?;
    write_new(&target.archive_path, bytes, &digest).with_context(|| {
        format!(
            "failed to write archive copy {}",
            target.archive_path.display()
        )
    })?;

    Ok(SnapshotOutcome {
        working_path: target.working_path.clone(),
        archive_path: target.archive_path.clone(),
        bytes: bytes.len(),
        sha256: digest,
    })
}
