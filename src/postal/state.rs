use crate::postal::paths::ArchivePaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveState {
    pub schema_version: u32,
    pub last_good_url: Option<String>,
    pub last_resolved_via: Option<String>,
    pub last_run_epoch_secs: Option<u64>,
    pub last_snapshot: Option<String>,
}

impl Default for ArchiveState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            last_good_url: None,
            last_resolved_via: None,
            last_run_epoch_secs: None,
            last_snapshot: None,
        }
    }
}

pub fn load(paths: &ArchivePaths) -> Result<ArchiveState> {
    let file = paths.state_file();
    if !file.exists() {
        return Ok(ArchiveState::default());
    }

    let raw =
        fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: ArchiveState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(parsed)
}

pub fn save(paths: &ArchivePaths, state: &ArchiveState) -> Result<PathBuf> {
    let file = paths.state_file();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(state)?;
    fs::write(&file, format!("{data}\n"))
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(file)
}
