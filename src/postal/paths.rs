use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

pub const INDEX_FILE_NAME: &str = "index.csv";

#[derive(Debug, Clone)]
pub struct ArchivePaths {
    pub home: PathBuf,
    pub work_dir: PathBuf,
    pub snapshots_dir: PathBuf,
    pub index_file: PathBuf,
    pub state_dir: PathBuf,
}

impl ArchivePaths {
    pub fn under(home: PathBuf) -> Self {
        let snapshots_dir = home.join("static").join("snapshots");
        Self {
            work_dir: home.clone(),
            index_file: snapshots_dir.join(INDEX_FILE_NAME),
            state_dir: home.join(".postalpoints"),
            snapshots_dir,
            home,
        }
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.state_dir.join("audit.log")
    }
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<ArchivePaths> {
    let cwd = env::current_dir().context("current directory could not be resolved")?;
    let home = env_or_default_path("POSTALPOINTS_HOME", cwd);
    let defaults = ArchivePaths::under(home.clone());

    let work_dir = env_or_default_path("POSTALPOINTS_WORK_DIR", defaults.work_dir);
    let snapshots_dir = env_or_default_path("POSTALPOINTS_SNAPSHOTS_DIR", defaults.snapshots_dir);
    let state_dir = env_or_default_path("POSTALPOINTS_STATE_DIR", defaults.state_dir);

    Ok(ArchivePaths {
        home,
        work_dir,
        index_file: snapshots_dir.join(INDEX_FILE_NAME),
        snapshots_dir,
        state_dir,
    })
}
