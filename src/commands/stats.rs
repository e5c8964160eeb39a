use anyhow::{Context, Result, bail};
use std::fs;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::postal::decode;
use crate::postal::index;
use crate::postal::paths::resolve_paths;
use crate::postal::stats::count_by_field;

#[derive(Debug, Clone)]
pub struct StatsOptions {
    pub field: String,
    pub value: Option<String>,
    pub file: Option<PathBuf>,
}

fn latest_snapshot() -> Result<PathBuf> {
    let paths = resolve_paths()?;
    let loaded = index::load(&paths.index_file)?;
    let Some(latest) = loaded.entries.last() else {
        bail!(
            "no snapshots indexed in {}; pass --file",
            paths.index_file.display()
        );
    };
    Ok(paths.snapshots_dir.join(&latest.file))
}

pub fn run(opts: &StatsOptions) -> Result<CommandReport> {
    let file = match &opts.file {
        Some(file) => file.clone(),
        None => latest_snapshot()?,
    };
    let bytes = fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let counts = count_by_field(&decode::decode(&bytes), &opts.field, opts.value.as_deref())?;

    let mut report = CommandReport::new("stats");
    report.detail(format!("file={}", file.display()));
    report.detail(format!("field={}", counts.field));
    if let Some(value) = &opts.value {
        report.detail(format!("filter={value}"));
    }
    report.detail(format!("rows={}", counts.rows));
    for (value, count) in counts.ranked() {
        let label = if value.is_empty() { "(empty)" } else { value };
        report.detail(format!("{label}: {count}"));
    }
    Ok(report)
}
