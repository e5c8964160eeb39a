use anyhow::Result;

use crate::commands::CommandReport;
use crate::postal::config::load_config;
use crate::postal::index;
use crate::postal::paths::resolve_paths;
use crate::postal::warn::{self, WarnEvent};

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub rebuild: bool,
}

pub fn run(opts: &IndexOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("index");
    report.detail(format!("index={}", paths.index_file.display()));

    if opts.rebuild {
        let config = load_config(&paths)?;
        let update = index::rebuild(
            &paths.index_file,
            &paths.snapshots_dir,
            &config.archive.file_prefix,
        )?;
        report.detail(format!(
            "rebuild: added={} rows={}",
            update.added, update.rows
        ));
        if update.malformed_dropped > 0 {
            report.detail(format!(
                "index_malformed_rows_dropped={}",
                update.malformed_dropped
            ));
        }
        return Ok(report);
    }

    if !paths.index_file.exists() {
        report.issue("index does not exist yet; run `postalpoints fetch` first");
        return Ok(report);
    }

    let loaded = index::load(&paths.index_file)?;
    if loaded.malformed > 0 {
        warn::emit(WarnEvent {
            code: "INDEX_ROWS_MALFORMED",
            stage: "index",
            action: "load-index",
            target: &paths.index_file.display().to_string(),
            reason: "malformed-rows",
            err: &format!("count={}", loaded.malformed),
        });
    }
    report.detail(format!("rows={}", loaded.entries.len()));
    for entry in &loaded.entries {
        let present = paths.snapshots_dir.join(&entry.file).is_file();
        report.detail(format!(
            "{} {}{}",
            entry.date.format("%Y-%m-%d"),
            entry.file,
            if present { "" } else { " (missing)" }
        ));
    }

    Ok(report)
}
