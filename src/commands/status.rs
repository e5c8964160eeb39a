use anyhow::Result;
use chrono::Utc;
use std::env;

use crate::commands::CommandReport;
use crate::postal::config::load_config;
use crate::postal::index;
use crate::postal::paths::resolve_paths;
use crate::postal::state;
use crate::source::signed_url::signed_url_expiry;

include!(concat!(env!("OUT_DIR"), "/postalpoints_env_allowlist.rs"));

fn env_is_set(key: &str) -> bool {
    env::var(key).is_ok_and(|v| !v.trim().is_empty())
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let config = load_config(&paths)?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build={}", env!("BUILD_UUID")));
    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("work_dir={}", paths.work_dir.display()));
    report.detail(format!("snapshots_dir={}", paths.snapshots_dir.display()));
    report.detail(format!("index={}", paths.index_file.display()));
    report.detail(format!("state_dir={}", paths.state_dir.display()));

    report.detail(format!("strategy={}", config.source.strategy.label()));
    report.detail(format!(
        "landing_url={}",
        config.source.landing_url.as_deref().unwrap_or("none")
    ));
    report.detail(format!("url_prefix={}", config.source.url_prefix));
    report.detail(format!("link_selector={}", config.link_selector()));
    report.detail(format!("file_prefix={}", config.archive.file_prefix));
    report.detail(format!(
        "timezone={}",
        config.archive.timezone.as_deref().unwrap_or("local")
    ));

    let set: Vec<&str> = GENERATED_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env_is_set(key))
        .collect();
    report.detail(format!(
        "env_set={}",
        if set.is_empty() {
            "none".to_string()
        } else {
            set.join(",")
        }
    ));

    if paths.index_file.exists() {
        match index::load(&paths.index_file) {
            Ok(loaded) => {
                report.detail(format!("index_rows={}", loaded.entries.len()));
                if let Some(latest) = loaded.entries.last() {
                    report.detail(format!("latest_snapshot={}", latest.file));
                }
            }
            Err(err) => report.issue(format!("index unreadable: {err:#}")),
        }
    } else {
        report.detail("index_rows=0");
    }

    match state::load(&paths) {
        Ok(saved) => {
            if let Some(url) = saved.last_good_url.as_deref() {
                let expiry = signed_url_expiry(url);
                report.detail(format!(
                    "last_good_url_expires_at={}",
                    expiry
                        .map(|e| e.to_rfc3339())
                        .unwrap_or_else(|| "unknown".to_string())
                ));
                if expiry.is_some_and(|e| e <= Utc::now()) {
                    report.detail("last_good_url_expired=true");
                }
            }
            if let Some(via) = saved.last_resolved_via.as_deref() {
                report.detail(format!("last_resolved_via={via}"));
            }
        }
        Err(err) => report.issue(format!("state unreadable: {err:#}")),
    }

    Ok(report)
}
