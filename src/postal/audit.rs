use crate::postal::paths::ArchivePaths;
use crate::postal::util::now_epoch_secs;
use crate::postal::warn::{self, WarnEvent};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: String,
    pub message: String,
}

pub fn append_event(paths: &ArchivePaths, phase: &str, status: &str, message: &str) -> Result<()> {
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("failed to create {}", paths.state_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        phase: phase.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths.audit_log();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

pub fn record(paths: &ArchivePaths, phase: &str, status: &str, message: &str) {
    if let Err(err) = append_event(paths, phase, status, message) {
        warn::emit(WarnEvent {
            code: "AUDIT_APPEND_FAILED",
            stage: phase,
            action: "append-audit-event",
            target: &paths.audit_log().display().to_string(),
            reason: "audit-write-failed",
            err: &format!("{err:#}"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn events_are_appended_as_json_lines() {
        let tmp = tempdir().expect("tempdir");
        let paths = ArchivePaths::under(tmp.path().to_path_buf());

        append_event(&paths, "fetch", "ok", "first").expect("append");
        append_event(&paths, "index", "ok", "second").expect("append");

        let raw = fs::read_to_string(paths.audit_log()).expect("read audit");
        let events: Vec<AuditEvent> = raw
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].phase, "fetch");
        assert_eq!(events[1].message, "second");
    }
}
