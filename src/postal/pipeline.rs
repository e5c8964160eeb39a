use crate::error::PipelineError;
use crate::postal::audit;
use crate::postal::config::{PostalConfig, ResolveStrategy};
use crate::postal::decode::{self, SourceEncoding};
use crate::postal::index::{self, IndexUpdate};
use crate::postal::paths::ArchivePaths;
use crate::postal::snapshot::{self, SnapshotOutcome, SnapshotTarget};
use crate::postal::state::{self, ArchiveState};
use crate::postal::util::now_epoch_secs;
use crate::postal::warn::{self, WarnEvent};
use crate::source::browser::DriverLauncher;
use crate::source::http::Fetcher;
use crate::source::resolver::{Resolution, ResolveRequest, ResolvedVia, SourceResolver};
use crate::source::signed_url::{pick_fallback, signed_url_expiry};
use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::collections::BTreeSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolvingUrl,
    Fetching,
    Decoding,
    WritingSnapshot,
    UpdatingIndex,
    Done,
    Failed,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Self::ResolvingUrl => "resolving-url",
            Self::Fetching => "fetching",
            Self::Decoding => "decoding",
            Self::WritingSnapshot => "writing-snapshot",
            Self::UpdatingIndex => "updating-index",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

pub struct PipelineContext<'a> {
    pub paths: &'a ArchivePaths,
    pub config: &'a PostalConfig,
    pub now: NaiveDateTime,
    pub strategy: ResolveStrategy,
    pub landing_url: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct RunPlan {
    pub resolution: Resolution,
    pub fallback_origin: Option<&'static str>,
    pub expires_at: Option<DateTime<Utc>>,
    pub target: SnapshotTarget,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub plan: RunPlan,
    pub encoding: SourceEncoding,
    pub substitutions: usize,
    pub passes: usize,
    pub snapshot: SnapshotOutcome,
    pub index: IndexUpdate,
}

pub fn archive_now(config: &PostalConfig) -> Result<NaiveDateTime> {
    Ok(match config.timezone()? {
        Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
        None => Local::now().naive_local(),
    })
}

fn load_state(paths: &ArchivePaths) -> ArchiveState {
    match state::load(paths) {
        Ok(state) => state,
        Err(err) => {
            warn::emit(WarnEvent {
                code: "STATE_UNREADABLE",
                stage: Stage::ResolvingUrl.label(),
                action: "load-state",
                target: &paths.state_file().display().to_string(),
                reason: "state-parse-failed",
                err: &format!("{err:#}"),
            });
            ArchiveState::default()
        }
    }
}

fn save_state(paths: &ArchivePaths, plan: &RunPlan) {
    let mut next = load_state(paths);
    next.last_good_url = Some(plan.resolution.url.clone());
    next.last_resolved_via = Some(plan.resolution.via.label().to_string());
    next.last_run_epoch_secs = now_epoch_secs().ok();
    next.last_snapshot = Some(plan.target.file_name.clone());
    if let Err(err) = state::save(paths, &next) {
        warn::emit(WarnEvent {
            code: "STATE_SAVE_FAILED",
            stage: Stage::Done.label(),
            action: "save-state",
            target: &paths.state_file().display().to_string(),
            reason: "state-write-failed",
            err: &format!("{err:#}"),
        });
    }
}

pub fn plan(
    ctx: &PipelineContext<'_>,
    fetcher: &dyn Fetcher,
    launcher: &dyn DriverLauncher,
) -> Result<RunPlan> {
    let state = load_state(ctx.paths);
    let fallback = pick_fallback(
        state.last_good_url.as_deref(),
        &ctx.config.source.fallback_url,
    );

    let link_selector = ctx.config.link_selector();
    let request = ResolveRequest {
        landing_url: ctx.landing_url,
        url_prefix: &ctx.config.source.url_prefix,
        strategy: ctx.strategy,
        click_selector: ctx.config.browser.click_selector.as_deref(),
        link_selector: &link_selector,
        wait_timeout: Duration::from_secs(ctx.config.browser.wait_timeout_secs),
    };
    let resolver = SourceResolver { fetcher, launcher };
    let resolution = resolver.resolve(
        &request,
        fallback.as_ref().map(|f| f.url.as_str()).unwrap_or_default(),
    )?;

    let (fallback_origin, expires_at) = match (resolution.via, fallback.as_ref()) {
        (ResolvedVia::Fallback, Some(choice)) => (Some(choice.origin), choice.expires_at),
        _ => (None, signed_url_expiry(&resolution.url)),
    };
    // A broken index only blocks the real run, at the write stage.
    let indexed = index::indexed_files(&ctx.paths.index_file).unwrap_or_else(|err| {
        log::warn!("planning without index names: {err:#}");
        BTreeSet::new()
    });
    let target = snapshot::pick_target(
        &ctx.config.archive.file_prefix,
        ctx.now,
        &ctx.paths.work_dir,
        &ctx.paths.snapshots_dir,
        &indexed,
    );

    Ok(RunPlan {
        resolution,
        fallback_origin,
        expires_at,
        target,
    })
}

fn run_stages(
    ctx: &PipelineContext<'_>,
    fetcher: &dyn Fetcher,
    launcher: &dyn DriverLauncher,
    stage: &mut Stage,
) -> Result<RunOutcome> {
    *stage = Stage::ResolvingUrl;
    let plan = plan(ctx, fetcher, launcher)?;
    log::info!(
        "resolved source via {} (expires {})",
        plan.resolution.via.label(),
        plan.expires_at
            .map(|e| e.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );

    *stage = Stage::Fetching;
    let bytes = fetcher
        .fetch(&plan.resolution.url)
        .map_err(|err| PipelineError::Fetch {
            url: plan.resolution.url.clone(),
            reason: format!("{err:#}"),
        })?;
    log::info!("fetched {} bytes", bytes.len());

    *stage = Stage::Decoding;
    let payload = decode::decode_payload(&bytes);
    log::info!(
        "decoded as {} with {} mojibake substitutions",
        payload.encoding.label(),
        payload.substitutions
    );

    *stage = Stage::WritingSnapshot;
    // Re-pick right before writing; the directory may have changed while
    // the download ran.
    let indexed = index::indexed_files(&ctx.paths.index_file)?;
    let target = snapshot::pick_target(
        &ctx.config.archive.file_prefix,
        ctx.now,
        &ctx.paths.work_dir,
        &ctx.paths.snapshots_dir,
        &indexed,
    );
    let written = snapshot::write_snapshot(&target, &payload.text)?;
    audit::record(
        ctx.paths,
        Stage::WritingSnapshot.label(),
        "ok",
        &format!(
            "{} bytes={} sha256={}",
            target.file_name, written.bytes, written.sha256
        ),
    );

    *stage = Stage::UpdatingIndex;
    let index = index::update(&ctx.paths.index_file, target.date, &target.file_name)?;
    if index.malformed_dropped > 0 {
        warn::emit(WarnEvent {
            code: "INDEX_ROWS_DROPPED",
            stage: Stage::UpdatingIndex.label(),
            action: "load-index",
            target: &ctx.paths.index_file.display().to_string(),
            reason: "malformed-rows",
            err: &format!("dropped={}", index.malformed_dropped),
        });
    }

    *stage = Stage::Done;
    let plan = RunPlan { target, ..plan };
    save_state(ctx.paths, &plan);
    audit::record(
        ctx.paths,
        Stage::Done.label(),
        "ok",
        &format!("{} rows={}", plan.target.file_name, index.rows),
    );

    Ok(RunOutcome {
        plan,
        encoding: payload.encoding,
        substitutions: payload.substitutions,
        passes: payload.passes,
        snapshot: written,
        index,
    })
}

/// The index is touched last, so a failed run never leaves a dangling row.
pub fn run(
    ctx: &PipelineContext<'_>,
    fetcher: &dyn Fetcher,
    launcher: &dyn DriverLauncher,
) -> Result<RunOutcome> {
    let mut stage = Stage::ResolvingUrl;
    match run_stages(ctx, fetcher, launcher, &mut stage) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            let code = err
                .downcast_ref::<PipelineError>()
                .map(|e| e.code().as_str())
                .unwrap_or("E000_UNKNOWN");
            audit::record(
                ctx.paths,
                Stage::Failed.label(),
                code,
                &format!("stage={} err={err:#}", stage.label()),
            );
            Err(err).with_context(|| format!("{code}: pipeline failed while {}", stage.label()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postal::audit::AuditEvent;
    use crate::source::resolver::testing::{FakeFetcher, FakeLauncher};
    use std::fs;
    use tempfile::tempdir;

    const LANDING: &str = "https://landing.example/opendata";
    const SIGNED: &str = "https://biptopendata.blob.core.windows.net/opendata/postalpoints.csv?sv=1&sig=abc";

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S")
            .expect("datetime")
    }

    fn landing_markup() -> Vec<u8> {
        format!(r#"<html><a href="{}">download</a></html>"#, SIGNED.replace('&', "&amp;"))
            .into_bytes()
    }

    fn ctx<'a>(
        paths: &'a ArchivePaths,
        config: &'a PostalConfig,
        now: NaiveDateTime,
    ) -> PipelineContext<'a> {
        PipelineContext {
            paths,
            config,
            now,
            strategy: ResolveStrategy::Pattern,
            landing_url: Some(LANDING),
        }
    }

    #[test]
    fn two_runs_on_one_day_keep_both_snapshots() {
        let tmp = tempdir().expect("tempdir");
        let paths = ArchivePaths::under(tmp.path().to_path_buf());
        let config = PostalConfig::default();
        let fetcher = FakeFetcher::default()
            .with(LANDING, &landing_markup())
            .with(SIGNED, "id,name\n1,CafÃ©\n".as_bytes());
        let launcher = FakeLauncher::revealing(None);

        let first = run(&ctx(&paths, &config, at("2025-06-01", "08:00:00")), &fetcher, &launcher)
            .expect("first run");
        let second = run(&ctx(&paths, &config, at("2025-06-01", "08:05:00")), &fetcher, &launcher)
            .expect("second run");

        assert_eq!(first.plan.resolution.url, SIGNED);
        assert_eq!(first.plan.resolution.via, ResolvedVia::Pattern);
        assert_eq!(first.substitutions, 1);
        assert_eq!(first.plan.target.file_name, "postalpoints_2025-06-01.csv");
        assert_eq!(second.plan.target.file_name, "postalpoints_2025-06-01_080500.csv");

        for name in ["postalpoints_2025-06-01.csv", "postalpoints_2025-06-01_080500.csv"] {
            assert_eq!(
                fs::read_to_string(paths.work_dir.join(name)).expect("working copy"),
                "id,name\n1,Café\n"
            );
            assert!(paths.snapshots_dir.join(name).is_file());
        }
        assert_eq!(
            fs::read_to_string(&paths.index_file).expect("index"),
            "date,file\n\
             2025-06-01,postalpoints_2025-06-01.csv\n\
             2025-06-01,postalpoints_2025-06-01_080500.csv\n"
        );
        assert_eq!(second.index.rows, 2);
    }

    #[test]
    fn fetch_failure_writes_nothing() {
        let tmp = tempdir().expect("tempdir");
        let paths = ArchivePaths::under(tmp.path().to_path_buf());
        let config = PostalConfig::default();
        let fetcher = FakeFetcher::default().with(LANDING, &landing_markup());
        let launcher = FakeLauncher::revealing(None);

        let err = run(&ctx(&paths, &config, at("2025-06-01", "08:00:00")), &fetcher, &launcher)
            .expect_err("fetch must fail");
        let rendered = format!("{err:#}");
        assert!(rendered.contains("E002_FETCH"));
        assert!(rendered.contains("fetching"));

        assert!(!paths.index_file.exists());
        assert!(!paths.work_dir.join("postalpoints_2025-06-01.csv").exists());
        assert!(!paths.snapshots_dir.exists());

        let audit_raw = fs::read_to_string(paths.audit_log()).expect("audit");
        let last: AuditEvent =
            serde_json::from_str(audit_raw.lines().last().expect("line")).expect("json");
        assert_eq!(last.phase, "failed");
        assert_eq!(last.status, "E002_FETCH");
    }

    #[test]
    fn landing_failure_uses_fallback_and_remembers_good_url() {
        let tmp = tempdir().expect("tempdir");
        let paths = ArchivePaths::under(tmp.path().to_path_buf());
        let mut config = PostalConfig::default();
        config.source.fallback_url = SIGNED.to_string();
        let fetcher = FakeFetcher::default().with(SIGNED, b"id\n1\n");
        let launcher = FakeLauncher::revealing(None);

        let outcome = run(&ctx(&paths, &config, at("2025-06-02", "07:00:00")), &fetcher, &launcher)
            .expect("run");
        assert_eq!(outcome.plan.resolution.via, ResolvedVia::Fallback);
        assert_eq!(outcome.plan.fallback_origin, Some("config"));

        let saved = state::load(&paths).expect("state");
        assert_eq!(saved.last_good_url.as_deref(), Some(SIGNED));
        assert_eq!(saved.last_resolved_via.as_deref(), Some("fallback"));
        assert_eq!(saved.last_snapshot.as_deref(), Some("postalpoints_2025-06-02.csv"));
    }

    #[test]
    fn plan_does_not_touch_the_archive() {
        let tmp = tempdir().expect("tempdir");
        let paths = ArchivePaths::under(tmp.path().to_path_buf());
        let config = PostalConfig::default();
        let fetcher = FakeFetcher::default().with(LANDING, &landing_markup());
        let launcher = FakeLauncher::revealing(None);

        let planned = plan(&ctx(&paths, &config, at("2025-06-01", "08:00:00")), &fetcher, &launcher)
            .expect("plan");
        assert_eq!(planned.resolution.url, SIGNED);
        assert_eq!(planned.target.file_name, "postalpoints_2025-06-01.csv");
        assert!(!paths.snapshots_dir.exists());
        assert!(!paths.state_dir.exists());
    }

    #[test]
    fn latin1_payload_is_archived_as_utf8() {
        let tmp = tempdir().expect("tempdir");
        let paths = ArchivePaths::under(tmp.path().to_path_buf());
        let config = PostalConfig::default();
        let fetcher = FakeFetcher::default()
            .with(LANDING, &landing_markup())
            .with(SIGNED, b"city\nLi\xe8ge\n");
        let launcher = FakeLauncher::revealing(None);

        let outcome = run(&ctx(&paths, &config, at("2025-06-01", "08:00:00")), &fetcher, &launcher)
            .expect("run");
        assert_eq!(outcome.encoding, SourceEncoding::Latin1);
        assert_eq!(
            fs::read_to_string(&outcome.snapshot.archive_path).expect("archive"),
            "city\nLiège\n"
        );
    }

    #[test]
    fn deleted_snapshot_name_is_not_reused() {
        let tmp = tempdir().expect("tempdir");
        let paths = ArchivePaths::under(tmp.path().to_path_buf());
        let config = PostalConfig::default();
        let fetcher = FakeFetcher::default()
            .with(LANDING, &landing_markup())
            .with(SIGNED, b"id\n1\n");
        let launcher = FakeLauncher::revealing(None);

        let first = run(&ctx(&paths, &config, at("2025-06-01", "08:00:00")), &fetcher, &launcher)
            .expect("first run");
        fs::remove_file(&first.snapshot.working_path).expect("remove working copy");
        fs::remove_file(&first.snapshot.archive_path).expect("remove archive copy");

        let second = run(&ctx(&paths, &config, at("2025-06-01", "09:30:00")), &fetcher, &launcher)
            .expect("second run");
        assert_eq!(second.plan.target.file_name, "postalpoints_2025-06-01_093000.csv");
        assert_eq!(
            fs::read_to_string(&paths.index_file).expect("index"),
            "date,file\n\
             2025-06-01,postalpoints_2025-06-01.csv\n\
             2025-06-01,postalpoints_2025-06-01_093000.csv\n"
        );
    }

    #[test]
    fn non_utf8_index_does_not_block_the_next_run() {
        let tmp = tempdir().expect("tempdir");
        let paths = ArchivePaths::under(tmp.path().to_path_buf());
        fs::create_dir_all(&paths.snapshots_dir).expect("mkdir");
        fs::write(
            &paths.index_file,
            b"date,file\n2025-05-31,postalpoints_2025-05-31.csv\n2025-05-31,r\xe9sum\xe9.csv\n"
                .as_slice(),
        )
        .expect("seed index");
        let config = PostalConfig::default();
        let fetcher = FakeFetcher::default()
            .with(LANDING, &landing_markup())
            .with(SIGNED, b"id\n1\n");
        let launcher = FakeLauncher::revealing(None);

        let outcome = run(&ctx(&paths, &config, at("2025-06-01", "08:00:00")), &fetcher, &launcher)
            .expect("run");
        assert_eq!(outcome.index.malformed_dropped, 1);
        assert_eq!(outcome.index.rows, 2);
    }

    #[test]
    fn unreadable_index_fails_with_index_code_before_writing() {
        let tmp = tempdir().expect("tempdir");
        let paths = ArchivePaths::under(tmp.path().to_path_buf());
        fs::create_dir_all(&paths.index_file).expect("directory in the way");
        let config = PostalConfig::default();
        let fetcher = FakeFetcher::default()
            .with(LANDING, &landing_markup())
            .with(SIGNED, b"id\n1\n");
        let launcher = FakeLauncher::revealing(None);

        let err = run(&ctx(&paths, &config, at("2025-06-01", "08:00:00")), &fetcher, &launcher)
            .expect_err("index unreadable");
        assert!(format!("{err:#}").contains("E004_INDEX"));
        assert!(!paths.work_dir.join("postalpoints_2025-06-01.csv").exists());
    }
}
