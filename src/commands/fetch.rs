use anyhow::Result;

use crate::commands::{CommandReport, chrome_launcher, describe_plan};
use crate::postal::config::{ResolveStrategy, load_config};
use crate::postal::paths::resolve_paths;
use crate::postal::pipeline::{self, PipelineContext};
use crate::source::http::HttpFetcher;

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub strategy: Option<ResolveStrategy>,
    pub landing_url: Option<String>,
    pub dry_run: bool,
}

pub fn run(opts: &FetchOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let config = load_config(&paths)?;
    let mut report = CommandReport::new("fetch");

    let strategy = opts.strategy.unwrap_or(config.source.strategy);
    let ctx = PipelineContext {
        paths: &paths,
        config: &config,
        now: pipeline::archive_now(&config)?,
        strategy,
        landing_url: opts
            .landing_url
            .as_deref()
            .or(config.source.landing_url.as_deref()),
    };
    let fetcher = HttpFetcher::new(config.fetch.timeout_secs)?;
    let launcher = chrome_launcher(&config);
    report.detail(format!("strategy={}", strategy.label()));

    if opts.dry_run {
        let plan = pipeline::plan(&ctx, &fetcher, &launcher)?;
        describe_plan(&mut report, &plan);
        report.detail(format!(
            "dry-run: would write {} and {}",
            plan.target.working_path.display(),
            plan.target.archive_path.display()
        ));
        report.detail(format!(
            "dry-run: would add {},{} to {}",
            plan.target.date.format("%Y-%m-%d"),
            plan.target.file_name,
            paths.index_file.display()
        ));
        return Ok(report);
    }

    let outcome = pipeline::run(&ctx, &fetcher, &launcher)?;
    describe_plan(&mut report, &outcome.plan);
    report.detail(format!("encoding={}", outcome.encoding.label()));
    report.detail(format!(
        "mojibake_substitutions={} passes={}",
        outcome.substitutions, outcome.passes
    ));
    report.detail(format!("snapshot={}", outcome.snapshot.working_path.display()));
    report.detail(format!("archived={}", outcome.snapshot.archive_path.display()));
    report.detail(format!(
        "bytes={} sha256={}",
        outcome.snapshot.bytes, outcome.snapshot.sha256
    ));
    report.detail(format!(
        "index={} rows={}",
        paths.index_file.display(),
        outcome.index.rows
    ));
    if outcome.index.malformed_dropped > 0 {
        report.detail(format!(
            "index_malformed_rows_dropped={}",
            outcome.index.malformed_dropped
        ));
    }

    Ok(report)
}
