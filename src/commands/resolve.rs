use anyhow::Result;

use crate::commands::{CommandReport, chrome_launcher, describe_plan};
use crate::postal::config::{ResolveStrategy, load_config};
use crate::postal::paths::resolve_paths;
use crate::postal::pipeline::{self, PipelineContext};
use crate::source::http::HttpFetcher;

#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub strategy: Option<ResolveStrategy>,
    pub landing_url: Option<String>,
}

pub fn run(opts: &ResolveOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let config = load_config(&paths)?;
    let mut report = CommandReport::new("resolve");

    let strategy = opts.strategy.unwrap_or(config.source.strategy);
    let landing_url = opts
        .landing_url
        .as_deref()
        .or(config.source.landing_url.as_deref());
    report.detail(format!("strategy={}", strategy.label()));
    report.detail(format!("landing_url={}", landing_url.unwrap_or("none")));

    let ctx = PipelineContext {
        paths: &paths,
        config: &config,
        now: pipeline::archive_now(&config)?,
        strategy,
        landing_url,
    };
    let fetcher = HttpFetcher::new(config.fetch.timeout_secs)?;
    let launcher = chrome_launcher(&config);
    let plan = pipeline::plan(&ctx, &fetcher, &launcher)?;
    describe_plan(&mut report, &plan);

    Ok(report)
}
