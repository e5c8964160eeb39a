pub mod fetch;
pub mod index;
pub mod repair;
pub mod resolve;
pub mod stats;
pub mod status;

use chrono::Utc;
use serde::Serialize;
use std::time::Duration;

use crate::postal::config::PostalConfig;
use crate::postal::pipeline::RunPlan;
use crate::source::browser::ChromeLauncher;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

pub fn chrome_launcher(config: &PostalConfig) -> ChromeLauncher {
    ChromeLauncher {
        binary: config.browser.binary.clone(),
        headless: config.browser.headless,
        // Leave the browser room to finish the click-and-wait sequence.
        idle_timeout: Duration::from_secs(config.browser.wait_timeout_secs.saturating_mul(4)),
    }
}

pub fn describe_plan(report: &mut CommandReport, plan: &RunPlan) {
    report.detail(format!("source_url={}", plan.resolution.url));
    report.detail(format!("resolved_via={}", plan.resolution.via.label()));
    if let Some(origin) = plan.fallback_origin {
        report.detail(format!("fallback_origin={origin}"));
    }
    for failure in &plan.resolution.failures {
        report.detail(format!("strategy_failed={failure}"));
    }
    match plan.expires_at {
        Some(expiry) => {
            report.detail(format!("url_expires_at={}", expiry.to_rfc3339()));
            if expiry <= Utc::now() {
                report.detail("url_expired=true (fetch may be rejected)");
            }
        }
        None => report.detail("url_expires_at=unknown"),
    }
}
