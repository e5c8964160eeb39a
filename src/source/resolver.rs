use crate::error::{PipelineError, ResolutionError};
use crate::postal::config::ResolveStrategy;
use crate::source::browser::{DriverLauncher, PageDriver};
use crate::source::html;
use crate::source::http::Fetcher;
use regex::Regex;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ResolveRequest<'a> {
    pub landing_url: Option<&'a str>,
    pub url_prefix: &'a str,
    pub strategy: ResolveStrategy,
    pub click_selector: Option<&'a str>,
    pub link_selector: &'a str,
    pub wait_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedVia {
    Pattern,
    Browser,
    Fallback,
}

impl ResolvedVia {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Browser => "browser",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub url: String,
    pub via: ResolvedVia,
    pub failures: Vec<String>,
}

fn signed_url_pattern(prefix: &str) -> Option<Regex> {
    Regex::new(&format!(r#"{}\?[^"'<>\s]+"#, regex::escape(prefix))).ok()
}

pub fn find_signed_url(markup: &str, prefix: &str) -> Option<String> {
    let pattern = signed_url_pattern(prefix)?;
    let unescaped = html::unescape(markup);
    pattern
        .find(&unescaped)
        .map(|m| m.as_str().to_string())
}

pub fn resolve_by_pattern(
    fetcher: &dyn Fetcher,
    landing_url: &str,
    prefix: &str,
) -> Result<String, ResolutionError> {
    let body = fetcher
        .fetch(landing_url)
        .map_err(|err| ResolutionError::LandingUnavailable(format!("{err:#}")))?;
    let markup = String::from_utf8_lossy(&body);
    find_signed_url(&markup, prefix).ok_or_else(|| ResolutionError::NoMatch {
        prefix: prefix.to_string(),
    })
}

pub fn resolve_interactive(
    driver: &mut dyn PageDriver,
    landing_url: &str,
    click_selector: Option<&str>,
    link_selector: &str,
    timeout: Duration,
) -> Result<String, ResolutionError> {
    driver.load(landing_url)?;
    if let Some(selector) = click_selector {
        driver.click(selector, timeout)?;
    }
    let href = driver.wait_for_visible(link_selector, timeout)?;
    let href = href.trim();
    if href.is_empty() {
        return Err(ResolutionError::EmptyHref {
            selector: link_selector.to_string(),
        });
    }
    Ok(html::unescape(href))
}

pub fn resolve_with_browser(
    launcher: &dyn DriverLauncher,
    landing_url: &str,
    click_selector: Option<&str>,
    link_selector: &str,
    timeout: Duration,
) -> Result<String, ResolutionError> {
    let mut driver = launcher.launch()?;
    resolve_interactive(
        driver.as_mut(),
        landing_url,
        click_selector,
        link_selector,
        timeout,
    )
}

pub struct SourceResolver<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub launcher: &'a dyn DriverLauncher,
}

impl SourceResolver<'_> {
    fn try_strategies(
        &self,
        req: &ResolveRequest<'_>,
        failures: &mut Vec<String>,
    ) -> Option<(String, ResolvedVia)> {
        let plan: &[ResolvedVia] = match req.strategy {
            ResolveStrategy::Auto => &[ResolvedVia::Pattern, ResolvedVia::Browser],
            ResolveStrategy::Pattern => &[ResolvedVia::Pattern],
            ResolveStrategy::Browser => &[ResolvedVia::Browser],
            ResolveStrategy::Fallback => &[],
        };
        if plan.is_empty() {
            return None;
        }
        let Some(landing) = req.landing_url else {
            failures.push(format!("landing: {}", ResolutionError::NotConfigured));
            return None;
        };

        for via in plan {
            let attempt = match via {
                ResolvedVia::Pattern => resolve_by_pattern(self.fetcher, landing, req.url_prefix),
                ResolvedVia::Browser => resolve_with_browser(
                    self.launcher,
                    landing,
                    req.click_selector,
                    req.link_selector,
                    req.wait_timeout,
                ),
                ResolvedVia::Fallback => continue,
            };
            match attempt {
                Ok(url) => return Some((url, *via)),
                Err(err) => {
                    log::debug!("{} resolution failed: {err}", via.label());
                    failures.push(format!("{}: {err}", via.label()));
                }
            }
        }
        None
    }

    pub fn resolve(
        &self,
        req: &ResolveRequest<'_>,
        fallback_url: &str,
    ) -> Result<Resolution, PipelineError> {
        let mut failures = Vec::new();
        if let Some((url, via)) = self.try_strategies(req, &mut failures) {
            return Ok(Resolution { url, via, failures });
        }

        let fallback = fallback_url.trim();
        if fallback.is_empty() {
            return Err(PipelineError::NoSourceUrl(if failures.is_empty() {
                "no fallback url configured".to_string()
            } else {
                failures.join("; ")
            }));
        }
        log::debug!("using fallback url");
        Ok(Resolution {
            url: fallback.to_string(),
            via: ResolvedVia::Fallback,
            failures,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use anyhow::Result;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Default)]
    pub struct FakeFetcher {
        pub bodies: BTreeMap<String, Vec<u8>>,
        pub requested: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), body.to_vec());
            self
        }
    }

    impl Fetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>> {
            self.requested.borrow_mut().push(url.to_string());
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("connection refused: {url}"))
        }
    }

    #[derive(Debug, Default)]
    pub struct DriverLog {
        pub calls: Vec<String>,
        pub launched: usize,
        pub closed: usize,
    }

    pub struct FakeDriver {
        log: Rc<RefCell<DriverLog>>,
        href: Option<String>,
        fail_load: bool,
    }

    impl PageDriver for FakeDriver {
        fn load(&mut self, url: &str) -> Result<(), ResolutionError> {
            self.log.borrow_mut().calls.push(format!("load {url}"));
            if self.fail_load {
                return Err(ResolutionError::LandingUnavailable(url.to_string()));
            }
            Ok(())
        }

        fn click(&mut self, selector: &str, _timeout: Duration) -> Result<(), ResolutionError> {
            self.log.borrow_mut().calls.push(format!("click {selector}"));
            Ok(())
        }

        fn wait_for_visible(
            &mut self,
            selector: &str,
            timeout: Duration,
        ) -> Result<String, ResolutionError> {
            self.log.borrow_mut().calls.push(format!("wait {selector}"));
            self.href.clone().ok_or_else(|| ResolutionError::Timeout {
                selector: selector.to_string(),
                secs: timeout.as_secs(),
            })
        }
    }

    impl Drop for FakeDriver {
        fn drop(&mut self) {
            self.log.borrow_mut().closed += 1;
        }
    }

    pub struct FakeLauncher {
        pub log: Rc<RefCell<DriverLog>>,
        pub href: Option<String>,
        pub fail_load: bool,
    }

    impl FakeLauncher {
        pub fn revealing(href: Option<&str>) -> Self {
            Self {
                log: Rc::new(RefCell::new(DriverLog::default())),
                href: href.map(str::to_string),
                fail_load: false,
            }
        }
    }

    impl DriverLauncher for FakeLauncher {
        fn launch(&self) -> Result<Box<dyn PageDriver>, ResolutionError> {
            self.log.borrow_mut().launched += 1;
            Ok(Box::new(FakeDriver {
                log: Rc::clone(&self.log),
                href: self.href.clone(),
                fail_load: self.fail_load,
            }))
        }
    }
}
