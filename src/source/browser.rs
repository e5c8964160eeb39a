use crate::error::ResolutionError;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CHROME_CANDIDATES: [&str; 4] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
];
const IS_VISIBLE_JS: &str =
    "function() { return !!(this.offsetWidth || this.offsetHeight || this.getClientRects().length); }";

/// Implementations release their browser resources on drop.
pub trait PageDriver {
    fn load(&mut self, url: &str) -> Result<(), ResolutionError>;
    fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), ResolutionError>;
    fn wait_for_visible(&mut self, selector: &str, timeout: Duration)
    -> Result<String, ResolutionError>;
}

pub trait DriverLauncher {
    fn launch(&self) -> Result<Box<dyn PageDriver>, ResolutionError>;
}

fn browser_error(context: &str, err: impl std::fmt::Display) -> ResolutionError {
    ResolutionError::Browser(format!("{context}: {err}"))
}

fn is_container() -> bool {
    std::env::var("POSTALPOINTS_CONTAINER").is_ok() || Path::new("/.dockerenv").exists()
}

fn discover_chrome(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }
    CHROME_CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
}

pub struct ChromeLauncher {
    pub binary: Option<PathBuf>,
    pub headless: bool,
    pub idle_timeout: Duration,
}

impl DriverLauncher for ChromeLauncher {
    fn launch(&self) -> Result<Box<dyn PageDriver>, ResolutionError> {
        let path = discover_chrome(self.binary.as_deref());
        log::debug!(
            "launching chrome binary={} headless={}",
            path.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "auto".to_string()),
            self.headless
        );

        let options = LaunchOptions::default_builder()
            .headless(self.headless)
            .sandbox(!is_container())
            .path(path)
            .idle_browser_timeout(self.idle_timeout)
            .build()
            .map_err(|e| browser_error("failed to build chrome launch options", e))?;
        let browser =
            Browser::new(options).map_err(|e| browser_error("failed to launch chrome", e))?;
        let tab = browser
            .new_tab()
            .map_err(|e| browser_error("failed to open tab", e))?;

        Ok(Box::new(ChromeDriver { browser, tab }))
    }
}

pub struct ChromeDriver {
    browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    fn element_is_visible(&self, selector: &str) -> Option<String> {
        let element = self.tab.find_element(selector).ok()?;
        let visible = element
            .call_js_fn(IS_VISIBLE_JS, vec![], false)
            .ok()?
            .value
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !visible {
            return None;
        }
        let href = element
            .get_attribute_value("href")
            .ok()
            .flatten()
            .unwrap_or_default();
        Some(href)
    }
}

impl PageDriver for ChromeDriver {
    fn load(&mut self, url: &str) -> Result<(), ResolutionError> {
        self.tab
            .navigate_to(url)
            .map_err(|e| ResolutionError::LandingUnavailable(format!("{url}: {e}")))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| ResolutionError::LandingUnavailable(format!("{url}: {e}")))?;
        Ok(())
    }

    fn click(&mut self, selector: &str, timeout: Duration) -> Result<(), ResolutionError> {
        let element = self
            .tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|_| ResolutionError::Timeout {
                selector: selector.to_string(),
                secs: timeout.as_secs(),
            })?;
        element
            .click()
            .map_err(|e| browser_error(&format!("failed to click `{selector}`"), e))?;
        Ok(())
    }

    fn wait_for_visible(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<String, ResolutionError> {
        let started = Instant::now();
        loop {
            if let Some(href) = self.element_is_visible(selector) {
                return Ok(href);
            }
            if started.elapsed() >= timeout {
                return Err(ResolutionError::Timeout {
                    selector: selector.to_string(),
                    secs: timeout.as_secs(),
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        let _ = self.tab.close(false);
        log::debug!(
            "closed chrome session (pid {:?})",
            self.browser.get_process_id()
        );
    }
}
