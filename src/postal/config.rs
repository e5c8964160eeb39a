use crate::postal::paths::ArchivePaths;
use anyhow::{Result, anyhow};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_URL_PREFIX: &str =
    "https://biptopendata.blob.core.windows.net/opendata/postalpoints.csv";

/// Last signed URL known to work. The signature covers the whole query
/// string, so it is kept verbatim.
pub const DEFAULT_FALLBACK_URL: &str = concat!(
    "https://biptopendata.blob.core.windows.net/opendata/postalpoints.csv",
    "?sv=2024-11-04&se=2026-01-02T22%3A00%3A27Z&sr=b&sp=r",
    "&sig=syM5luCTzr0nW%2FR1JJE6793YzMgdJbV2fjeoAp9pyX4%3D",
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResolveStrategy {
    /// Pattern scan first, then the browser, then the fallback URL.
    Auto,
    /// Scan the landing page markup only.
    Pattern,
    /// Drive a headless browser through the landing page only.
    Browser,
    /// Skip the landing page and use the best known URL.
    Fallback,
}

impl ResolveStrategy {
    pub fn label(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Pattern => "pattern",
            Self::Browser => "browser",
            Self::Fallback => "fallback",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "pattern" => Some(Self::Pattern),
            "browser" => Some(Self::Browser),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub landing_url: Option<String>,
    pub fallback_url: String,
    pub url_prefix: String,
    pub strategy: ResolveStrategy,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            landing_url: None,
            fallback_url: DEFAULT_FALLBACK_URL.to_string(),
            url_prefix: DEFAULT_URL_PREFIX.to_string(),
            strategy: ResolveStrategy::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub binary: Option<PathBuf>,
    pub click_selector: Option<String>,
    pub link_selector: Option<String>,
    pub wait_timeout_secs: u64,
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary: None,
            click_selector: None,
            link_selector: None,
            wait_timeout_secs: 15,
            headless: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub file_prefix: String,
    pub timezone: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            file_prefix: "postalpoints".to_string(),
            timezone: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PostalConfig {
    pub source: SourceConfig,
    pub browser: BrowserConfig,
    pub fetch: FetchConfig,
    pub archive: ArchiveConfig,
}

impl PostalConfig {
    pub fn link_selector(&self) -> String {
        if let Some(custom) = self.browser.link_selector.as_deref() {
            return custom.to_string();
        }
        let host_path = self
            .source
            .url_prefix
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.source.url_prefix);
        format!("a[href*=\"{host_path}\"]")
    }

    pub fn timezone(&self) -> Result<Option<Tz>> {
        let Some(name) = self.archive.timezone.as_deref() else {
            return Ok(None);
        };
        name.parse::<Tz>()
            .map(Some)
            .map_err(|err| anyhow!("invalid archive timezone `{name}`: {err}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialPostalConfig {
    source: Option<SourceConfig>,
    browser: Option<BrowserConfig>,
    fetch: Option<FetchConfig>,
    archive: Option<ArchiveConfig>,
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    env_non_empty(var).unwrap_or_else(|| fallback.to_string())
}

fn validate(cfg: &PostalConfig) -> Result<()> {
    let prefix = cfg.source.url_prefix.as_str();
    if !(prefix.starts_with("https://") || prefix.starts_with("http://")) {
        return Err(anyhow!(
            "invalid source url prefix `{prefix}`: must start with http:// or https://"
        ));
    }
    if prefix.contains('?') {
        return Err(anyhow!(
            "invalid source url prefix `{prefix}`: must not carry a query string"
        ));
    }
    if cfg.source.fallback_url.trim().is_empty() {
        return Err(anyhow!("invalid fallback url: cannot be empty"));
    }
    if cfg.browser.wait_timeout_secs == 0 {
        return Err(anyhow!("invalid browser wait timeout: must be >= 1 second"));
    }
    if cfg.fetch.timeout_secs == 0 {
        return Err(anyhow!("invalid fetch timeout: must be >= 1 second"));
    }
    let file_prefix = cfg.archive.file_prefix.trim();
    if file_prefix.is_empty() || file_prefix.contains(['/', '\\']) {
        return Err(anyhow!(
            "invalid archive file prefix: must be a non-empty file name fragment"
        ));
    }
    cfg.timezone()?;
    Ok(())
}

fn resolve_config_path(paths: &ArchivePaths) -> PathBuf {
    match env_non_empty("POSTALPOINTS_CONFIG_PATH") {
        Some(custom) => PathBuf::from(custom),
        None => paths.home.join("postalpoints.toml"),
    }
}

fn merge_file_config(base: &mut PostalConfig, paths: &ArchivePaths) -> Result<()> {
    let path = resolve_config_path(paths);
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    let parsed: PartialPostalConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))?;
    if let Some(source) = parsed.source {
        base.source = source;
    }
    if let Some(browser) = parsed.browser {
        base.browser = browser;
    }
    if let Some(fetch) = parsed.fetch {
        base.fetch = fetch;
    }
    if let Some(archive) = parsed.archive {
        base.archive = archive;
    }
    Ok(())
}

fn merge_env(cfg: &mut PostalConfig) -> Result<()> {
    if let Some(landing) = env_non_empty("POSTALPOINTS_LANDING_URL") {
        cfg.source.landing_url = Some(landing);
    }
    cfg.source.fallback_url = env_or_string("POSTALPOINTS_FALLBACK_URL", &cfg.source.fallback_url);
    cfg.source.url_prefix = env_or_string("POSTALPOINTS_URL_PREFIX", &cfg.source.url_prefix);
    if let Some(raw) = env_non_empty("POSTALPOINTS_STRATEGY") {
        cfg.source.strategy = ResolveStrategy::parse(&raw).ok_or_else(|| {
            anyhow!("invalid POSTALPOINTS_STRATEGY `{raw}`: use auto, pattern, browser or fallback")
        })?;
    }

    if let Some(binary) = env_non_empty("POSTALPOINTS_BROWSER_BIN") {
        cfg.browser.binary = Some(PathBuf::from(binary));
    }
    if let Some(selector) = env_non_empty("POSTALPOINTS_CLICK_SELECTOR") {
        cfg.browser.click_selector = Some(selector);
    }
    if let Some(selector) = env_non_empty("POSTALPOINTS_LINK_SELECTOR") {
        cfg.browser.link_selector = Some(selector);
    }
    cfg.browser.wait_timeout_secs =
        env_or_u64("POSTALPOINTS_WAIT_TIMEOUT_SECS", cfg.browser.wait_timeout_secs);
    cfg.browser.headless = env_or_bool("POSTALPOINTS_HEADLESS", cfg.browser.headless);

    cfg.fetch.timeout_secs = env_or_u64("POSTALPOINTS_FETCH_TIMEOUT_SECS", cfg.fetch.timeout_secs);

    cfg.archive.file_prefix =
        env_or_string("POSTALPOINTS_FILE_PREFIX", &cfg.archive.file_prefix);
    if let Some(tz) = env_non_empty("POSTALPOINTS_TIMEZONE") {
        cfg.archive.timezone = Some(tz);
    }
    Ok(())
}

pub fn load_config(paths: &ArchivePaths) -> Result<PostalConfig> {
    let mut cfg = PostalConfig::default();
    merge_file_config(&mut cfg, paths)?;
    merge_env(&mut cfg)?;
    validate(&cfg)?;
    Ok(cfg)
}
