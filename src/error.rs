use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no landing page configured")]
    NotConfigured,
    #[error("landing page unavailable: {0}")]
    LandingUnavailable(String),
    #[error("no link matching {prefix} found on landing page")]
    NoMatch { prefix: String },
    #[error("`{selector}` did not become visible within {secs}s")]
    Timeout { selector: String, secs: u64 },
    #[error("link `{selector}` has an empty href")]
    EmptyHref { selector: String },
    #[error("browser session failed: {0}")]
    Browser(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no usable source url: {0}")]
    NoSourceUrl(String),
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },
    #[error("failed to write {path}: {reason}")]
    Write { path: String, reason: String },
    #[error("failed to update index {path}: {reason}")]
    Index { path: String, reason: String },
}

impl PipelineError {
    pub fn code(&self) -> ArchiveErrorCode {
        match self {
            Self::NoSourceUrl(_) => ArchiveErrorCode::E001Resolution,
            Self::Fetch { .. } => ArchiveErrorCode::E002Fetch,
            Self::Write { .. } => ArchiveErrorCode::E003Write,
            Self::Index { .. } => ArchiveErrorCode::E004Index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveErrorCode {
    E001Resolution,
    E002Fetch,
    E003Write,
    E004Index,
}

impl ArchiveErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Resolution => "E001_RESOLUTION",
            Self::E002Fetch => "E002_FETCH",
            Self::E003Write => "E003_WRITE",
            Self::E004Index => "E004_INDEX",
        }
    }
}
