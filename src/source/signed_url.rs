use chrono::{DateTime, Utc};
use url::Url;

pub fn signed_url_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = Url::parse(raw).ok()?;
    let (_, expiry) = parsed.query_pairs().find(|(key, _)| key == "se")?;
    DateTime::parse_from_rfc3339(&expiry)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackChoice {
    pub url: String,
    pub origin: &'static str,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Choose between the last URL that worked and the configured one: the
/// later expiry wins, unknown expiry ranks lowest, ties keep the stored URL.
pub fn pick_fallback(stored: Option<&str>, configured: &str) -> Option<FallbackChoice> {
    let candidates = [(stored, "state"), (Some(configured), "config")];
    let mut best: Option<FallbackChoice> = None;
    for (url, origin) in candidates {
        let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
            continue;
        };
        let expires_at = signed_url_expiry(url);
        let better = match &best {
            None => true,
            Some(current) => expires_at > current.expires_at,
        };
        if better {
            best = Some(FallbackChoice {
                url: url.to_string(),
                origin,
                expires_at,
            });
        }
    }
    best
}
