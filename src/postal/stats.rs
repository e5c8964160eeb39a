use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct CategoryCounts {
    pub field: String,
    pub rows: usize,
    pub counts: BTreeMap<String, usize>,
}

impl CategoryCounts {
    pub fn ranked(&self) -> Vec<(&str, usize)> {
        let mut ranked: Vec<(&str, usize)> = self
            .counts
            .iter()
            .map(|(value, count)| (value.as_str(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

pub fn count_by_field(text: &str, field: &str, only: Option<&str>) -> Result<CategoryCounts> {
    if text.trim().is_empty() {
        bail!("snapshot is empty");
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(text))
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .context("failed to read snapshot header")?
        .clone();
    let Some(column) = headers
        .iter()
        .position(|name| name.trim().eq_ignore_ascii_case(field.trim()))
    else {
        bail!(
            "column `{field}` not found (available: {})",
            headers
                .iter()
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(", ")
        );
    };

    let mut out = CategoryCounts {
        field: headers[column].trim().to_string(),
        ..CategoryCounts::default()
    };
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to read snapshot row {}", i + 2))?;
        let value = record.get(column).map(str::trim).unwrap_or_default();
        if only.is_some_and(|wanted| wanted.trim() != value) {
            continue;
        }
        out.rows += 1;
        *out.counts.entry(value.to_string()).or_default() += 1;
    }
    Ok(out)
}
