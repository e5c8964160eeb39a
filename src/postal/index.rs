use crate::error::PipelineError;
use crate::postal::snapshot::parse_snapshot_date;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

pub const INDEX_HEADER: [&str; 2] = ["date", "file"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub date: NaiveDate,
    pub file: String,
}

#[derive(Debug, Clone, Default)]
pub struct IndexLoad {
    pub entries: Vec<IndexEntry>,
    pub malformed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct IndexUpdate {
    pub rows: usize,
    pub added: usize,
    pub malformed_dropped: usize,
}

fn parse_entry(record: &StringRecord) -> Option<IndexEntry> {
    let date = record.get(0).map(str::trim).filter(|v| !v.is_empty())?;
    let file = record.get(1).map(str::trim).filter(|v| !v.is_empty())?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(IndexEntry {
        date,
        file: file.to_string(),
    })
}

fn is_header(record: &StringRecord) -> bool {
    match (record.get(0), record.get(1)) {
        (Some(date), Some(file)) => {
            date.trim().eq_ignore_ascii_case(INDEX_HEADER[0])
                && file.trim().eq_ignore_ascii_case(INDEX_HEADER[1])
        }
        _ => false,
    }
}

fn index_error(path: &Path, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::Index {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

/// Read the index. A missing file is an empty index. Rows that are not
/// UTF-8, lack a field or carry an unparseable date are counted and dropped.
pub fn load(path: &Path) -> Result<IndexLoad> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(IndexLoad::default()),
        Err(err) => return Err(index_error(path, err).into()),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let mut out = IndexLoad::default();
    for (i, record) in reader.byte_records().enumerate() {
        let record = match record.map(StringRecord::from_byte_record) {
            Ok(Ok(record)) => record,
            Ok(Err(err)) => {
                log::debug!("dropping index row {}: {}", i + 1, err.utf8_error());
                out.malformed += 1;
                continue;
            }
            Err(err) => {
                log::debug!("dropping index row {}: {err}", i + 1);
                out.malformed += 1;
                continue;
            }
        };
        if i == 0 && is_header(&record) {
            continue;
        }
        match parse_entry(&record) {
            Some(entry) => out.entries.push(entry),
            None => {
                log::debug!("dropping malformed index row {}: {:?}", i + 1, record);
                out.malformed += 1;
            }
        }
    }
    Ok(out)
}

pub fn indexed_files(path: &Path) -> Result<BTreeSet<String>> {
    Ok(load(path)?
        .entries
        .into_iter()
        .map(|entry| entry.file)
        .collect())
}

fn render(path: &Path, entries: &[IndexEntry]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(INDEX_HEADER)
        .map_err(|err| index_error(path, err))?;
    for entry in entries {
        let date = entry.date.format("%Y-%m-%d").to_string();
        writer
            .write_record([date.as_str(), entry.file.as_str()])
            .map_err(|err| index_error(path, err))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| index_error(path, err.error()))?;
    Ok(bytes)
}

/// Replace the index file in one rename so readers never see a partial file.
fn write_atomic(path: &Path, entries: &[IndexEntry]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|err| index_error(dir, err))?;

    let rendered = render(path, entries)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|err| index_error(path, err))?;
    tmp.write_all(&rendered)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|err| index_error(path, err))?;
    tmp.persist(path).map_err(|err| index_error(path, err.error))?;
    Ok(())
}

fn merge_and_write(path: &Path, new_entries: Vec<IndexEntry>) -> Result<IndexUpdate> {
    let IndexLoad {
        mut entries,
        malformed,
    } = load(path)?;
    let added = new_entries.len();
    entries.extend(new_entries);
    // Stable: rows sharing a date keep their insertion order.
    entries.sort_by_key(|entry| entry.date);
    write_atomic(path, &entries)?;

    Ok(IndexUpdate {
        rows: entries.len(),
        added,
        malformed_dropped: malformed,
    })
}

pub fn update(path: &Path, date: NaiveDate, file: &str) -> Result<IndexUpdate> {
    merge_and_write(
        path,
        vec![IndexEntry {
            date,
            file: file.to_string(),
        }],
    )
}

pub fn rebuild(path: &Path, snapshots_dir: &Path, prefix: &str) -> Result<IndexUpdate> {
    let known = indexed_files(path)?;

    let mut found = Vec::new();
    if snapshots_dir.exists() {
        for dir_entry in fs::read_dir(snapshots_dir)
            .with_context(|| format!("failed to read {}", snapshots_dir.display()))?
        {
            let file_path = dir_entry?.path();
            if !file_path.is_file() {
                continue;
            }
            let Some(name) = file_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if known.contains(name) {
                continue;
            }
            if let Some(date) = parse_snapshot_date(prefix, name) {
                found.push(IndexEntry {
                    date,
                    file: name.to_string(),
                });
            }
        }
    }
    // Directory order is arbitrary; names sort chronologically within a day.
    found.sort_by(|a, b| a.file.cmp(&b.file));
    merge_and_write(path, found)
}
