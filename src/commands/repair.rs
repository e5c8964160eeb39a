use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::commands::CommandReport;
use crate::postal::decode;

#[derive(Debug, Clone)]
pub struct RepairOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
}

fn write_atomic(path: &Path, text: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to stage {}", path.display()))?;
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

pub fn run(opts: &RepairOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("repair");
    let bytes =
        fs::read(&opts.input).with_context(|| format!("failed to read {}", opts.input.display()))?;
    let payload = decode::decode_payload(&bytes);
    let target = opts.output.as_deref().unwrap_or(&opts.input);

    report.detail(format!("input={}", opts.input.display()));
    report.detail(format!("encoding={}", payload.encoding.label()));
    report.detail(format!(
        "mojibake_substitutions={} passes={}",
        payload.substitutions, payload.passes
    ));

    let unchanged = payload.text.as_bytes() == bytes.as_slice();
    if unchanged && target == opts.input.as_path() {
        report.detail("already clean; nothing written");
        return Ok(report);
    }

    write_atomic(target, &payload.text)?;
    report.detail(format!("output={}", target.display()));
    Ok(report)
}
