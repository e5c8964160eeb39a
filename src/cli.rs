use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::fetch::FetchOptions;
use crate::commands::index::IndexOptions;
use crate::commands::repair::RepairOptions;
use crate::commands::resolve::ResolveOptions;
use crate::commands::stats::StatsOptions;
use crate::commands::{self, CommandReport};
use crate::logging;
use crate::postal::config::ResolveStrategy;

#[derive(Parser)]
#[command(name = "postalpoints")]
#[command(about = "Archive dated snapshots of the postal points open-data CSV")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Print the report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve, download, repair and archive today's snapshot
    Fetch {
        /// Override the configured resolution strategy
        #[arg(long, value_enum)]
        strategy: Option<ResolveStrategy>,

        /// Override the configured landing page
        #[arg(long)]
        landing_url: Option<String>,

        /// Resolve and plan file names without downloading
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve the current download URL only
    Resolve {
        #[arg(long, value_enum)]
        strategy: Option<ResolveStrategy>,

        #[arg(long)]
        landing_url: Option<String>,
    },

    /// Decode and repair an existing CSV file
    Repair {
        file: PathBuf,

        /// Write here instead of in place
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List the snapshot index
    Index {
        /// Register snapshot files missing from the index
        #[arg(long)]
        rebuild: bool,
    },

    /// Count snapshot rows per value of one column
    Stats {
        #[arg(long)]
        field: String,

        /// Only count rows with this value
        #[arg(long)]
        value: Option<String>,

        /// Snapshot to read (defaults to the latest indexed one)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show effective paths, settings and archive state
    Status,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{}: {}",
        report.command,
        if report.ok { "ok" } else { "issues found" }
    );
    for line in &report.details {
        println!("  {line}");
    }
    for line in &report.issues {
        println!("  issue: {line}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let report = match cli.command {
        Command::Fetch {
            strategy,
            landing_url,
            dry_run,
        } => commands::fetch::run(&FetchOptions {
            strategy,
            landing_url,
            dry_run,
        })?,
        Command::Resolve {
            strategy,
            landing_url,
        } => commands::resolve::run(&ResolveOptions {
            strategy,
            landing_url,
        })?,
        Command::Repair { file, output } => commands::repair::run(&RepairOptions {
            input: file,
            output,
        })?,
        Command::Index { rebuild } => commands::index::run(&IndexOptions { rebuild })?,
        Command::Stats { field, value, file } => {
            commands::stats::run(&StatsOptions { field, value, file })?
        }
        Command::Status => commands::status::run()?,
    };

    print_report(&report, cli.json)?;
    if !report.ok {
        bail!(
            "{} reported {} issue(s)",
            report.command,
            report.issues.len()
        );
    }
    Ok(())
}
