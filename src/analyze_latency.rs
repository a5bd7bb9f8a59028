// RelayLab: Topology Compilation and Latency Measurement for Emulated Relay Meshes
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

use relaylab::{
    config::ConfigArgs,
    measurement::{BaselineStore, MeasurementReport},
    util,
};
use relaylab_utils::files::most_recent_files;

/// Analyze the latency of the most recent measurement logs.
#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
    /// Overwrite the measurement directory.
    #[arg(short, long)]
    dir: Option<PathBuf>,
    /// Overwrite the number of most recent logs to analyze.
    #[arg(short, long)]
    num_files: Option<usize>,
    /// Analyze these files instead of the most recent logs.
    #[arg(short, long, num_args = 1..)]
    files: Vec<PathBuf>,
    /// Baseline in seconds.
    #[arg(short, long, conflicts_with_all = ["trace", "no_baseline"])]
    baseline: Option<f64>,
    /// Derive the baseline from this element trace.
    #[arg(short, long, conflicts_with = "no_baseline")]
    trace: Option<PathBuf>,
    /// Do not subtract any baseline. Without this flag, the newest persisted baseline is used.
    #[arg(long)]
    no_baseline: bool,
    /// Write the per-file reports to this CSV file.
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn main() -> Result<()> {
    util::init_logging();

    let args = Args::parse();
    let config = args.config.load().context("Cannot load the configuration")?;
    let dir = args.dir.unwrap_or(config.measurement.dir.clone());

    let baseline = if let Some(b) = args.baseline {
        Some(b)
    } else if let Some(trace) = args.trace.as_ref() {
        let content = util::read_log(trace)
            .with_context(|| format!("Cannot read {}", trace.display()))?;
        let b = config
            .measurement
            .trace
            .from_lines(content.lines())
            .with_context(|| format!("Cannot derive a baseline from {}", trace.display()))?;
        log::info!("Baseline derived from {}: {b}s", trace.display());
        Some(b)
    } else if args.no_baseline {
        None
    } else {
        match BaselineStore::new(&dir).latest()? {
            Some((date, b)) => {
                log::info!("Using the baseline recorded on {date}: {b}s");
                Some(b)
            }
            None => {
                log::warn!("No baseline recorded in {}", dir.display());
                None
            }
        }
    };

    let files = if args.files.is_empty() {
        let exclude: Vec<&str> = config
            .measurement
            .exclude_prefixes
            .iter()
            .map(String::as_str)
            // persisted baselines share the directory
            .chain(std::iter::once("assumedbaseline_"))
            .collect();
        most_recent_files(
            &dir,
            args.num_files.unwrap_or(config.measurement.num_files),
            &exclude,
        )?
    } else {
        args.files
    };
    if files.is_empty() {
        bail!("No measurement logs found in {}", dir.display());
    }

    let (logs, unreadable) = util::read_logs(&files);
    let report = MeasurementReport::analyze(&logs, baseline).with_skipped(unreadable);
    println!("{report}");

    if let Some(path) = args.csv {
        let file = fs::File::create(&path)
            .with_context(|| format!("Cannot create {}", path.display()))?;
        report
            .write_csv(file)
            .with_context(|| format!("Cannot write {}", path.display()))?;
    }

    Ok(())
}
