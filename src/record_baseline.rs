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
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use relaylab::{
    config::ConfigArgs,
    measurement::{extract_samples, summarize, BaselineStore},
    util,
};
use relaylab_utils::files::most_recent_files;

/// Compute the baseline from a capture without relay-induced delay, and store it for today.
#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,
    /// Baseline capture. Defaults to the newest capture in the measurement directory.
    capture: Option<PathBuf>,
    /// Overwrite the measurement directory.
    #[arg(short, long)]
    dir: Option<PathBuf>,
    /// Print the baseline without storing it.
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    util::init_logging();

    let args = Args::parse();
    let config = args.config.load().context("Cannot load the configuration")?;
    let dir = args.dir.unwrap_or(config.measurement.dir.clone());

    let capture = match args.capture {
        Some(c) => c,
        None => match most_recent_files(&dir, 1, &["assumedbaseline_"])?.pop() {
            Some(c) => c,
            None => bail!("No capture found in {}", dir.display()),
        },
    };

    let content = util::read_log(&capture)
        .with_context(|| format!("Cannot read {}", capture.display()))?;
    let summary = summarize(&extract_samples(content.lines()))
        .with_context(|| format!("Cannot compute a baseline from {}", capture.display()))?;
    println!("assumed baseline: {}", summary.mean_seconds);

    if !args.dry_run {
        let path = BaselineStore::new(&dir).store_today(summary.mean_seconds)?;
        log::info!("Baseline stored in {}", path.display());
    }

    Ok(())
}
