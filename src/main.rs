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

use anyhow::{Context, Result};
use clap::Parser;
use itertools::Itertools;

use relaylab::{config::ConfigArgs, plan::NetworkPlan, routing::MeshMode, util};

/// Compile a topology into addresses, routes, link delays, and the process launch plan.
#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Topology file (YAML).
    topology: PathBuf,
    #[command(flatten)]
    config: ConfigArgs,
    /// Write the plan (JSON) to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Overwrite the mesh mode of the configuration.
    #[arg(short, long, value_enum)]
    mesh: Option<MeshMode>,
    /// Only print the addresses the relay certificate must cover, separated by spaces.
    #[arg(long)]
    certificate_hosts: bool,
}

fn main() -> Result<()> {
    util::init_logging();

    let args = Args::parse();

    let mut config = args.config.load().context("Cannot load the configuration")?;
    if let Some(mesh) = args.mesh {
        config.mesh = mesh;
    }

    let raw = fs::read_to_string(&args.topology)
        .with_context(|| format!("Cannot read {}", args.topology.display()))?;
    let raw: serde_yaml::Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Cannot parse {}", args.topology.display()))?;

    let plan = NetworkPlan::compile(&raw, &config)
        .with_context(|| format!("Cannot compile {}", args.topology.display()))?;

    if args.certificate_hosts {
        println!("{}", plan.certificate_hosts().iter().join(" "));
        return Ok(());
    }

    let json = plan.to_json().context("Cannot serialize the plan")?;
    match args.output {
        Some(path) => {
            fs::write(&path, json).with_context(|| format!("Cannot write {}", path.display()))?;
            log::info!("Plan written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
