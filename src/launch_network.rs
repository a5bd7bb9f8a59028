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
use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;

use relaylab::{
    config::ConfigArgs,
    launch::{start, CommandSupervisor, NetworkReadiness},
    plan::NetworkPlan,
    routing::MeshMode,
    util,
};

/// Start the relays, publishers, and subscribers of an emulated network, stage by stage. The hosts
/// must already exist; every process is run through the configured host prefix.
#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Topology file (YAML).
    topology: PathBuf,
    #[command(flatten)]
    config: ConfigArgs,
    /// Overwrite the mesh mode of the configuration.
    #[arg(short, long, value_enum)]
    mesh: Option<MeshMode>,
    /// Stop all processes after this many seconds. Without it, run until interrupted.
    #[arg(short, long)]
    duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
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

    let mut supervisor = CommandSupervisor::new(config.launch.host_prefix.clone());
    let check = NetworkReadiness::new(config.launch.check_timeout)?;

    if let Err(e) = start(&plan.launch, &mut supervisor, &check, &config.launch).await {
        supervisor.shutdown().await;
        return Err(e).context("Cannot start the network");
    }
    log::info!(
        "All {} processes are running",
        plan.launch.processes().count()
    );

    match args.duration {
        Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
        None => tokio::signal::ctrl_c()
            .await
            .context("Cannot wait for the interrupt signal")?,
    }

    log::info!("Stopping all processes");
    supervisor.shutdown().await;
    Ok(())
}
