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
//! Settings of the compiler, the launcher, and the analysis. Every field has a default, so an
//! empty (or missing) configuration file is valid.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    addressing::AddressingConfig,
    delay::LinkDelayBuilder,
    launch::LaunchConfig,
    measurement::TraceBaseline,
    routing::MeshMode,
    topology::DuplicateEdgePolicy,
};

/// Environment variable that enables TLS verification of relays and clients.
pub const TLS_VERIFY_ENV: &str = "TLS_VERIFY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Delay rule for a single relay pair, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayOverride {
    pub a: String,
    pub b: String,
    pub delay: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Directory with the subscriber logs and persisted baselines.
    pub dir: PathBuf,
    /// Number of most recent logs to analyze.
    pub num_files: usize,
    /// Logs whose name starts with one of these prefixes are never analyzed as measurements.
    pub exclude_prefixes: Vec<String>,
    /// How to derive a baseline from an element trace.
    pub trace: TraceBaseline,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("measurements"),
            num_files: 1,
            exclude_prefixes: vec!["baseline_test_".to_string()],
            trace: TraceBaseline::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub addressing: AddressingConfig,
    pub mesh: MeshMode,
    pub duplicate_edges: DuplicateEdgePolicy,
    /// Delay of links whose edge record has none. Unset links are not shaped.
    pub default_delay: Option<f64>,
    pub delay_overrides: Vec<DelayOverride>,
    pub launch: LaunchConfig,
    pub measurement: MeasurementConfig,
}

impl Config {
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigFileError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).map_err(|e| ConfigFileError::Io(path.to_path_buf(), e))?;
        Self::from_yaml_str(&content)
    }

    /// Read the configuration from `path` if given, or use the defaults otherwise.
    pub fn load_or_default(path: Option<impl AsRef<Path>>) -> Result<Self, ConfigFileError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Delay rules of the configuration, with relays still referenced by name.
    pub fn delays(&self) -> LinkDelayBuilder<String> {
        let mut builder = LinkDelayBuilder::new();
        if let Some(d) = self.default_delay {
            builder = builder.default_delay(d);
        }
        for o in self.delay_overrides.iter() {
            builder = builder.overwrite(o.a.clone(), o.b.clone(), o.delay);
        }
        builder
    }
}

/// Command-line arguments shared by all binaries that read the configuration.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigArgs {
    /// Configuration file (YAML). Defaults are used if omitted.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Verify the TLS certificates of relays. Overwrites the configuration file.
    #[arg(long, env = TLS_VERIFY_ENV, value_parser = clap::builder::BoolishValueParser::new())]
    pub tls_verify: Option<bool>,
}

impl ConfigArgs {
    /// Load the configuration file (or the defaults) and apply the command-line overrides.
    pub fn load(&self) -> Result<Config, ConfigFileError> {
        let mut config = Config::load_or_default(self.config.as_ref())?;
        if let Some(verify) = self.tls_verify {
            config.launch.tls_verify = verify;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let c = Config::from_yaml_str("{}").unwrap();
        assert_eq!(c, Config::default());
        assert_eq!(c.mesh, MeshMode::Full);
        assert_eq!(c.measurement.exclude_prefixes, vec!["baseline_test_"]);
    }

    #[test]
    fn partial_document() {
        let c = Config::from_yaml_str(
            "
mesh: declared
duplicate_edges: reject
default_delay: 2.5
addressing:
  attachment_prefix_len: 29
launch:
  relay_port: 4444
  ready_timeout: 500
measurement:
  num_files: 3
  trace:
    mode: probe_delta
    from: before2
    to: after1
",
        )
        .unwrap();
        assert_eq!(c.mesh, MeshMode::Declared);
        assert_eq!(c.duplicate_edges, DuplicateEdgePolicy::Reject);
        assert_eq!(c.addressing.attachment_prefix_len, 29);
        assert_eq!(c.addressing.backbone_prefix_len, 24);
        assert_eq!(c.launch.relay_port, 4444);
        assert_eq!(c.launch.ready_timeout.as_millis(), 500);
        assert_eq!(c.measurement.num_files, 3);
        assert_eq!(
            c.measurement.trace,
            TraceBaseline::ProbeDelta {
                from: "before2".into(),
                to: "after1".into()
            }
        );
    }

    #[derive(Debug, clap::Parser)]
    struct Cli {
        #[command(flatten)]
        config: ConfigArgs,
    }

    #[test]
    fn tls_verify_flag() {
        use clap::Parser;

        let args = Cli::try_parse_from(["relaylab", "--tls-verify", "yes"]).unwrap();
        assert!(args.config.load().unwrap().launch.tls_verify);
        let args = Cli::try_parse_from(["relaylab", "--tls-verify", "0"]).unwrap();
        assert!(!args.config.load().unwrap().launch.tls_verify);
        assert!(Cli::try_parse_from(["relaylab", "--tls-verify", "maybe"]).is_err());

        let c = ConfigArgs::default().load().unwrap();
        assert_eq!(c, Config::default());
    }

    #[test]
    fn unknown_mesh_mode() {
        assert!(Config::from_yaml_str("mesh: star").is_err());
    }
}
