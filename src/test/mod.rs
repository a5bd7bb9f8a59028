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
//! Property tests of the build phase on hand-written and randomly generated topologies.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_yaml::Value;

use crate::topology::Topology;

pub fn parse(yaml: &str) -> Value {
    serde_yaml::from_str(yaml).unwrap()
}

pub fn load(yaml: &str) -> Topology {
    Topology::load(&parse(yaml)).unwrap()
}

/// A random topology with `n` relays, random edges and delays, and `tracks` tracks, each with one
/// publisher and between zero and two subscribers.
pub fn random_topology(seed: u64, n: usize, tracks: usize) -> Value {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut edges = Vec::new();
    for i in 1..=n {
        for j in (i + 1)..=n {
            if rng.gen_bool(0.4) {
                edges.push(format!(
                    "{{node1: {i}, node2: r{j}, delay: {}}}",
                    rng.gen_range(0..50)
                ));
            }
        }
    }
    let mut first = Vec::new();
    let mut last = Vec::new();
    for t in 0..tracks {
        first.push(format!(
            "{{relay: {}, track: t{t}}}",
            rng.gen_range(1..=n)
        ));
        for _ in 0..rng.gen_range(0..=2) {
            last.push(format!("{{node: {}, track: t{t}}}", rng.gen_range(1..=n)));
        }
    }
    parse(&format!(
        "{{nodes: {{number: {n}}}, edges: [{}], first_hop_relay: [{}], last_hop_relay: [{}]}}",
        edges.join(", "),
        first.join(", "),
        last.join(", ")
    ))
}

mod pipeline;
mod routing;
