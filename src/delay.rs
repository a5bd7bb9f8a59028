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
//! Artificial link delays of the emulated mesh.

use std::collections::HashMap;

use relaylab_utils::serde::SortedMap;
use serde::{Deserialize, Serialize};

use crate::topology::{ConfigError, NodeId, Topology};

/// Delay lookup over the edge records of a topology, in declaration order.
#[derive(Debug, Clone, Copy)]
pub struct EdgeTable<'a> {
    topo: &'a Topology,
}

impl<'a> EdgeTable<'a> {
    pub fn new(topo: &'a Topology) -> Self {
        Self { topo }
    }

    /// Delay (in milliseconds) of the link between relays `i` and `j` (0-based indices). The
    /// first edge record that connects the 1-based pair `(i + 1, j + 1)` in either direction
    /// determines the delay. Returns `None` if no record matches, or if the first matching record
    /// has no delay; the link is then not shaped.
    pub fn delay_for(&self, i: usize, j: usize) -> Option<f64> {
        self.topo
            .edges()
            .iter()
            .find(|e| e.connects(NodeId(i), NodeId(j)))
            .and_then(|e| e.delay)
    }
}

/// One-way delay to apply on a single link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkShaping {
    pub a: NodeId,
    pub b: NodeId,
    pub delay_ms: f64,
}

/// Builder for the delays of all links.
///
/// The delay of a link is, in that order of precedence, the overwrite rule for the pair, the delay
/// of the first edge record for the pair, or the default delay. Links without any of those are not
/// shaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(
    serialize = "R: Serialize + Ord",
    deserialize = "R: serde::de::DeserializeOwned + Eq + std::hash::Hash"
))]
pub struct LinkDelayBuilder<R> {
    default: Option<f64>,
    exceptions: SortedMap<(R, R), f64>,
}

impl<R> Default for LinkDelayBuilder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> LinkDelayBuilder<R> {
    pub fn new() -> Self {
        Self {
            default: None,
            exceptions: SortedMap::default(),
        }
    }

    /// Sets the default delay (in milliseconds) for links whose edge record does not specify one.
    pub fn default_delay(mut self, default_delay: f64) -> Self {
        self.default = Some(default_delay);
        self
    }
}

impl<R> LinkDelayBuilder<R>
where
    R: Eq + std::hash::Hash,
{
    /// Add an overwrite rule to the link delays (in milliseconds)
    pub fn overwrite(mut self, a: R, b: R, delay: f64) -> Self {
        self.exceptions.0.insert((a, b), delay);
        self
    }
}

impl<R> LinkDelayBuilder<R>
where
    R: AsRef<str>,
{
    /// Resolve the relay names of all overwrite rules.
    pub fn build(self, topo: &Topology) -> Result<LinkDelayBuilder<NodeId>, ConfigError> {
        let resolve = |name: &R| {
            topo.get_node_id(name)
                .filter(|id| topo.is_relay(*id))
                .ok_or_else(|| ConfigError::UnknownNode {
                    field: "delays".to_string(),
                    name: name.as_ref().to_string(),
                })
        };
        Ok(LinkDelayBuilder {
            default: self.default,
            exceptions: SortedMap(
                self.exceptions
                    .0
                    .into_iter()
                    .map(|((a, b), d)| Ok(((resolve(&a)?, resolve(&b)?), d)))
                    .collect::<Result<_, ConfigError>>()?,
            ),
        })
    }
}

impl LinkDelayBuilder<NodeId> {
    /// Generate the link delays (in milliseconds) of all `links`.
    pub fn generate_delays(
        &self,
        topo: &Topology,
        links: &[(NodeId, NodeId)],
    ) -> HashMap<(NodeId, NodeId), f64> {
        let table = EdgeTable::new(topo);
        let mut delays = HashMap::new();

        for &(a, b) in links {
            // check if there is an exception (and also check if there is one in the other direction)
            let delay = self
                .exceptions
                .0
                .get(&(a, b))
                .or(self.exceptions.0.get(&(b, a)))
                .copied()
                .or_else(|| table.delay_for(a.0, b.0))
                .or(self.default);

            // if the delay is still None, then the link is not shaped
            if let Some(delay) = delay {
                delays.insert((a, b), delay);
            }
        }

        delays
    }

    /// Shaping table of all `links`, ordered by relay pair.
    pub fn shaping(&self, topo: &Topology, links: &[(NodeId, NodeId)]) -> Vec<LinkShaping> {
        let mut result: Vec<LinkShaping> = self
            .generate_delays(topo, links)
            .into_iter()
            .map(|((a, b), delay_ms)| LinkShaping { a, b, delay_ms })
            .collect();
        result.sort_by_key(|s| (s.a, s.b));
        result
    }
}
