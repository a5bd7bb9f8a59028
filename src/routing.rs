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
//! Static route synthesis for the relay mesh. The mesh runs no dynamic routing, so every relay
//! needs an explicit route to the identity address of every other relay.

use std::{collections::HashMap, net::Ipv4Addr};

use petgraph::{
    algo::{connected_components, dijkstra},
    graph::{NodeIndex, UnGraph},
};
use serde::{Deserialize, Serialize};

use crate::{
    addressing::AddressPlan,
    topology::{NodeId, Topology},
};

/// Which relay pairs are connected by a link.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum MeshMode {
    /// Every pair of relays is directly connected, whether or not an edge is declared.
    #[default]
    Full,
    /// Only declared edges become links. Traffic between non-adjacent relays is forwarded along a
    /// shortest path.
    Declared,
}

/// A single static route `destination/32 via next_hop`, installed on `on_host`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RouteEntry {
    pub on_host: NodeId,
    pub destination: Ipv4Addr,
    pub via: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectivityError {
    #[error("The relay mesh is disconnected: {components} components, `{from}` cannot reach `{to}`")]
    Disconnected {
        components: usize,
        from: String,
        to: String,
    },
    #[error("No backbone subnet is allocated between relay {0} and relay {1}")]
    MissingLink(NodeId, NodeId),
    #[error("No address is allocated for node {0}")]
    MissingAddress(NodeId),
}

/// Relay pairs `(i, j)`, `i < j`, that are connected by a link in the given mode.
pub fn materialized_links(topo: &Topology, mode: MeshMode) -> Vec<(NodeId, NodeId)> {
    match mode {
        MeshMode::Full => topo.all_pairs().collect(),
        MeshMode::Declared => topo.declared_pairs(),
    }
}

/// Compute all static routes.
///
/// Relay routes come first, grouped by the relay they are installed on, followed by one route per
/// client towards the identity of its relay.
pub fn synthesize(
    topo: &Topology,
    plan: &AddressPlan,
    mode: MeshMode,
) -> Result<Vec<RouteEntry>, ConnectivityError> {
    let mut routes = match mode {
        MeshMode::Full => full_mesh_routes(topo, plan)?,
        MeshMode::Declared => shortest_path_routes(topo, plan)?,
    };

    for a in plan.attachments() {
        let destination = plan
            .try_identity(a.relay)
            .ok_or(ConnectivityError::MissingAddress(a.relay))?;
        routes.push(RouteEntry {
            on_host: a.host,
            destination,
            via: a.relay_addr,
        });
    }

    log::debug!("Synthesized {} static routes ({mode:?} mesh)", routes.len());
    Ok(routes)
}

/// The address of `next` on the backbone link shared with `from`.
fn next_hop_addr(
    plan: &AddressPlan,
    from: NodeId,
    next: NodeId,
) -> Result<Ipv4Addr, ConnectivityError> {
    plan.backbone_link(from, next)
        .and_then(|l| l.addr_of(next))
        .ok_or(ConnectivityError::MissingLink(from, next))
}

fn identity(plan: &AddressPlan, relay: NodeId) -> Result<Ipv4Addr, ConnectivityError> {
    plan.try_identity(relay)
        .ok_or(ConnectivityError::MissingAddress(relay))
}

fn full_mesh_routes(
    topo: &Topology,
    plan: &AddressPlan,
) -> Result<Vec<RouteEntry>, ConnectivityError> {
    let mut routes = Vec::new();
    for src in topo.relay_ids() {
        for dst in topo.relay_ids().filter(|dst| *dst != src) {
            routes.push(RouteEntry {
                on_host: src,
                destination: identity(plan, dst)?,
                via: next_hop_addr(plan, src, dst)?,
            });
        }
    }
    Ok(routes)
}

fn shortest_path_routes(
    topo: &Topology,
    plan: &AddressPlan,
) -> Result<Vec<RouteEntry>, ConnectivityError> {
    let n = topo.num_relays();
    let mut g: UnGraph<NodeId, ()> = UnGraph::with_capacity(n, topo.edges().len());
    let idx: Vec<NodeIndex> = topo.relay_ids().map(|r| g.add_node(r)).collect();
    for (a, b) in topo.declared_pairs() {
        g.add_edge(idx[a.0], idx[b.0], ());
    }

    let components = connected_components(&g);

    // hop distance from every relay towards every destination
    let dist: Vec<HashMap<NodeIndex, usize>> = idx
        .iter()
        .map(|dst| dijkstra(&g, *dst, None, |_| 1usize))
        .collect();

    let mut routes = Vec::new();
    for src in topo.relay_ids() {
        for dst in topo.relay_ids().filter(|dst| *dst != src) {
            let to_dst = &dist[dst.0];
            let Some(d) = to_dst.get(&idx[src.0]).copied() else {
                return Err(ConnectivityError::Disconnected {
                    components,
                    from: topo.name(src).to_string(),
                    to: topo.name(dst).to_string(),
                });
            };
            // neighbor one hop closer to the destination with the lowest index
            let next = g
                .neighbors(idx[src.0])
                .filter(|nb| to_dst.get(nb).map_or(false, |x| x + 1 == d))
                .map(|nb| g[nb])
                .min()
                .ok_or(ConnectivityError::MissingLink(src, dst))?;
            log::trace!(
                "route on {} to {} via {} ({d} hops)",
                topo.name(src),
                topo.name(dst),
                topo.name(next)
            );
            routes.push(RouteEntry {
                on_host: src,
                destination: identity(plan, dst)?,
                via: next_hop_addr(plan, src, next)?,
            });
        }
    }
    Ok(routes)
}
