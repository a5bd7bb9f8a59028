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
//! Compilation of a topology document into a complete network plan.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use crate::{
    addressing::{AddressPlan, AddressPlanBuilder, AllocationError, InterfaceAssignment},
    config::Config,
    delay::LinkShaping,
    launch::{LaunchError, LaunchPlan},
    routing::{materialized_links, synthesize, ConnectivityError, MeshMode, RouteEntry},
    topology::{ConfigError, NodeId, Topology},
};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Invalid topology: {0}")]
    Config(#[from] ConfigError),
    #[error("Address allocation failed: {0}")]
    Allocation(#[from] AllocationError),
    #[error("Route synthesis failed: {0}")]
    Connectivity(#[from] ConnectivityError),
    #[error("Cannot build the launch plan: {0}")]
    Launch(#[from] LaunchError),
}

/// An emulated link between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub a: NodeId,
    pub b: NodeId,
    pub subnet: Ipv4Net,
}

/// Everything needed to build and start the emulated network. Produced at once, or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkPlan {
    pub mesh: MeshMode,
    pub topology: Topology,
    pub addresses: AddressPlan,
    /// Links to create: backbone links first (ordered by relay pair), then client attachments.
    pub links: Vec<Link>,
    pub interfaces: Vec<InterfaceAssignment>,
    pub routes: Vec<RouteEntry>,
    pub shaping: Vec<LinkShaping>,
    pub launch: LaunchPlan,
}

impl NetworkPlan {
    /// Run the whole build phase: load the topology, allocate addresses, synthesize routes, compute
    /// the link delays, and derive the launch plan. The first error aborts the compilation.
    pub fn compile(raw: &Value, config: &Config) -> Result<Self, PlanError> {
        let topology = Topology::load_with(raw, config.duplicate_edges)?;
        let addresses = AddressPlanBuilder::new(&config.addressing)?.build(&topology)?;
        let routes = synthesize(&topology, &addresses, config.mesh)?;

        let pairs = materialized_links(&topology, config.mesh);
        let shaping = config
            .delays()
            .build(&topology)?
            .shaping(&topology, &pairs);
        let interfaces = addresses.interfaces(Some(&pairs));

        let mut links: Vec<Link> = pairs
            .iter()
            .filter_map(|(a, b)| addresses.backbone_link(*a, *b))
            .map(|l| Link {
                a: l.a,
                b: l.b,
                subnet: l.subnet.cidr,
            })
            .collect();
        links.extend(addresses.attachments().iter().map(|a| Link {
            a: a.relay,
            b: a.host,
            subnet: a.subnet.cidr,
        }));
        let c = addresses.control();
        links.extend(
            topology
                .relay_ids()
                .map(|r| Link {
                    a: c.control,
                    b: r,
                    subnet: c.segment.cidr,
                }),
        );

        let launch = LaunchPlan::build(&topology, &addresses, &config.launch)?;

        log::info!(
            "Compiled network with {} nodes, {} links, {} interfaces, {} routes, and {} shaped links",
            topology.nodes().len(),
            links.len(),
            interfaces.len(),
            routes.len(),
            shaping.len(),
        );

        Ok(Self {
            mesh: config.mesh,
            topology,
            addresses,
            links,
            interfaces,
            routes,
            shaping,
            launch,
        })
    }

    /// Addresses that the relay certificate must be valid for: the identity of every relay.
    pub fn certificate_hosts(&self) -> Vec<Ipv4Addr> {
        self.addresses.identities().collect()
    }

    /// Routes installed on a single host.
    pub fn routes_of(&self, host: NodeId) -> impl Iterator<Item = &RouteEntry> {
        self.routes.iter().filter(move |r| r.on_host == host)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn failure_produces_nothing() {
        let raw: Value =
            serde_yaml::from_str("{nodes: {number: 2}, edges: [{node1: 1, node2: 7}]}").unwrap();
        assert!(matches!(
            NetworkPlan::compile(&raw, &Config::default()),
            Err(PlanError::Config(ConfigError::UnknownNode { .. }))
        ));
    }

    #[test]
    fn certificate_hosts() {
        let raw: Value = serde_yaml::from_str("{nodes: {number: 3}}").unwrap();
        let plan = NetworkPlan::compile(&raw, &Config::default()).unwrap();
        assert_eq!(
            plan.certificate_hosts(),
            vec![
                Ipv4Addr::new(10, 3, 0, 1),
                Ipv4Addr::new(10, 3, 0, 2),
                Ipv4Addr::new(10, 3, 0, 3)
            ]
        );
    }
}
