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
use crate::{
    addressing::InterfaceRole,
    config::{Config, DelayOverride},
    delay::LinkShaping,
    launch::StageKind,
    plan::{NetworkPlan, PlanError},
    routing::{ConnectivityError, MeshMode},
    topology::NodeId,
};

use super::{parse, random_topology};

const DOC: &str = "
nodes: {number: 4}
edges:
  - {node1: 1, node2: 2, delay: 10}
  - {node1: 2, node2: 3, delay: 20}
  - {node1: 3, node2: 4}
first_hop_relay:
  - {relay: 1, track: bbb_0}
last_hop_relay:
  - {relay: 4, track: bbb_0}
";

#[test]
fn full_mesh_plan() {
    let plan = NetworkPlan::compile(&parse(DOC), &Config::default()).unwrap();

    // 6 backbone links, 2 client links, 4 control links
    assert_eq!(plan.links.len(), 6 + 2 + 4);
    assert_eq!(
        plan.shaping,
        vec![
            LinkShaping {
                a: NodeId(0),
                b: NodeId(1),
                delay_ms: 10.0
            },
            LinkShaping {
                a: NodeId(1),
                b: NodeId(2),
                delay_ms: 20.0
            },
        ]
    );
    assert_eq!(plan.routes_of(NodeId(0)).count(), 3);

    let stages: Vec<(StageKind, usize)> = plan
        .launch
        .stages
        .iter()
        .map(|s| (s.kind, s.processes.len()))
        .collect();
    assert_eq!(
        stages,
        vec![
            (StageKind::Control, 1),
            (StageKind::Relays, 4),
            (StageKind::Publishers, 1),
            (StageKind::Subscribers, 1)
        ]
    );
}

#[test]
fn declared_mesh_plan() {
    let config = Config {
        mesh: MeshMode::Declared,
        default_delay: Some(1.0),
        delay_overrides: vec![DelayOverride {
            a: "r4".into(),
            b: "r3".into(),
            delay: 7.5,
        }],
        ..Default::default()
    };
    let plan = NetworkPlan::compile(&parse(DOC), &config).unwrap();

    let backbone_ifaces = plan
        .interfaces
        .iter()
        .filter(|i| matches!(i.role, InterfaceRole::Backbone { .. }))
        .count();
    assert_eq!(backbone_ifaces, 2 * 3);
    assert_eq!(plan.links.len(), 3 + 2 + 4);
    assert_eq!(
        plan.shaping.iter().map(|s| s.delay_ms).collect::<Vec<_>>(),
        vec![10.0, 20.0, 7.5]
    );
    // addresses do not depend on the mesh mode
    let full = NetworkPlan::compile(&parse(DOC), &Config::default()).unwrap();
    assert_eq!(plan.addresses, full.addresses);
}

#[test]
fn disconnected_declared_mesh_fails() {
    let config = Config {
        mesh: MeshMode::Declared,
        ..Default::default()
    };
    let doc = parse("{nodes: {number: 3}, edges: [{node1: 1, node2: 2}]}");
    assert!(matches!(
        NetworkPlan::compile(&doc, &config),
        Err(PlanError::Connectivity(ConnectivityError::Disconnected { .. }))
    ));
}

#[test]
fn compilation_is_deterministic() {
    let doc = random_topology(7, 6, 3);
    let a = NetworkPlan::compile(&doc, &Config::default()).unwrap();
    let b = NetworkPlan::compile(&doc, &Config::default()).unwrap();
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
}

#[test]
fn plan_json_round_trip() {
    let plan = NetworkPlan::compile(&parse(DOC), &Config::default()).unwrap();
    let back: NetworkPlan = serde_json::from_str(&plan.to_json().unwrap()).unwrap();
    assert_eq!(back, plan);
}
