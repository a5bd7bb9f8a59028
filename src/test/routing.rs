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
use std::collections::{HashMap, HashSet};

use crate::{addressing::*, routing::*, topology::*};

use super::{load, random_topology};

/// Follow the routes from `src` towards the identity of `dst` and return the visited relays.
fn walk(
    topo: &Topology,
    plan: &AddressPlan,
    routes: &[RouteEntry],
    src: NodeId,
    dst: NodeId,
) -> Vec<NodeId> {
    // map each backbone address to its relay
    let owner: HashMap<_, _> = plan
        .backbone()
        .iter()
        .flat_map(|l| [(l.addr_a, l.a), (l.addr_b, l.b)])
        .collect();
    let target = plan.identity(dst);
    let mut path = vec![src];
    let mut current = src;
    while current != dst {
        let r = routes
            .iter()
            .find(|r| r.on_host == current && r.destination == target)
            .unwrap_or_else(|| panic!("no route on {} to {}", topo.name(current), topo.name(dst)));
        current = owner[&r.via];
        assert!(path.len() <= topo.num_relays(), "routing loop: {path:?}");
        path.push(current);
    }
    path
}

#[test]
fn full_mesh_covers_every_ordered_pair() {
    for seed in 0..10 {
        let n = 2 + seed as usize;
        let t = Topology::load(&random_topology(seed, n, 2)).unwrap();
        let p = allocate(&t).unwrap();
        let routes = synthesize(&t, &p, MeshMode::Full).unwrap();

        let relay_routes: HashSet<(NodeId, _)> = routes
            .iter()
            .filter(|r| t.is_relay(r.on_host))
            .map(|r| (r.on_host, r.destination))
            .collect();
        assert_eq!(relay_routes.len(), n * (n - 1));

        for (i, j) in t.all_pairs() {
            let link = p.backbone_link(i, j).unwrap();
            assert!(routes.contains(&RouteEntry {
                on_host: i,
                destination: p.identity(j),
                via: link.addr_b,
            }));
            assert!(routes.contains(&RouteEntry {
                on_host: j,
                destination: p.identity(i),
                via: link.addr_a,
            }));
        }

        // one route per client
        assert_eq!(routes.len(), n * (n - 1) + t.attachments().len());
    }
}

#[test]
fn declared_mesh_reaches_every_relay() {
    let mut checked = 0;
    for seed in 0..30 {
        let n = 3 + (seed as usize % 6);
        let t = Topology::load(&random_topology(seed, n, 1)).unwrap();
        let p = allocate(&t).unwrap();
        let Ok(routes) = synthesize(&t, &p, MeshMode::Declared) else {
            continue;
        };
        checked += 1;
        let declared = t.declared_pairs();
        for src in t.relay_ids() {
            for dst in t.relay_ids().filter(|d| *d != src) {
                let path = walk(&t, &p, &routes, src, dst);
                // only declared links are used
                for hop in path.windows(2) {
                    let pair = (hop[0].min(hop[1]), hop[0].max(hop[1]));
                    assert!(declared.contains(&pair));
                }
            }
        }
    }
    assert!(checked > 0);
}

#[test]
fn declared_routes_are_shortest() {
    // r1 - r2 - r3 - r4, plus a shortcut r1 - r4
    let t = load(
        "{nodes: {number: 4}, edges: [{node1: 1, node2: 2}, {node1: 2, node2: 3}, {node1: 3, node2: 4}, {node1: 1, node2: 4}]}",
    );
    let p = allocate(&t).unwrap();
    let routes = synthesize(&t, &p, MeshMode::Declared).unwrap();
    assert_eq!(
        walk(&t, &p, &routes, NodeId(0), NodeId(3)),
        vec![NodeId(0), NodeId(3)]
    );
    // two paths of length two from r2 to r4; the one over r1 has the lower index
    assert_eq!(
        walk(&t, &p, &routes, NodeId(1), NodeId(3)),
        vec![NodeId(1), NodeId(0), NodeId(3)]
    );
}

#[test]
fn single_relay() {
    let t = load("{nodes: {number: 1}, first_hop_relay: [{relay: 1, track: t}]}");
    let p = allocate(&t).unwrap();
    for mode in [MeshMode::Full, MeshMode::Declared] {
        let routes = synthesize(&t, &p, mode).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].on_host, t.get_node_id("pub1").unwrap());
    }
}
