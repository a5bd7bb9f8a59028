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
//! Topology model of the emulated relay mesh.
//!
//! The topology is loaded once from an already-deserialized document and is read-only afterwards.
//! Relays are declared by the document; publishers and subscribers are synthesized from the
//! `first_hop_relay` and `last_hop_relay` lists, and exactly one control node is added.

use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Name of the control-plane node that hosts the relay API.
pub const CONTROL_NODE_NAME: &str = "api";

/// Upper bound of `nodes.number`. Larger meshes cannot be addressed from a single `/16`.
pub const MAX_RELAYS: u64 = 1 << 16;

/// Index of a node in the topology. Relays occupy the indices `0..num_relays` in declaration
/// order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    Relay,
    Publisher,
    Subscriber,
    Control,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HopRole {
    /// The relay a publisher of the track connects to.
    FirstHop,
    /// The relay a subscriber of the track connects to.
    LastHop,
}

/// Direct emulated link between two relays. Undirected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub a: NodeId,
    pub b: NodeId,
    /// Artificial one-way delay in milliseconds, if configured.
    pub delay: Option<f64>,
}

impl Edge {
    /// The endpoints ordered by index.
    pub fn pair(&self) -> (NodeId, NodeId) {
        if self.a <= self.b {
            (self.a, self.b)
        } else {
            (self.b, self.a)
        }
    }

    /// Check whether the edge connects `x` and `y`, in any direction.
    pub fn connects(&self, x: NodeId, y: NodeId) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }
}

/// Assignment of a client (publisher or subscriber) of a track to a relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackAttachment {
    pub track: String,
    pub relay: NodeId,
    pub role: HopRole,
    /// The synthesized publisher or subscriber node.
    pub host: NodeId,
}

/// How to treat several edge records for the same pair of relays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateEdgePolicy {
    /// Keep all records; the earliest one is authoritative for the link delay.
    #[default]
    FirstWins,
    /// Fail with [`ConfigError::DuplicateEdge`].
    Reject,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required field `{0}`")]
    MissingField(String),
    #[error("Field `{field}` is invalid: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("`{field}` references the unknown relay `{name}`")]
    UnknownNode { field: String, name: String },
    #[error("Node `{0}` is declared more than once")]
    DuplicateNode(String),
    #[error("The topology does not declare any relay")]
    NoRelays,
    #[error("Edge {0} connects relay `{1}` to itself")]
    SelfLoop(usize, String),
    #[error("The edge between `{0}` and `{1}` is declared more than once")]
    DuplicateEdge(String, String),
    #[error("Track `{0}` has a last-hop relay but no first-hop relay")]
    TrackWithoutPublisher(String),
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidField {
        field: field.into(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    nodes: Vec<Node>,
    num_relays: usize,
    edges: Vec<Edge>,
    attachments: Vec<TrackAttachment>,
    control: NodeId,
}

impl Topology {
    /// Load and validate a topology using the [`DuplicateEdgePolicy::FirstWins`] policy.
    pub fn load(raw: &Value) -> Result<Self, ConfigError> {
        Self::load_with(raw, DuplicateEdgePolicy::default())
    }

    /// Load and validate a topology from an already-deserialized document.
    ///
    /// The document is a mapping with the fields `nodes` (required), `edges`, `first_hop_relay`,
    /// and `last_hop_relay`. Nodes are given either as `{number: N}` (relays named `r1..rN`), as
    /// `{names: [..]}`, or as a sequence of names. Relays are referenced either by name or by their
    /// 1-based index.
    pub fn load_with(raw: &Value, duplicates: DuplicateEdgePolicy) -> Result<Self, ConfigError> {
        let root = raw
            .as_mapping()
            .ok_or_else(|| invalid("<root>", "expected a mapping"))?;

        // relays
        let relay_names = parse_relay_names(get(root, "nodes").ok_or_else(|| {
            ConfigError::MissingField("nodes".to_string())
        })?)?;
        if relay_names.is_empty() {
            return Err(ConfigError::NoRelays);
        }
        let num_relays = relay_names.len();
        let mut nodes = relay_names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Node {
                id: NodeId(i),
                name,
                kind: NodeKind::Relay,
            })
            .collect_vec();
        let lookup: HashMap<String, NodeId> =
            nodes.iter().map(|n| (n.name.clone(), n.id)).collect();
        let mut taken: HashSet<String> = lookup.keys().cloned().collect();

        // edges
        let edges = match get(root, "edges") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(seq)) => seq
                .iter()
                .enumerate()
                .map(|(i, e)| parse_edge(i, e, &lookup, num_relays))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(invalid("edges", "expected a sequence")),
        };
        for (i, e) in edges.iter().enumerate() {
            if e.a == e.b {
                return Err(ConfigError::SelfLoop(i, nodes[e.a.0].name.clone()));
            }
        }
        let mut seen = HashSet::new();
        for e in edges.iter() {
            if !seen.insert(e.pair()) {
                let (a, b) = e.pair();
                match duplicates {
                    DuplicateEdgePolicy::FirstWins => log::warn!(
                        "Duplicate edge between {} and {}; the first declaration is used.",
                        nodes[a.0].name,
                        nodes[b.0].name
                    ),
                    DuplicateEdgePolicy::Reject => {
                        return Err(ConfigError::DuplicateEdge(
                            nodes[a.0].name.clone(),
                            nodes[b.0].name.clone(),
                        ))
                    }
                }
            }
        }

        // track attachments, publishers first, then subscribers
        let mut attachments = Vec::new();
        for (field, role, kind, prefix) in [
            (
                "first_hop_relay",
                HopRole::FirstHop,
                NodeKind::Publisher,
                "pub",
            ),
            (
                "last_hop_relay",
                HopRole::LastHop,
                NodeKind::Subscriber,
                "sub",
            ),
        ] {
            let list = match get(root, field) {
                None | Some(Value::Null) => continue,
                Some(Value::Sequence(seq)) => seq,
                Some(_) => return Err(invalid(field, "expected a sequence")),
            };
            for (i, entry) in list.iter().enumerate() {
                let path = format!("{field}[{i}]");
                let (track, relay) = parse_attachment(&path, entry, &lookup, num_relays)?;
                let host = NodeId(nodes.len());
                nodes.push(Node {
                    id: host,
                    name: free_name(format!("{prefix}{}", i + 1), &mut taken),
                    kind,
                });
                attachments.push(TrackAttachment {
                    track,
                    relay,
                    role,
                    host,
                });
            }
        }

        let control = NodeId(nodes.len());
        nodes.push(Node {
            id: control,
            name: free_name(CONTROL_NODE_NAME.to_string(), &mut taken),
            kind: NodeKind::Control,
        });

        // every track that is subscribed must also be published
        let published: HashSet<&str> = attachments
            .iter()
            .filter(|a| a.role == HopRole::FirstHop)
            .map(|a| a.track.as_str())
            .collect();
        if let Some(a) = attachments
            .iter()
            .find(|a| a.role == HopRole::LastHop && !published.contains(a.track.as_str()))
        {
            return Err(ConfigError::TrackWithoutPublisher(a.track.clone()));
        }

        log::debug!(
            "Loaded topology with {} relays, {} edges, and {} track attachments",
            num_relays,
            edges.len(),
            attachments.len()
        );

        Ok(Self {
            nodes,
            num_relays,
            edges,
            attachments,
            control,
        })
    }

    /// All nodes, relays first (in declaration order), then publishers, subscribers, and the
    /// control node.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn get_node_id(&self, name: impl AsRef<str>) -> Option<NodeId> {
        let name = name.as_ref();
        self.nodes.iter().find(|n| n.name == name).map(|n| n.id)
    }

    pub fn relays(&self) -> &[Node] {
        &self.nodes[..self.num_relays]
    }

    pub fn relay_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.relays().iter().map(|n| n.id)
    }

    pub fn num_relays(&self) -> usize {
        self.num_relays
    }

    pub fn is_relay(&self, id: NodeId) -> bool {
        id.0 < self.num_relays
    }

    /// Edge records in declaration order, duplicates included.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Relay pairs `(i, j)` with `i < j` that have an explicit edge, in pair order.
    pub fn declared_pairs(&self) -> Vec<(NodeId, NodeId)> {
        self.edges
            .iter()
            .map(Edge::pair)
            .unique()
            .sorted()
            .collect()
    }

    /// All relay pairs `(i, j)` with `i < j`, in index order.
    pub fn all_pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        (0..self.num_relays)
            .tuple_combinations()
            .map(|(i, j)| (NodeId(i), NodeId(j)))
    }

    pub fn attachments(&self) -> &[TrackAttachment] {
        &self.attachments
    }

    /// Attachments of a relay with the given role, in declaration order.
    pub fn attachments_of(
        &self,
        relay: NodeId,
        role: HopRole,
    ) -> impl Iterator<Item = &TrackAttachment> + '_ {
        self.attachments
            .iter()
            .filter(move |a| a.relay == relay && a.role == role)
    }

    /// The attachment whose client is `host`.
    pub fn attachment_of_host(&self, host: NodeId) -> Option<&TrackAttachment> {
        self.attachments.iter().find(|a| a.host == host)
    }

    pub fn control(&self) -> NodeId {
        self.control
    }

    /// All tracks in order of first appearance.
    pub fn tracks(&self) -> Vec<&str> {
        self.attachments
            .iter()
            .map(|a| a.track.as_str())
            .unique()
            .collect()
    }

    /// Tracks that have both a publisher and at least one subscriber. Only those can be measured.
    pub fn measured_tracks(&self) -> Vec<&str> {
        self.tracks()
            .into_iter()
            .filter(|t| {
                self.attachments
                    .iter()
                    .any(|a| a.track == *t && a.role == HopRole::LastHop)
            })
            .collect()
    }
}

/// `name`, or `name-2`, `name-3`, ... if it is already taken by another node.
fn free_name(name: String, taken: &mut HashSet<String>) -> String {
    let mut candidate = name.clone();
    let mut k = 2;
    while taken.contains(&candidate) {
        candidate = format!("{name}-{k}");
        k += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(key)
}

fn parse_relay_names(nodes: &Value) -> Result<Vec<String>, ConfigError> {
    let names = match nodes {
        Value::Mapping(m) => {
            if let Some(names) = get(m, "names") {
                parse_name_list("nodes.names", names)?
            } else if let Some(number) = get(m, "number") {
                let n = number
                    .as_u64()
                    .ok_or_else(|| invalid("nodes.number", "expected a non-negative integer"))?;
                if n > MAX_RELAYS {
                    return Err(invalid(
                        "nodes.number",
                        format!("at most {MAX_RELAYS} relays are supported, got {n}"),
                    ));
                }
                (1..=n).map(|i| format!("r{i}")).collect()
            } else {
                return Err(ConfigError::MissingField("nodes.number".to_string()));
            }
        }
        Value::Sequence(_) => parse_name_list("nodes", nodes)?,
        _ => return Err(invalid("nodes", "expected a mapping or a sequence")),
    };

    let mut seen = HashSet::new();
    if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
        return Err(ConfigError::DuplicateNode(dup.clone()));
    }
    Ok(names)
}

fn parse_name_list(field: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    let Value::Sequence(seq) = value else {
        return Err(invalid(field, "expected a sequence"));
    };
    seq.iter()
        .enumerate()
        .map(|(i, v)| match v {
            Value::String(s) if !s.is_empty() => Ok(s.clone()),
            Value::Mapping(m) => match get(m, "name") {
                Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
                Some(_) => Err(invalid(format!("{field}[{i}].name"), "expected a string")),
                None => Err(ConfigError::MissingField(format!("{field}[{i}].name"))),
            },
            _ => Err(invalid(format!("{field}[{i}]"), "expected a node name")),
        })
        .collect()
}

/// Resolve a relay reference, either by name or by its 1-based index.
fn resolve_relay(
    field: &str,
    value: &Value,
    lookup: &HashMap<String, NodeId>,
    num_relays: usize,
) -> Result<NodeId, ConfigError> {
    let unknown = |name: String| ConfigError::UnknownNode {
        field: field.to_string(),
        name,
    };
    let by_index = |i: u64| {
        if i >= 1 && (i as usize) <= num_relays {
            Ok(NodeId(i as usize - 1))
        } else {
            Err(unknown(i.to_string()))
        }
    };
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(i) => by_index(i),
            None => Err(unknown(n.to_string())),
        },
        Value::String(s) => match lookup.get(s) {
            Some(id) => Ok(*id),
            None => match s.parse::<u64>() {
                Ok(i) => by_index(i),
                Err(_) => Err(unknown(s.clone())),
            },
        },
        _ => Err(invalid(field, "expected a relay name or a 1-based index")),
    }
}

fn parse_delay(field: &str, value: &Value) -> Result<Option<f64>, ConfigError> {
    let delay = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches("ms").trim().parse::<f64>().ok(),
        _ => None,
    };
    match delay {
        Some(d) if d.is_finite() && d >= 0.0 => Ok(Some(d)),
        _ => Err(invalid(
            field,
            "expected a non-negative delay in milliseconds",
        )),
    }
}

fn parse_edge(
    i: usize,
    value: &Value,
    lookup: &HashMap<String, NodeId>,
    num_relays: usize,
) -> Result<Edge, ConfigError> {
    let path = format!("edges[{i}]");
    let Value::Mapping(m) = value else {
        return Err(invalid(path, "expected a mapping"));
    };
    let endpoint = |key: &str| {
        let field = format!("{path}.{key}");
        let v = get(m, key).ok_or_else(|| ConfigError::MissingField(field.clone()))?;
        resolve_relay(&field, v, lookup, num_relays)
    };
    let a = endpoint("node1")?;
    let b = endpoint("node2")?;

    let delay = if let Some(d) = get(m, "delay") {
        parse_delay(&format!("{path}.delay"), d)?
    } else if let Some(attrs) = get(m, "attributes") {
        let Value::Mapping(attrs) = attrs else {
            return Err(invalid(format!("{path}.attributes"), "expected a mapping"));
        };
        match get(attrs, "latency") {
            Some(l) => parse_delay(&format!("{path}.attributes.latency"), l)?,
            None => None,
        }
    } else {
        None
    };

    Ok(Edge { a, b, delay })
}

fn parse_attachment(
    path: &str,
    value: &Value,
    lookup: &HashMap<String, NodeId>,
    num_relays: usize,
) -> Result<(String, NodeId), ConfigError> {
    let Value::Mapping(m) = value else {
        return Err(invalid(path, "expected a mapping"));
    };
    let track = match get(m, "track") {
        Some(Value::String(t)) if !t.is_empty() => t.clone(),
        Some(_) => return Err(invalid(format!("{path}.track"), "expected a track name")),
        None => return Err(ConfigError::MissingField(format!("{path}.track"))),
    };
    let (key, relay) = match (get(m, "relay"), get(m, "node")) {
        (Some(r), _) => ("relay", r),
        (None, Some(r)) => ("node", r),
        (None, None) => return Err(ConfigError::MissingField(format!("{path}.relay"))),
    };
    let relay = resolve_relay(&format!("{path}.{key}"), relay, lookup, num_relays)?;
    Ok((track, relay))
}
