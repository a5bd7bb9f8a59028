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
//! Address allocation for the emulated relay mesh.
//!
//! Every address class owns a disjoint address range and its own subnet counter. The counters live
//! in an [`AddressPlanBuilder`] that is threaded through a fixed, deterministic traversal of the
//! topology:
//!
//! 1. one [`AddressClass::RelayIdentity`] address per relay, in declaration order,
//! 2. per relay (in declaration order), one [`AddressClass::ClientAttachment`] subnet for each of
//!    its first-hop attachments, then for each of its last-hop attachments,
//! 3. one [`AddressClass::MeshBackbone`] subnet for every relay pair `(i, j)` with `i < j`, whether
//!    or not an edge is declared for that pair,
//! 4. the [`AddressClass::ControlPlane`] uplink subnet and the control segment that reaches every
//!    relay.
//!
//! The capacity of every class is checked before the first address is handed out, so an
//! oversized topology fails with [`AllocationError::Exhausted`] and never with an out-of-range
//! address later on.

use std::net::Ipv4Addr;

use ipnet::{Ipv4AddrRange, Ipv4Net, Ipv4Subnets};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::topology::{HopRole, NodeId, Topology};

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
pub enum AddressClass {
    MeshBackbone,
    RelayIdentity,
    ClientAttachment,
    ControlPlane,
}

/// An allocated network. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subnet {
    pub class: AddressClass,
    /// Value of the class counter when the subnet was allocated.
    pub index: usize,
    pub cidr: Ipv4Net,
}

impl Subnet {
    /// Address of `addr` within this subnet, including the prefix length.
    pub fn with_addr(&self, addr: Ipv4Addr) -> Ipv4Net {
        // the prefix length comes from an existing network and is thus valid.
        Ipv4Net::new(addr, self.cidr.prefix_len()).unwrap_or(self.cidr)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    /// The topology needs more addresses than the class provides.
    #[error("Address space of class {class} is exhausted: {required} required, but only {available} available")]
    Exhausted {
        class: AddressClass,
        required: u64,
        available: u64,
    },
    /// A class ran out of addresses during allocation.
    #[error("IP address of class {0} could not be assigned! ran out of addresses.")]
    NotEnoughAddresses(AddressClass),
    /// The netmask is invalid.
    #[error("Invalid Netmask: {0}")]
    InvalidNetmask(#[from] ipnet::PrefixLenError),
    /// Subnets of a class are too small to host the required addresses.
    #[error("Subnets of class {class} (/{prefix_len}) cannot hold {required} host addresses")]
    SubnetTooSmall {
        class: AddressClass,
        prefix_len: u8,
        required: u64,
    },
    /// Two classes share addresses.
    #[error("Address range {2} of class {0} overlaps with range {3} of class {1}")]
    OverlappingClasses(AddressClass, AddressClass, Ipv4Net, Ipv4Net),
}

/// Return `AllocationError::NotEnoughAddresses` if the option is `None`.
fn ip_err<T>(class: AddressClass, option: Option<T>) -> Result<T, AllocationError> {
    option.ok_or(AllocationError::NotEnoughAddresses(class))
}

/// Address ranges and subnet sizes of all classes. The defaults are:
///
/// - `backbone_range`: `10.0.0.0/16`, split into `/24` networks (`10.0.{k}.0/24`),
/// - `control_range`: `10.1.0.0/16`, split into `/24` networks (uplink first, then the control
///   segment `10.1.1.0/24`),
/// - `identity_range`: `10.3.0.0/16`, single host addresses starting at `10.3.0.1`,
/// - `attachment_range`: `10.4.0.0/16`, split into `/30` networks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressingConfig {
    pub backbone_range: Ipv4Net,
    pub backbone_prefix_len: u8,
    pub identity_range: Ipv4Net,
    pub attachment_range: Ipv4Net,
    pub attachment_prefix_len: u8,
    pub control_range: Ipv4Net,
    pub control_prefix_len: u8,
    /// Host offset of the peer on the control uplink (the host namespace that runs the API's
    /// storage). The control node itself always takes the first host address.
    pub uplink_peer_offset: u32,
}

fn net(addr: [u8; 4], prefix_len: u8) -> Ipv4Net {
    let addr = Ipv4Addr::from(addr);
    Ipv4Net::new(addr, prefix_len).unwrap_or_else(|_| Ipv4Net::from(addr))
}

impl Default for AddressingConfig {
    fn default() -> Self {
        Self {
            backbone_range: net([10, 0, 0, 0], 16),
            backbone_prefix_len: 24,
            identity_range: net([10, 3, 0, 0], 16),
            attachment_range: net([10, 4, 0, 0], 16),
            attachment_prefix_len: 30,
            control_range: net([10, 1, 0, 0], 16),
            control_prefix_len: 24,
            uplink_peer_offset: 99,
        }
    }
}

impl AddressingConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn backbone(mut self, range: Ipv4Net, prefix_len: u8) -> Self {
        self.backbone_range = range.trunc();
        self.backbone_prefix_len = prefix_len;
        self
    }

    pub fn identity(mut self, range: Ipv4Net) -> Self {
        self.identity_range = range.trunc();
        self
    }

    pub fn attachment(mut self, range: Ipv4Net, prefix_len: u8) -> Self {
        self.attachment_range = range.trunc();
        self.attachment_prefix_len = prefix_len;
        self
    }

    pub fn control(mut self, range: Ipv4Net, prefix_len: u8) -> Self {
        self.control_range = range.trunc();
        self.control_prefix_len = prefix_len;
        self
    }

    pub fn uplink_peer_offset(mut self, offset: u32) -> Self {
        self.uplink_peer_offset = offset;
        self
    }

    fn ranges(&self) -> [(AddressClass, Ipv4Net); 4] {
        [
            (AddressClass::MeshBackbone, self.backbone_range.trunc()),
            (AddressClass::RelayIdentity, self.identity_range.trunc()),
            (AddressClass::ClientAttachment, self.attachment_range.trunc()),
            (AddressClass::ControlPlane, self.control_range.trunc()),
        ]
    }

    /// Make sure that no two classes can ever hand out the same address.
    pub fn check_disjoint(&self) -> Result<(), AllocationError> {
        for ((c1, r1), (c2, r2)) in self.ranges().into_iter().tuple_combinations() {
            if r1.contains(&r2) || r2.contains(&r1) {
                return Err(AllocationError::OverlappingClasses(c1, c2, r1, r2));
            }
        }
        Ok(())
    }
}

/// Number of subnets of length `sub` within `range`.
fn num_subnets(range: &Ipv4Net, sub: u8) -> u64 {
    if sub < range.prefix_len() || sub > 32 {
        0
    } else {
        1u64 << (sub - range.prefix_len())
    }
}

/// Number of usable host addresses in a network with the given prefix length.
fn num_hosts(prefix_len: u8) -> u64 {
    match prefix_len {
        32 => 1,
        31 => 2,
        l if l < 31 => (1u64 << (32 - l)) - 2,
        _ => 0,
    }
}

/// The `offset`-th address of a network (the network address itself has offset 0).
fn host_at(net: &Ipv4Net, offset: u32) -> Option<Ipv4Addr> {
    let addr = Ipv4Addr::from(u32::from(net.network()).checked_add(offset)?);
    (net.contains(&addr) && (net.prefix_len() >= 31 || addr != net.broadcast())).then_some(addr)
}

/// Point-to-point link between two relays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackboneLink {
    /// Relay with the lower index, holding the first host address.
    pub a: NodeId,
    /// Relay with the higher index, holding the second host address.
    pub b: NodeId,
    pub subnet: Subnet,
    pub addr_a: Ipv4Addr,
    pub addr_b: Ipv4Addr,
}

impl BackboneLink {
    /// Address of `node` on this link.
    pub fn addr_of(&self, node: NodeId) -> Option<Ipv4Addr> {
        if node == self.a {
            Some(self.addr_a)
        } else if node == self.b {
            Some(self.addr_b)
        } else {
            None
        }
    }

    /// The other end of the link.
    pub fn peer_of(&self, node: NodeId) -> Option<NodeId> {
        if node == self.a {
            Some(self.b)
        } else if node == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Segment between a relay and one of its clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentLink {
    /// Index into [`Topology::attachments`].
    pub attachment: usize,
    pub track: String,
    pub role: HopRole,
    pub relay: NodeId,
    pub host: NodeId,
    pub subnet: Subnet,
    pub relay_addr: Ipv4Addr,
    pub host_addr: Ipv4Addr,
}

/// Addressing of the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPlane {
    pub control: NodeId,
    /// Link from the control node to the host namespace.
    pub uplink: Subnet,
    pub uplink_addr: Ipv4Addr,
    pub uplink_peer_addr: Ipv4Addr,
    /// Shared segment of the control node and all relays.
    pub segment: Subnet,
    pub control_addr: Ipv4Addr,
    /// Address of each relay on the control segment, indexed by the relay index.
    pub relay_addrs: Vec<Ipv4Addr>,
}

/// Role of an interface in the emulated network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "role")]
pub enum InterfaceRole {
    /// Loopback address that identifies a relay.
    Identity,
    /// Link to another relay.
    Backbone { peer: NodeId },
    /// Link between a relay and a client of a track.
    Attachment { peer: NodeId, track: String },
    /// Link from the control node to the host namespace.
    ControlUplink,
    /// Shared control segment.
    ControlSegment,
}

/// A single address to configure on a host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceAssignment {
    pub host: NodeId,
    #[serde(flatten)]
    pub role: InterfaceRole,
    pub cidr: Ipv4Net,
}

/// Complete addressing of a topology. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPlan {
    identities: Vec<Subnet>,
    attachments: Vec<AttachmentLink>,
    backbone: Vec<BackboneLink>,
    control: ControlPlane,
}

impl AddressPlan {
    /// Identity address of a relay.
    ///
    /// # Panics
    /// If `relay` is not a relay of the topology the plan was built for.
    pub fn identity(&self, relay: NodeId) -> Ipv4Addr {
        self.identities[relay.0].cidr.addr()
    }

    pub fn try_identity(&self, relay: NodeId) -> Option<Ipv4Addr> {
        self.identities.get(relay.0).map(|s| s.cidr.addr())
    }

    /// Identity addresses of all relays, in relay order.
    pub fn identities(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.identities.iter().map(|s| s.cidr.addr())
    }

    /// All backbone links, ordered by relay pair.
    pub fn backbone(&self) -> &[BackboneLink] {
        &self.backbone
    }

    /// The backbone link between two relays, in any order.
    pub fn backbone_link(&self, x: NodeId, y: NodeId) -> Option<&BackboneLink> {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };
        self.backbone.iter().find(|l| l.a == a && l.b == b)
    }

    pub fn attachments(&self) -> &[AttachmentLink] {
        &self.attachments
    }

    pub fn attachment_of_host(&self, host: NodeId) -> Option<&AttachmentLink> {
        self.attachments.iter().find(|a| a.host == host)
    }

    pub fn control(&self) -> &ControlPlane {
        &self.control
    }

    /// All allocated subnets, grouped by class in allocation order.
    pub fn subnets(&self) -> Vec<Subnet> {
        self.identities
            .iter()
            .copied()
            .chain(self.attachments.iter().map(|a| a.subnet))
            .chain(self.backbone.iter().map(|l| l.subnet))
            .chain([self.control.uplink, self.control.segment])
            .collect()
    }

    /// All addresses to configure. Backbone interfaces are only listed for the links in
    /// `materialized` (pairs of relays); pass `None` to list all of them.
    pub fn interfaces(&self, materialized: Option<&[(NodeId, NodeId)]>) -> Vec<InterfaceAssignment> {
        let mut result = Vec::new();
        for (i, s) in self.identities.iter().enumerate() {
            result.push(InterfaceAssignment {
                host: NodeId(i),
                role: InterfaceRole::Identity,
                cidr: s.cidr,
            });
        }
        for l in self
            .backbone
            .iter()
            .filter(|l| materialized.map_or(true, |m| m.contains(&(l.a, l.b))))
        {
            result.push(InterfaceAssignment {
                host: l.a,
                role: InterfaceRole::Backbone { peer: l.b },
                cidr: l.subnet.with_addr(l.addr_a),
            });
            result.push(InterfaceAssignment {
                host: l.b,
                role: InterfaceRole::Backbone { peer: l.a },
                cidr: l.subnet.with_addr(l.addr_b),
            });
        }
        for a in self.attachments.iter() {
            result.push(InterfaceAssignment {
                host: a.relay,
                role: InterfaceRole::Attachment {
                    peer: a.host,
                    track: a.track.clone(),
                },
                cidr: a.subnet.with_addr(a.relay_addr),
            });
            result.push(InterfaceAssignment {
                host: a.host,
                role: InterfaceRole::Attachment {
                    peer: a.relay,
                    track: a.track.clone(),
                },
                cidr: a.subnet.with_addr(a.host_addr),
            });
        }
        let c = &self.control;
        result.push(InterfaceAssignment {
            host: c.control,
            role: InterfaceRole::ControlUplink,
            cidr: c.uplink.with_addr(c.uplink_addr),
        });
        result.push(InterfaceAssignment {
            host: c.control,
            role: InterfaceRole::ControlSegment,
            cidr: c.segment.with_addr(c.control_addr),
        });
        for (i, addr) in c.relay_addrs.iter().enumerate() {
            result.push(InterfaceAssignment {
                host: NodeId(i),
                role: InterfaceRole::ControlSegment,
                cidr: c.segment.with_addr(*addr),
            });
        }
        result
    }
}

/// Allocate all addresses for `topo` with the default address ranges.
pub fn allocate(topo: &Topology) -> Result<AddressPlan, AllocationError> {
    allocate_with(topo, &AddressingConfig::default())
}

/// Allocate all addresses for `topo`.
pub fn allocate_with(
    topo: &Topology,
    config: &AddressingConfig,
) -> Result<AddressPlan, AllocationError> {
    AddressPlanBuilder::new(config)?.build(topo)
}

/// Holds the per-class counters while a plan is allocated.
#[derive(Debug, Clone)]
pub struct AddressPlanBuilder {
    config: AddressingConfig,
    identity_iter: Ipv4AddrRange,
    attachment_iter: Ipv4Subnets,
    backbone_iter: Ipv4Subnets,
    control_iter: Ipv4Subnets,
    /// Next index of each class, in the order of [`AddressClass`].
    counters: [usize; 4],
}

impl AddressPlanBuilder {
    /// Create a builder with fresh counters. Fails if two classes overlap or a subnet length does
    /// not fit into its range.
    pub fn new(config: &AddressingConfig) -> Result<Self, AllocationError> {
        config.check_disjoint()?;
        for (class, len) in [
            (AddressClass::MeshBackbone, config.backbone_prefix_len),
            (AddressClass::ClientAttachment, config.attachment_prefix_len),
        ] {
            // point-to-point subnets need two host addresses
            if num_hosts(len) < 2 {
                return Err(AllocationError::SubnetTooSmall {
                    class,
                    prefix_len: len,
                    required: 2,
                });
            }
        }
        Ok(Self {
            config: config.clone(),
            identity_iter: config.identity_range.trunc().hosts(),
            attachment_iter: config
                .attachment_range
                .trunc()
                .subnets(config.attachment_prefix_len)?,
            backbone_iter: config
                .backbone_range
                .trunc()
                .subnets(config.backbone_prefix_len)?,
            control_iter: config
                .control_range
                .trunc()
                .subnets(config.control_prefix_len)?,
            counters: [0; 4],
        })
    }

    /// Check that every class can hold all addresses `topo` requires.
    pub fn check_capacity(&self, topo: &Topology) -> Result<(), AllocationError> {
        let c = &self.config;
        let n = topo.num_relays() as u64;
        let exhausted = |class, required: u64, available: u64| {
            if required > available {
                Err(AllocationError::Exhausted {
                    class,
                    required,
                    available,
                })
            } else {
                Ok(())
            }
        };

        exhausted(
            AddressClass::RelayIdentity,
            n,
            num_hosts(c.identity_range.prefix_len()),
        )?;
        exhausted(
            AddressClass::ClientAttachment,
            topo.attachments().len() as u64,
            num_subnets(&c.attachment_range, c.attachment_prefix_len),
        )?;
        exhausted(
            AddressClass::MeshBackbone,
            n.checked_mul(n.saturating_sub(1)).map_or(u64::MAX, |x| x / 2),
            num_subnets(&c.backbone_range, c.backbone_prefix_len),
        )?;
        exhausted(
            AddressClass::ControlPlane,
            2,
            num_subnets(&c.control_range, c.control_prefix_len),
        )?;
        // the control segment holds the control node and every relay
        exhausted(
            AddressClass::ControlPlane,
            n + 1,
            num_hosts(c.control_prefix_len),
        )?;
        if num_hosts(c.control_prefix_len) < c.uplink_peer_offset as u64
            || c.uplink_peer_offset < 2
        {
            return Err(AllocationError::SubnetTooSmall {
                class: AddressClass::ControlPlane,
                prefix_len: c.control_prefix_len,
                required: c.uplink_peer_offset as u64,
            });
        }
        Ok(())
    }

    fn counter(&mut self, class: AddressClass) -> usize {
        let slot = &mut self.counters[class as usize];
        let idx = *slot;
        *slot += 1;
        idx
    }

    fn next_subnet(&mut self, class: AddressClass) -> Result<Subnet, AllocationError> {
        let cidr = ip_err(
            class,
            match class {
                AddressClass::MeshBackbone => self.backbone_iter.next(),
                AddressClass::ClientAttachment => self.attachment_iter.next(),
                AddressClass::ControlPlane => self.control_iter.next(),
                AddressClass::RelayIdentity => self
                    .identity_iter
                    .next()
                    .and_then(|a| Ipv4Net::new(a, 32).ok()),
            },
        )?;
        let index = self.counter(class);
        log::trace!("allocated {class} subnet #{index}: {cidr}");
        Ok(Subnet { class, index, cidr })
    }

    /// Allocate a point-to-point subnet and return it with its first two host addresses.
    fn next_link(
        &mut self,
        class: AddressClass,
    ) -> Result<(Subnet, Ipv4Addr, Ipv4Addr), AllocationError> {
        let subnet = self.next_subnet(class)?;
        let mut hosts = subnet.cidr.hosts();
        let first = ip_err(class, hosts.next())?;
        let second = ip_err(class, hosts.next())?;
        Ok((subnet, first, second))
    }

    /// Traverse the topology and allocate all addresses. Nothing is returned unless the whole
    /// plan could be allocated.
    pub fn build(mut self, topo: &Topology) -> Result<AddressPlan, AllocationError> {
        self.check_capacity(topo)?;

        // 1. identities
        let identities = topo
            .relay_ids()
            .map(|_| self.next_subnet(AddressClass::RelayIdentity))
            .collect::<Result<Vec<_>, _>>()?;

        // 2. client attachments, per relay: first-hop, then last-hop
        let mut attachments = Vec::new();
        for relay in topo.relay_ids() {
            for role in [HopRole::FirstHop, HopRole::LastHop] {
                let indices = topo
                    .attachments()
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| a.relay == relay && a.role == role)
                    .map(|(i, _)| i)
                    .collect_vec();
                for i in indices {
                    let a = &topo.attachments()[i];
                    let (subnet, relay_addr, host_addr) =
                        self.next_link(AddressClass::ClientAttachment)?;
                    attachments.push(AttachmentLink {
                        attachment: i,
                        track: a.track.clone(),
                        role: a.role,
                        relay: a.relay,
                        host: a.host,
                        subnet,
                        relay_addr,
                        host_addr,
                    });
                }
            }
        }

        // 3. backbone for the full mesh
        let backbone = topo
            .all_pairs()
            .map(|(a, b)| {
                let (subnet, addr_a, addr_b) = self.next_link(AddressClass::MeshBackbone)?;
                Ok(BackboneLink {
                    a,
                    b,
                    subnet,
                    addr_a,
                    addr_b,
                })
            })
            .collect::<Result<Vec<_>, AllocationError>>()?;

        // 4. control plane
        let class = AddressClass::ControlPlane;
        let uplink = self.next_subnet(class)?;
        let uplink_addr = ip_err(class, host_at(&uplink.cidr, 1))?;
        let uplink_peer_addr = ip_err(
            class,
            host_at(&uplink.cidr, self.config.uplink_peer_offset),
        )?;
        let segment = self.next_subnet(class)?;
        let control_addr = ip_err(class, host_at(&segment.cidr, 1))?;
        let relay_addrs = topo
            .relay_ids()
            .map(|r| ip_err(class, host_at(&segment.cidr, r.0 as u32 + 2)))
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "Allocated {} identities, {} attachment subnets, {} backbone subnets, and 2 control subnets",
            identities.len(),
            attachments.len(),
            backbone.len(),
        );

        Ok(AddressPlan {
            identities,
            attachments,
            backbone,
            control: ControlPlane {
                control: topo.control(),
                uplink,
                uplink_addr,
                uplink_peer_addr,
                segment,
                control_addr,
                relay_addrs,
            },
        })
    }
}
