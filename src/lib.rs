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
//! Topology compilation and latency measurement for emulated relay meshes.
//!
//! The build phase turns a topology document into a [`plan::NetworkPlan`]: addresses
//! ([`addressing`]), static routes ([`routing`]), link delays ([`delay`]), and the ordered startup
//! of all processes ([`launch`]). The analysis phase ([`measurement`]) turns subscriber logs into
//! latency reports.

pub mod addressing;
pub mod config;
pub mod delay;
pub mod launch;
pub mod measurement;
pub mod plan;
pub mod routing;
pub mod topology;
pub mod util;

#[cfg(test)]
mod test;

pub mod prelude {
    pub use super::{
        addressing::{allocate, AddressClass, AddressPlan, AllocationError},
        config::Config,
        delay::{EdgeTable, LinkDelayBuilder},
        measurement::{extract_samples, summarize, LatencyReport, MeasurementReport},
        plan::{NetworkPlan, PlanError},
        routing::{synthesize, MeshMode, RouteEntry},
        topology::{ConfigError, NodeId, Topology},
    };
}
