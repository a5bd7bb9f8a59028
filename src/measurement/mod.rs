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
//! Latency measurement: samples from subscriber logs, their statistics, and the baseline that is
//! subtracted to obtain the delay added by the relays.

pub mod baseline;
pub mod report;
pub mod samples;
pub mod stats;
pub mod trace;

pub use baseline::{BaselineError, BaselineStore};
pub use report::{FileReport, MeasurementReport, SkippedFile};
pub use samples::{extract_samples, LatencySample};
pub use stats::{summarize, EmptySampleSet, LatencyReport, LatencySummary};
pub use trace::{TraceBaseline, TraceError, TraceRecord};
