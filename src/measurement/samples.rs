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
//! Extraction of end-to-end latency samples from free-form log output.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref LATENCY_RE: Regex = Regex::new(r"Latency: (\d+)").unwrap();
}

/// A single end-to-end latency, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LatencySample(pub u64);

impl LatencySample {
    pub fn nanos(&self) -> u64 {
        self.0
    }

    pub fn seconds(&self) -> f64 {
        self.0 as f64 / 1e9
    }
}

/// Parse a single line. Returns `None` for lines without a latency marker, and for values that do
/// not fit into 64 bits.
pub fn parse_line(line: &str) -> Option<LatencySample> {
    LATENCY_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .map(LatencySample)
}

/// Extract all latency samples from the given lines, in order. Lines without a `Latency: <n>`
/// marker are ignored.
pub fn extract_samples<I, S>(lines: I) -> Vec<LatencySample>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|l| parse_line(l.as_ref()))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ignores_unrelated_lines() {
        let log = "\
0:00:01.1 INFO timeoverlayparse Latency: 1500000
garbage line
0:00:01.2 INFO timeoverlayparse Latency: 2500000 (frame 12)
Latency: abc
";
        assert_eq!(
            extract_samples(log.lines()),
            vec![LatencySample(1_500_000), LatencySample(2_500_000)]
        );
    }

    #[test]
    fn seconds() {
        assert_eq!(LatencySample(2_000_000_000).seconds(), 2.0);
    }
}
