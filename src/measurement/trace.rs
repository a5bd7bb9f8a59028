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
//! Baselines derived from element-level processing-time traces of the media pipeline.
//!
//! A trace line carries a running timestamp, the name of a pipeline element, and (optionally) the
//! processing time of that element:
//!
//! ```text
//! 0:00:01.123456789 12345 0x55d TRACE GST_TRACER :0:: processingtime, element=(string)before02, time=(guint64)41250;
//! ```

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pipeline elements in front of and behind the timestamp overlay, in pipeline order.
pub const DEFAULT_STAGES: [&str; 9] = [
    "before01", "before02", "before03", "before2", "middle", "after1", "after2", "after3", "after4",
];

/// The element that stamps the frames; its own processing time is part of the measurement.
pub const DEFAULT_PROBE_STAGE: &str = "middle";

lazy_static! {
    static ref TIMESTAMP_RE: Regex = Regex::new(r"^\s*(\d+):(\d{2}):(\d{2})\.(\d{1,9})\b").unwrap();
    static ref ELEMENT_RE: Regex = Regex::new(r"element=\(string\)([^,;\s]+)").unwrap();
    static ref TIME_RE: Regex = Regex::new(r"time=\(guint64\)(\d+)").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TraceError {
    #[error("The trace contains no records")]
    NoData,
    #[error("The trace contains no records of stage `{0}`")]
    MissingStage(String),
    #[error("The trace contains no pair of records for the probe points `{0}` and `{1}`")]
    NoProbePairs(String, String),
}

/// One parsed trace line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Running time of the line, in nanoseconds.
    pub timestamp_ns: u64,
    pub element: String,
    /// Processing time reported for the element, in nanoseconds.
    pub time_ns: Option<u64>,
}

/// Parse `h:mm:ss.fffffffff` into nanoseconds. Shorter fractions are scaled up. Timestamps that do
/// not fit into `u64` nanoseconds are rejected.
fn parse_timestamp(line: &str) -> Option<u64> {
    let c = TIMESTAMP_RE.captures(line)?;
    let h: u64 = c.get(1)?.as_str().parse().ok()?;
    let m: u64 = c.get(2)?.as_str().parse().ok()?;
    let s: u64 = c.get(3)?.as_str().parse().ok()?;
    let frac = c.get(4)?.as_str();
    let nanos: u64 = frac.parse::<u64>().ok()? * 10u64.pow(9 - frac.len() as u32);
    h.checked_mul(3600)?
        .checked_add(m * 60 + s)?
        .checked_mul(1_000_000_000)?
        .checked_add(nanos)
}

/// Parse a single trace line. Lines without timestamp or element name yield `None`.
pub fn parse_trace_line(line: &str) -> Option<TraceRecord> {
    let timestamp_ns = parse_timestamp(line)?;
    let element = ELEMENT_RE.captures(line)?.get(1)?.as_str().to_string();
    let time_ns = TIME_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    Some(TraceRecord {
        timestamp_ns,
        element,
        time_ns,
    })
}

/// Parse all trace records of a log, skipping unrelated lines.
pub fn parse_trace<I, S>(lines: I) -> Vec<TraceRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|l| parse_trace_line(l.as_ref()))
        .collect()
}

/// How to derive the baseline from a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum TraceBaseline {
    /// Sum of the average processing time of every stage except the probe stage.
    StageSum { stages: Vec<String>, probe: String },
    /// Average difference between the timestamps of two probe points. The `i`-th record of `from`
    /// is paired with the `i`-th record of `to`.
    ProbeDelta { from: String, to: String },
}

impl Default for TraceBaseline {
    fn default() -> Self {
        Self::StageSum {
            stages: DEFAULT_STAGES.iter().map(|s| s.to_string()).collect(),
            probe: DEFAULT_PROBE_STAGE.to_string(),
        }
    }
}

impl TraceBaseline {
    /// Compute the baseline in seconds.
    pub fn compute(&self, records: &[TraceRecord]) -> Result<f64, TraceError> {
        if records.is_empty() {
            return Err(TraceError::NoData);
        }
        match self {
            Self::StageSum { stages, probe } => {
                let mut total = 0.0;
                for stage in stages.iter().filter(|s| *s != probe) {
                    let times: Vec<f64> = records
                        .iter()
                        .filter(|r| &r.element == stage)
                        .filter_map(|r| r.time_ns)
                        .map(|t| t as f64)
                        .collect();
                    if times.is_empty() {
                        return Err(TraceError::MissingStage(stage.clone()));
                    }
                    let avg = times.iter().sum::<f64>() / times.len() as f64;
                    log::trace!("stage {stage}: {} records, average {avg}ns", times.len());
                    total += avg;
                }
                Ok(total / 1e9)
            }
            Self::ProbeDelta { from, to } => {
                let a = records.iter().filter(|r| &r.element == from);
                let b = records.iter().filter(|r| &r.element == to);
                let (num_a, num_b) = (a.clone().count(), b.clone().count());
                if num_a != num_b {
                    log::warn!(
                        "Probe points have different numbers of records ({from}: {num_a}, {to}: {num_b}); unpaired records are ignored."
                    );
                }
                let deltas: Vec<i128> = a
                    .zip(b)
                    .map(|(a, b)| b.timestamp_ns as i128 - a.timestamp_ns as i128)
                    .collect();
                if deltas.is_empty() {
                    return Err(TraceError::NoProbePairs(from.clone(), to.clone()));
                }
                let avg = deltas.iter().sum::<i128>() as f64 / deltas.len() as f64;
                Ok(avg / 1e9)
            }
        }
    }

    /// Parse the lines and compute the baseline in seconds.
    pub fn from_lines<I, S>(&self, lines: I) -> Result<f64, TraceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.compute(&parse_trace(lines))
    }
}
