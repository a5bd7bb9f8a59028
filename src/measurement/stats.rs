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
//! Descriptive statistics of latency samples.

use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution, Median};

use super::samples::LatencySample;

/// Returned when statistics are requested for an empty sample set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("No latency samples found")]
pub struct EmptySampleSet;

/// Statistics of a non-empty sample set, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub mean_seconds: f64,
    pub median_seconds: f64,
    pub p99_seconds: f64,
}

/// Compute mean, median, and 99th percentile of the samples, converted to seconds.
///
/// The percentile is computed by linear interpolation between the closest ranks: for sorted
/// values `x_0..x_{n-1}` and `p = 0.99`, let `h = (n - 1) * p`; the result is
/// `x_⌊h⌋ + (h - ⌊h⌋) * (x_⌈h⌉ - x_⌊h⌋)`.
pub fn summarize(samples: &[LatencySample]) -> Result<LatencySummary, EmptySampleSet> {
    if samples.is_empty() {
        return Err(EmptySampleSet);
    }
    let nanos: Vec<f64> = samples.iter().map(|s| s.0 as f64).collect();
    let p99 = percentile(&nanos, 0.99).ok_or(EmptySampleSet)?;
    let data = Data::new(nanos);
    let mean = data.mean().ok_or(EmptySampleSet)?;
    let median = data.median();

    Ok(LatencySummary {
        samples: samples.len(),
        mean_seconds: mean / 1e9,
        median_seconds: median / 1e9,
        p99_seconds: p99 / 1e9,
    })
}

/// Linear-interpolation percentile, `p` in `[0, 1]`.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let h = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// Statistics of a measurement, together with the baseline subtracted from its mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub samples: usize,
    pub mean_seconds: f64,
    pub median_seconds: f64,
    pub p99_seconds: f64,
    pub baseline_seconds: Option<f64>,
    /// `mean_seconds - baseline_seconds`, if a baseline is known.
    pub adjusted_mean_seconds: Option<f64>,
}

impl LatencySummary {
    /// Create a report, subtracting `baseline` (in seconds) from the mean.
    pub fn with_baseline(self, baseline: Option<f64>) -> LatencyReport {
        LatencyReport {
            samples: self.samples,
            mean_seconds: self.mean_seconds,
            median_seconds: self.median_seconds,
            p99_seconds: self.p99_seconds,
            baseline_seconds: baseline,
            adjusted_mean_seconds: baseline.map(|b| self.mean_seconds - b),
        }
    }
}

impl From<LatencySummary> for LatencyReport {
    fn from(s: LatencySummary) -> Self {
        s.with_baseline(None)
    }
}

impl fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "samples: {}, average: {:.6}s, median: {:.6}s, 99th percentile: {:.6}s",
            self.samples, self.mean_seconds, self.median_seconds, self.p99_seconds
        )?;
        if let (Some(b), Some(adj)) = (self.baseline_seconds, self.adjusted_mean_seconds) {
            write!(f, ", baseline: {b:.6}s, relay delay: {adj:.6}s")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn secs(xs: &[u64]) -> Vec<LatencySample> {
        xs.iter().map(|x| LatencySample(x * 1_000_000_000)).collect()
    }

    #[test]
    fn one_two_three() {
        let s = summarize(&secs(&[1, 2, 3])).unwrap();
        assert_eq!(s.samples, 3);
        assert!((s.mean_seconds - 2.0).abs() < 1e-12);
        assert!((s.median_seconds - 2.0).abs() < 1e-12);
        assert!((s.p99_seconds - 2.98).abs() < 1e-9);
    }

    #[test]
    fn empty() {
        assert_eq!(summarize(&[]), Err(EmptySampleSet));
    }

    #[test]
    fn single_sample() {
        let s = summarize(&[LatencySample(5)]).unwrap();
        assert_eq!(s.p99_seconds, s.mean_seconds);
        assert_eq!(s.median_seconds, s.mean_seconds);
    }

    #[test]
    fn percentile_interpolates() {
        let values: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        // h = 99 * 0.99 = 98.01
        assert!((percentile(&values, 0.99).unwrap() - 99.01).abs() < 1e-9);
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 1.0), Some(100.0));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn adjusted_mean() {
        let s = summarize(&[LatencySample(1_500_000_000), LatencySample(2_500_000_000)]).unwrap();
        let r = s.with_baseline(Some(0.5));
        assert_eq!(r.baseline_seconds, Some(0.5));
        assert!((r.adjusted_mean_seconds.unwrap() - 1.5).abs() < 1e-12);

        let r: LatencyReport = s.into();
        assert_eq!(r.adjusted_mean_seconds, None);
    }
}
