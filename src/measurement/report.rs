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
//! Analysis of a set of measurement logs.

use std::{fmt, io::Write};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{
    samples::{extract_samples, LatencySample},
    stats::{summarize, EmptySampleSet, LatencyReport},
};

/// Report of a single log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub name: String,
    pub report: LatencyReport,
}

/// A log file without any latency sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

/// Per-file reports, the files that had to be skipped, and the aggregate over all samples of all
/// usable files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub files: Vec<FileReport>,
    pub skipped: Vec<SkippedFile>,
    /// `None` if no file contains any sample.
    pub aggregate: Option<LatencyReport>,
}

/// Flat record written to CSV.
#[derive(Debug, Clone, Serialize)]
struct CsvRecord<'a> {
    file: &'a str,
    samples: usize,
    mean_seconds: f64,
    median_seconds: f64,
    p99_seconds: f64,
    baseline_seconds: Option<f64>,
    adjusted_mean_seconds: Option<f64>,
}

impl<'a> CsvRecord<'a> {
    fn new(file: &'a str, r: &LatencyReport) -> Self {
        Self {
            file,
            samples: r.samples,
            mean_seconds: r.mean_seconds,
            median_seconds: r.median_seconds,
            p99_seconds: r.p99_seconds,
            baseline_seconds: r.baseline_seconds,
            adjusted_mean_seconds: r.adjusted_mean_seconds,
        }
    }
}

impl MeasurementReport {
    /// Analyze already-loaded log files, given as `(name, content)`. Files are processed in
    /// parallel; the result keeps the input order. Files without samples are listed in
    /// [`MeasurementReport::skipped`] and excluded from the aggregate.
    pub fn analyze<N, C>(logs: &[(N, C)], baseline: Option<f64>) -> Self
    where
        N: AsRef<str> + Sync,
        C: AsRef<str> + Sync,
    {
        let parsed: Vec<(String, Result<(LatencyReport, Vec<LatencySample>), EmptySampleSet>)> =
            logs.par_iter()
                .map(|(name, content)| {
                    let samples = extract_samples(content.as_ref().lines());
                    let report = summarize(&samples).map(|s| (s.with_baseline(baseline), samples));
                    (name.as_ref().to_string(), report)
                })
                .collect();

        let mut files = Vec::new();
        let mut skipped = Vec::new();
        let mut all_samples = Vec::new();
        for (name, result) in parsed {
            match result {
                Ok((report, samples)) => {
                    all_samples.extend(samples);
                    files.push(FileReport { name, report });
                }
                Err(e) => {
                    log::warn!("Skipping {name}: {e}");
                    skipped.push(SkippedFile {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let aggregate = summarize(&all_samples)
            .ok()
            .map(|s| s.with_baseline(baseline));

        Self {
            files,
            skipped,
            aggregate,
        }
    }

    /// Add files that were skipped before the analysis, e.g., because they could not be read.
    pub fn with_skipped(mut self, skipped: impl IntoIterator<Item = SkippedFile>) -> Self {
        self.skipped.extend(skipped);
        self
    }

    pub fn has_data(&self) -> bool {
        self.aggregate.is_some()
    }

    /// Write one CSV row per usable file, followed by a row `*` for the aggregate.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv = csv::WriterBuilder::new()
            .has_headers(true)
            .from_writer(writer);
        for f in self.files.iter() {
            csv.serialize(CsvRecord::new(&f.name, &f.report))?;
        }
        if let Some(agg) = self.aggregate.as_ref() {
            csv.serialize(CsvRecord::new("*", agg))?;
        }
        csv.flush()?;
        Ok(())
    }
}

impl fmt::Display for MeasurementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in self.files.iter() {
            writeln!(f, "{}: {}", r.name, r.report)?;
        }
        for s in self.skipped.iter() {
            writeln!(f, "{}: skipped ({})", s.name, s.reason)?;
        }
        match self.aggregate.as_ref() {
            Some(agg) => write!(f, "total: {agg}"),
            None => write!(f, "no data"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_file_is_skipped() {
        let logs = [
            ("a.txt", "Latency: 1000000000\nLatency: 3000000000\n"),
            ("empty.txt", ""),
            ("b.txt", "foo\nLatency: 2000000000\n"),
        ];
        let r = MeasurementReport::analyze(&logs, Some(0.5));
        assert_eq!(
            r.files.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(),
            vec!["a.txt", "b.txt"]
        );
        assert_eq!(r.skipped.len(), 1);
        assert_eq!(r.skipped[0].name, "empty.txt");

        let agg = r.aggregate.unwrap();
        assert_eq!(agg.samples, 3);
        assert!((agg.mean_seconds - 2.0).abs() < 1e-12);
        assert!((agg.adjusted_mean_seconds.unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn no_data() {
        let logs: [(&str, &str); 2] = [("x", ""), ("y", "nothing")];
        let r = MeasurementReport::analyze(&logs, None);
        assert!(!r.has_data());
        assert_eq!(r.skipped.len(), 2);
        assert!(r.to_string().ends_with("no data"));
    }

    #[test]
    fn csv_rows() {
        let logs = [("a", "Latency: 1000000000")];
        let r = MeasurementReport::analyze(&logs, None);
        let mut buf = Vec::new();
        r.write_csv(&mut buf).unwrap();
        let s = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = s.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("file,samples,mean_seconds"));
        assert!(lines[1].starts_with("a,1,1.0"));
        assert!(lines[2].starts_with("*,1,1.0"));
    }
}
