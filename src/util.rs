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
//! Utility module collection of functions

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::measurement::SkippedFile;

/// Initialize logging from `log4rs.yml` in the working directory. Without that file, fall back to
/// `pretty_env_logger` (configured by `RUST_LOG`).
pub fn init_logging() {
    let config = Path::new("log4rs.yml");
    if config.exists() {
        match log4rs::init_file(config, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("Cannot initialize log4rs from {}: {e}", config.display()),
        }
    }
    let _ = pretty_env_logger::try_init();
}

/// Read a log file. Bytes that are not valid UTF-8 are replaced, so that stray binary output of
/// the media pipeline does not discard the whole log.
pub fn read_log(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read the given log files as `(file name, content)`. Files that cannot be read are returned
/// separately, together with the reason.
pub fn read_logs(paths: &[PathBuf]) -> (Vec<(String, String)>, Vec<SkippedFile>) {
    let mut logs = Vec::new();
    let mut unreadable = Vec::new();
    for p in paths {
        match read_log(p) {
            Ok(content) => logs.push((file_name(p), content)),
            Err(e) => {
                log::warn!("Cannot read {}: {e}", p.display());
                unreadable.push(SkippedFile {
                    name: file_name(p),
                    reason: format!("cannot read: {e}"),
                });
            }
        }
    }
    (logs, unreadable)
}

/// The file name of a path, or the full path if it has none.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::measurement::MeasurementReport;

    #[test]
    fn unreadable_logs_are_reported() {
        let dir = std::env::temp_dir().join(format!("relaylab-read-logs-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("good.txt"), "Latency: 1000000000\n").unwrap();
        let mut garbled = b"Latency: 3000000000\n".to_vec();
        garbled.extend([0xff, 0xfe, b'\n']);
        fs::write(dir.join("garbled.txt"), garbled).unwrap();

        let paths = vec![
            dir.join("good.txt"),
            dir.join("garbled.txt"),
            dir.join("missing.txt"),
        ];
        let (logs, unreadable) = read_logs(&paths);
        assert_eq!(logs.len(), 2);
        assert_eq!(unreadable.len(), 1);
        assert_eq!(unreadable[0].name, "missing.txt");

        let report = MeasurementReport::analyze(&logs, None).with_skipped(unreadable);
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.aggregate.unwrap().samples, 2);
        assert!(report.to_string().contains("missing.txt: skipped (cannot read"));
        fs::remove_dir_all(&dir).unwrap();
    }
}
