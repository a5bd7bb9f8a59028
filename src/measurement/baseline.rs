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
//! Persisted baselines. A baseline is stored as a single decimal number of seconds in a file named
//! `assumedbaseline_<YYYYMMDD>.txt`, one file per day.

use std::{
    fs,
    path::{Path, PathBuf},
};

use relaylab_utils::other::{date_key, parse_date_key, today, Date};

const PREFIX: &str = "assumedbaseline_";
const SUFFIX: &str = ".txt";

#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    #[error("IO Error on {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Cannot parse the baseline stored in {0}: {1:?}")]
    Parse(PathBuf, String),
    #[error("Baseline must be a finite number of seconds, got {0}")]
    NotFinite(f64),
    #[error("No baseline stored in {0}")]
    NotFound(PathBuf),
}

/// Directory of persisted baselines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineStore {
    dir: PathBuf,
}

impl BaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the baseline recorded on `date`.
    pub fn path(&self, date: Date) -> PathBuf {
        self.dir.join(format!("{PREFIX}{}{SUFFIX}", date_key(date)))
    }

    /// Persist `seconds` as the baseline of `date`, replacing any previous value of that day.
    pub fn store(&self, date: Date, seconds: f64) -> Result<PathBuf, BaselineError> {
        if !seconds.is_finite() {
            return Err(BaselineError::NotFinite(seconds));
        }
        fs::create_dir_all(&self.dir).map_err(|e| BaselineError::Io(self.dir.clone(), e))?;
        let path = self.path(date);
        fs::write(&path, seconds.to_string()).map_err(|e| BaselineError::Io(path.clone(), e))?;
        log::info!("Stored baseline of {seconds}s in {}", path.display());
        Ok(path)
    }

    /// Persist `seconds` as today's baseline.
    pub fn store_today(&self, seconds: f64) -> Result<PathBuf, BaselineError> {
        self.store(today(), seconds)
    }

    /// Read the baseline of `date`.
    pub fn load(&self, date: Date) -> Result<f64, BaselineError> {
        read_value(&self.path(date))
    }

    /// Read the most recent persisted baseline, if there is any.
    pub fn latest(&self) -> Result<Option<(Date, f64)>, BaselineError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BaselineError::Io(self.dir.clone(), e)),
        };
        let newest = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                let key = name.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
                parse_date_key(key)
            })
            .max();
        match newest {
            Some(date) => Ok(Some((date, self.load(date)?))),
            None => Ok(None),
        }
    }
}

fn read_value(path: &Path) -> Result<f64, BaselineError> {
    let content = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BaselineError::NotFound(path.to_path_buf()),
        _ => BaselineError::Io(path.to_path_buf(), e),
    })?;
    let value: f64 = content
        .trim()
        .parse()
        .map_err(|_| BaselineError::Parse(path.to_path_buf(), content.clone()))?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(BaselineError::NotFinite(value))
    }
}

#[cfg(test)]
mod test {
    use time::macros::date;

    use super::*;

    fn store(name: &str) -> BaselineStore {
        let dir = std::env::temp_dir().join(format!(
            "relaylab-baseline-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        BaselineStore::new(dir)
    }

    #[test]
    fn store_and_load() {
        let s = store("load");
        let path = s.store(date!(2024 - 05 - 01), 0.25).unwrap();
        assert!(path.ends_with("assumedbaseline_20240501.txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "0.25");
        assert_eq!(s.load(date!(2024 - 05 - 01)).unwrap(), 0.25);
        assert!(matches!(
            s.load(date!(2024 - 05 - 02)),
            Err(BaselineError::NotFound(_))
        ));
        fs::remove_dir_all(s.dir()).unwrap();
    }

    #[test]
    fn latest_by_date() {
        let s = store("latest");
        assert_eq!(s.latest().unwrap(), None);
        s.store(date!(2024 - 05 - 03), 0.3).unwrap();
        s.store(date!(2024 - 04 - 30), 0.1).unwrap();
        fs::write(s.dir().join("baseline_test_1.txt"), "Latency: 1").unwrap();
        assert_eq!(s.latest().unwrap(), Some((date!(2024 - 05 - 03), 0.3)));
        fs::remove_dir_all(s.dir()).unwrap();
    }

    #[test]
    fn garbage_is_rejected() {
        let s = store("garbage");
        fs::create_dir_all(s.dir()).unwrap();
        fs::write(s.path(date!(2024 - 01 - 01)), "fast").unwrap();
        assert!(matches!(
            s.load(date!(2024 - 01 - 01)),
            Err(BaselineError::Parse(_, _))
        ));
        assert!(s.store(date!(2024 - 01 - 01), f64::NAN).is_err());
        fs::remove_dir_all(s.dir()).unwrap();
    }
}
