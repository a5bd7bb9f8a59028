//! Selection of measurement artifacts on disk.

use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// Return the `n` most recently created files directly inside `dir`, newest first. Files whose
/// name starts with one of `exclude_prefixes` are skipped (e.g., baseline captures that share the
/// directory with regular measurements).
///
/// If the file system does not report a creation time, the modification time is used instead.
pub fn most_recent_files(
    dir: impl AsRef<Path>,
    n: usize,
    exclude_prefixes: &[&str],
) -> Result<Vec<PathBuf>, glob::PatternError> {
    let pattern = dir.as_ref().join("*");
    let pattern = pattern.to_string_lossy();

    let mut files: Vec<(SystemTime, PathBuf)> = glob::glob(&pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Cannot read directory entry: {e}");
                None
            }
        })
        .filter(|path| path.is_file())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|x| x.to_string_lossy().to_string())
                .unwrap_or_default();
            !exclude_prefixes.iter().any(|p| name.starts_with(p))
        })
        .filter_map(|path| {
            let meta = fs::metadata(&path).ok()?;
            let t = meta.created().or_else(|_| meta.modified()).ok()?;
            Some((t, path))
        })
        .collect();

    // newest first, ties broken by the path to keep the order stable
    files.sort_by(|(ta, pa), (tb, pb)| tb.cmp(ta).then_with(|| pa.cmp(pb)));

    Ok(files.into_iter().take(n).map(|(_, p)| p).collect())
}
