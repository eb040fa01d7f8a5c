use crate::error::CacheError;
use crate::util::{dir_size_bytes_nofollow, now_millis};
use std::fs;
use std::io;
use std::path::Path;

const GC_MARKER: &str = ".gc-";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub removed_releases: Vec<u32>,
    pub reclaimed_bytes: u64,
    pub failed: Vec<String>,
}

/// Removes every release directory under `root` other than `current`.
///
/// A stale tree is first renamed to `<release>.gc-<pid>-<millis>` and only then deleted, so a
/// reader never resolves a path into a half-deleted release. Leftover `.gc-` trees from an
/// interrupted earlier prune are deleted as well. Non-numeric entries are left alone.
pub fn prune_stale_releases(root: &Path, current: u32) -> Result<PruneReport, CacheError> {
    let mut report = PruneReport::default();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(report),
        Err(err) => return Err(err.into()),
    };

    for entry in entries {
        let entry = entry?;
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();

        if name.contains(GC_MARKER) {
            let bytes = dir_size_bytes_nofollow(&path);
            match fs::remove_dir_all(&path) {
                Ok(()) => report.reclaimed_bytes = report.reclaimed_bytes.saturating_add(bytes),
                Err(err) => {
                    tracing::debug!(
                        target: "pathex.cache",
                        path = %path.display(),
                        error = %err,
                        "failed to remove leftover release tree"
                    );
                    report.failed.push(name);
                }
            }
            continue;
        }

        let Ok(release) = name.parse::<u32>() else {
            continue;
        };
        if release == current {
            continue;
        }

        let bytes = dir_size_bytes_nofollow(&path);
        let doomed = root.join(format!(
            "{name}{GC_MARKER}{}-{}",
            std::process::id(),
            now_millis()
        ));
        let removed = fs::rename(&path, &doomed).and_then(|()| fs::remove_dir_all(&doomed));
        match removed {
            Ok(()) => {
                report.removed_releases.push(release);
                report.reclaimed_bytes = report.reclaimed_bytes.saturating_add(bytes);
            }
            Err(err) => {
                tracing::warn!(
                    target: "pathex.cache",
                    release,
                    path = %path.display(),
                    error = %err,
                    "failed to prune stale release"
                );
                report.failed.push(name);
            }
        }
    }

    report.removed_releases.sort_unstable();
    if !report.removed_releases.is_empty() {
        tracing::info!(
            target: "pathex.cache",
            current,
            removed = ?report.removed_releases,
            reclaimed_bytes = report.reclaimed_bytes,
            "pruned stale cache releases"
        );
    }
    Ok(report)
}
