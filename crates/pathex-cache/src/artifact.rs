use crate::error::CacheError;
use crate::key::CacheKey;
use crate::util::{atomic_write, remove_file_best_effort};
use pathex_core::Format;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Scratch directory (under the cache root) holding ephemeral artifacts.
pub const EPHEMERAL_DIR_NAME: &str = ".ephemeral";

/// A persisted artifact. The file is shared with other requests and must not be deleted by the
/// caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedArtifact {
    path: PathBuf,
    len: u64,
}

impl CachedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A one-off artifact. The backing file is deleted when this value is dropped.
#[derive(Debug)]
pub struct EphemeralArtifact {
    path: TempPath,
    len: u64,
}

impl EphemeralArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }
}

/// The result of [`ArtifactCache::lookup_or_render`].
#[derive(Debug)]
pub enum Artifact {
    Cached(CachedArtifact),
    Ephemeral(EphemeralArtifact),
    /// Rendered bytes that could not be written anywhere on disk.
    Memory(Vec<u8>),
}

impl Artifact {
    /// Backing file, or `None` for [`Artifact::Memory`].
    pub fn path(&self) -> Option<&Path> {
        match self {
            Artifact::Cached(artifact) => Some(artifact.path()),
            Artifact::Ephemeral(artifact) => Some(artifact.path()),
            Artifact::Memory(_) => None,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Artifact::Cached(artifact) => artifact.len(),
            Artifact::Ephemeral(artifact) => artifact.len(),
            Artifact::Memory(bytes) => bytes.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Artifact::Ephemeral(_))
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self, Artifact::Memory(_))
    }

    /// Takes the bytes out of an in-memory artifact; file-backed artifacts are handed back.
    pub fn into_memory(self) -> Result<Vec<u8>, Self> {
        match self {
            Artifact::Memory(bytes) => Ok(bytes),
            other => Err(other),
        }
    }

    /// Reads the whole artifact, wherever it lives.
    pub fn read(&self) -> io::Result<Vec<u8>> {
        match self {
            Artifact::Memory(bytes) => Ok(bytes.clone()),
            Artifact::Cached(artifact) => fs::read(artifact.path()),
            Artifact::Ephemeral(artifact) => fs::read(artifact.path()),
        }
    }
}

/// Filesystem-backed store of rendered artifacts for one release.
///
/// Layout: `<root>/<release>/<kind>/<profile>/<file>` (see [`CacheKey::relative_path`]).
/// Every write goes through [`atomic_write`], so a file that exists at a key path is always
/// complete and readers need no locking.
#[derive(Clone, Debug)]
pub struct ArtifactCache {
    root: PathBuf,
    release: u32,
    release_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl ArtifactCache {
    /// Opens (creating if needed) the cache for `release` under `root`.
    ///
    /// Ephemeral files left behind by a previous process are removed.
    pub fn open(root: impl AsRef<Path>, release: u32) -> Result<Self, CacheError> {
        if release == 0 {
            return Err(CacheError::InvalidRelease);
        }
        let root = root.as_ref().to_path_buf();
        let release_dir = root.join(release.to_string());
        let scratch_dir = root.join(EPHEMERAL_DIR_NAME);
        fs::create_dir_all(&release_dir)?;
        fs::create_dir_all(&scratch_dir)?;

        let cache = Self {
            root,
            release,
            release_dir,
            scratch_dir,
        };
        cache.clear_scratch();
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn release(&self) -> u32 {
        self.release
    }

    pub fn release_dir(&self) -> &Path {
        &self.release_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.release_dir.join(key.relative_path())
    }

    /// Returns the artifact stored under `key`, if a complete file exists there.
    pub fn get(&self, key: &CacheKey) -> Option<CachedArtifact> {
        let path = self.path_for(key);
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_file() => Some(CachedArtifact {
                path,
                len: meta.len(),
            }),
            Ok(_) => None,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(
                        target: "pathex.cache",
                        path = %path.display(),
                        error = %err,
                        "failed to stat cached artifact"
                    );
                }
                None
            }
        }
    }

    /// Atomically stores `bytes` under `key`. Concurrent writers of the same key race
    /// harmlessly; the last rename wins.
    pub fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<CachedArtifact, CacheError> {
        let path = self.path_for(key);
        atomic_write(&path, bytes)?;
        tracing::debug!(
            target: "pathex.cache",
            path = %path.display(),
            bytes = bytes.len(),
            "stored artifact"
        );
        Ok(CachedArtifact {
            path,
            len: bytes.len() as u64,
        })
    }

    /// Writes `bytes` to a scratch file that disappears when the returned artifact is dropped.
    pub fn ephemeral(&self, format: Format, bytes: &[u8]) -> Result<Artifact, CacheError> {
        let mut file = tempfile::Builder::new()
            .prefix("artifact-")
            .suffix(&format!(".{}", format.extension()))
            .tempfile_in(&self.scratch_dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Artifact::Ephemeral(EphemeralArtifact {
            path: file.into_temp_path(),
            len: bytes.len() as u64,
        }))
    }

    /// Serves `key` from the cache or renders it.
    ///
    /// - `key == None` marks a decorated request: `render` is always called and the result is
    ///   ephemeral.
    /// - On a hit `render` is not called.
    /// - On a miss the rendered bytes are stored under `key`. If storing fails the request
    ///   still succeeds with an ephemeral artifact.
    /// - If the scratch file cannot be written either, the bytes are served from memory.
    ///
    /// The only errors returned are `render`'s own, unchanged; they never leave a file behind.
    pub fn lookup_or_render<F, E>(
        &self,
        key: Option<&CacheKey>,
        format: Format,
        render: F,
    ) -> Result<Artifact, E>
    where
        F: FnOnce() -> Result<Vec<u8>, E>,
    {
        let Some(key) = key else {
            let bytes = render()?;
            return Ok(self.ephemeral_or_memory(format, bytes));
        };

        if let Some(hit) = self.get(key) {
            return Ok(Artifact::Cached(hit));
        }

        let bytes = render()?;
        match self.put(key, &bytes) {
            Ok(stored) => Ok(Artifact::Cached(stored)),
            Err(err) => {
                tracing::warn!(
                    target: "pathex.cache",
                    path = %self.path_for(key).display(),
                    error = %err,
                    "failed to store artifact; serving it uncached"
                );
                Ok(self.ephemeral_or_memory(format, bytes))
            }
        }
    }

    fn ephemeral_or_memory(&self, format: Format, bytes: Vec<u8>) -> Artifact {
        match self.ephemeral(format, &bytes) {
            Ok(artifact) => artifact,
            Err(err) => {
                tracing::warn!(
                    target: "pathex.cache",
                    dir = %self.scratch_dir.display(),
                    bytes = bytes.len(),
                    error = %err,
                    "failed to stage artifact; serving it from memory"
                );
                Artifact::Memory(bytes)
            }
        }
    }

    fn clear_scratch(&self) {
        let entries = match fs::read_dir(&self.scratch_dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(
                    target: "pathex.cache",
                    dir = %self.scratch_dir.display(),
                    error = %err,
                    "failed to list scratch directory"
                );
                return;
            }
        };
        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_file = entry.file_type().map(|ty| ty.is_file()).unwrap_or(false);
            if is_file && remove_file_best_effort(&path, "artifact_cache.clear_scratch") {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(
                target: "pathex.cache",
                removed,
                "removed leftover ephemeral artifacts"
            );
        }
    }
}
