use crate::error::CacheError;
use crate::token::Token;
use crate::util::{
    atomic_write, bincode_deserialize, bincode_options_limited, bincode_serialize,
    millis_since_epoch, now_millis, read_file_limited, remove_file_best_effort, TMP_MARKER,
};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

pub const TOKEN_STORE_SCHEMA_VERSION: u32 = 1;

/// Atomic-write temp files younger than this may belong to a save in progress.
const TMP_GRACE: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenStorePolicy {
    /// Entries older than this (measured from when they were saved) are dropped regardless of
    /// size pressure.
    pub ttl: Duration,
    /// A sweep starts evicting once the store grows beyond this many bytes...
    pub high_water_bytes: u64,
    /// ...and stops once it is back at or below this many.
    pub low_water_bytes: u64,
}

impl Default for TokenStorePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(7 * 24 * 60 * 60),
            high_water_bytes: 512 * 1024 * 1024,
            low_water_bytes: 384 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    AlreadyPresent,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    pub corrupt: usize,
    pub evicted: usize,
    pub reclaimed_bytes: u64,
    pub remaining_bytes: u64,
}

/// Disk-backed map from [`Token`] to a serialized result, bounded by TTL and a size budget.
///
/// Each entry lives in `<root>/<token>.bin` as a versioned bincode envelope. Writes are atomic
/// renames and deletions are single unlinks, so a [`TokenStore::load`] racing a sweep sees either
/// the complete old entry or nothing. Access recency is tracked through the file mtime, which
/// `load` refreshes.
#[derive(Clone, Debug)]
pub struct TokenStore {
    root: PathBuf,
    policy: TokenStorePolicy,
}

impl TokenStore {
    pub fn open(root: impl AsRef<Path>, policy: TokenStorePolicy) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root, policy })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &TokenStorePolicy {
        &self.policy
    }

    pub fn entry_path(&self, token: &Token) -> PathBuf {
        self.root.join(format!("{}.bin", token.as_str()))
    }

    /// Persists `value` under `token`. Saving a token that already holds a readable entry is a
    /// no-op, since tokens are derived from content.
    pub fn save<T: Serialize>(&self, token: &Token, value: &T) -> Result<SaveOutcome, CacheError> {
        let path = self.entry_path(token);
        if self.read_envelope(token, &path).is_some() {
            touch(&path);
            return Ok(SaveOutcome::AlreadyPresent);
        }

        let payload = bincode_serialize(value)?;
        let persisted = PersistedEntry {
            schema_version: TOKEN_STORE_SCHEMA_VERSION,
            saved_at_millis: now_millis(),
            token: token.as_str(),
            payload: &payload,
        };
        atomic_write(&path, &bincode_serialize(&persisted)?)?;
        tracing::debug!(
            target: "pathex.tokens",
            %token,
            bytes = payload.len(),
            "saved token entry"
        );
        Ok(SaveOutcome::Created)
    }

    /// Returns the value stored under `token`, or `None` when it is missing, expired, corrupt,
    /// or not of shape `T`.
    pub fn load<T: DeserializeOwned>(&self, token: &Token) -> Option<T> {
        let path = self.entry_path(token);
        let persisted = self.read_envelope(token, &path)?;

        match bincode_deserialize::<T>(&persisted.payload) {
            Ok(value) => {
                touch(&path);
                Some(value)
            }
            Err(err) => {
                // The envelope is sound; another caller may expect a different shape, so the
                // entry is kept.
                tracing::debug!(
                    target: "pathex.tokens",
                    %token,
                    error = %err,
                    "token entry does not match the requested shape"
                );
                None
            }
        }
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.read_envelope(token, &self.entry_path(token)).is_some()
    }

    fn read_envelope(&self, token: &Token, path: &Path) -> Option<PersistedEntryOwned> {
        let bytes = read_file_limited(path)?;
        let persisted: PersistedEntryOwned = match bincode_deserialize(&bytes) {
            Ok(persisted) => persisted,
            Err(err) => {
                tracing::debug!(
                    target: "pathex.tokens",
                    path = %path.display(),
                    error = %err,
                    "discarding corrupt token entry"
                );
                remove_file_best_effort(path, "token_store.corrupt");
                return None;
            }
        };

        if persisted.schema_version != TOKEN_STORE_SCHEMA_VERSION
            || persisted.token != token.as_str()
        {
            remove_file_best_effort(path, "token_store.mismatch");
            return None;
        }

        if self.is_expired(persisted.saved_at_millis, now_millis()) {
            remove_file_best_effort(path, "token_store.expired");
            return None;
        }

        Some(persisted)
    }

    fn is_expired(&self, saved_at_millis: u64, now: u64) -> bool {
        let ttl_millis = u64::try_from(self.policy.ttl.as_millis()).unwrap_or(u64::MAX);
        now.saturating_sub(saved_at_millis) > ttl_millis
    }

    /// Drops expired and unreadable entries, then evicts least recently accessed entries while
    /// the store is above the high-water mark, until it is at or below the low-water mark.
    pub fn sweep(&self) -> Result<SweepReport, CacheError> {
        let now = now_millis();
        let mut report = SweepReport::default();
        let mut candidates: Vec<SweepEntry> = Vec::new();
        let mut total_bytes: u64 = 0;

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(err) => return Err(err.into()),
        };

        for entry in entries {
            let Ok(entry) = entry else {
                continue;
            };
            let path = entry.path();
            let Ok(meta) = fs::symlink_metadata(&path) else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let modified_millis = meta.modified().map(millis_since_epoch).unwrap_or(0);

            if name.contains(TMP_MARKER) {
                let age = now.saturating_sub(modified_millis);
                if u128::from(age) > TMP_GRACE.as_millis() {
                    remove_file_best_effort(&path, "token_store.stale_tmp");
                }
                continue;
            }
            if path.extension().and_then(|ext| ext.to_str()) != Some("bin") {
                continue;
            }
            report.scanned += 1;

            let header = read_entry_header(&path);
            let stem = path.file_stem().and_then(|stem| stem.to_str());
            let Some(header) = header.filter(|header| {
                header.schema_version == TOKEN_STORE_SCHEMA_VERSION
                    && stem == Some(header.token.as_str())
            }) else {
                if remove_file_best_effort(&path, "token_store.sweep_corrupt") {
                    report.corrupt += 1;
                    report.reclaimed_bytes = report.reclaimed_bytes.saturating_add(meta.len());
                }
                continue;
            };

            if self.is_expired(header.saved_at_millis, now) {
                if remove_file_best_effort(&path, "token_store.sweep_expired") {
                    report.expired += 1;
                    report.reclaimed_bytes = report.reclaimed_bytes.saturating_add(meta.len());
                }
                continue;
            }

            total_bytes = total_bytes.saturating_add(meta.len());
            candidates.push(SweepEntry {
                last_access_millis: modified_millis,
                len: meta.len(),
                path,
            });
        }

        if total_bytes > self.policy.high_water_bytes {
            candidates.sort_by_key(|entry| entry.last_access_millis);
            for entry in candidates {
                if total_bytes <= self.policy.low_water_bytes {
                    break;
                }
                if remove_file_best_effort(&entry.path, "token_store.evict") {
                    total_bytes = total_bytes.saturating_sub(entry.len);
                    report.evicted += 1;
                    report.reclaimed_bytes = report.reclaimed_bytes.saturating_add(entry.len);
                }
            }
        }
        report.remaining_bytes = total_bytes;

        if report.expired + report.corrupt + report.evicted > 0 {
            tracing::info!(
                target: "pathex.tokens",
                scanned = report.scanned,
                expired = report.expired,
                corrupt = report.corrupt,
                evicted = report.evicted,
                reclaimed_bytes = report.reclaimed_bytes,
                remaining_bytes = report.remaining_bytes,
                "swept token store"
            );
        }
        Ok(report)
    }
}

fn touch(path: &Path) {
    let touched = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.set_modified(SystemTime::now()));
    if let Err(err) = touched {
        // A sweep may have removed the entry after it was read.
        if err.kind() != io::ErrorKind::NotFound {
            tracing::debug!(
                target: "pathex.tokens",
                path = %path.display(),
                error = %err,
                "failed to refresh token entry access time"
            );
        }
    }
}

#[derive(Debug)]
struct SweepEntry {
    last_access_millis: u64,
    len: u64,
    path: PathBuf,
}

#[derive(Debug, Serialize)]
struct PersistedEntry<'a> {
    schema_version: u32,
    saved_at_millis: u64,
    token: &'a str,
    payload: &'a [u8],
}

#[derive(Debug, Deserialize)]
struct PersistedEntryOwned {
    schema_version: u32,
    saved_at_millis: u64,
    token: String,
    payload: Vec<u8>,
}

/// Leading fields of [`PersistedEntry`]; the payload is never read during a sweep.
#[derive(Debug, Deserialize)]
struct PersistedEntryHeader {
    schema_version: u32,
    saved_at_millis: u64,
    token: String,
}

fn read_entry_header(path: &Path) -> Option<PersistedEntryHeader> {
    let bytes = read_file_limited(path)?;
    let mut cursor = Cursor::new(bytes);
    bincode_options_limited().deserialize_from(&mut cursor).ok()
}
