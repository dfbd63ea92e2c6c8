#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Path-addressed memoization for derived tables.
//!
//! Every derived artifact is identified by a [`CacheKey`] built from the
//! producing function's name and its arguments. [`ArtifactCache`] returns
//! the stored artifact when one exists and otherwise builds, stores, and
//! returns it. There is no versioning: an artifact is valid for as long as
//! its file exists.
//!
//! The cache assumes a single sequential writer. Two processes building the
//! same key race on the same path and the last write wins.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// File extension of stored artifacts.
pub const ARTIFACT_EXTENSION: &str = "msgpack";

/// Errors raised by cache backends.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Reading or writing an artifact file failed.
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        /// Artifact path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// An artifact could not be serialized.
    #[error("Failed to encode artifact {key}: {source}")]
    Encode {
        /// Artifact key.
        key: String,
        /// Underlying error.
        source: rmp_serde::encode::Error,
    },

    /// A stored artifact could not be deserialized.
    #[error("Failed to decode artifact {key}: {source}")]
    Decode {
        /// Artifact key.
        key: String,
        /// Underlying error.
        source: rmp_serde::decode::Error,
    },
}

/// Deterministic identity of a derived artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    name: String,
    args: Vec<String>,
}

impl CacheKey {
    /// Starts a key for the function `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    /// Appends one argument. Order matters.
    #[must_use]
    pub fn arg(mut self, value: impl Display) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// File name of the artifact: `name_arg1_arg2.msgpack`, with path
    /// separators and other unsafe characters replaced.
    #[must_use]
    pub fn file_name(&self) -> String {
        let mut stem = sanitize(&self.name);
        for arg in &self.args {
            stem.push('_');
            stem.push_str(&sanitize(arg));
        }
        format!("{stem}.{ARTIFACT_EXTENSION}")
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(", "))
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Storage for serialized artifacts.
pub trait CacheBackend: Send + Sync {
    /// Returns the stored bytes for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if an existing artifact cannot be read.
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stores the bytes for `key`, replacing any previous artifact.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the artifact cannot be written.
    fn store(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError>;
}

/// Artifacts stored as files in one directory.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Uses `root` as the artifact directory (created on first write).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path at which `key` is stored.
    #[must_use]
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Artifact directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl CacheBackend for FsBackend {
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    fn store(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.root).map_err(|source| CacheError::Io {
            path: self.root.clone(),
            source,
        })?;

        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes)
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|source| CacheError::Io { path, source })
    }
}

/// Artifacts kept in memory for the lifetime of the backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for MemoryBackend {
    fn load(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.file_name())
            .cloned())
    }

    fn store(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.file_name(), bytes.to_vec());
        Ok(())
    }
}

/// Backend that never stores anything; every request rebuilds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl CacheBackend for NoCache {
    fn load(&self, _key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    fn store(&self, _key: &CacheKey, _bytes: &[u8]) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Load-or-build front end over a [`CacheBackend`].
pub struct ArtifactCache {
    backend: Box<dyn CacheBackend>,
}

impl ArtifactCache {
    /// Wraps a backend.
    #[must_use]
    pub fn new(backend: Box<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    /// File-backed cache rooted at `root`.
    #[must_use]
    pub fn on_disk(root: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(FsBackend::new(root)))
    }

    /// In-memory cache.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryBackend::new()))
    }

    /// Cache that always rebuilds.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Box::new(NoCache))
    }

    /// Returns the artifact stored under `key`, or runs `build`, stores its
    /// result, and returns it.
    ///
    /// # Errors
    ///
    /// Returns the error from `build`, or a [`CacheError`] (converted into
    /// `E`) if the artifact cannot be read, decoded, encoded, or written.
    pub fn load_or_build<T, E, F>(&self, key: &CacheKey, build: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<CacheError>,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(bytes) = self.backend.load(key)? {
            log::debug!("Cache hit: {key}");
            return rmp_serde::from_slice(&bytes)
                .map_err(|source| {
                    CacheError::Decode {
                        key: key.to_string(),
                        source,
                    }
                    .into()
                });
        }

        log::info!("Building {key}...");
        let value = build()?;

        let bytes = rmp_serde::to_vec_named(&value).map_err(|source| CacheError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.backend.store(key, &bytes)?;

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn key_file_names_are_deterministic() {
        let key = CacheKey::new("blocks_misclass_flag")
            .arg(2015)
            .arg("pm25_12")
            .arg("msatna");
        assert_eq!(key.file_name(), "blocks_misclass_flag_2015_pm25_12_msatna.msgpack");
        assert_eq!(key.to_string(), "blocks_misclass_flag(2015, pm25_12, msatna)");

        let unsafe_key = CacheKey::new("x").arg("../etc/passwd");
        assert_eq!(unsafe_key.file_name(), "x_..-etc-passwd.msgpack");
    }

    #[test]
    fn builds_once_then_serves_from_cache() {
        let cache = ArtifactCache::in_memory();
        let key = CacheKey::new("panel").arg(2010);
        let calls = Cell::new(0);

        for _ in 0..3 {
            let value: BTreeMap<String, f64> = cache
                .load_or_build(&key, || {
                    calls.set(calls.get() + 1);
                    Ok::<_, CacheError>(BTreeMap::from([("a".to_string(), 1.5)]))
                })
                .unwrap();
            assert_eq!(value["a"], 1.5);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn disabled_cache_always_rebuilds() {
        let cache = ArtifactCache::disabled();
        let key = CacheKey::new("panel");
        let calls = Cell::new(0);
        for _ in 0..2 {
            let _: u32 = cache
                .load_or_build(&key, || {
                    calls.set(calls.get() + 1);
                    Ok::<_, CacheError>(7)
                })
                .unwrap();
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn build_errors_are_not_cached() {
        let cache = ArtifactCache::in_memory();
        let key = CacheKey::new("flaky");

        let failed: Result<u32, CacheError> = cache.load_or_build(&key, || {
            Err(CacheError::Io {
                path: PathBuf::from("x"),
                source: std::io::Error::other("boom"),
            })
        });
        assert!(failed.is_err());

        let rebuilt: u32 = cache
            .load_or_build(&key, || Ok::<_, CacheError>(3))
            .unwrap();
        assert_eq!(rebuilt, 3);
    }

    #[test]
    fn fs_backend_round_trips_between_instances() {
        let tmp = std::env::temp_dir().join("moncov_cache_fs_test");
        let _ = std::fs::remove_dir_all(&tmp);

        let key = CacheKey::new("bg_multisatpm_withpop").arg(2012);
        let first: Vec<Option<f64>> = ArtifactCache::on_disk(&tmp)
            .load_or_build(&key, || Ok::<_, CacheError>(vec![Some(1.0), None]))
            .unwrap();

        assert!(FsBackend::new(&tmp).path_for(&key).exists());

        let second: Vec<Option<f64>> = ArtifactCache::on_disk(&tmp)
            .load_or_build(&key, || -> Result<_, CacheError> {
                panic!("should be served from disk")
            })
            .unwrap();
        assert_eq!(first, second);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn corrupt_artifacts_surface_decode_errors() {
        let backend = MemoryBackend::new();
        let key = CacheKey::new("corrupt");
        backend.store(&key, &[0xc1]).unwrap();
        let cache = ArtifactCache::new(Box::new(backend));
        let result: Result<u32, CacheError> = cache.load_or_build(&key, || Ok(1));
        assert!(matches!(result, Err(CacheError::Decode { .. })));
    }
}
