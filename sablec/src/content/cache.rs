//! # Semantic Cache
//!
//! Persistent content-addressed store of resolved expressions.
//!
//! ## Cache Structure
//!
//! ```text
//! $SABLE_CACHE/                 (or ~/.cache/sable/)
//! ├── 1220a7f2...c9    # canonical encoding of a resolved expression
//! ├── 12203b01...4e
//! └── ...
//! ```
//!
//! Each entry is named by the hex multihash of its own contents. Reading an
//! entry re-hashes it, so a truncated or tampered file is reported as
//! corrupted instead of being trusted. Entries are written to a temporary
//! file and renamed into place, so concurrent writers never expose a
//! partial entry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use super::hash::Digest;
use crate::binary::{decode_expression, encode_expression, DecodeError};
use crate::syntax::{Expr, Import, Resolved};

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached expressions.
    pub entries: usize,
    /// Total size in bytes.
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache entry {expected} is corrupted: contents hash to {actual}")]
    Corrupted { expected: Digest, actual: Digest },

    #[error("cache entry {digest} does not decode: {source}")]
    Decode {
        digest: Digest,
        #[source]
        source: DecodeError,
    },

    #[error("cache entry {digest} still contains the import {import}")]
    Unresolved { digest: Digest, import: Box<Import> },
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Content-addressed store keyed by semantic hash.
#[derive(Debug, Clone)]
pub struct SemanticCache {
    cache_dir: PathBuf,
    enabled: bool,
}

impl SemanticCache {
    /// Create a cache at the configured default location.
    pub fn new() -> Self {
        Self::with_dir(crate::config::cache_dir())
    }

    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            enabled: true,
        }
    }

    /// A cache that never hits and never stores.
    pub fn disabled() -> Self {
        Self {
            cache_dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn root(&self) -> &Path {
        &self.cache_dir
    }

    pub fn init(&self) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.cache_dir).map_err(|e| CacheError::io(&self.cache_dir, e))
    }

    pub fn entry_path(&self, digest: &Digest) -> PathBuf {
        self.cache_dir.join(digest.to_multihash_hex())
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.enabled && self.entry_path(digest).is_file()
    }

    /// Raw bytes of an entry, verified against its name.
    pub fn get_bytes(&self, digest: &Digest) -> Result<Option<Vec<u8>>, CacheError> {
        if !self.enabled {
            return Ok(None);
        }
        let path = self.entry_path(digest);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        let actual = Digest::compute(&bytes);
        if actual != *digest {
            return Err(CacheError::Corrupted {
                expected: *digest,
                actual,
            });
        }
        Ok(Some(bytes))
    }

    /// Load and decode an entry.
    pub fn load(&self, digest: &Digest) -> Result<Option<Expr<Resolved>>, CacheError> {
        let Some(bytes) = self.get_bytes(digest)? else {
            return Ok(None);
        };
        let expr = decode_expression(&bytes).map_err(|source| CacheError::Decode {
            digest: *digest,
            source,
        })?;
        expr.try_resolved()
            .map(Some)
            .map_err(|import| CacheError::Unresolved {
                digest: *digest,
                import,
            })
    }

    /// Store canonical bytes under their digest.
    ///
    /// Existing entries are left in place. Bytes that do not hash to
    /// `digest` are refused.
    pub fn store(&self, digest: &Digest, bytes: &[u8]) -> Result<(), CacheError> {
        if !self.enabled {
            return Ok(());
        }
        let actual = Digest::compute(bytes);
        if actual != *digest {
            return Err(CacheError::Corrupted {
                expected: *digest,
                actual,
            });
        }

        let path = self.entry_path(digest);
        if path.is_file() {
            return Ok(());
        }
        self.init()?;

        let tmp = self.cache_dir.join(format!(
            ".{}.{}.tmp",
            digest.to_multihash_hex(),
            std::process::id()
        ));
        fs::write(&tmp, bytes).map_err(|e| CacheError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            CacheError::io(&path, e)
        })?;
        debug!(digest = %digest.short(), "stored cache entry");
        Ok(())
    }

    /// Encode, hash and store a resolved expression.
    pub fn store_expr(&self, expr: &Expr<Resolved>) -> Result<Digest, CacheError> {
        let bytes = encode_expression(expr);
        let digest = Digest::compute(&bytes);
        self.store(&digest, &bytes)?;
        Ok(digest)
    }

    pub fn remove(&self, digest: &Digest) -> Result<bool, CacheError> {
        if !self.enabled {
            return Ok(false);
        }
        let path = self.entry_path(digest);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        if !self.enabled || !self.cache_dir.exists() {
            return Ok(CacheStats::default());
        }

        let mut stats = CacheStats::default();
        for entry in walkdir::WalkDir::new(&self.cache_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_entry_name(e.file_name().to_str()))
        {
            stats.entries += 1;
            if let Ok(meta) = entry.metadata() {
                stats.size += meta.len();
            }
        }
        Ok(stats)
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        if !self.enabled || !self.cache_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        let dir = fs::read_dir(&self.cache_dir).map_err(|e| CacheError::io(&self.cache_dir, e))?;
        for entry in dir {
            let entry = entry.map_err(|e| CacheError::io(&self.cache_dir, e))?;
            let name = entry.file_name();
            let name = name.to_str();
            let is_temp = name.is_some_and(|n| n.starts_with(".1220") && n.ends_with(".tmp"));
            if is_entry_name(name) || is_temp {
                let path = entry.path();
                fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
                removed += 1;
            }
        }
        debug!(removed, dir = %self.cache_dir.display(), "cleared semantic cache");
        Ok(removed)
    }
}

impl Default for SemanticCache {
    fn default() -> Self {
        Self::new()
    }
}

fn is_entry_name(name: Option<&str>) -> bool {
    name.is_some_and(|n| n.parse::<Digest>().is_ok() && n.starts_with("1220"))
}
