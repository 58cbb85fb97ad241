//! Resolver configuration.
//!
//! Environment variables:
//! - `SABLE_CACHE`: semantic cache directory
//! - `SABLE_CACHE_MODE`: `use` (default) or `ignore`
//! - `SABLE_DIGEST_POLICY`: `enforce` (default) or `hint`

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Overrides the semantic cache directory.
pub const CACHE_ENV: &str = "SABLE_CACHE";
/// Selects the [`CacheMode`].
pub const CACHE_MODE_ENV: &str = "SABLE_CACHE_MODE";
/// Selects the [`DigestPolicy`].
pub const DIGEST_POLICY_ENV: &str = "SABLE_DIGEST_POLICY";

/// Default timeout for remote imports.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The semantic cache directory.
///
/// Uses `$SABLE_CACHE` if set, else the platform cache directory, else
/// `.sable-cache` in the working directory.
pub fn cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CACHE_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    if let Some(cache) = dirs::cache_dir() {
        return cache.join("sable");
    }

    PathBuf::from(".sable-cache")
}

/// Whether digested imports may be served from the semantic cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Use,
    Ignore,
}

impl FromStr for CacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "use" => Ok(CacheMode::Use),
            "ignore" => Ok(CacheMode::Ignore),
            other => Err(format!("unknown cache mode `{}` (expected `use` or `ignore`)", other)),
        }
    }
}

/// What a digest mismatch means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DigestPolicy {
    /// A mismatch fails resolution.
    #[default]
    Enforce,
    /// A mismatch is reported and the fetched content is used.
    CacheHint,
}

impl FromStr for DigestPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enforce" => Ok(DigestPolicy::Enforce),
            "hint" | "cache-hint" => Ok(DigestPolicy::CacheHint),
            other => Err(format!("unknown digest policy `{}` (expected `enforce` or `hint`)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Directory that root-level relative imports are resolved against.
    pub base_dir: PathBuf,
    pub cache_mode: CacheMode,
    pub digest_policy: DigestPolicy,
    /// Semantic cache directory; `None` means [`cache_dir()`].
    pub cache_dir: Option<PathBuf>,
    pub http_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            cache_mode: CacheMode::Use,
            digest_policy: DigestPolicy::Enforce,
            cache_dir: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl ResolverConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `SABLE_CACHE_MODE` and `SABLE_DIGEST_POLICY`.
    /// Unrecognised values are logged and ignored.
    pub fn from_env(base_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(base_dir);

        if let Ok(mode) = std::env::var(CACHE_MODE_ENV) {
            match mode.parse() {
                Ok(mode) => config.cache_mode = mode,
                Err(e) => tracing::warn!("ignoring {}: {}", CACHE_MODE_ENV, e),
            }
        }
        if let Ok(policy) = std::env::var(DIGEST_POLICY_ENV) {
            match policy.parse() {
                Ok(policy) => config.digest_policy = policy,
                Err(e) => tracing::warn!("ignoring {}: {}", DIGEST_POLICY_ENV, e),
            }
        }

        config
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    pub fn with_digest_policy(mut self, policy: DigestPolicy) -> Self {
        self.digest_policy = policy;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// The effective semantic cache directory.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(cache_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modes() {
        assert_eq!("ignore".parse::<CacheMode>(), Ok(CacheMode::Ignore));
        assert_eq!("USE".parse::<CacheMode>(), Ok(CacheMode::Use));
        assert!("sometimes".parse::<CacheMode>().is_err());
        assert_eq!("hint".parse::<DigestPolicy>(), Ok(DigestPolicy::CacheHint));
        assert_eq!("enforce".parse::<DigestPolicy>(), Ok(DigestPolicy::Enforce));
    }

    #[test]
    fn test_builder() {
        let config = ResolverConfig::new("/project")
            .with_cache_mode(CacheMode::Ignore)
            .with_digest_policy(DigestPolicy::CacheHint)
            .with_cache_dir("/tmp/sable-cache");
        assert_eq!(config.base_dir, PathBuf::from("/project"));
        assert_eq!(config.cache_mode, CacheMode::Ignore);
        assert_eq!(config.digest_policy, DigestPolicy::CacheHint);
        assert_eq!(config.resolved_cache_dir(), PathBuf::from("/tmp/sable-cache"));
    }

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.cache_mode, CacheMode::Use);
        assert_eq!(config.digest_policy, DigestPolicy::Enforce);
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
    }
}
