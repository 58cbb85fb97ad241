//! Raw content retrieval for imports.
//!
//! The resolver never touches the filesystem, the environment or the
//! network directly; everything goes through a [`Fetch`] implementation so
//! tests can count and script retrievals.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::config::DEFAULT_HTTP_TIMEOUT;

/// Errors that can occur while fetching an import.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("environment variable `{0}` is not set")]
    EnvNotSet(String),

    #[error("environment variable `{0}` is not valid unicode")]
    EnvNotUnicode(String),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("the `missing` import never resolves")]
    Missing,
}

/// Source of raw import content.
pub trait Fetch {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FetchError>;

    fn read_env(&self, name: &str) -> Result<String, FetchError>;

    fn fetch_url(&self, url: &str, headers: &[(String, String)]) -> Result<Vec<u8>, FetchError>;
}

/// Largest remote response body read into memory.
pub const MAX_RESPONSE_BYTES: u64 = 10 * 1024 * 1024;

/// Fetches from the real filesystem, process environment and network.
#[derive(Debug, Clone)]
pub struct SystemFetcher {
    agent: ureq::Agent,
    max_response_bytes: u64,
}

impl SystemFetcher {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("sable/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            max_response_bytes: MAX_RESPONSE_BYTES,
        }
    }

    pub fn with_max_response_bytes(mut self, limit: u64) -> Self {
        self.max_response_bytes = limit;
        self
    }
}

impl Default for SystemFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetch for SystemFetcher {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FetchError> {
        debug!(path = %path.display(), "reading local import");
        std::fs::read(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => FetchError::FileNotFound(path.to_path_buf()),
            _ => FetchError::Io {
                path: path.to_path_buf(),
                source,
            },
        })
    }

    fn read_env(&self, name: &str) -> Result<String, FetchError> {
        debug!(name, "reading environment import");
        std::env::var(name).map_err(|e| match e {
            std::env::VarError::NotPresent => FetchError::EnvNotSet(name.to_string()),
            std::env::VarError::NotUnicode(_) => FetchError::EnvNotUnicode(name.to_string()),
        })
    }

    fn fetch_url(&self, url: &str, headers: &[(String, String)]) -> Result<Vec<u8>, FetchError> {
        debug!(url, headers = headers.len(), "fetching remote import");
        let mut request = self.agent.get(url);
        for (name, value) in headers {
            request = request.set(name, value);
        }

        let response = request.call().map_err(|e| match e {
            ureq::Error::Status(status, _) => FetchError::Status {
                url: url.to_string(),
                status,
            },
            other => FetchError::Network(format!("failed to fetch {}: {}", url, other)),
        })?;

        read_limited(response.into_reader(), self.max_response_bytes, url)
    }
}

/// Read at most `limit` bytes of a response body.
fn read_limited(reader: impl Read, limit: u64, url: &str) -> Result<Vec<u8>, FetchError> {
    let mut body = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut body)
        .map_err(|e| FetchError::Network(format!("failed to read response from {}: {}", url, e)))?;
    if body.len() as u64 > limit {
        return Err(FetchError::TooLarge {
            url: url.to_string(),
            limit,
        });
    }
    Ok(body)
}
