//! # Semantic Hash
//!
//! SHA-256 over the canonical encoding of a denoted expression.
//!
//! Two trees that differ only in notes, record field order or the width a
//! float was written with have the same encoding, and so the same hash.
//!
//! ## Display Formats
//!
//! ```text
//! Source form: sha256:2a9c7c3e...   (64 hex digits)
//! Multihash:   12202a9c7c3e...      (0x12 = sha2-256, 0x20 = 32 bytes)
//! ```
//!
//! The multihash form names entries in the semantic cache; the binary
//! encoding of an import carries the same 34 bytes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use thiserror::Error;

use crate::binary::{encode_expression, EncodeEmbed};
use crate::syntax::Expr;

/// Multihash function code for SHA-256.
pub const MULTIHASH_SHA256: u8 = 0x12;

/// Digest length in bytes.
pub const DIGEST_LEN: usize = 32;

/// A SHA-256 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest([u8; DIGEST_LEN]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestParseError {
    #[error("expected `sha256:` followed by 64 hex digits")]
    MissingPrefix,
    #[error("invalid hex digest: {0}")]
    InvalidHex(String),
    #[error("digest must be {DIGEST_LEN} bytes, got {0}")]
    WrongLength(usize),
}

impl Digest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn compute(data: &[u8]) -> Self {
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&Sha256::digest(data));
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// `0x12 0x20` followed by the digest.
    pub fn multihash_bytes(&self) -> [u8; DIGEST_LEN + 2] {
        let mut out = [0u8; DIGEST_LEN + 2];
        out[0] = MULTIHASH_SHA256;
        out[1] = DIGEST_LEN as u8;
        out[2..].copy_from_slice(&self.0);
        out
    }

    /// Parse the 34-byte multihash layout.
    pub fn from_multihash_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [MULTIHASH_SHA256, len, digest @ ..] if usize::from(*len) == DIGEST_LEN && digest.len() == DIGEST_LEN => {
                let mut out = [0u8; DIGEST_LEN];
                out.copy_from_slice(digest);
                Some(Self(out))
            }
            _ => None,
        }
    }

    /// Hex-encoded multihash, used as the cache file name.
    pub fn to_multihash_hex(&self) -> String {
        hex::encode(self.multihash_bytes())
    }

    /// First 12 hex digits, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }

    fn from_hex(s: &str) -> Result<Self, DigestParseError> {
        let bytes = hex::decode(s).map_err(|e| DigestParseError::InvalidHex(e.to_string()))?;
        let bytes: [u8; DIGEST_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| DigestParseError::WrongLength(bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest(sha256:{}…)", self.short())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

/// Accepts `sha256:<hex>` and the hex multihash `1220<hex>`.
impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex) = s.strip_prefix("sha256:") {
            return Self::from_hex(hex);
        }
        match s.strip_prefix("1220") {
            Some(hex) if s.len() == 2 * (DIGEST_LEN + 2) => Self::from_hex(hex),
            _ => Err(DigestParseError::MissingPrefix),
        }
    }
}

/// The semantic hash of an expression.
pub fn semantic_hash<A: EncodeEmbed>(expr: &Expr<A>) -> Digest {
    Digest::compute(&encode_expression(expr))
}

/// The semantic hash as a hex multihash string.
pub fn hash_expression<A: EncodeEmbed>(expr: &Expr<A>) -> String {
    semantic_hash(expr).to_multihash_hex()
}
