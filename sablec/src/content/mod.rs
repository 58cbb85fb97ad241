//! # Content Addressing
//!
//! Semantic hashes of expressions and the persistent cache keyed by them.
//!
//! ```text
//! Expr<Resolved> ──encode──▶ canonical bytes ──sha256──▶ Digest
//!                                   │                      │
//!                                   └──────▶ cache/1220<hex digest>
//! ```

pub mod cache;
pub mod hash;

pub use cache::{CacheError, CacheStats, SemanticCache};
pub use hash::{hash_expression, semantic_hash, Digest, DigestParseError};
