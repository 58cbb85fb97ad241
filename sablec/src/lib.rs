//! # Sable Core Library
//!
//! Canonical binary encoding, semantic hashing and import resolution for
//! the Sable configuration language.
//!
//! Sable programs can import other expressions from files, environment
//! variables and URLs, optionally pinned by a SHA-256 digest. This crate
//! provides the two pieces that make that trustworthy:
//!
//! 1. **Canonical codec** - a deterministic CBOR encoding of expressions,
//!    whose digest is the expression's *semantic hash*
//! 2. **Import resolution** - fetches, verifies and caches imports while
//!    recording the dependency graph
//!
//! ## Pipeline
//!
//! ```text
//! bytes -> decode -> Expr<Import> -> resolve -> Expr<Resolved> -> encode -> sha256
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use sablec::binary::{decode_expression, encode_expression};
//! use sablec::content::hash_expression;
//! use sablec::syntax::{Expr, Resolved};
//!
//! let expr: Expr<Resolved> = Expr::natural(42);
//! let bytes = encode_expression(&expr);
//! assert_eq!(decode_expression(&bytes).unwrap(), Expr::natural(42));
//! println!("{}", hash_expression(&expr));
//! ```
//!
//! ## Module Overview
//!
//! - [`span`] - Source positions carried by cosmetic notes
//! - [`syntax`] - Expression tree and import descriptors
//! - [`binary`] - CBOR term model and the canonical codec
//! - [`content`] - Semantic hashes and the content-addressed cache
//! - [`resolve`] - Import chaining, fetching, resolution and freezing
//! - [`config`] - Resolver configuration

pub mod binary;
pub mod config;
pub mod content;
pub mod resolve;
pub mod span;
pub mod syntax;

// Re-export commonly used types
pub use binary::{decode_expression, encode_expression, DecodeError};
pub use config::{CacheMode, DigestPolicy, ResolverConfig};
pub use content::{hash_expression, semantic_hash, Digest, SemanticCache};
pub use resolve::{assert_no_imports, resolve_relative_to, Resolution, ResolveError, Resolver};
pub use span::Span;
pub use syntax::{Expr, Import, Resolved};
