//! # Canonical Binary Encoding
//!
//! Expressions are exchanged and hashed in a single canonical binary form:
//! a tree of [`Term`]s laid out as CBOR.
//!
//! ```text
//! Expr ──encode──▶ Term ──to_bytes──▶ bytes
//! Expr ◀──decode── Term ◀─from_bytes─ bytes
//! ```
//!
//! Canonical means one byte sequence per denoted tree: notes are skipped,
//! map keys are sorted, integers and floats take their shortest exact form,
//! and nested `let`s are flattened. Decoding is lenient where the layout
//! allows it (legacy version wrappers, the self-describing tag, indefinite
//! lengths) but always yields a tree that re-encodes canonically.

pub mod decode;
pub mod encode;
pub mod term;

use thiserror::Error;

use crate::syntax::{Expr, Import};

pub use encode::{encode, EncodeEmbed};
pub use term::{CborError, Term};

/// The self-describing CBOR tag, stripped before decoding.
pub const SELF_DESCRIBE_TAG: u64 = 55799;

/// Version strings accepted in the legacy `[version, expression]` wrapper.
pub const LEGACY_VERSIONS: &[&str] = &["1.0.0", "2.0.0", "3.0.0", "4.0.0", "5.0.0"];

/// Leading tags of array-shaped expressions.
pub(crate) mod tags {
    pub const APP: u64 = 0;
    pub const LAMBDA: u64 = 1;
    pub const PI: u64 = 2;
    pub const OPERATOR: u64 = 3;
    pub const LIST: u64 = 4;
    pub const SOME: u64 = 5;
    pub const MERGE: u64 = 6;
    pub const RECORD_TYPE: u64 = 7;
    pub const RECORD_LIT: u64 = 8;
    pub const FIELD: u64 = 9;
    pub const PROJECT: u64 = 10;
    pub const UNION_TYPE: u64 = 11;
    pub const IF: u64 = 14;
    pub const NATURAL: u64 = 15;
    pub const INTEGER: u64 = 16;
    pub const TEXT: u64 = 18;
    pub const ASSERT: u64 = 19;
    pub const IMPORT: u64 = 24;
    pub const LET: u64 = 25;
    pub const ANNOT: u64 = 26;
    pub const TO_MAP: u64 = 27;
    pub const EMPTY_LIST: u64 = 28;
    pub const WITH: u64 = 29;
}

/// Import target codes.
pub(crate) mod import_types {
    pub const HTTP: u64 = 0;
    pub const HTTPS: u64 = 1;
    pub const ABSOLUTE: u64 = 2;
    pub const HERE: u64 = 3;
    pub const PARENT: u64 = 4;
    pub const HOME: u64 = 5;
    pub const ENV: u64 = 6;
    pub const MISSING: u64 = 7;
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed binary: {0}")]
    Cbor(#[from] CborError),

    #[error("expected {expected}, found {term}")]
    UnexpectedTerm { expected: &'static str, term: Box<Term> },

    #[error("unknown expression tag {tag} in {term}")]
    UnknownTag { tag: u64, term: Box<Term> },

    #[error("unknown builtin `{0}`")]
    UnknownBuiltin(String),

    #[error("unknown operator code {0}")]
    UnknownOperator(u64),

    #[error("the anonymous name `_` may not be spelled out: {term}")]
    PlaceholderName { term: Box<Term> },

    #[error("duplicate key `{key}` in {term}")]
    DuplicateKey { key: String, term: Box<Term> },

    #[error("invalid digest: {0}")]
    InvalidDigest(Box<Term>),

    #[error("unsupported encoding version `{0}`")]
    UnsupportedVersion(String),

    #[error("expression nested deeper than {0} levels")]
    DepthLimit(usize),
}

impl DecodeError {
    pub(crate) fn unexpected(expected: &'static str, term: &Term) -> Self {
        DecodeError::UnexpectedTerm {
            expected,
            term: Box::new(term.clone()),
        }
    }
}

/// Encode an expression to canonical bytes.
///
/// Notes are skipped, so the output is that of the denoted tree.
pub fn encode_expression<A: EncodeEmbed>(expr: &Expr<A>) -> Vec<u8> {
    encode(expr).to_bytes()
}

/// Decode bytes produced by [`encode_expression`] or by an older encoder.
pub fn decode_expression(bytes: &[u8]) -> Result<Expr<Import>, DecodeError> {
    let term = Term::from_bytes(bytes)?;
    decode_term(&term)
}

/// Decode an already-parsed term.
///
/// Direct decoding is attempted first. Only when that fails is a
/// two-element `[version, expression]` array treated as a legacy wrapper.
pub fn decode_term(term: &Term) -> Result<Expr<Import>, DecodeError> {
    let term = strip_self_describe(term);
    let direct_error = match decode::decode(term) {
        Ok(expr) => return Ok(expr),
        Err(err) => err,
    };

    if let Term::Array(items) = term {
        if let [Term::Text(version), inner] = items.as_slice() {
            if version != crate::syntax::PLACEHOLDER {
                if LEGACY_VERSIONS.contains(&version.as_str()) {
                    tracing::debug!(version = %version, "decoding legacy version wrapper");
                    return decode::decode(strip_self_describe(inner));
                }
                return Err(DecodeError::UnsupportedVersion(version.clone()));
            }
        }
    }
    Err(direct_error)
}

fn strip_self_describe(mut term: &Term) -> &Term {
    while let Term::Tagged(SELF_DESCRIBE_TAG, inner) = term {
        term = inner;
    }
    term
}
