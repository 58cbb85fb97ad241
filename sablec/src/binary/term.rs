//! # Term Model
//!
//! A generic self-describing binary value and its CBOR byte layout.
//!
//! Every item starts with a header byte: the top three bits select the
//! major type, the low five bits carry a small argument or announce how many
//! argument bytes follow.
//!
//! ```text
//!   7   5 4       0
//! ┌─────┬─────────┐
//! │ maj │  info   │  info < 24: argument inline
//! └─────┴─────────┘  24/25/26/27: 1/2/4/8 argument bytes follow (big-endian)
//!                    31: indefinite length (byte/text strings, arrays, maps)
//! ```
//!
//! The writer always emits definite lengths and the shortest argument form.
//! The reader accepts indefinite lengths and non-shortest arguments.

use std::fmt;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, ToPrimitive};
use thiserror::Error;

/// Nesting depth past which the reader gives up.
pub const MAX_DEPTH: usize = 128;

/// Tag for positive bignums.
pub const TAG_POSITIVE_BIGNUM: u64 = 2;
/// Tag for negative bignums.
pub const TAG_NEGATIVE_BIGNUM: u64 = 3;

const BREAK: u8 = 0xff;

/// A decoded CBOR value.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Major type 0.
    Unsigned(u64),
    /// Major type 1, holding `n` for the value `-1 - n`.
    Negative(u64),
    /// An integer outside the 64-bit range, carried as tag 2 or 3.
    BigInt(BigInt),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Term>),
    /// Entries in wire order.
    Map(Vec<(Term, Term)>),
    Tagged(u64, Box<Term>),
    Bool(bool),
    Null,
    /// IEEE 754 half precision, raw bits.
    Half(u16),
    Float(f32),
    Double(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CborError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),

    #[error("{0} trailing bytes after the top-level item")]
    TrailingBytes(usize),

    #[error("invalid UTF-8 in text string at byte {0}")]
    InvalidUtf8(usize),

    #[error("reserved additional information {info} at byte {offset}")]
    Reserved { info: u8, offset: usize },

    #[error("unsupported simple value {value} at byte {offset}")]
    UnsupportedSimple { value: u8, offset: usize },

    #[error("unexpected break at byte {0}")]
    UnexpectedBreak(usize),

    #[error("invalid chunk in indefinite-length string at byte {0}")]
    InvalidChunk(usize),

    #[error("bignum tag without a byte string at byte {0}")]
    InvalidBignum(usize),

    #[error("nesting deeper than {0} levels")]
    DepthLimit(usize),
}

impl Term {
    pub fn text(s: impl Into<String>) -> Self {
        Term::Text(s.into())
    }

    /// The smallest term representing `n`.
    pub fn integer(n: &BigInt) -> Self {
        match n.sign() {
            Sign::Minus => {
                let m: BigUint = n.magnitude() - BigUint::one();
                match m.to_u64() {
                    Some(m) => Term::Negative(m),
                    None => Term::BigInt(n.clone()),
                }
            }
            _ => match n.to_u64() {
                Some(v) => Term::Unsigned(v),
                None => Term::BigInt(n.clone()),
            },
        }
    }

    pub fn natural(n: &BigUint) -> Self {
        match n.to_u64() {
            Some(v) => Term::Unsigned(v),
            None => Term::BigInt(BigInt::from(n.clone())),
        }
    }

    /// Any integer term as an arbitrary-precision value.
    pub fn as_bigint(&self) -> Option<BigInt> {
        match self {
            Term::Unsigned(v) => Some(BigInt::from(*v)),
            Term::Negative(m) => Some(-BigInt::from(*m) - BigInt::one()),
            Term::BigInt(n) => Some(n.clone()),
            _ => None,
        }
    }

    /// Any float term widened to double precision.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Term::Half(bits) => Some(f16_bits_to_f64(*bits)),
            Term::Float(x) => Some(f64::from(*x)),
            Term::Double(x) => Some(*x),
            _ => None,
        }
    }

    /// The narrowest float term that holds `x` exactly. NaN is always the
    /// half-precision quiet NaN.
    pub fn float(x: f64) -> Self {
        if x.is_nan() {
            return Term::Half(0x7e00);
        }
        if let Some(bits) = f64_to_f16_exact(x) {
            return Term::Half(bits);
        }
        let single = x as f32;
        if f64::from(single) == x {
            Term::Float(single)
        } else {
            Term::Double(x)
        }
    }

    /// A short description of the term's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Term::Unsigned(_) | Term::Negative(_) | Term::BigInt(_) => "integer",
            Term::Bytes(_) => "byte string",
            Term::Text(_) => "text string",
            Term::Array(_) => "array",
            Term::Map(_) => "map",
            Term::Tagged(..) => "tagged item",
            Term::Bool(_) => "boolean",
            Term::Null => "null",
            Term::Half(_) | Term::Float(_) | Term::Double(_) => "float",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Term, CborError> {
        let mut reader = Reader { bytes, pos: 0, depth: 0 };
        let term = reader.item()?;
        if reader.pos != bytes.len() {
            return Err(CborError::TrailingBytes(bytes.len() - reader.pos));
        }
        Ok(term)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Term::Unsigned(v) => write_head(out, 0, *v),
            Term::Negative(m) => write_head(out, 1, *m),
            Term::BigInt(n) => write_bigint(out, n),
            Term::Bytes(b) => {
                write_head(out, 2, b.len() as u64);
                out.extend_from_slice(b);
            }
            Term::Text(s) => {
                write_head(out, 3, s.len() as u64);
                out.extend_from_slice(s.as_bytes());
            }
            Term::Array(items) => {
                write_head(out, 4, items.len() as u64);
                for item in items {
                    item.write_to(out);
                }
            }
            Term::Map(entries) => {
                write_head(out, 5, entries.len() as u64);
                for (k, v) in entries {
                    k.write_to(out);
                    v.write_to(out);
                }
            }
            Term::Tagged(tag, inner) => {
                write_head(out, 6, *tag);
                inner.write_to(out);
            }
            Term::Bool(false) => out.push(0xf4),
            Term::Bool(true) => out.push(0xf5),
            Term::Null => out.push(0xf6),
            Term::Half(bits) => {
                out.push(0xf9);
                out.extend_from_slice(&bits.to_be_bytes());
            }
            Term::Float(x) => {
                out.push(0xfa);
                out.extend_from_slice(&x.to_bits().to_be_bytes());
            }
            Term::Double(x) => {
                out.push(0xfb);
                out.extend_from_slice(&x.to_bits().to_be_bytes());
            }
        }
    }

    /// JSON rendering for diagnostics. Byte strings become hex strings and
    /// non-finite floats become strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Value};

        match self {
            Term::Unsigned(v) => json!(v),
            Term::Negative(m) => match i64::try_from(*m) {
                Ok(m) => json!(-1 - m),
                Err(_) => Value::String(format!("-{}", u128::from(*m) + 1)),
            },
            Term::BigInt(n) => Value::String(n.to_string()),
            Term::Bytes(b) => Value::String(hex::encode(b)),
            Term::Text(s) => Value::String(s.clone()),
            Term::Array(items) => Value::Array(items.iter().map(Term::to_json).collect()),
            Term::Map(entries) => {
                let mut object = serde_json::Map::new();
                for (k, v) in entries {
                    let key = match k {
                        Term::Text(s) => s.clone(),
                        other => other.to_string(),
                    };
                    object.insert(key, v.to_json());
                }
                Value::Object(object)
            }
            Term::Tagged(tag, inner) => json!({ "tag": tag, "value": inner.to_json() }),
            Term::Bool(b) => Value::Bool(*b),
            Term::Null => Value::Null,
            Term::Half(_) | Term::Float(_) | Term::Double(_) => {
                let x = self.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(x)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(float_diagnostic(x)))
            }
        }
    }
}

/// CBOR diagnostic notation.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Unsigned(v) => write!(f, "{}", v),
            Term::Negative(m) => write!(f, "-{}", u128::from(*m) + 1),
            Term::BigInt(n) => write!(f, "{}", n),
            Term::Bytes(b) => write!(f, "h'{}'", hex::encode(b)),
            Term::Text(s) => write!(f, "{:?}", s),
            Term::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Term::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
            Term::Tagged(tag, inner) => write!(f, "{}({})", tag, inner),
            Term::Bool(b) => write!(f, "{}", b),
            Term::Null => f.write_str("null"),
            Term::Half(_) | Term::Float(_) | Term::Double(_) => {
                f.write_str(&float_diagnostic(self.as_f64().unwrap_or(f64::NAN)))
            }
        }
    }
}

fn float_diagnostic(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format!("{:?}", x)
    }
}

fn write_head(out: &mut Vec<u8>, major: u8, arg: u64) {
    let major = major << 5;
    if arg < 24 {
        out.push(major | arg as u8);
    } else if arg <= u64::from(u8::MAX) {
        out.push(major | 24);
        out.push(arg as u8);
    } else if arg <= u64::from(u16::MAX) {
        out.push(major | 25);
        out.extend_from_slice(&(arg as u16).to_be_bytes());
    } else if arg <= u64::from(u32::MAX) {
        out.push(major | 26);
        out.extend_from_slice(&(arg as u32).to_be_bytes());
    } else {
        out.push(major | 27);
        out.extend_from_slice(&arg.to_be_bytes());
    }
}

fn write_bigint(out: &mut Vec<u8>, n: &BigInt) {
    let (major, tag, magnitude) = match n.sign() {
        Sign::Minus => (1, TAG_NEGATIVE_BIGNUM, n.magnitude() - BigUint::one()),
        _ => (0, TAG_POSITIVE_BIGNUM, n.magnitude().clone()),
    };
    if let Some(v) = magnitude.to_u64() {
        write_head(out, major, v);
        return;
    }
    write_head(out, 6, tag);
    let bytes = magnitude.to_bytes_be();
    write_head(out, 2, bytes.len() as u64);
    out.extend_from_slice(&bytes);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, CborError> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or(CborError::UnexpectedEof(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: u64) -> Result<&'a [u8], CborError> {
        let remaining = self.bytes.len() - self.pos;
        let len = usize::try_from(len)
            .ok()
            .filter(|len| *len <= remaining)
            .ok_or(CborError::UnexpectedEof(self.bytes.len()))?;
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn peek_break(&mut self) -> Result<bool, CborError> {
        match self.bytes.get(self.pos) {
            Some(&BREAK) => {
                self.pos += 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(CborError::UnexpectedEof(self.pos)),
        }
    }

    /// The header argument, or `None` for an indefinite length.
    fn argument(&mut self, info: u8, offset: usize) -> Result<Option<u64>, CborError> {
        let width = match info {
            0..=23 => return Ok(Some(u64::from(info))),
            24 => 1,
            25 => 2,
            26 => 4,
            27 => 8,
            31 => return Ok(None),
            _ => return Err(CborError::Reserved { info, offset }),
        };
        let bytes = self.take(width)?;
        Ok(Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))))
    }

    fn definite(&mut self, info: u8, offset: usize) -> Result<u64, CborError> {
        self.argument(info, offset)?
            .ok_or(CborError::Reserved { info, offset })
    }

    fn item(&mut self) -> Result<Term, CborError> {
        if self.depth >= MAX_DEPTH {
            return Err(CborError::DepthLimit(MAX_DEPTH));
        }
        self.depth += 1;
        let term = self.item_inner();
        self.depth -= 1;
        term
    }

    fn item_inner(&mut self) -> Result<Term, CborError> {
        let offset = self.pos;
        let initial = self.byte()?;
        let major = initial >> 5;
        let info = initial & 0x1f;

        match major {
            0 => Ok(Term::Unsigned(self.definite(info, offset)?)),
            1 => Ok(Term::Negative(self.definite(info, offset)?)),
            2 => Ok(Term::Bytes(self.string_bytes(2, info, offset)?)),
            3 => {
                let bytes = self.string_bytes(3, info, offset)?;
                String::from_utf8(bytes)
                    .map(Term::Text)
                    .map_err(|_| CborError::InvalidUtf8(offset))
            }
            4 => {
                let mut items = Vec::new();
                match self.argument(info, offset)? {
                    Some(len) => {
                        for _ in 0..len {
                            items.push(self.item()?);
                        }
                    }
                    None => {
                        while !self.peek_break()? {
                            items.push(self.item()?);
                        }
                    }
                }
                Ok(Term::Array(items))
            }
            5 => {
                let mut entries = Vec::new();
                match self.argument(info, offset)? {
                    Some(len) => {
                        for _ in 0..len {
                            let k = self.item()?;
                            entries.push((k, self.item()?));
                        }
                    }
                    None => {
                        while !self.peek_break()? {
                            let k = self.item()?;
                            entries.push((k, self.item()?));
                        }
                    }
                }
                Ok(Term::Map(entries))
            }
            6 => {
                let tag = self.definite(info, offset)?;
                let inner = self.item()?;
                match (tag, inner) {
                    (TAG_POSITIVE_BIGNUM, Term::Bytes(b)) => {
                        Ok(Term::BigInt(BigInt::from_bytes_be(Sign::Plus, &b)))
                    }
                    (TAG_NEGATIVE_BIGNUM, Term::Bytes(b)) => {
                        let m = BigInt::from_bytes_be(Sign::Plus, &b);
                        Ok(Term::BigInt(-m - BigInt::one()))
                    }
                    (TAG_POSITIVE_BIGNUM | TAG_NEGATIVE_BIGNUM, _) => Err(CborError::InvalidBignum(offset)),
                    (tag, inner) => Ok(Term::Tagged(tag, Box::new(inner))),
                }
            }
            _ => self.simple(info, offset),
        }
    }

    fn simple(&mut self, info: u8, offset: usize) -> Result<Term, CborError> {
        match info {
            20 => Ok(Term::Bool(false)),
            21 => Ok(Term::Bool(true)),
            22 => Ok(Term::Null),
            25 => {
                let b = self.take(2)?;
                Ok(Term::Half(u16::from_be_bytes([b[0], b[1]])))
            }
            26 => {
                let b = self.take(4)?;
                Ok(Term::Float(f32::from_bits(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))))
            }
            27 => {
                let b = self.take(8)?;
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                Ok(Term::Double(f64::from_bits(u64::from_be_bytes(raw))))
            }
            31 => Err(CborError::UnexpectedBreak(offset)),
            28..=30 => Err(CborError::Reserved { info, offset }),
            24 => {
                let value = self.byte()?;
                Err(CborError::UnsupportedSimple { value, offset })
            }
            value => Err(CborError::UnsupportedSimple { value, offset }),
        }
    }

    fn string_bytes(&mut self, major: u8, info: u8, offset: usize) -> Result<Vec<u8>, CborError> {
        match self.argument(info, offset)? {
            Some(len) => Ok(self.take(len)?.to_vec()),
            None => {
                let mut out = Vec::new();
                while !self.peek_break()? {
                    let chunk_offset = self.pos;
                    let header = self.byte()?;
                    let chunk_info = header & 0x1f;
                    if header >> 5 != major || chunk_info == 31 {
                        return Err(CborError::InvalidChunk(chunk_offset));
                    }
                    let len = self.definite(chunk_info, chunk_offset)?;
                    out.extend_from_slice(self.take(len)?);
                }
                Ok(out)
            }
        }
    }
}

/// Widen IEEE 754 half-precision bits.
pub fn f16_bits_to_f64(bits: u16) -> f64 {
    let negative = bits & 0x8000 != 0;
    let exponent = i32::from((bits >> 10) & 0x1f);
    let mantissa = f64::from(bits & 0x3ff);
    let magnitude = match exponent {
        0 => mantissa * 2f64.powi(-24),
        31 if mantissa == 0.0 => f64::INFINITY,
        31 => f64::NAN,
        _ => (1024.0 + mantissa) * 2f64.powi(exponent - 25),
    };
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Half-precision bits for `x` when the conversion loses nothing.
pub fn f64_to_f16_exact(x: f64) -> Option<u16> {
    if x.is_nan() {
        return None;
    }
    let sign: u16 = if x.is_sign_negative() { 0x8000 } else { 0 };
    let magnitude = x.abs();
    let candidate = if magnitude.is_infinite() {
        sign | 0x7c00
    } else if magnitude == 0.0 {
        sign
    } else {
        let bits = magnitude.to_bits();
        let raw_exponent = ((bits >> 52) & 0x7ff) as i32;
        if raw_exponent == 0 {
            return None;
        }
        let exponent = raw_exponent - 1023;
        if exponent > 15 {
            return None;
        }
        if exponent >= -14 {
            let fraction = bits & ((1u64 << 52) - 1);
            if fraction & ((1u64 << 42) - 1) != 0 {
                return None;
            }
            sign | (((exponent + 15) as u16) << 10) | (fraction >> 42) as u16
        } else {
            let scaled = magnitude * 2f64.powi(24);
            if scaled.fract() != 0.0 || scaled >= 1024.0 {
                return None;
            }
            sign | scaled as u16
        }
    };
    (f16_bits_to_f64(candidate).to_bits() == x.to_bits()).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_of(term: &Term) -> String {
        hex::encode(term.to_bytes())
    }

    #[test]
    fn test_integers_use_shortest_form() {
        assert_eq!(hex_of(&Term::Unsigned(0)), "00");
        assert_eq!(hex_of(&Term::Unsigned(23)), "17");
        assert_eq!(hex_of(&Term::Unsigned(24)), "1818");
        assert_eq!(hex_of(&Term::Unsigned(256)), "190100");
        assert_eq!(hex_of(&Term::Unsigned(65536)), "1a00010000");
        assert_eq!(hex_of(&Term::Unsigned(u64::MAX)), "1bffffffffffffffff");
        assert_eq!(hex_of(&Term::Negative(0)), "20");
        assert_eq!(hex_of(&Term::Negative(99)), "3863");
    }

    #[test]
    fn test_bignums() {
        let big = BigInt::from(u64::MAX) + 1;
        let term = Term::integer(&big);
        assert_eq!(term, Term::BigInt(big.clone()));
        assert_eq!(hex_of(&term), "c249010000000000000000");
        assert_eq!(Term::from_bytes(&term.to_bytes()).unwrap().as_bigint(), Some(big));

        let negative: BigInt = -(BigInt::from(u64::MAX) + 2u32);
        let term = Term::integer(&negative);
        assert_eq!(hex_of(&term), "c349010000000000000000");
        assert_eq!(Term::from_bytes(&term.to_bytes()).unwrap().as_bigint(), Some(negative));

        assert_eq!(Term::integer(&BigInt::from(-1)), Term::Negative(0));
    }

    #[test]
    fn test_floats_use_narrowest_exact_width() {
        assert_eq!(Term::float(1.5), Term::Half(0x3e00));
        assert_eq!(Term::float(0.0), Term::Half(0x0000));
        assert_eq!(Term::float(-0.0), Term::Half(0x8000));
        assert_eq!(Term::float(f64::INFINITY), Term::Half(0x7c00));
        assert_eq!(Term::float(f64::NEG_INFINITY), Term::Half(0xfc00));
        assert_eq!(Term::float(f64::NAN), Term::Half(0x7e00));
        assert_eq!(Term::float(65504.0), Term::Half(0x7bff));
        assert_eq!(Term::float(2f64.powi(-24)), Term::Half(0x0001));
        assert_eq!(Term::float(100000.0), Term::Float(100000.0));
        assert_eq!(Term::float(0.1), Term::Double(0.1));
        assert_eq!(hex_of(&Term::float(f64::NAN)), "f97e00");
    }

    #[test]
    fn test_half_conversion_is_exact() {
        for bits in 0..=u16::MAX {
            let x = f16_bits_to_f64(bits);
            if x.is_nan() {
                continue;
            }
            assert_eq!(f64_to_f16_exact(x), Some(bits), "bits {:04x}", bits);
        }
    }

    #[test]
    fn test_read_indefinite_lengths() {
        // [_ 1, [2, 3]]
        let term = Term::from_bytes(&[0x9f, 0x01, 0x82, 0x02, 0x03, 0xff]).unwrap();
        assert_eq!(
            term,
            Term::Array(vec![
                Term::Unsigned(1),
                Term::Array(vec![Term::Unsigned(2), Term::Unsigned(3)]),
            ])
        );

        // (_ "ab", "c")
        let term = Term::from_bytes(&[0x7f, 0x62, b'a', b'b', 0x61, b'c', 0xff]).unwrap();
        assert_eq!(term, Term::text("abc"));
    }

    #[test]
    fn test_read_non_shortest_argument() {
        assert_eq!(Term::from_bytes(&[0x18, 0x01]).unwrap(), Term::Unsigned(1));
    }

    #[test]
    fn test_read_errors() {
        assert_eq!(Term::from_bytes(&[0x01, 0x02]), Err(CborError::TrailingBytes(1)));
        assert_eq!(Term::from_bytes(&[0x82, 0x01]), Err(CborError::UnexpectedEof(2)));
        assert_eq!(Term::from_bytes(&[]), Err(CborError::UnexpectedEof(0)));
        assert_eq!(
            Term::from_bytes(&[0x1c]),
            Err(CborError::Reserved { info: 28, offset: 0 })
        );
        assert_eq!(Term::from_bytes(&[0x62, 0xff, 0xfe]), Err(CborError::InvalidUtf8(0)));
        assert_eq!(Term::from_bytes(&[0xff]), Err(CborError::UnexpectedBreak(0)));
        assert_eq!(Term::from_bytes(&[0xf7]), Err(CborError::UnsupportedSimple { value: 23, offset: 0 }));
        assert_eq!(Term::from_bytes(&[0x7f, 0x41, 0x00, 0xff]), Err(CborError::InvalidChunk(1)));
    }

    #[test]
    fn test_depth_limit() {
        let mut bytes = vec![0x81; MAX_DEPTH + 1];
        bytes.push(0x00);
        assert_eq!(Term::from_bytes(&bytes), Err(CborError::DepthLimit(MAX_DEPTH)));

        let mut bytes = vec![0x81; MAX_DEPTH - 1];
        bytes.push(0x00);
        assert!(Term::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn test_huge_declared_length_is_eof() {
        let bytes = [0x5b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(Term::from_bytes(&bytes), Err(CborError::UnexpectedEof(_))));
    }

    #[test]
    fn test_tagged_and_map_roundtrip() {
        let term = Term::Tagged(
            55799,
            Box::new(Term::Map(vec![
                (Term::text("b"), Term::Null),
                (Term::text("a"), Term::Bool(true)),
            ])),
        );
        assert_eq!(Term::from_bytes(&term.to_bytes()).unwrap(), term);
    }

    #[test]
    fn test_diagnostic_notation() {
        let term = Term::Array(vec![
            Term::Unsigned(0),
            Term::text("x"),
            Term::Negative(4),
            Term::Bytes(vec![0x12, 0x20]),
            Term::Half(0x7e00),
            Term::Map(vec![(Term::text("k"), Term::Null)]),
        ]);
        assert_eq!(term.to_string(), r#"[0, "x", -5, h'1220', NaN, {"k": null}]"#);
    }

    #[test]
    fn test_to_json() {
        let term = Term::Array(vec![
            Term::Unsigned(15),
            Term::Negative(0),
            Term::Double(f64::INFINITY),
            Term::Map(vec![(Term::text("a"), Term::Half(0x3c00))]),
        ]);
        assert_eq!(
            term.to_json(),
            serde_json::json!([15, -1, "Infinity", { "a": 1.0 }])
        );
    }
}
