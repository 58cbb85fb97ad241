//! Injected capabilities: parsing fetched code and normalizing results.

use crate::binary::decode_expression;
use crate::syntax::{Expr, Import, Resolved};

use super::chain::ImportLocation;

/// Turns fetched source into an expression tree.
pub trait Frontend {
    fn parse(&self, source: &[u8], location: &ImportLocation) -> Result<Expr<Import>, String>;
}

/// Reads imported files as canonical binary encodings.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryFrontend;

impl Frontend for BinaryFrontend {
    fn parse(&self, source: &[u8], _location: &ImportLocation) -> Result<Expr<Import>, String> {
        decode_expression(source).map_err(|e| e.to_string())
    }
}

impl<F> Frontend for F
where
    F: Fn(&[u8], &ImportLocation) -> Result<Expr<Import>, String>,
{
    fn parse(&self, source: &[u8], location: &ImportLocation) -> Result<Expr<Import>, String> {
        self(source, location)
    }
}

/// Brings a resolved import into the form that is hashed and cached.
pub trait Normalizer {
    fn normalize(&self, expr: Expr<Resolved>) -> Result<Expr<Resolved>, String>;
}

/// Strips notes and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct Denote;

impl Normalizer for Denote {
    fn normalize(&self, expr: Expr<Resolved>) -> Result<Expr<Resolved>, String> {
        Ok(expr.denote())
    }
}

impl<F> Normalizer for F
where
    F: Fn(Expr<Resolved>) -> Result<Expr<Resolved>, String>,
{
    fn normalize(&self, expr: Expr<Resolved>) -> Result<Expr<Resolved>, String> {
        self(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::encode_expression;
    use crate::span::Span;

    #[test]
    fn test_binary_frontend() {
        let bytes = encode_expression::<Resolved>(&Expr::natural(3));
        let parsed = BinaryFrontend.parse(&bytes, &ImportLocation::Missing).unwrap();
        assert_eq!(parsed, Expr::natural(3));
        assert!(BinaryFrontend.parse(b"\xff", &ImportLocation::Missing).is_err());
    }

    #[test]
    fn test_closure_frontend() {
        let frontend = |source: &[u8], _: &ImportLocation| -> Result<Expr<Import>, String> {
            Ok(Expr::text(String::from_utf8_lossy(source).into_owned()))
        };
        assert_eq!(
            frontend.parse(b"hi", &ImportLocation::Missing).unwrap(),
            Expr::text("hi")
        );
    }

    #[test]
    fn test_denote_normalizer() {
        let noted: Expr<Resolved> = Expr::Note(Span::dummy(), Box::new(Expr::BoolLit(true)));
        assert_eq!(Denote.normalize(noted).unwrap(), Expr::BoolLit(true));
    }
}
