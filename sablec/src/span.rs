//! Source positions carried by cosmetic `Note` nodes.
//!
//! A front end wraps the nodes it parses in notes; `Expr::denote` strips
//! them before a tree is encoded or hashed, so positions never reach the
//! binary form.

/// Byte range of a parsed node plus the 1-based line and column it starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Position of a synthesized node.
    pub fn dummy() -> Self {
        Self::default()
    }
}
