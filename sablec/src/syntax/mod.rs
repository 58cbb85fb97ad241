//! # Expression Tree
//!
//! The syntax tree exchanged between the parser, the binary codec and the
//! import resolver.
//!
//! The tree is parameterised by its embedded leaf type `A`:
//!
//! ```text
//! Expr<Import>    parsed, may still contain imports
//!      │  resolve
//!      ▼
//! Expr<Resolved>  fully resolved; `Resolved` is uninhabited
//! ```
//!
//! Because `Resolved` has no values, "contains no imports" is a property the
//! type checker enforces rather than something checked at runtime.

pub mod import;

use std::convert::Infallible;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use num_bigint::{BigInt, BigUint};

use crate::span::Span;

pub use import::{FilePath, FilePrefix, Import, ImportMode, ImportTarget, Scheme, Url};

/// A field, alternative or variable name.
pub type Label = String;

/// The reserved anonymous binder name.
pub const PLACEHOLDER: &str = "_";

/// Marker for trees that contain no imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolved {}

/// A variable reference: name plus the number of shadowing binders to skip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct V {
    pub name: Label,
    pub index: u64,
}

impl V {
    pub fn new(name: impl Into<Label>, index: u64) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    /// Whether this variable refers to an anonymous binder.
    pub fn is_placeholder(&self) -> bool {
        self.name == PLACEHOLDER
    }
}

impl fmt::Display for V {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.index)
        }
    }
}

/// Type universes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Const {
    Type,
    Kind,
    Sort,
}

impl Const {
    pub fn as_str(self) -> &'static str {
        match self {
            Const::Type => "Type",
            Const::Kind => "Kind",
            Const::Sort => "Sort",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Type" => Some(Const::Type),
            "Kind" => Some(Const::Kind),
            "Sort" => Some(Const::Sort),
            _ => None,
        }
    }
}

macro_rules! builtins {
    ($($variant:ident => $name:literal,)*) => {
        /// The closed set of built-in types and primitive functions.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Builtin {
            $($variant,)*
        }

        impl Builtin {
            /// Every builtin, in declaration order.
            pub const ALL: &'static [Builtin] = &[$(Builtin::$variant,)*];

            /// The builtin's spelling, which is also its binary encoding.
            pub fn name(self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name,)*
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($name => Some(Builtin::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

builtins! {
    Bool => "Bool",
    Natural => "Natural",
    Integer => "Integer",
    Double => "Double",
    Text => "Text",
    List => "List",
    Optional => "Optional",
    OptionalNone => "None",
    NaturalBuild => "Natural/build",
    NaturalFold => "Natural/fold",
    NaturalIsZero => "Natural/isZero",
    NaturalEven => "Natural/even",
    NaturalOdd => "Natural/odd",
    NaturalToInteger => "Natural/toInteger",
    NaturalShow => "Natural/show",
    NaturalSubtract => "Natural/subtract",
    IntegerToDouble => "Integer/toDouble",
    IntegerShow => "Integer/show",
    IntegerNegate => "Integer/negate",
    IntegerClamp => "Integer/clamp",
    DoubleShow => "Double/show",
    ListBuild => "List/build",
    ListFold => "List/fold",
    ListLength => "List/length",
    ListHead => "List/head",
    ListLast => "List/last",
    ListIndexed => "List/indexed",
    ListReverse => "List/reverse",
    TextShow => "Text/show",
    TextReplace => "Text/replace",
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Binary operators.
///
/// Each operator owns a fixed opcode in the binary encoding. New operators
/// get new opcodes; existing opcodes are never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    /// `||`
    BoolOr,
    /// `&&`
    BoolAnd,
    /// `==`
    BoolEq,
    /// `!=`
    BoolNe,
    /// `+`
    NaturalPlus,
    /// `*`
    NaturalTimes,
    /// `++`
    TextAppend,
    /// `#`
    ListAppend,
    /// `∧`, deep record merge
    RecursiveRecordMerge,
    /// `⫽`, shallow right-biased merge
    RightBiasedRecordMerge,
    /// `⩓`, record type merge
    RecursiveRecordTypeMerge,
    /// `?`, import alternative
    ImportAlt,
    /// `===`
    Equivalence,
    /// `::`, record completion
    Completion,
}

impl BinOp {
    pub fn opcode(self) -> u64 {
        match self {
            BinOp::BoolOr => 0,
            BinOp::BoolAnd => 1,
            BinOp::BoolEq => 2,
            BinOp::BoolNe => 3,
            BinOp::NaturalPlus => 4,
            BinOp::NaturalTimes => 5,
            BinOp::TextAppend => 6,
            BinOp::ListAppend => 7,
            BinOp::RecursiveRecordMerge => 8,
            BinOp::RightBiasedRecordMerge => 9,
            BinOp::RecursiveRecordTypeMerge => 10,
            BinOp::ImportAlt => 11,
            BinOp::Equivalence => 12,
            BinOp::Completion => 13,
        }
    }

    pub fn from_opcode(opcode: u64) -> Option<Self> {
        Some(match opcode {
            0 => BinOp::BoolOr,
            1 => BinOp::BoolAnd,
            2 => BinOp::BoolEq,
            3 => BinOp::BoolNe,
            4 => BinOp::NaturalPlus,
            5 => BinOp::NaturalTimes,
            6 => BinOp::TextAppend,
            7 => BinOp::ListAppend,
            8 => BinOp::RecursiveRecordMerge,
            9 => BinOp::RightBiasedRecordMerge,
            10 => BinOp::RecursiveRecordTypeMerge,
            11 => BinOp::ImportAlt,
            12 => BinOp::Equivalence,
            13 => BinOp::Completion,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::BoolOr => "||",
            BinOp::BoolAnd => "&&",
            BinOp::BoolEq => "==",
            BinOp::BoolNe => "!=",
            BinOp::NaturalPlus => "+",
            BinOp::NaturalTimes => "*",
            BinOp::TextAppend => "++",
            BinOp::ListAppend => "#",
            BinOp::RecursiveRecordMerge => "∧",
            BinOp::RightBiasedRecordMerge => "⫽",
            BinOp::RecursiveRecordTypeMerge => "⩓",
            BinOp::ImportAlt => "?",
            BinOp::Equivalence => "===",
            BinOp::Completion => "::",
        }
    }
}

/// A double-precision literal.
///
/// Equality is bitwise except that every NaN equals every other NaN, so
/// `0.0` and `-0.0` are different literals while NaN payloads are not
/// distinguished.
#[derive(Debug, Clone, Copy)]
pub struct Double(f64);

impl Double {
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    pub fn value(self) -> f64 {
        self.0
    }

    fn canonical_bits(self) -> u64 {
        if self.0.is_nan() {
            f64::NAN.to_bits()
        } else {
            self.0.to_bits()
        }
    }
}

impl PartialEq for Double {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bits() == other.canonical_bits()
    }
}

impl Eq for Double {}

impl Hash for Double {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bits().hash(state);
    }
}

impl From<f64> for Double {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

/// A text literal with interpolations: `head ${e1} s1 ${e2} s2 ...`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLit<A> {
    pub head: String,
    pub tail: Vec<(Expr<A>, String)>,
}

impl<A> TextLit<A> {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            head: text.into(),
            tail: Vec::new(),
        }
    }

    /// The literal's contents when it has no interpolations.
    pub fn as_plain(&self) -> Option<&str> {
        if self.tail.is_empty() {
            Some(&self.head)
        } else {
            None
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr<A> {
    Const(Const),
    Var(V),
    /// `λ(x : A) → b`
    Lam(Label, Box<Expr<A>>, Box<Expr<A>>),
    /// `∀(x : A) → B`
    Pi(Label, Box<Expr<A>>, Box<Expr<A>>),
    App(Box<Expr<A>>, Box<Expr<A>>),
    /// `let x : A = a in b`; several bindings nest in the body.
    Let(Label, Option<Box<Expr<A>>>, Box<Expr<A>>, Box<Expr<A>>),
    /// `e : T`
    Annot(Box<Expr<A>>, Box<Expr<A>>),
    /// `assert : T`
    Assert(Box<Expr<A>>),
    Builtin(Builtin),
    BoolLit(bool),
    NaturalLit(BigUint),
    IntegerLit(BigInt),
    DoubleLit(Double),
    TextLit(TextLit<A>),
    /// `[] : T`
    EmptyListLit(Box<Expr<A>>),
    NEListLit(Vec<Expr<A>>),
    SomeLit(Box<Expr<A>>),
    RecordType(IndexMap<Label, Expr<A>>),
    RecordLit(IndexMap<Label, Expr<A>>),
    UnionType(IndexMap<Label, Option<Expr<A>>>),
    /// `merge h u` with an optional `: T`
    Merge(Box<Expr<A>>, Box<Expr<A>>, Option<Box<Expr<A>>>),
    /// `toMap e` with an optional `: T`
    ToMap(Box<Expr<A>>, Option<Box<Expr<A>>>),
    /// `e.k`, field or alternative selection
    Field(Box<Expr<A>>, Label),
    /// `e.{ a, b }`
    Project(Box<Expr<A>>, Vec<Label>),
    /// `e.(T)`
    ProjectByType(Box<Expr<A>>, Box<Expr<A>>),
    /// `e with a.b = v`
    With(Box<Expr<A>>, Vec<Label>, Box<Expr<A>>),
    If(Box<Expr<A>>, Box<Expr<A>>, Box<Expr<A>>),
    BinOp(BinOp, Box<Expr<A>>, Box<Expr<A>>),
    /// Cosmetic source position; removed by [`Expr::denote`].
    Note(Span, Box<Expr<A>>),
    Embed(A),
}

/// Rebuilds a tree one layer at a time.
///
/// [`Expr::fold_children`] hands every direct child to `fold_expr` and every
/// embedded leaf to `fold_embed`, then reassembles the node.
pub trait ExprFolder<A, B> {
    type Error;

    fn fold_expr(&mut self, expr: Expr<A>) -> Result<Expr<B>, Self::Error>;

    fn fold_embed(&mut self, embed: A) -> Result<Expr<B>, Self::Error>;
}

impl<A> Expr<A> {
    pub fn var(name: impl Into<Label>, index: u64) -> Self {
        Expr::Var(V::new(name, index))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Expr::TextLit(TextLit::plain(text))
    }

    pub fn natural(n: u64) -> Self {
        Expr::NaturalLit(BigUint::from(n))
    }

    pub fn integer(n: i64) -> Self {
        Expr::IntegerLit(BigInt::from(n))
    }

    pub fn double(x: f64) -> Self {
        Expr::DoubleLit(Double::new(x))
    }

    /// `f a1 a2 ... an`
    pub fn app_many(f: Expr<A>, args: impl IntoIterator<Item = Expr<A>>) -> Self {
        args.into_iter()
            .fold(f, |acc, arg| Expr::App(Box::new(acc), Box::new(arg)))
    }

    pub fn let_in(name: impl Into<Label>, annot: Option<Expr<A>>, value: Expr<A>, body: Expr<A>) -> Self {
        Expr::Let(name.into(), annot.map(Box::new), Box::new(value), Box::new(body))
    }

    pub fn binop(op: BinOp, lhs: Expr<A>, rhs: Expr<A>) -> Self {
        Expr::BinOp(op, Box::new(lhs), Box::new(rhs))
    }

    /// Skip any `Note` wrappers around this node.
    pub fn skip_notes(&self) -> &Expr<A> {
        let mut expr = self;
        while let Expr::Note(_, inner) = expr {
            expr = inner;
        }
        expr
    }

    /// Strip every cosmetic `Note` from the tree.
    pub fn denote(self) -> Expr<A> {
        struct Denote;

        impl<A> ExprFolder<A, A> for Denote {
            type Error = Infallible;

            fn fold_expr(&mut self, expr: Expr<A>) -> Result<Expr<A>, Infallible> {
                Ok(expr.denote())
            }

            fn fold_embed(&mut self, embed: A) -> Result<Expr<A>, Infallible> {
                Ok(Expr::Embed(embed))
            }
        }

        match self {
            Expr::Note(_, inner) => inner.denote(),
            expr => match expr.fold_children(&mut Denote) {
                Ok(expr) => expr,
                Err(never) => match never {},
            },
        }
    }

    /// Rebuild this node from its folded children.
    ///
    /// `Note` nodes keep their span and fold their inner expression.
    pub fn fold_children<B, F>(self, folder: &mut F) -> Result<Expr<B>, F::Error>
    where
        F: ExprFolder<A, B> + ?Sized,
    {
        fn go<A, B, F>(folder: &mut F, e: Box<Expr<A>>) -> Result<Box<Expr<B>>, F::Error>
        where
            F: ExprFolder<A, B> + ?Sized,
        {
            folder.fold_expr(*e).map(Box::new)
        }

        fn go_opt<A, B, F>(folder: &mut F, e: Option<Box<Expr<A>>>) -> Result<Option<Box<Expr<B>>>, F::Error>
        where
            F: ExprFolder<A, B> + ?Sized,
        {
            e.map(|e| go(folder, e)).transpose()
        }

        Ok(match self {
            Expr::Const(c) => Expr::Const(c),
            Expr::Var(v) => Expr::Var(v),
            Expr::Lam(x, t, b) => Expr::Lam(x, go(folder, t)?, go(folder, b)?),
            Expr::Pi(x, t, b) => Expr::Pi(x, go(folder, t)?, go(folder, b)?),
            Expr::App(f, a) => Expr::App(go(folder, f)?, go(folder, a)?),
            Expr::Let(x, t, v, b) => {
                let t = go_opt(folder, t)?;
                let v = go(folder, v)?;
                Expr::Let(x, t, v, go(folder, b)?)
            }
            Expr::Annot(e, t) => Expr::Annot(go(folder, e)?, go(folder, t)?),
            Expr::Assert(t) => Expr::Assert(go(folder, t)?),
            Expr::Builtin(b) => Expr::Builtin(b),
            Expr::BoolLit(b) => Expr::BoolLit(b),
            Expr::NaturalLit(n) => Expr::NaturalLit(n),
            Expr::IntegerLit(n) => Expr::IntegerLit(n),
            Expr::DoubleLit(d) => Expr::DoubleLit(d),
            Expr::TextLit(TextLit { head, tail }) => {
                let mut folded = Vec::with_capacity(tail.len());
                for (e, s) in tail {
                    folded.push((folder.fold_expr(e)?, s));
                }
                Expr::TextLit(TextLit { head, tail: folded })
            }
            Expr::EmptyListLit(t) => Expr::EmptyListLit(go(folder, t)?),
            Expr::NEListLit(items) => Expr::NEListLit(
                items
                    .into_iter()
                    .map(|e| folder.fold_expr(e))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::SomeLit(e) => Expr::SomeLit(go(folder, e)?),
            Expr::RecordType(fields) => Expr::RecordType(fold_map(folder, fields)?),
            Expr::RecordLit(fields) => Expr::RecordLit(fold_map(folder, fields)?),
            Expr::UnionType(alts) => {
                let mut folded = IndexMap::with_capacity(alts.len());
                for (k, v) in alts {
                    let v = v.map(|e| folder.fold_expr(e)).transpose()?;
                    folded.insert(k, v);
                }
                Expr::UnionType(folded)
            }
            Expr::Merge(h, u, t) => {
                let h = go(folder, h)?;
                let u = go(folder, u)?;
                Expr::Merge(h, u, go_opt(folder, t)?)
            }
            Expr::ToMap(e, t) => {
                let e = go(folder, e)?;
                Expr::ToMap(e, go_opt(folder, t)?)
            }
            Expr::Field(e, k) => Expr::Field(go(folder, e)?, k),
            Expr::Project(e, ks) => Expr::Project(go(folder, e)?, ks),
            Expr::ProjectByType(e, t) => Expr::ProjectByType(go(folder, e)?, go(folder, t)?),
            Expr::With(e, path, v) => {
                let e = go(folder, e)?;
                Expr::With(e, path, go(folder, v)?)
            }
            Expr::If(c, t, f) => {
                let c = go(folder, c)?;
                let t = go(folder, t)?;
                Expr::If(c, t, go(folder, f)?)
            }
            Expr::BinOp(op, l, r) => {
                let l = go(folder, l)?;
                Expr::BinOp(op, l, go(folder, r)?)
            }
            Expr::Note(span, e) => Expr::Note(span, go(folder, e)?),
            Expr::Embed(a) => folder.fold_embed(a)?,
        })
    }
}

fn fold_map<A, B, F>(folder: &mut F, fields: IndexMap<Label, Expr<A>>) -> Result<IndexMap<Label, Expr<B>>, F::Error>
where
    F: ExprFolder<A, B> + ?Sized,
{
    let mut folded = IndexMap::with_capacity(fields.len());
    for (k, v) in fields {
        folded.insert(k, folder.fold_expr(v)?);
    }
    Ok(folded)
}

impl Expr<Resolved> {
    /// View a resolved tree as a tree over any embedded type.
    pub fn absurd<B>(self) -> Expr<B> {
        struct Absurd;

        impl<B> ExprFolder<Resolved, B> for Absurd {
            type Error = Infallible;

            fn fold_expr(&mut self, expr: Expr<Resolved>) -> Result<Expr<B>, Infallible> {
                Ok(expr.absurd())
            }

            fn fold_embed(&mut self, embed: Resolved) -> Result<Expr<B>, Infallible> {
                match embed {}
            }
        }

        match self.fold_children(&mut Absurd) {
            Ok(expr) => expr,
            Err(never) => match never {},
        }
    }
}

impl Expr<Import> {
    /// Reinterpret an import-free tree as resolved, or return the first
    /// import found.
    pub fn try_resolved(self) -> Result<Expr<Resolved>, Box<Import>> {
        struct NoImports;

        impl ExprFolder<Import, Resolved> for NoImports {
            type Error = Box<Import>;

            fn fold_expr(&mut self, expr: Expr<Import>) -> Result<Expr<Resolved>, Box<Import>> {
                expr.try_resolved()
            }

            fn fold_embed(&mut self, embed: Import) -> Result<Expr<Resolved>, Box<Import>> {
                Err(Box::new(embed))
            }
        }

        self.fold_children(&mut NoImports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note<A>(e: Expr<A>) -> Expr<A> {
        Expr::Note(Span::new(0, 1, 1, 1), Box::new(e))
    }

    #[test]
    fn test_spans_never_survive_denotation() {
        let at = |line, column| -> Expr<Resolved> {
            Expr::Note(Span::new(10, 14, line, column), Box::new(Expr::natural(1)))
        };
        assert_ne!(at(1, 1), at(3, 7));
        assert_eq!(at(1, 1).denote(), at(3, 7).denote());
        assert_eq!(Span::dummy(), Span::default());
    }

    #[test]
    fn test_builtin_names_roundtrip() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::parse(builtin.name()), Some(*builtin));
        }
        assert_eq!(Builtin::parse("Natural/frobnicate"), None);
    }

    #[test]
    fn test_opcodes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for opcode in 0..14 {
            let op = BinOp::from_opcode(opcode).unwrap();
            assert_eq!(op.opcode(), opcode);
            assert!(seen.insert(op));
        }
        assert_eq!(BinOp::from_opcode(14), None);
    }

    #[test]
    fn test_double_equality() {
        assert_eq!(Double::new(f64::NAN), Double::new(-f64::NAN));
        assert_ne!(Double::new(0.0), Double::new(-0.0));
        assert_eq!(Double::new(1.5), Double::new(1.5));
    }

    #[test]
    fn test_denote_strips_nested_notes() {
        let noted: Expr<Resolved> = note(Expr::let_in(
            "x",
            None,
            note(Expr::natural(1)),
            note(note(Expr::var("x", 0))),
        ));
        let expected = Expr::let_in("x", None, Expr::natural(1), Expr::var("x", 0));
        assert_eq!(noted.denote(), expected);
    }

    #[test]
    fn test_app_many_is_left_nested() {
        let e: Expr<Resolved> = Expr::app_many(Expr::var("f", 0), vec![Expr::natural(1), Expr::natural(2)]);
        match e {
            Expr::App(f, b) => {
                assert_eq!(*b, Expr::natural(2));
                assert!(matches!(*f, Expr::App(_, _)));
            }
            other => panic!("expected application, got {:?}", other),
        }
    }

    #[test]
    fn test_try_resolved() {
        let clean: Expr<Import> = Expr::binop(BinOp::NaturalPlus, Expr::natural(1), Expr::natural(2));
        assert_eq!(
            clean.try_resolved().unwrap(),
            Expr::binop(BinOp::NaturalPlus, Expr::natural(1), Expr::natural(2))
        );

        let import = Import::env("HOME");
        let dirty = Expr::SomeLit(Box::new(Expr::Embed(import.clone())));
        assert_eq!(dirty.try_resolved().unwrap_err(), Box::new(import));
    }

    #[test]
    fn test_absurd_preserves_tree() {
        let resolved: Expr<Resolved> = Expr::let_in("x", None, Expr::natural(1), Expr::var("x", 0));
        let widened: Expr<Import> = resolved.absurd();
        assert_eq!(widened, Expr::let_in("x", None, Expr::natural(1), Expr::var("x", 0)));
    }

    #[test]
    fn test_record_equality_ignores_order() {
        let mut a: IndexMap<Label, Expr<Resolved>> = IndexMap::new();
        a.insert("x".into(), Expr::natural(1));
        a.insert("y".into(), Expr::natural(2));
        let mut b = IndexMap::new();
        b.insert("y".into(), Expr::natural(2));
        b.insert("x".into(), Expr::natural(1));
        assert_eq!(Expr::RecordLit(a), Expr::RecordLit(b));
    }
}
