//! Term to expression decoding.
//!
//! Every malformed shape fails with a [`DecodeError`] that carries the
//! offending term; nothing is silently repaired.

use indexmap::IndexMap;
use num_bigint::Sign;

use super::term::MAX_DEPTH;
use super::{import_types, tags, DecodeError, Term};
use crate::content::hash::Digest;
use crate::syntax::{
    BinOp, Builtin, Const, Double, Expr, FilePath, FilePrefix, Import, ImportMode, ImportTarget, Label,
    Scheme, TextLit, Url, V, PLACEHOLDER,
};

type Result<T> = std::result::Result<T, DecodeError>;

/// Nesting of the decoded tree past which decoding fails. Every binding of a
/// flattened `let` and every argument of a flattened application counts as a
/// level, since each becomes a nested node.
pub const MAX_NESTING: usize = 1024;

/// Decode a single term. Legacy wrappers and the self-describing tag are
/// handled by [`super::decode_term`].
pub fn decode(term: &Term) -> Result<Expr<Import>> {
    Decoder::default().expr(term)
}

/// Tracks how deep the decoder has recursed and how deep the tree it builds
/// has become. Terms built in memory may nest deeper than the reader allows,
/// so recursion is bounded here as well.
#[derive(Debug, Default)]
struct Decoder {
    depth: usize,
    nesting: usize,
}

impl Decoder {
    fn expr(&mut self, term: &Term) -> Result<Expr<Import>> {
        if self.depth >= MAX_DEPTH {
            return Err(DecodeError::DepthLimit(MAX_DEPTH));
        }
        self.depth += 1;
        let expr = self.nested(1, |d| d.expr_inner(term));
        self.depth -= 1;
        expr
    }

    fn nested<T>(&mut self, levels: usize, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.nesting;
        self.nesting = saved.saturating_add(levels);
        if self.nesting > MAX_NESTING {
            self.nesting = saved;
            return Err(DecodeError::DepthLimit(MAX_NESTING));
        }
        let result = f(self);
        self.nesting = saved;
        result
    }

    fn boxed(&mut self, term: &Term) -> Result<Box<Expr<Import>>> {
        self.expr(term).map(Box::new)
    }

    fn optional(&mut self, term: &Term) -> Result<Option<Box<Expr<Import>>>> {
        match term {
            Term::Null => Ok(None),
            other => self.boxed(other).map(Some),
        }
    }

    fn expr_inner(&mut self, term: &Term) -> Result<Expr<Import>> {
        match term {
            Term::Unsigned(index) => Ok(Expr::Var(V::new(PLACEHOLDER, *index))),
            Term::Text(name) => decode_name(name),
            Term::Bool(b) => Ok(Expr::BoolLit(*b)),
            Term::Half(_) | Term::Float(_) | Term::Double(_) => {
                let x = term.as_f64().ok_or_else(|| DecodeError::unexpected("float", term))?;
                Ok(Expr::DoubleLit(Double::new(x)))
            }
            Term::Array(items) => self.array(term, items),
            _ => Err(DecodeError::unexpected("expression", term)),
        }
    }

    // Each tag family lives in its own function so a level of recursion only
    // pays for the frame of the family it passes through.
    fn array(&mut self, term: &Term, items: &[Term]) -> Result<Expr<Import>> {
        let tag = match items.first() {
            Some(Term::Text(name)) => return decode_variable(term, name, items),
            Some(Term::Unsigned(tag)) => *tag,
            _ => return Err(DecodeError::unexpected("tagged expression", term)),
        };
        let args = &items[1..];

        match tag {
            tags::APP => self.application(term, args),
            tags::LAMBDA | tags::PI => self.binder(term, tag, args),
            tags::OPERATOR => self.operator(term, args),
            tags::LIST | tags::EMPTY_LIST => self.list(term, tag, args),
            tags::RECORD_TYPE | tags::RECORD_LIT | tags::UNION_TYPE => self.record(term, tag, args),
            tags::FIELD | tags::PROJECT | tags::WITH => self.selection(term, tag, args),
            tags::NATURAL | tags::INTEGER | tags::TEXT => self.literal(term, tag, args),
            tags::SOME | tags::MERGE | tags::IF | tags::ASSERT | tags::ANNOT | tags::TO_MAP => {
                self.compound(term, tag, args)
            }
            tags::IMPORT => self.import(term, args).map(Expr::Embed),
            tags::LET => self.let_chain(term, args),
            _ => Err(DecodeError::UnknownTag {
                tag,
                term: Box::new(term.clone()),
            }),
        }
    }

    fn application(&mut self, term: &Term, args: &[Term]) -> Result<Expr<Import>> {
        match args {
            [f, rest @ ..] if !rest.is_empty() => self.nested(rest.len(), |d| {
                let f = d.expr(f)?;
                rest.iter()
                    .try_fold(f, |acc, arg| Ok(Expr::App(Box::new(acc), d.boxed(arg)?)))
            }),
            _ => Err(malformed(term)),
        }
    }

    fn binder(&mut self, term: &Term, tag: u64, args: &[Term]) -> Result<Expr<Import>> {
        let (name, t, b) = match args {
            [t, b] => (PLACEHOLDER.to_string(), t, b),
            [x, t, b] => (binder_name(term, x)?, t, b),
            _ => return Err(malformed(term)),
        };
        let (t, b) = (self.boxed(t)?, self.boxed(b)?);
        Ok(if tag == tags::LAMBDA {
            Expr::Lam(name, t, b)
        } else {
            Expr::Pi(name, t, b)
        })
    }

    fn operator(&mut self, term: &Term, args: &[Term]) -> Result<Expr<Import>> {
        match args {
            [Term::Unsigned(code), l, r] => {
                let op = BinOp::from_opcode(*code).ok_or(DecodeError::UnknownOperator(*code))?;
                Ok(Expr::BinOp(op, self.boxed(l)?, self.boxed(r)?))
            }
            _ => Err(malformed(term)),
        }
    }

    fn list(&mut self, term: &Term, tag: u64, args: &[Term]) -> Result<Expr<Import>> {
        match (tag, args) {
            (tags::LIST, [Term::Null, elements @ ..]) if !elements.is_empty() => {
                let elements = elements.iter().map(|e| self.expr(e)).collect::<Result<_>>()?;
                Ok(Expr::NEListLit(elements))
            }
            (tags::LIST, [t]) if *t != Term::Null => {
                let list = Expr::App(Box::new(Expr::Builtin(Builtin::List)), self.boxed(t)?);
                Ok(Expr::EmptyListLit(Box::new(list)))
            }
            (tags::EMPTY_LIST, [t]) => Ok(Expr::EmptyListLit(self.boxed(t)?)),
            _ => Err(malformed(term)),
        }
    }

    fn record(&mut self, term: &Term, tag: u64, args: &[Term]) -> Result<Expr<Import>> {
        let entries = match args {
            [Term::Map(entries)] => entries,
            _ => return Err(malformed(term)),
        };
        match tag {
            tags::RECORD_TYPE => Ok(Expr::RecordType(decode_map(term, entries, |v| self.expr(v))?)),
            tags::RECORD_LIT => Ok(Expr::RecordLit(decode_map(term, entries, |v| self.expr(v))?)),
            _ => {
                let alternatives = decode_map(term, entries, |v| match v {
                    Term::Null => Ok(None),
                    other => self.expr(other).map(Some),
                })?;
                Ok(Expr::UnionType(alternatives))
            }
        }
    }

    fn selection(&mut self, term: &Term, tag: u64, args: &[Term]) -> Result<Expr<Import>> {
        match (tag, args) {
            (tags::FIELD, [e, Term::Text(k)]) => Ok(Expr::Field(self.boxed(e)?, k.clone())),
            (tags::PROJECT, [e, Term::Array(selector)]) => match selector.as_slice() {
                [t] => Ok(Expr::ProjectByType(self.boxed(e)?, self.boxed(t)?)),
                _ => Err(DecodeError::unexpected("single projection type", term)),
            },
            (tags::PROJECT, [e, labels @ ..]) => {
                let labels = labels
                    .iter()
                    .map(|l| text(l, "projection label").map(str::to_string))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expr::Project(self.boxed(e)?, labels))
            }
            (tags::WITH, [e, Term::Array(path), v]) if !path.is_empty() => {
                let path = path
                    .iter()
                    .map(|k| text(k, "field name").map(str::to_string))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expr::With(self.boxed(e)?, path, self.boxed(v)?))
            }
            _ => Err(malformed(term)),
        }
    }

    fn literal(&mut self, term: &Term, tag: u64, args: &[Term]) -> Result<Expr<Import>> {
        match (tag, args) {
            (tags::NATURAL, [n]) => {
                let value = n.as_bigint().ok_or_else(|| DecodeError::unexpected("natural number", n))?;
                match value.sign() {
                    Sign::Minus => Err(DecodeError::unexpected("natural number", n)),
                    _ => Ok(Expr::NaturalLit(value.magnitude().clone())),
                }
            }
            (tags::INTEGER, [n]) => n
                .as_bigint()
                .map(Expr::IntegerLit)
                .ok_or_else(|| DecodeError::unexpected("integer", n)),
            (tags::TEXT, [Term::Text(head), rest @ ..]) if rest.len() % 2 == 0 => {
                let mut tail = Vec::with_capacity(rest.len() / 2);
                for pair in rest.chunks(2) {
                    let e = self.expr(&pair[0])?;
                    let s = text(&pair[1], "text chunk")?;
                    tail.push((e, s.to_string()));
                }
                Ok(Expr::TextLit(TextLit {
                    head: head.clone(),
                    tail,
                }))
            }
            _ => Err(malformed(term)),
        }
    }

    fn compound(&mut self, term: &Term, tag: u64, args: &[Term]) -> Result<Expr<Import>> {
        match (tag, args) {
            (tags::SOME, [Term::Null, e]) => Ok(Expr::SomeLit(self.boxed(e)?)),
            (tags::MERGE, [h, u]) => Ok(Expr::Merge(self.boxed(h)?, self.boxed(u)?, None)),
            (tags::MERGE, [h, u, t]) => Ok(Expr::Merge(self.boxed(h)?, self.boxed(u)?, Some(self.boxed(t)?))),
            (tags::IF, [c, t, f]) => Ok(Expr::If(self.boxed(c)?, self.boxed(t)?, self.boxed(f)?)),
            (tags::ASSERT, [t]) => Ok(Expr::Assert(self.boxed(t)?)),
            (tags::ANNOT, [e, t]) => Ok(Expr::Annot(self.boxed(e)?, self.boxed(t)?)),
            (tags::TO_MAP, [e]) => Ok(Expr::ToMap(self.boxed(e)?, None)),
            (tags::TO_MAP, [e, t]) => Ok(Expr::ToMap(self.boxed(e)?, Some(self.boxed(t)?))),
            _ => Err(malformed(term)),
        }
    }

    /// `[25, x1, A1|null, a1, ..., xn, An|null, an, body]`, rebuilt as nested
    /// single-binding lets.
    fn let_chain(&mut self, term: &Term, args: &[Term]) -> Result<Expr<Import>> {
        if args.len() < 4 || (args.len() - 1) % 3 != 0 {
            return Err(malformed(term));
        }
        let (body, bindings) = args
            .split_last()
            .ok_or_else(|| DecodeError::unexpected("let body", term))?;
        self.nested(bindings.len() / 3, |d| {
            let mut expr = d.expr(body)?;
            for binding in bindings.chunks(3).rev() {
                let name = text(&binding[0], "let binder name")?.to_string();
                let annot = d.optional(&binding[1])?;
                let value = d.boxed(&binding[2])?;
                expr = Expr::Let(name, annot, value, Box::new(expr));
            }
            Ok(expr)
        })
    }

    fn import(&mut self, term: &Term, args: &[Term]) -> Result<Import> {
        let (hash, mode, code, rest) = match args {
            [hash, Term::Unsigned(mode), Term::Unsigned(code), rest @ ..] => (hash, *mode, *code, rest),
            _ => return Err(DecodeError::unexpected("import", term)),
        };

        let hash = match hash {
            Term::Null => None,
            Term::Bytes(bytes) => Some(
                Digest::from_multihash_bytes(bytes).ok_or_else(|| DecodeError::InvalidDigest(Box::new(hash.clone())))?,
            ),
            other => return Err(DecodeError::InvalidDigest(Box::new(other.clone()))),
        };
        let mode = ImportMode::from_code(mode).ok_or_else(|| DecodeError::unexpected("import mode", term))?;

        let target = match code {
            import_types::HTTP | import_types::HTTPS => {
                let scheme = if code == import_types::HTTP { Scheme::Http } else { Scheme::Https };
                match rest {
                    [headers, Term::Text(authority), path @ .., query] if !path.is_empty() => {
                        let headers = self.optional(headers)?;
                        let query = match query {
                            Term::Null => None,
                            Term::Text(q) => Some(q.clone()),
                            other => return Err(DecodeError::unexpected("query string", other)),
                        };
                        ImportTarget::Remote(Url {
                            scheme,
                            authority: authority.clone(),
                            path: path_segments(path)?,
                            query,
                            headers,
                        })
                    }
                    _ => return Err(DecodeError::unexpected("remote import", term)),
                }
            }
            import_types::ABSOLUTE | import_types::HERE | import_types::PARENT | import_types::HOME => {
                if rest.is_empty() {
                    return Err(DecodeError::unexpected("local import path", term));
                }
                let prefix = match code {
                    import_types::ABSOLUTE => FilePrefix::Absolute,
                    import_types::HERE => FilePrefix::Here,
                    import_types::PARENT => FilePrefix::Parent,
                    _ => FilePrefix::Home,
                };
                ImportTarget::Local(prefix, path_segments(rest)?)
            }
            import_types::ENV => match rest {
                [Term::Text(name)] => ImportTarget::Env(name.clone()),
                _ => return Err(DecodeError::unexpected("environment variable name", term)),
            },
            import_types::MISSING if rest.is_empty() => ImportTarget::Missing,
            _ => return Err(DecodeError::unexpected("import type", term)),
        };

        Ok(Import { hash, mode, target })
    }
}

fn malformed(term: &Term) -> DecodeError {
    DecodeError::unexpected("well-formed expression", term)
}

fn decode_name(name: &str) -> Result<Expr<Import>> {
    if let Some(c) = Const::parse(name) {
        return Ok(Expr::Const(c));
    }
    Builtin::parse(name)
        .map(Expr::Builtin)
        .ok_or_else(|| DecodeError::UnknownBuiltin(name.to_string()))
}

fn text<'a>(term: &'a Term, expected: &'static str) -> Result<&'a str> {
    match term {
        Term::Text(s) => Ok(s),
        other => Err(DecodeError::unexpected(expected, other)),
    }
}

fn decode_variable(term: &Term, name: &str, items: &[Term]) -> Result<Expr<Import>> {
    match items {
        [_, Term::Unsigned(index)] => {
            if name == PLACEHOLDER {
                return Err(DecodeError::PlaceholderName {
                    term: Box::new(term.clone()),
                });
            }
            Ok(Expr::Var(V::new(name, *index)))
        }
        _ => Err(DecodeError::unexpected("variable", term)),
    }
}

fn binder_name(term: &Term, name: &Term) -> Result<Label> {
    let name = text(name, "binder name")?;
    if name == PLACEHOLDER {
        return Err(DecodeError::PlaceholderName {
            term: Box::new(term.clone()),
        });
    }
    Ok(name.to_string())
}

fn decode_map<T, F>(term: &Term, entries: &[(Term, Term)], mut value: F) -> Result<IndexMap<Label, T>>
where
    F: FnMut(&Term) -> Result<T>,
{
    let mut map = IndexMap::with_capacity(entries.len());
    for (k, v) in entries {
        let key = text(k, "field name")?;
        if map.contains_key(key) {
            return Err(DecodeError::DuplicateKey {
                key: key.to_string(),
                term: Box::new(term.clone()),
            });
        }
        map.insert(key.to_string(), value(v)?);
    }
    Ok(map)
}

fn path_segments(terms: &[Term]) -> Result<FilePath> {
    let segments = terms
        .iter()
        .map(|t| text(t, "path segment").map(str::to_string))
        .collect::<Result<Vec<_>>>()?;
    Ok(FilePath { segments })
}
