//! Expression to term encoding.

use super::import_types;
use super::tags;
use super::Term;
use crate::syntax::{Expr, FilePrefix, Import, ImportTarget, Label, Resolved, Scheme, PLACEHOLDER};

/// How an embedded leaf is written.
pub trait EncodeEmbed {
    fn encode_embed(&self) -> Term;
}

impl EncodeEmbed for Resolved {
    fn encode_embed(&self) -> Term {
        match *self {}
    }
}

impl EncodeEmbed for Import {
    fn encode_embed(&self) -> Term {
        let hash = match &self.hash {
            Some(digest) => Term::Bytes(digest.multihash_bytes().to_vec()),
            None => Term::Null,
        };
        let mut items = vec![Term::Unsigned(tags::IMPORT), hash, Term::Unsigned(self.mode.code())];

        match &self.target {
            ImportTarget::Local(prefix, path) => {
                let code = match prefix {
                    FilePrefix::Absolute => import_types::ABSOLUTE,
                    FilePrefix::Here => import_types::HERE,
                    FilePrefix::Parent => import_types::PARENT,
                    FilePrefix::Home => import_types::HOME,
                };
                items.push(Term::Unsigned(code));
                items.extend(path.segments.iter().map(|s| Term::text(s.as_str())));
            }
            ImportTarget::Remote(url) => {
                let code = match url.scheme {
                    Scheme::Http => import_types::HTTP,
                    Scheme::Https => import_types::HTTPS,
                };
                items.push(Term::Unsigned(code));
                items.push(match &url.headers {
                    Some(headers) => encode(headers),
                    None => Term::Null,
                });
                items.push(Term::text(url.authority.as_str()));
                items.extend(url.path.segments.iter().map(|s| Term::text(s.as_str())));
                items.push(match &url.query {
                    Some(query) => Term::text(query.as_str()),
                    None => Term::Null,
                });
            }
            ImportTarget::Env(name) => {
                items.push(Term::Unsigned(import_types::ENV));
                items.push(Term::text(name.as_str()));
            }
            ImportTarget::Missing => items.push(Term::Unsigned(import_types::MISSING)),
        }
        Term::Array(items)
    }
}

/// Encode an expression as a term. `Note` nodes are transparent.
pub fn encode<A: EncodeEmbed>(expr: &Expr<A>) -> Term {
    match expr {
        Expr::Note(_, inner) => encode(inner),
        Expr::Const(c) => Term::text(c.as_str()),
        Expr::Builtin(b) => Term::text(b.name()),
        Expr::Var(v) => {
            if v.is_placeholder() {
                Term::Unsigned(v.index)
            } else {
                Term::Array(vec![Term::text(v.name.as_str()), Term::Unsigned(v.index)])
            }
        }
        Expr::App(..) => {
            let mut args = Vec::new();
            let mut head = expr;
            while let Expr::App(f, a) = head {
                args.push(a.as_ref());
                head = f.skip_notes();
            }
            let mut items = Vec::with_capacity(args.len() + 2);
            items.push(Term::Unsigned(tags::APP));
            items.push(encode(head));
            items.extend(args.into_iter().rev().map(encode));
            Term::Array(items)
        }
        Expr::Lam(x, t, b) => binder(tags::LAMBDA, x, t, b),
        Expr::Pi(x, t, b) => binder(tags::PI, x, t, b),
        Expr::BinOp(op, l, r) => tagged(
            tags::OPERATOR,
            vec![Term::Unsigned(op.opcode()), encode(l), encode(r)],
        ),
        Expr::EmptyListLit(t) => match t.skip_notes() {
            Expr::App(list, element) if matches!(list.skip_notes(), Expr::Builtin(crate::syntax::Builtin::List)) => {
                tagged(tags::LIST, vec![encode(element)])
            }
            _ => tagged(tags::EMPTY_LIST, vec![encode(t)]),
        },
        Expr::NEListLit(items) => {
            let mut terms = vec![Term::Unsigned(tags::LIST), Term::Null];
            terms.extend(items.iter().map(encode));
            Term::Array(terms)
        }
        Expr::SomeLit(e) => tagged(tags::SOME, vec![Term::Null, encode(e)]),
        Expr::Merge(h, u, t) => {
            let mut items = vec![encode(h), encode(u)];
            if let Some(t) = t {
                items.push(encode(t));
            }
            tagged(tags::MERGE, items)
        }
        Expr::RecordType(fields) => tagged(
            tags::RECORD_TYPE,
            vec![sorted_map(fields.iter().map(|(k, v)| (k, encode(v))))],
        ),
        Expr::RecordLit(fields) => tagged(
            tags::RECORD_LIT,
            vec![sorted_map(fields.iter().map(|(k, v)| (k, encode(v))))],
        ),
        Expr::UnionType(alts) => tagged(
            tags::UNION_TYPE,
            vec![sorted_map(alts.iter().map(|(k, v)| {
                (k, v.as_ref().map(encode).unwrap_or(Term::Null))
            }))],
        ),
        Expr::Field(e, k) => tagged(tags::FIELD, vec![encode(e), Term::text(k.as_str())]),
        Expr::Project(e, ks) => {
            let mut items = vec![encode(e)];
            items.extend(ks.iter().map(|k| Term::text(k.as_str())));
            tagged(tags::PROJECT, items)
        }
        Expr::ProjectByType(e, t) => tagged(tags::PROJECT, vec![encode(e), Term::Array(vec![encode(t)])]),
        Expr::If(c, t, f) => tagged(tags::IF, vec![encode(c), encode(t), encode(f)]),
        Expr::NaturalLit(n) => tagged(tags::NATURAL, vec![Term::natural(n)]),
        Expr::IntegerLit(n) => tagged(tags::INTEGER, vec![Term::integer(n)]),
        Expr::DoubleLit(d) => Term::float(d.value()),
        Expr::BoolLit(b) => Term::Bool(*b),
        Expr::TextLit(text) => {
            let mut items = vec![Term::Unsigned(tags::TEXT), Term::text(text.head.as_str())];
            for (e, s) in &text.tail {
                items.push(encode(e));
                items.push(Term::text(s.as_str()));
            }
            Term::Array(items)
        }
        Expr::Assert(t) => tagged(tags::ASSERT, vec![encode(t)]),
        Expr::Let(..) => {
            let mut items = vec![Term::Unsigned(tags::LET)];
            let mut current = expr;
            while let Expr::Let(x, t, v, b) = current {
                items.push(Term::text(x.as_str()));
                items.push(t.as_deref().map(encode).unwrap_or(Term::Null));
                items.push(encode(v));
                current = b.skip_notes();
            }
            items.push(encode(current));
            Term::Array(items)
        }
        Expr::Annot(e, t) => tagged(tags::ANNOT, vec![encode(e), encode(t)]),
        Expr::ToMap(e, t) => {
            let mut items = vec![encode(e)];
            if let Some(t) = t {
                items.push(encode(t));
            }
            tagged(tags::TO_MAP, items)
        }
        Expr::With(e, path, v) => tagged(
            tags::WITH,
            vec![
                encode(e),
                Term::Array(path.iter().map(|k| Term::text(k.as_str())).collect()),
                encode(v),
            ],
        ),
        Expr::Embed(a) => a.encode_embed(),
    }
}

fn tagged(tag: u64, rest: Vec<Term>) -> Term {
    let mut items = Vec::with_capacity(rest.len() + 1);
    items.push(Term::Unsigned(tag));
    items.extend(rest);
    Term::Array(items)
}

fn binder<A: EncodeEmbed>(tag: u64, name: &Label, annot: &Expr<A>, body: &Expr<A>) -> Term {
    if name == PLACEHOLDER {
        tagged(tag, vec![encode(annot), encode(body)])
    } else {
        tagged(tag, vec![Term::text(name.as_str()), encode(annot), encode(body)])
    }
}

/// Text-keyed map with keys in byte order.
fn sorted_map<'a>(entries: impl Iterator<Item = (&'a Label, Term)>) -> Term {
    let mut entries: Vec<(&Label, Term)> = entries.collect();
    entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
    Term::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Term::text(k.as_str()), v))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::hash::Digest;
    use crate::syntax::{BinOp, Builtin, Const, FilePath, ImportMode, Url};
    use indexmap::IndexMap;

    fn enc(expr: &Expr<Resolved>) -> Term {
        encode(expr)
    }

    fn nat(n: u64) -> Term {
        Term::Array(vec![Term::Unsigned(tags::NATURAL), Term::Unsigned(n)])
    }

    #[test]
    fn test_variables() {
        assert_eq!(enc(&Expr::var("_", 3)), Term::Unsigned(3));
        assert_eq!(
            enc(&Expr::var("x", 0)),
            Term::Array(vec![Term::text("x"), Term::Unsigned(0)])
        );
    }

    #[test]
    fn test_constants_and_builtins_are_text() {
        assert_eq!(enc(&Expr::Const(Const::Type)), Term::text("Type"));
        assert_eq!(enc(&Expr::Builtin(Builtin::NaturalFold)), Term::text("Natural/fold"));
    }

    #[test]
    fn test_application_is_flattened() {
        let e = Expr::app_many(Expr::var("f", 0), vec![Expr::natural(1), Expr::natural(2)]);
        assert_eq!(
            enc(&e),
            Term::Array(vec![
                Term::Unsigned(tags::APP),
                Term::Array(vec![Term::text("f"), Term::Unsigned(0)]),
                nat(1),
                nat(2),
            ])
        );
    }

    #[test]
    fn test_anonymous_binders_omit_name() {
        let lam = Expr::Lam("_".into(), Box::new(Expr::Builtin(Builtin::Bool)), Box::new(Expr::var("_", 0)));
        assert_eq!(
            enc(&lam),
            Term::Array(vec![Term::Unsigned(tags::LAMBDA), Term::text("Bool"), Term::Unsigned(0)])
        );
        let pi = Expr::Pi("a".into(), Box::new(Expr::Const(Const::Type)), Box::new(Expr::var("a", 0)));
        assert_eq!(
            enc(&pi),
            Term::Array(vec![
                Term::Unsigned(tags::PI),
                Term::text("a"),
                Term::text("Type"),
                Term::Array(vec![Term::text("a"), Term::Unsigned(0)]),
            ])
        );
    }

    #[test]
    fn test_let_chain_is_flattened() {
        let e = Expr::let_in(
            "x",
            Some(Expr::Builtin(Builtin::Natural)),
            Expr::natural(1),
            Expr::let_in("y", None, Expr::natural(2), Expr::var("x", 0)),
        );
        assert_eq!(
            enc(&e),
            Term::Array(vec![
                Term::Unsigned(tags::LET),
                Term::text("x"),
                Term::text("Natural"),
                nat(1),
                Term::text("y"),
                Term::Null,
                nat(2),
                Term::Array(vec![Term::text("x"), Term::Unsigned(0)]),
            ])
        );
    }

    #[test]
    fn test_record_keys_are_sorted() {
        let mut fields = IndexMap::new();
        fields.insert("b".to_string(), Expr::natural(2));
        fields.insert("a".to_string(), Expr::natural(1));
        let e: Expr<Resolved> = Expr::RecordLit(fields);
        assert_eq!(
            enc(&e),
            Term::Array(vec![
                Term::Unsigned(tags::RECORD_LIT),
                Term::Map(vec![(Term::text("a"), nat(1)), (Term::text("b"), nat(2))]),
            ])
        );
    }

    #[test]
    fn test_empty_list_forms() {
        let list_of_bool = Expr::App(Box::new(Expr::Builtin(Builtin::List)), Box::new(Expr::Builtin(Builtin::Bool)));
        assert_eq!(
            enc(&Expr::EmptyListLit(Box::new(list_of_bool))),
            Term::Array(vec![Term::Unsigned(tags::LIST), Term::text("Bool")])
        );
        assert_eq!(
            enc(&Expr::EmptyListLit(Box::new(Expr::var("T", 0)))),
            Term::Array(vec![
                Term::Unsigned(tags::EMPTY_LIST),
                Term::Array(vec![Term::text("T"), Term::Unsigned(0)]),
            ])
        );
        assert_eq!(
            enc(&Expr::NEListLit(vec![Expr::BoolLit(true)])),
            Term::Array(vec![Term::Unsigned(tags::LIST), Term::Null, Term::Bool(true)])
        );
    }

    #[test]
    fn test_integer_literals() {
        assert_eq!(
            enc(&Expr::integer(-3)),
            Term::Array(vec![Term::Unsigned(tags::INTEGER), Term::Negative(2)])
        );
        assert_eq!(
            enc(&Expr::integer(3)),
            Term::Array(vec![Term::Unsigned(tags::INTEGER), Term::Unsigned(3)])
        );
    }

    #[test]
    fn test_operator() {
        let e = Expr::binop(BinOp::TextAppend, Expr::text("a"), Expr::text("b"));
        assert_eq!(
            enc(&e),
            Term::Array(vec![
                Term::Unsigned(tags::OPERATOR),
                Term::Unsigned(6),
                Term::Array(vec![Term::Unsigned(tags::TEXT), Term::text("a")]),
                Term::Array(vec![Term::Unsigned(tags::TEXT), Term::text("b")]),
            ])
        );
    }

    #[test]
    fn test_import_layout() {
        let digest = Digest::compute(b"payload");
        let local = Import::local(FilePrefix::Parent, ["lib", "a.sable"]).with_hash(digest);
        let Term::Array(items) = local.encode_embed() else {
            panic!("import must encode as an array");
        };
        assert_eq!(items[0], Term::Unsigned(tags::IMPORT));
        assert_eq!(items[1], Term::Bytes(digest.multihash_bytes().to_vec()));
        assert_eq!(&items[2..], &[
            Term::Unsigned(0),
            Term::Unsigned(import_types::PARENT),
            Term::text("lib"),
            Term::text("a.sable"),
        ]);

        let url = Url {
            scheme: Scheme::Https,
            authority: "example.com".into(),
            path: FilePath::new(["a.sable"]),
            query: None,
            headers: None,
        };
        let remote = Import::new(ImportTarget::Remote(url), ImportMode::RawText);
        assert_eq!(
            remote.encode_embed(),
            Term::Array(vec![
                Term::Unsigned(tags::IMPORT),
                Term::Null,
                Term::Unsigned(1),
                Term::Unsigned(import_types::HTTPS),
                Term::Null,
                Term::text("example.com"),
                Term::text("a.sable"),
                Term::Null,
            ])
        );

        assert_eq!(
            Import::missing().encode_embed(),
            Term::Array(vec![Term::Unsigned(tags::IMPORT), Term::Null, Term::Unsigned(0), Term::Unsigned(7)])
        );
    }
}
