//! Import resolution integration tests.
//!
//! Fixtures are written to a temporary directory and read through a
//! fetcher that wraps the system one and counts every request. Each test
//! uses its own semantic cache directory.

use std::path::Path;
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use sablec::binary::encode_expression;
use sablec::config::{CacheMode, DigestPolicy, ResolverConfig};
use sablec::content::{semantic_hash, SemanticCache};
use sablec::resolve::{Fetch, FetchError, ImportNode, ResolveError, Resolver, SystemFetcher};
use sablec::syntax::{BinOp, Expr, FilePrefix, Import, ImportMode, Resolved};

// ============================================================================
// Test Infrastructure
// ============================================================================

/// Forwards to [`SystemFetcher`] and records every request.
#[derive(Clone, Default)]
struct CountingFetcher {
    inner: SystemFetcher,
    requests: Arc<Mutex<Vec<String>>>,
}

impl CountingFetcher {
    fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requested(&self, name: &str) -> bool {
        self.requests.lock().unwrap().iter().any(|r| r.ends_with(name))
    }
}

impl Fetch for CountingFetcher {
    fn read_file(&self, path: &Path) -> Result<Vec<u8>, FetchError> {
        self.requests.lock().unwrap().push(path.display().to_string());
        self.inner.read_file(path)
    }

    fn read_env(&self, name: &str) -> Result<String, FetchError> {
        self.requests.lock().unwrap().push(format!("env:{}", name));
        self.inner.read_env(name)
    }

    fn fetch_url(&self, url: &str, headers: &[(String, String)]) -> Result<Vec<u8>, FetchError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.inner.fetch_url(url, headers)
    }
}

struct Fixture {
    dir: TempDir,
    cache: TempDir,
    fetcher: CountingFetcher,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            cache: TempDir::new().unwrap(),
            fetcher: CountingFetcher::default(),
        }
    }

    fn write(&self, name: &str, contents: &[u8]) {
        std::fs::write(self.dir.path().join(name), contents).unwrap();
    }

    fn write_expr(&self, name: &str, expr: &Expr<Import>) {
        self.write(name, &encode_expression(expr));
    }

    fn config(&self) -> ResolverConfig {
        ResolverConfig::new(self.dir.path()).with_cache_dir(self.cache.path())
    }

    fn resolver(&self) -> Resolver {
        self.resolver_with(self.config())
    }

    fn resolver_with(&self, config: ResolverConfig) -> Resolver {
        let cache = SemanticCache::with_dir(self.cache.path());
        Resolver::new(config)
            .with_fetcher(self.fetcher.clone())
            .with_cache(cache)
    }

    fn cache(&self) -> SemanticCache {
        SemanticCache::with_dir(self.cache.path())
    }
}

fn here(name: &str) -> Import {
    Import::local(FilePrefix::Here, [name])
}

fn import(name: &str) -> Expr<Import> {
    Expr::Embed(here(name))
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_let_bound_text_import() {
    let fixture = Fixture::new();
    fixture.write("a.txt", b"hello");

    let root = Expr::let_in(
        "x",
        None,
        Expr::Embed(here("a.txt").with_mode(ImportMode::RawText)),
        Expr::var("x", 0),
    );
    let resolution = fixture.resolver().resolve(root).unwrap();

    assert_eq!(
        resolution.expr,
        Expr::let_in("x", None, Expr::text("hello"), Expr::var("x", 0))
    );
    let edges: Vec<_> = resolution.graph.edges().collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from, ImportNode::Root);
    assert!(edges[0].to.to_string().ends_with("a.txt as Text"));
}

#[test]
fn test_nested_code_imports_are_normalized() {
    let fixture = Fixture::new();
    fixture.write_expr("a.sable", &Expr::NEListLit(vec![import("b.sable"), Expr::natural(2)]));
    fixture.write_expr("b.sable", &Expr::natural(1));

    let resolution = fixture.resolver().resolve(import("a.sable")).unwrap();
    assert_eq!(
        resolution.expr,
        Expr::NEListLit(vec![Expr::natural(1), Expr::natural(2)])
    );
    assert_eq!(resolution.imports.len(), 2);
}

// ============================================================================
// Cycles
// ============================================================================

#[test]
fn test_cycle_fails_before_later_siblings_are_fetched() {
    let fixture = Fixture::new();
    fixture.write_expr("a.sable", &import("b.sable"));
    fixture.write_expr("b.sable", &import("a.sable"));
    fixture.write_expr("c.sable", &Expr::natural(3));

    let root = Expr::NEListLit(vec![import("a.sable"), import("c.sable")]);
    let err = fixture.resolver().resolve(root).unwrap_err();

    assert!(matches!(err, ResolveError::CyclicImport { .. }), "got {err}");
    assert_eq!(fixture.fetcher.count(), 2);
    assert!(!fixture.fetcher.requested("c.sable"));
}

// ============================================================================
// Caching
// ============================================================================

#[test]
fn test_repeated_import_is_fetched_once() {
    let fixture = Fixture::new();
    fixture.write_expr("shared.sable", &Expr::BoolLit(true));
    fixture.write_expr("a.sable", &import("shared.sable"));

    let root = Expr::NEListLit(vec![import("shared.sable"), import("a.sable"), import("shared.sable")]);
    fixture.resolver().resolve(root).unwrap();

    assert_eq!(fixture.fetcher.count(), 2);
}

#[test]
fn test_digest_cache_hit_fetches_nothing() {
    let fixture = Fixture::new();
    let value: Expr<Resolved> = Expr::text("cached");
    let digest = fixture.cache().store_expr(&value).unwrap();

    let root = Expr::Embed(here("absent.sable").with_hash(digest));
    let resolution = fixture.resolver().resolve(root).unwrap();

    assert_eq!(resolution.expr, value);
    assert_eq!(fixture.fetcher.count(), 0);
}

#[test]
fn test_correct_digest_populates_cache() {
    let fixture = Fixture::new();
    fixture.write_expr("a.sable", &Expr::natural(9));
    let digest = semantic_hash::<Resolved>(&Expr::natural(9));

    fixture
        .resolver()
        .resolve(Expr::Embed(here("a.sable").with_hash(digest)))
        .unwrap();
    assert!(fixture.cache().contains(&digest));
}

#[test]
fn test_ignore_mode_skips_persistent_cache() {
    let fixture = Fixture::new();
    fixture.write_expr("a.sable", &Expr::natural(9));
    let digest = fixture.cache().store_expr(&Expr::natural(9)).unwrap();

    let config = fixture.config().with_cache_mode(CacheMode::Ignore);
    fixture
        .resolver_with(config)
        .resolve(Expr::Embed(here("a.sable").with_hash(digest)))
        .unwrap();
    assert_eq!(fixture.fetcher.count(), 1);
}

#[test]
fn test_corrupted_cache_entry_falls_back_to_fetch() {
    let fixture = Fixture::new();
    fixture.write_expr("a.sable", &Expr::natural(4));
    let digest = semantic_hash::<Resolved>(&Expr::natural(4));
    std::fs::write(fixture.cache().entry_path(&digest), b"garbage").unwrap();

    let resolution = fixture
        .resolver()
        .resolve(Expr::Embed(here("a.sable").with_hash(digest)))
        .unwrap();
    assert_eq!(resolution.expr, Expr::natural(4));
    assert_eq!(fixture.fetcher.count(), 1);
}

#[test]
fn test_load_graph_leaves_cache_untouched() {
    let fixture = Fixture::new();
    fixture.write_expr("a.sable", &Expr::natural(9));
    let digest = semantic_hash::<Resolved>(&Expr::natural(9));

    let graph = fixture
        .resolver()
        .load_graph(Expr::Embed(here("a.sable").with_hash(digest)))
        .unwrap();
    assert_eq!(graph.len(), 1);
    assert!(!fixture.cache().contains(&digest));
}

// ============================================================================
// Integrity
// ============================================================================

#[test]
fn test_hash_mismatch_is_fatal_and_not_cached() {
    let fixture = Fixture::new();
    fixture.write_expr("a.sable", &Expr::natural(1));
    let wrong = semantic_hash::<Resolved>(&Expr::natural(2));

    let err = fixture
        .resolver()
        .resolve(Expr::Embed(here("a.sable").with_hash(wrong)))
        .unwrap_err();

    match err {
        ResolveError::HashMismatch { expected, actual, .. } => {
            assert_eq!(expected, wrong);
            assert_eq!(actual, semantic_hash::<Resolved>(&Expr::natural(1)));
        }
        other => panic!("expected a hash mismatch, got {other}"),
    }
    assert!(!fixture.cache().contains(&wrong));
}

#[test]
fn test_hash_mismatch_is_not_recovered_by_alternative() {
    let fixture = Fixture::new();
    fixture.write_expr("a.sable", &Expr::natural(1));
    let wrong = semantic_hash::<Resolved>(&Expr::natural(2));

    let root = Expr::binop(
        BinOp::ImportAlt,
        Expr::Embed(here("a.sable").with_hash(wrong)),
        Expr::natural(0),
    );
    assert!(matches!(
        fixture.resolver().resolve(root),
        Err(ResolveError::HashMismatch { .. })
    ));
}

#[test]
fn test_hint_policy_uses_fetched_content() {
    let fixture = Fixture::new();
    fixture.write_expr("a.sable", &Expr::natural(1));
    let wrong = semantic_hash::<Resolved>(&Expr::natural(2));

    let config = fixture.config().with_digest_policy(DigestPolicy::CacheHint);
    let resolution = fixture
        .resolver_with(config)
        .resolve(Expr::Embed(here("a.sable").with_hash(wrong)))
        .unwrap();

    assert_eq!(resolution.expr, Expr::natural(1));
    assert_eq!(resolution.warnings.len(), 1);
    assert!(!fixture.cache().contains(&wrong));
}

// ============================================================================
// Alternatives and modes
// ============================================================================

#[test]
fn test_alternative_uses_fallback() {
    let fixture = Fixture::new();
    fixture.write("fallback.txt", b"plan b");

    let root = Expr::binop(
        BinOp::ImportAlt,
        Expr::Embed(Import::env("SABLE_TEST_DEFINITELY_UNSET")),
        Expr::Embed(here("fallback.txt").with_mode(ImportMode::RawText)),
    );
    let resolution = fixture.resolver().resolve(root).unwrap();

    assert_eq!(resolution.expr, Expr::text("plan b"));
    assert_eq!(resolution.graph.len(), 1);
}

#[test]
fn test_failed_alternative_leaves_no_trace() {
    let fixture = Fixture::new();
    fixture.write_expr("good.sable", &Expr::natural(1));
    fixture.write("fallback.txt", b"plan b");
    let wrong = semantic_hash::<Resolved>(&Expr::natural(2));
    let left: Expr<Import> = Expr::RecordLit(
        [
            ("good".to_string(), Expr::Embed(here("good.sable").with_hash(wrong))),
            ("bad".to_string(), import("absent.sable")),
        ]
        .into_iter()
        .collect(),
    );
    fixture.write_expr("left.sable", &left);

    let root = Expr::binop(
        BinOp::ImportAlt,
        import("left.sable"),
        Expr::Embed(here("fallback.txt").with_mode(ImportMode::RawText)),
    );
    let config = fixture.config().with_digest_policy(DigestPolicy::CacheHint);
    let resolution = fixture.resolver_with(config).resolve(root).unwrap();

    assert!(fixture.fetcher.requested("good.sable"));
    assert_eq!(resolution.expr, Expr::text("plan b"));
    let imports: Vec<String> = resolution.imports.iter().map(|i| i.to_string()).collect();
    assert_eq!(imports.len(), 1, "{imports:?}");
    assert!(imports[0].ends_with("fallback.txt as Text"));
    assert!(resolution.warnings.is_empty());
    assert_eq!(resolution.graph.len(), 1);
}

#[test]
fn test_missing_import_error() {
    let fixture = Fixture::new();
    let err = fixture.resolver().resolve(import("nope.sable")).unwrap_err();
    assert!(matches!(
        err,
        ResolveError::MissingImport {
            source: FetchError::FileNotFound(_),
            ..
        }
    ));
}

#[test]
fn test_parse_failure() {
    let fixture = Fixture::new();
    fixture.write("bad.sable", b"\xff\xff");
    assert!(matches!(
        fixture.resolver().resolve(import("bad.sable")),
        Err(ResolveError::Parse { .. })
    ));
}

#[test]
fn test_freeze_then_resolve_from_cache() {
    let fixture = Fixture::new();
    fixture.write_expr("a.sable", &Expr::natural(5));

    let resolver = fixture.resolver();
    let frozen = resolver
        .freeze(import("a.sable"), sablec::resolve::FreezeMode::Secure, sablec::resolve::FreezeScope::All)
        .unwrap();
    let Expr::Embed(pinned) = &frozen else {
        panic!("expected an import, got {frozen:?}");
    };
    assert_eq!(pinned.hash, Some(semantic_hash::<Resolved>(&Expr::natural(5))));

    // First pass verifies and stores, second is served from the cache.
    resolver.resolve(frozen.clone()).unwrap();
    std::fs::remove_file(fixture.dir.path().join("a.sable")).unwrap();
    let resolution = fixture.resolver().resolve(frozen).unwrap();
    assert_eq!(resolution.expr, Expr::natural(5));
}
