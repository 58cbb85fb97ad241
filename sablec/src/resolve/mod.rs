//! Import resolution.
//!
//! The [`Resolver`] walks an expression, replacing every import with the
//! expression it points to. Along the way it:
//!
//! - chains each import onto the one that contains it ([`chain`])
//! - detects cycles using the stack of imports being resolved
//! - records a dependency edge per parent/child pair ([`graph`])
//! - resolves each chained import at most once per run
//! - serves digested imports from the persistent [`SemanticCache`]
//! - verifies digests on freshly resolved content
//!
//! All I/O goes through the injected [`Fetch`], parsing through the
//! injected [`Frontend`] and post-resolution normalization through the
//! injected [`Normalizer`].

pub mod chain;
pub mod fetch;
pub mod freeze;
pub mod frontend;
pub mod graph;

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::binary::encode_expression;
use crate::config::{CacheMode, DigestPolicy, ResolverConfig};
use crate::content::{Digest, SemanticCache};
use crate::syntax::{BinOp, Expr, ExprFolder, Import, ImportMode, ImportTarget, Resolved};

pub use chain::{ChainedImport, ImportLocation, RemoteLocation};
pub use fetch::{Fetch, FetchError, SystemFetcher};
pub use freeze::{FreezeMode, FreezeScope};
pub use frontend::{BinaryFrontend, Denote, Frontend, Normalizer};
pub use graph::{Edge, GraphError, ImportGraph, ImportNode};

/// Errors that can occur during import resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("cyclic import: {import}")]
    CyclicImport {
        import: ChainedImport,
        /// Imports being resolved when the cycle closed, outermost first.
        stack: Vec<ChainedImport>,
    },

    #[error("hash mismatch for {import}: expected {expected}, found {actual}")]
    HashMismatch {
        import: ChainedImport,
        expected: Digest,
        actual: Digest,
    },

    #[error("cannot resolve {import}: {source}")]
    MissingImport {
        import: ChainedImport,
        #[source]
        source: FetchError,
    },

    #[error("failed to parse {import}: {message}")]
    Parse { import: ChainedImport, message: String },

    #[error("remote import {parent} cannot import `{target}`")]
    ReferentiallyOpaque { parent: ImportLocation, target: String },

    #[error("cannot resolve `{target}`: no home directory")]
    NoHomeDirectory { target: String },

    #[error("invalid headers for {import}: {message}")]
    InvalidHeaders { import: ChainedImport, message: String },

    #[error("failed to normalize {import}: {message}")]
    Normalize { import: ChainedImport, message: String },

    #[error("unexpected import `{0}`")]
    UnexpectedImport(Box<Import>),

    #[error("all import alternatives failed: {}", join_errors(.0))]
    AllAlternativesFailed(Vec<ResolveError>),
}

impl ResolveError {
    /// Whether an import alternative (`?`) may fall back past this error.
    ///
    /// Cycles, digest mismatches and remote imports reaching into local
    /// state are never recovered from.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ResolveError::MissingImport { .. }
                | ResolveError::Parse { .. }
                | ResolveError::NoHomeDirectory { .. }
                | ResolveError::InvalidHeaders { .. }
                | ResolveError::AllAlternativesFailed(_)
        )
    }
}

fn join_errors(errors: &[ResolveError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A digest mismatch accepted under [`DigestPolicy::CacheHint`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestWarning {
    pub import: ChainedImport,
    pub expected: Digest,
    pub actual: Digest,
}

impl fmt::Display for DigestWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} does not match its digest: expected {}, found {}",
            self.import, self.expected, self.actual
        )
    }
}

/// The outcome of a full resolution pass.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub expr: Expr<Resolved>,
    pub graph: ImportGraph,
    /// Every chained import resolved during the pass, in completion order.
    pub imports: Vec<ChainedImport>,
    pub warnings: Vec<DigestWarning>,
}

/// Per-pass state, threaded through every resolution call.
#[derive(Debug)]
pub(crate) struct ResolutionState {
    stack: Vec<ChainedImport>,
    graph: ImportGraph,
    resolved: IndexMap<ChainedImport, Expr<Resolved>>,
    warnings: Vec<DigestWarning>,
    use_cache: bool,
}

impl ResolutionState {
    pub(crate) fn new(use_cache: bool) -> Self {
        Self {
            stack: Vec::new(),
            graph: ImportGraph::new(),
            resolved: IndexMap::new(),
            warnings: Vec::new(),
            use_cache,
        }
    }

    fn parent_node(&self) -> ImportNode {
        match self.stack.last() {
            Some(parent) => ImportNode::Import(parent.clone()),
            None => ImportNode::Root,
        }
    }

    fn into_resolution(self, expr: Expr<Resolved>) -> Resolution {
        Resolution {
            expr,
            graph: self.graph,
            imports: self.resolved.into_keys().collect(),
            warnings: self.warnings,
        }
    }
}

/// Resolves imports using injected fetch, parse and normalize capabilities.
pub struct Resolver {
    config: ResolverConfig,
    fetcher: Box<dyn Fetch>,
    frontend: Box<dyn Frontend>,
    normalizer: Box<dyn Normalizer>,
    cache: SemanticCache,
    home: Option<PathBuf>,
}

impl Resolver {
    /// A resolver with the system fetcher, the binary frontend and the
    /// denoting normalizer.
    pub fn new(config: ResolverConfig) -> Self {
        let cache = SemanticCache::with_dir(config.resolved_cache_dir());
        let fetcher = SystemFetcher::with_timeout(config.http_timeout);
        Self {
            config,
            fetcher: Box::new(fetcher),
            frontend: Box::new(BinaryFrontend),
            normalizer: Box::new(Denote),
            cache,
            home: dirs::home_dir(),
        }
    }

    pub fn with_fetcher(mut self, fetcher: impl Fetch + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    pub fn with_frontend(mut self, frontend: impl Frontend + 'static) -> Self {
        self.frontend = Box::new(frontend);
        self
    }

    pub fn with_normalizer(mut self, normalizer: impl Normalizer + 'static) -> Self {
        self.normalizer = Box::new(normalizer);
        self
    }

    pub fn with_cache(mut self, cache: SemanticCache) -> Self {
        self.cache = cache;
        self
    }

    /// Directory that `~/` imports resolve against.
    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> &SemanticCache {
        &self.cache
    }

    /// Resolve every import in `expr`.
    pub fn resolve(&self, expr: Expr<Import>) -> Result<Resolution, ResolveError> {
        let mut state = ResolutionState::new(self.config.cache_mode == CacheMode::Use);
        let resolved = self.resolve_expr(&mut state, expr)?;
        Ok(state.into_resolution(resolved))
    }

    /// Build the dependency graph without reading or populating the
    /// persistent cache.
    pub fn load_graph(&self, expr: Expr<Import>) -> Result<ImportGraph, ResolveError> {
        let mut state = ResolutionState::new(false);
        self.resolve_expr(&mut state, expr)?;
        Ok(state.graph)
    }

    pub(crate) fn resolve_expr(
        &self,
        state: &mut ResolutionState,
        expr: Expr<Import>,
    ) -> Result<Expr<Resolved>, ResolveError> {
        ResolveFolder {
            resolver: self,
            state,
        }
        .fold_expr(expr)
    }

    /// `lhs ? rhs`: the first side that resolves wins.
    fn resolve_alternative(
        &self,
        state: &mut ResolutionState,
        lhs: Expr<Import>,
        rhs: Expr<Import>,
    ) -> Result<Expr<Resolved>, ResolveError> {
        let edges = state.graph.len();
        let depth = state.stack.len();
        let resolved = state.resolved.len();
        let warnings = state.warnings.len();

        let left = match self.resolve_expr(state, lhs) {
            Ok(expr) => return Ok(expr),
            Err(e) if e.is_recoverable() => e,
            Err(e) => return Err(e),
        };

        debug!(error = %left, "trying import alternative");
        state.graph.truncate(edges);
        state.stack.truncate(depth);
        state.resolved.truncate(resolved);
        state.warnings.truncate(warnings);

        match self.resolve_expr(state, rhs) {
            Ok(expr) => Ok(expr),
            Err(right) if right.is_recoverable() => {
                let mut errors = Vec::new();
                for error in [left, right] {
                    match error {
                        ResolveError::AllAlternativesFailed(nested) => errors.extend(nested),
                        other => errors.push(other),
                    }
                }
                Err(ResolveError::AllAlternativesFailed(errors))
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn resolve_import(
        &self,
        state: &mut ResolutionState,
        import: Import,
    ) -> Result<Expr<Resolved>, ResolveError> {
        let location = ImportLocation::chain(
            state.stack.last().map(|parent| &parent.location),
            &import,
            &self.config.base_dir,
            self.home.as_deref(),
        )?;
        let chained = ChainedImport::new(location, import.mode);

        if state.stack.contains(&chained) {
            return Err(ResolveError::CyclicImport {
                import: chained,
                stack: state.stack.clone(),
            });
        }

        let parent = state.parent_node();
        if state.graph.add_edge(parent.clone(), ImportNode::Import(chained.clone())) {
            debug!(from = %parent, to = %chained, "import edge");
        }

        if let Some(expr) = state.resolved.get(&chained) {
            debug!(import = %chained, "already resolved in this pass");
            let expr = expr.clone();
            if let Some(expected) = import.hash {
                self.check_digest(state, &chained, expected, &expr)?;
            }
            return Ok(expr);
        }

        if let Some(expected) = import.hash {
            if state.use_cache {
                match self.cache.load(&expected) {
                    Ok(Some(expr)) => {
                        debug!(import = %chained, digest = %expected.short(), "cache hit");
                        state.resolved.insert(chained, expr.clone());
                        return Ok(expr);
                    }
                    Ok(None) => debug!(import = %chained, digest = %expected.short(), "cache miss"),
                    Err(e) => {
                        warn!(import = %chained, "discarding unusable cache entry: {}", e);
                        if let Err(e) = self.cache.remove(&expected) {
                            warn!("failed to remove cache entry: {}", e);
                        }
                    }
                }
            }
        }

        let expr = self.load(state, &chained, &import)?;

        if let Some(expected) = import.hash {
            if self.check_digest(state, &chained, expected, &expr)? && state.use_cache {
                if let Err(e) = self.cache.store(&expected, &encode_expression(&expr)) {
                    warn!(import = %chained, "failed to populate cache: {}", e);
                }
            }
        }

        state.resolved.insert(chained, expr.clone());
        Ok(expr)
    }

    /// Fetch and interpret `import` according to its mode.
    fn load(
        &self,
        state: &mut ResolutionState,
        chained: &ChainedImport,
        import: &Import,
    ) -> Result<Expr<Resolved>, ResolveError> {
        match chained.mode {
            ImportMode::Location => Ok(chained.location.to_location_expr()),
            ImportMode::RawText => {
                let bytes = self.fetch(state, chained, import)?;
                let text = String::from_utf8(bytes).map_err(|e| ResolveError::Parse {
                    import: chained.clone(),
                    message: format!("not valid UTF-8 text: {}", e),
                })?;
                Ok(Expr::text(text))
            }
            ImportMode::Code => {
                let bytes = self.fetch(state, chained, import)?;
                let parsed = self
                    .frontend
                    .parse(&bytes, &chained.location)
                    .map_err(|message| ResolveError::Parse {
                        import: chained.clone(),
                        message,
                    })?;

                state.stack.push(chained.clone());
                let result = self.resolve_expr(state, parsed);
                state.stack.pop();

                self.normalizer
                    .normalize(result?.denote())
                    .map_err(|message| ResolveError::Normalize {
                        import: chained.clone(),
                        message,
                    })
            }
        }
    }

    fn fetch(
        &self,
        state: &mut ResolutionState,
        chained: &ChainedImport,
        import: &Import,
    ) -> Result<Vec<u8>, ResolveError> {
        let missing = |source: FetchError| ResolveError::MissingImport {
            import: chained.clone(),
            source,
        };

        match &chained.location {
            ImportLocation::Local(path) => self.fetcher.read_file(path).map_err(missing),
            ImportLocation::Env(name) => self
                .fetcher
                .read_env(name)
                .map(String::into_bytes)
                .map_err(missing),
            ImportLocation::Remote(remote) => {
                let headers = match &import.target {
                    ImportTarget::Remote(url) => match &url.headers {
                        Some(headers) => self.resolve_headers(state, chained, (**headers).clone())?,
                        None => Vec::new(),
                    },
                    _ => Vec::new(),
                };
                self.fetcher
                    .fetch_url(&remote.url(), &headers)
                    .map_err(missing)
            }
            ImportLocation::Missing => Err(missing(FetchError::Missing)),
        }
    }

    /// Resolve and normalize a headers expression in the parent's context.
    fn resolve_headers(
        &self,
        state: &mut ResolutionState,
        chained: &ChainedImport,
        headers: Expr<Import>,
    ) -> Result<Vec<(String, String)>, ResolveError> {
        let resolved = self.resolve_expr(state, headers)?;
        let normalized = self
            .normalizer
            .normalize(resolved.denote())
            .map_err(|message| ResolveError::Normalize {
                import: chained.clone(),
                message,
            })?;
        parse_headers(&normalized).map_err(|message| ResolveError::InvalidHeaders {
            import: chained.clone(),
            message,
        })
    }

    /// Compare the semantic hash of `expr` to `expected`.
    ///
    /// Returns `true` on a match. A mismatch is an error under
    /// [`DigestPolicy::Enforce`] and a recorded warning otherwise.
    fn check_digest(
        &self,
        state: &mut ResolutionState,
        chained: &ChainedImport,
        expected: Digest,
        expr: &Expr<Resolved>,
    ) -> Result<bool, ResolveError> {
        let actual = crate::content::semantic_hash(expr);
        if actual == expected {
            return Ok(true);
        }

        match self.config.digest_policy {
            DigestPolicy::Enforce => Err(ResolveError::HashMismatch {
                import: chained.clone(),
                expected,
                actual,
            }),
            DigestPolicy::CacheHint => {
                warn!(import = %chained, %expected, %actual, "digest mismatch, using fetched content");
                state.warnings.push(DigestWarning {
                    import: chained.clone(),
                    expected,
                    actual,
                });
                Ok(false)
            }
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}

struct ResolveFolder<'r, 's> {
    resolver: &'r Resolver,
    state: &'s mut ResolutionState,
}

impl ExprFolder<Import, Resolved> for ResolveFolder<'_, '_> {
    type Error = ResolveError;

    fn fold_expr(&mut self, expr: Expr<Import>) -> Result<Expr<Resolved>, ResolveError> {
        match expr {
            Expr::BinOp(BinOp::ImportAlt, lhs, rhs) => {
                self.resolver.resolve_alternative(self.state, *lhs, *rhs)
            }
            expr => expr.fold_children(self),
        }
    }

    fn fold_embed(&mut self, import: Import) -> Result<Expr<Resolved>, ResolveError> {
        self.resolver.resolve_import(self.state, import)
    }
}

/// Read a normalized headers value: a list of `{ mapKey, mapValue }`
/// (or `{ header, value }`) records with plain text fields.
fn parse_headers(expr: &Expr<Resolved>) -> Result<Vec<(String, String)>, String> {
    let items = match expr.skip_notes() {
        Expr::EmptyListLit(_) => return Ok(Vec::new()),
        Expr::NEListLit(items) => items,
        _ => return Err("expected a list of header records".to_string()),
    };

    items
        .iter()
        .map(|item| {
            let Expr::RecordLit(fields) = item.skip_notes() else {
                return Err("expected a header record".to_string());
            };
            let text = |key: &str| -> Option<Result<String, String>> {
                fields.get(key).map(|value| match value.skip_notes() {
                    Expr::TextLit(lit) => lit
                        .as_plain()
                        .map(str::to_string)
                        .ok_or_else(|| format!("`{}` is not plain text", key)),
                    _ => Err(format!("`{}` is not text", key)),
                })
            };
            match (text("mapKey"), text("mapValue"), text("header"), text("value")) {
                (Some(name), Some(value), None, None) | (None, None, Some(name), Some(value))
                    if fields.len() == 2 =>
                {
                    Ok((name?, value?))
                }
                _ => Err("header records need exactly `mapKey` and `mapValue`".to_string()),
            }
        })
        .collect()
}

/// Resolve `expr` against `base_dir` with environment-driven settings.
pub fn resolve_relative_to(
    expr: Expr<Import>,
    base_dir: impl Into<PathBuf>,
    cache_mode: CacheMode,
) -> Result<Resolution, ResolveError> {
    let config = ResolverConfig::from_env(base_dir).with_cache_mode(cache_mode);
    Resolver::new(config).resolve(expr)
}

/// Fail if `expr` still contains an import.
pub fn assert_no_imports(expr: Expr<Import>) -> Result<Expr<Resolved>, ResolveError> {
    expr.try_resolved().map_err(ResolveError::UnexpectedImport)
}

/// The directory a root file's relative imports resolve against.
pub fn base_dir_of(file: &Path) -> PathBuf {
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
