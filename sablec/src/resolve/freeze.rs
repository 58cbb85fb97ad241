//! Pinning imports to their semantic hashes.

use std::str::FromStr;

use tracing::debug;

use super::{ResolutionState, ResolveError, Resolver};
use crate::config::CacheMode;
use crate::content::semantic_hash;
use crate::syntax::{BinOp, Expr, ExprFolder, Import, ImportTarget};

/// How a frozen import is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreezeMode {
    /// `i` becomes `i sha256:…`.
    #[default]
    Secure,
    /// `i` becomes `i sha256:… ? i`, so a changed target still resolves.
    Cache,
}

/// Which imports are frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreezeScope {
    #[default]
    RemoteOnly,
    All,
}

impl FromStr for FreezeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secure" => Ok(FreezeMode::Secure),
            "cache" => Ok(FreezeMode::Cache),
            other => Err(format!("unknown freeze mode `{}`", other)),
        }
    }
}

impl Resolver {
    /// Attach a digest to every import in scope.
    ///
    /// `missing` and imports that already carry a digest are left alone. In
    /// [`FreezeMode::Cache`] an existing `i sha256:… ? i` pair is kept as is.
    pub fn freeze(
        &self,
        expr: Expr<Import>,
        mode: FreezeMode,
        scope: FreezeScope,
    ) -> Result<Expr<Import>, ResolveError> {
        let mut state = ResolutionState::new(self.config.cache_mode == CacheMode::Use);
        FreezeFolder {
            resolver: self,
            state: &mut state,
            mode,
            scope,
        }
        .fold_expr(expr)
    }
}

struct FreezeFolder<'r, 's> {
    resolver: &'r Resolver,
    state: &'s mut ResolutionState,
    mode: FreezeMode,
    scope: FreezeScope,
}

impl FreezeFolder<'_, '_> {
    fn in_scope(&self, import: &Import) -> bool {
        match &import.target {
            ImportTarget::Missing => false,
            target => self.scope == FreezeScope::All || target.is_remote(),
        }
    }

    /// Imports inside a `using` expression are frozen like any other.
    fn freeze_headers(&mut self, mut import: Import) -> Result<Import, ResolveError> {
        if let ImportTarget::Remote(url) = &mut import.target {
            if let Some(headers) = url.headers.take() {
                url.headers = Some(Box::new(self.fold_expr(*headers)?));
            }
        }
        Ok(import)
    }
}

impl ExprFolder<Import, Import> for FreezeFolder<'_, '_> {
    type Error = ResolveError;

    fn fold_expr(&mut self, expr: Expr<Import>) -> Result<Expr<Import>, ResolveError> {
        if self.mode == FreezeMode::Cache && is_cache_pair(&expr) {
            return Ok(expr);
        }
        expr.fold_children(self)
    }

    fn fold_embed(&mut self, import: Import) -> Result<Expr<Import>, ResolveError> {
        let import = self.freeze_headers(import)?;
        if import.hash.is_some() || !self.in_scope(&import) {
            return Ok(Expr::Embed(import));
        }

        let resolved = self.resolver.resolve_import(self.state, import.clone())?;
        let digest = semantic_hash(&resolved);
        debug!(import = %import, digest = %digest.short(), "froze import");

        let frozen = Expr::Embed(import.clone().with_hash(digest));
        Ok(match self.mode {
            FreezeMode::Secure => frozen,
            FreezeMode::Cache => Expr::binop(BinOp::ImportAlt, frozen, Expr::Embed(import)),
        })
    }
}

/// `i sha256:… ? i`
fn is_cache_pair(expr: &Expr<Import>) -> bool {
    let Expr::BinOp(BinOp::ImportAlt, lhs, rhs) = expr.skip_notes() else {
        return false;
    };
    match (lhs.skip_notes(), rhs.skip_notes()) {
        (Expr::Embed(hashed), Expr::Embed(plain)) => {
            hashed.hash.is_some() && plain.hash.is_none() && hashed.without_hash() == *plain
        }
        _ => false,
    }
}
