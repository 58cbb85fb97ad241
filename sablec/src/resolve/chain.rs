//! Chained import locations.
//!
//! An import as written (`../lib/a.sable`) only means something relative to
//! the import that contains it. Chaining turns it into an absolute
//! [`ImportLocation`] that identifies the import for cycle detection,
//! caching and the dependency graph.
//!
//! | parent \ child      | `./` `../`          | `/` `~/` | `env:` | remote   |
//! |---------------------|---------------------|----------|--------|----------|
//! | root / local / env  | parent dir + path   | absolute | env    | remote   |
//! | remote              | parent URL dir+path | refused  | refused| remote   |
//!
//! `as Location` imports read nothing, so a remote parent may name any
//! location that way.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ResolveError;
use crate::binary::encode_expression;
use crate::content::Digest;
use crate::syntax::{
    Builtin, Expr, FilePrefix, FilePath, Import, ImportMode, ImportTarget, Label, Resolved, Scheme, Url,
};

/// A fully chained remote location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RemoteLocation {
    pub scheme: Scheme,
    pub authority: String,
    /// Path segments, the last being the file name.
    pub path: Vec<String>,
    pub query: Option<String>,
    /// Digest of the `using` expression as written. The same URL requested
    /// with different headers is a different import.
    pub headers: Option<Digest>,
}

impl RemoteLocation {
    fn from_url(url: &Url) -> Self {
        Self {
            scheme: url.scheme,
            authority: url.authority.clone(),
            path: normalize_segments(url.path.segments.iter().map(String::as_str)),
            query: url.query.clone(),
            headers: url.headers.as_deref().map(|h| Digest::compute(&encode_expression(h))),
        }
    }

    /// The URL to request.
    pub fn url(&self) -> String {
        let mut url = format!("{}://{}", self.scheme.as_str(), self.authority);
        for segment in &self.path {
            url.push('/');
            url.push_str(segment);
        }
        if let Some(query) = &self.query {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    fn directory(&self) -> &[String] {
        match self.path.split_last() {
            Some((_, dir)) => dir,
            None => &[],
        }
    }

    fn join(&self, prefix: FilePrefix, path: &FilePath) -> Self {
        let mut segments: Vec<&str> = self.directory().iter().map(String::as_str).collect();
        if prefix == FilePrefix::Parent {
            segments.push("..");
        }
        segments.extend(path.segments.iter().map(String::as_str));
        Self {
            scheme: self.scheme,
            authority: self.authority.clone(),
            path: normalize_segments(segments.into_iter()),
            query: None,
            headers: None,
        }
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())?;
        if let Some(headers) = &self.headers {
            write!(f, " using #{}", headers.short())?;
        }
        Ok(())
    }
}

/// Where an import points once chained onto its parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ImportLocation {
    Local(PathBuf),
    Remote(RemoteLocation),
    Env(String),
    Missing,
}

impl ImportLocation {
    pub fn is_remote(&self) -> bool {
        matches!(self, ImportLocation::Remote(_))
    }

    /// Chain `import` onto `parent`; `None` is the root expression, whose
    /// relative imports resolve against `base_dir`.
    pub fn chain(
        parent: Option<&ImportLocation>,
        import: &Import,
        base_dir: &Path,
        home: Option<&Path>,
    ) -> Result<ImportLocation, ResolveError> {
        let target = &import.target;
        let opaque = |parent: &ImportLocation| ResolveError::ReferentiallyOpaque {
            parent: parent.clone(),
            target: target.to_string(),
        };
        let parent = match parent {
            Some(ImportLocation::Remote(_)) if import.mode == ImportMode::Location => match target {
                ImportTarget::Local(FilePrefix::Absolute | FilePrefix::Home, _) | ImportTarget::Env(_) => None,
                _ => parent,
            },
            _ => parent,
        };

        match target {
            ImportTarget::Missing => Ok(ImportLocation::Missing),
            ImportTarget::Remote(url) => Ok(ImportLocation::Remote(RemoteLocation::from_url(url))),
            ImportTarget::Env(name) => match parent {
                Some(p @ ImportLocation::Remote(_)) => Err(opaque(p)),
                _ => Ok(ImportLocation::Env(name.clone())),
            },
            ImportTarget::Local(prefix, path) => match (parent, prefix) {
                (Some(ImportLocation::Remote(remote)), FilePrefix::Here | FilePrefix::Parent) => {
                    Ok(ImportLocation::Remote(remote.join(*prefix, path)))
                }
                (Some(p @ ImportLocation::Remote(_)), _) => Err(opaque(p)),
                (_, FilePrefix::Absolute) => Ok(ImportLocation::Local(join_local(Path::new("/"), path))),
                (_, FilePrefix::Home) => {
                    let home = home.ok_or_else(|| ResolveError::NoHomeDirectory {
                        target: target.to_string(),
                    })?;
                    Ok(ImportLocation::Local(join_local(home, path)))
                }
                (parent, FilePrefix::Here | FilePrefix::Parent) => {
                    let mut dir = match parent {
                        Some(ImportLocation::Local(file)) => {
                            file.parent().map(Path::to_path_buf).unwrap_or_default()
                        }
                        _ => base_dir.to_path_buf(),
                    };
                    if *prefix == FilePrefix::Parent {
                        dir.push("..");
                    }
                    Ok(ImportLocation::Local(join_local(&dir, path)))
                }
            },
        }
    }

    /// The value an `as Location` import evaluates to.
    pub fn to_location_expr(&self) -> Expr<Resolved> {
        let (alternative, payload) = match self {
            ImportLocation::Local(path) => ("Local", Some(display_local(path))),
            ImportLocation::Remote(remote) => ("Remote", Some(remote.url())),
            ImportLocation::Env(name) => ("Environment", Some(name.clone())),
            ImportLocation::Missing => ("Missing", None),
        };
        let selector = Expr::Field(Box::new(location_type()), Label::from(alternative));
        match payload {
            Some(text) => Expr::App(Box::new(selector), Box::new(Expr::text(text))),
            None => selector,
        }
    }
}

impl fmt::Display for ImportLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportLocation::Local(path) => f.write_str(&display_local(path)),
            ImportLocation::Remote(remote) => write!(f, "{}", remote),
            ImportLocation::Env(name) => write!(f, "env:{}", name),
            ImportLocation::Missing => f.write_str("missing"),
        }
    }
}

/// `< Local : Text | Remote : Text | Environment : Text | Missing >`
pub fn location_type() -> Expr<Resolved> {
    let text = || Some(Expr::Builtin(Builtin::Text));
    Expr::UnionType(
        [
            ("Local", text()),
            ("Remote", text()),
            ("Environment", text()),
            ("Missing", None),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect(),
    )
}

/// An import location together with the mode it is imported in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainedImport {
    pub location: ImportLocation,
    pub mode: ImportMode,
}

impl ChainedImport {
    pub fn new(location: ImportLocation, mode: ImportMode) -> Self {
        Self { location, mode }
    }
}

impl fmt::Display for ChainedImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.location, self.mode.suffix())
    }
}

fn display_local(path: &Path) -> String {
    if path.is_absolute() || path.starts_with("..") {
        path.display().to_string()
    } else {
        format!("./{}", path.display())
    }
}

fn join_local(dir: &Path, path: &FilePath) -> PathBuf {
    let mut joined = dir.to_path_buf();
    joined.extend(path.segments.iter());
    normalize_path(&joined)
}

/// Resolve `.` and `..` lexically, without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

fn normalize_segments<'a>(segments: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for segment in segments {
        match segment {
            "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other.to_string()),
        }
    }
    out
}
