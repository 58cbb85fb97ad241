//! Import descriptors: the embedded leaves of an unresolved tree.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Expr;
use crate::content::hash::Digest;

/// How the fetched content of an import is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ImportMode {
    /// Parse the content as an expression and resolve it recursively.
    Code,
    /// Use the content verbatim as a text literal (`as Text`).
    RawText,
    /// Describe where the import points without fetching it (`as Location`).
    Location,
}

impl ImportMode {
    pub fn code(self) -> u64 {
        match self {
            ImportMode::Code => 0,
            ImportMode::RawText => 1,
            ImportMode::Location => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(ImportMode::Code),
            1 => Some(ImportMode::RawText),
            2 => Some(ImportMode::Location),
            _ => None,
        }
    }

    /// Source suffix: `""`, `" as Text"` or `" as Location"`.
    pub fn suffix(self) -> &'static str {
        match self {
            ImportMode::Code => "",
            ImportMode::RawText => " as Text",
            ImportMode::Location => " as Location",
        }
    }
}

/// The anchor of a local path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilePrefix {
    /// `/`
    Absolute,
    /// `./`
    Here,
    /// `../`
    Parent,
    /// `~/`
    Home,
}

impl FilePrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            FilePrefix::Absolute => "",
            FilePrefix::Here => ".",
            FilePrefix::Parent => "..",
            FilePrefix::Home => "~",
        }
    }
}

/// Path segments, the last of which is the file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilePath {
    pub segments: Vec<String>,
}

impl FilePath {
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Every segment except the file name.
    pub fn directory(&self) -> &[String] {
        match self.segments.split_last() {
            Some((_, dir)) => dir,
            None => &[],
        }
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A remote import target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Url {
    pub scheme: Scheme,
    pub authority: String,
    pub path: FilePath,
    pub query: Option<String>,
    /// `using <headers>`, itself an unresolved expression.
    pub headers: Option<Box<Expr<Import>>>,
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme.as_str(), self.authority, self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    Local(FilePrefix, FilePath),
    Remote(Url),
    Env(String),
    Missing,
}

impl ImportTarget {
    pub fn is_remote(&self) -> bool {
        matches!(self, ImportTarget::Remote(_))
    }
}

impl fmt::Display for ImportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportTarget::Local(prefix, path) => write!(f, "{}{}", prefix.as_str(), path),
            ImportTarget::Remote(url) => {
                write!(f, "{}", url)?;
                if url.headers.is_some() {
                    f.write_str(" using <headers>")?;
                }
                Ok(())
            }
            ImportTarget::Env(name) => write!(f, "env:{}", name),
            ImportTarget::Missing => f.write_str("missing"),
        }
    }
}

/// An import as written in source: target, mode and optional digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub hash: Option<Digest>,
    pub mode: ImportMode,
    pub target: ImportTarget,
}

impl Import {
    pub fn new(target: ImportTarget, mode: ImportMode) -> Self {
        Self {
            hash: None,
            mode,
            target,
        }
    }

    /// `./seg/.../file`
    pub fn local<S: Into<String>>(prefix: FilePrefix, segments: impl IntoIterator<Item = S>) -> Self {
        Self::new(ImportTarget::Local(prefix, FilePath::new(segments)), ImportMode::Code)
    }

    pub fn env(name: impl Into<String>) -> Self {
        Self::new(ImportTarget::Env(name.into()), ImportMode::Code)
    }

    pub fn missing() -> Self {
        Self::new(ImportTarget::Missing, ImportMode::Code)
    }

    pub fn with_mode(mut self, mode: ImportMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_hash(mut self, hash: Digest) -> Self {
        self.hash = Some(hash);
        self
    }

    /// The same import without its digest.
    pub fn without_hash(&self) -> Self {
        Self {
            hash: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)?;
        if let Some(hash) = &self.hash {
            write!(f, " {}", hash)?;
        }
        f.write_str(self.mode.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_display() {
        let import = Import::local(FilePrefix::Here, ["dir", "a.txt"]).with_mode(ImportMode::RawText);
        assert_eq!(import.to_string(), "./dir/a.txt as Text");

        let url = Url {
            scheme: Scheme::Https,
            authority: "example.com".into(),
            path: FilePath::new(["pkg", "package.sable"]),
            query: Some("v=1".into()),
            headers: None,
        };
        let remote = Import::new(ImportTarget::Remote(url), ImportMode::Location);
        assert_eq!(remote.to_string(), "https://example.com/pkg/package.sable?v=1 as Location");

        assert_eq!(Import::env("HOME").to_string(), "env:HOME");
        assert_eq!(Import::missing().to_string(), "missing");
    }

    #[test]
    fn test_file_path_parts() {
        let path = FilePath::new(["a", "b", "c.sable"]);
        assert_eq!(path.file_name(), Some("c.sable"));
        assert_eq!(path.directory(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_mode_codes() {
        for mode in [ImportMode::Code, ImportMode::RawText, ImportMode::Location] {
            assert_eq!(ImportMode::from_code(mode.code()), Some(mode));
        }
        assert_eq!(ImportMode::from_code(3), None);
    }
}
