//! Cleanup model
//!
//! A cleanup is a filesystem path the engine must remove at scope
//! teardown, with a tolerance policy for pre-existing absence. The textual
//! path conventions — a trailing separator marks a directory, and the
//! final component may be one of five wildcard forms — are parsed into a
//! `CleanupPath` so teardown never re-interprets strings.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupType {
    /// Remove; fail if the path does not exist
    Always,
    /// Remove; ignore if the path does not exist
    Maybe,
    /// Do not remove; a placeholder asserting non-removal
    Never,
}

impl CleanupType {
    fn sigil(self) -> &'static str {
        match self {
            CleanupType::Always => "&",
            CleanupType::Maybe => "&?",
            CleanupType::Never => "&!",
        }
    }
}

/// The five wildcard removal scopes for a cleanup's final path component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wildcard {
    /// `dir/*` — immediate files only
    Files,
    /// `dir/*/` — immediate sub-directories only (each must be empty)
    Subdirs,
    /// `dir/**` — all files recursively
    FilesRecursive,
    /// `dir/**/` — all sub-directories recursively (each must be empty)
    SubdirsRecursive,
    /// `dir/***` — the directory itself with everything under it
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupTarget {
    File,
    Dir,
    Wildcard(Wildcard),
}

/// A cleanup path split into its base and removal target. Comparison and
/// hashing work on the normalized pair, which is what teardown
/// deduplication keys on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CleanupPath {
    base: PathBuf,
    target: CleanupTarget,
}

impl CleanupPath {
    /// Parse the textual conventions: a trailing separator marks a
    /// directory; a final component of `*`, `*/`, `**`, `**/` or `***`
    /// selects a wildcard scope. A wildcard is only recognized when it is
    /// the entire final component (`foo*` is a file named `foo*`).
    pub fn parse(s: &str) -> Self {
        const WILDCARDS: [(&str, Wildcard); 5] = [
            ("***", Wildcard::All),
            ("**/", Wildcard::SubdirsRecursive),
            ("**", Wildcard::FilesRecursive),
            ("*/", Wildcard::Subdirs),
            ("*", Wildcard::Files),
        ];
        for (suffix, w) in WILDCARDS {
            if let Some(rest) = s.strip_suffix(suffix) {
                if rest.is_empty() || rest.ends_with(std::path::is_separator) {
                    return Self {
                        base: PathBuf::from(rest),
                        target: CleanupTarget::Wildcard(w),
                    };
                }
            }
        }
        let target = if s.ends_with(std::path::is_separator) {
            CleanupTarget::Dir
        } else {
            CleanupTarget::File
        };
        Self {
            base: PathBuf::from(s),
            target,
        }
    }

    pub fn file(p: impl Into<PathBuf>) -> Self {
        Self {
            base: p.into(),
            target: CleanupTarget::File,
        }
    }

    pub fn dir(p: impl Into<PathBuf>) -> Self {
        Self {
            base: p.into(),
            target: CleanupTarget::Dir,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn target(&self) -> CleanupTarget {
        self.target
    }

    /// Complete the base against `base_dir` and clean it lexically.
    pub(crate) fn absolutize(&mut self, base_dir: &Path) {
        self.base = paths::normalize(&self.base, base_dir);
    }
}

impl fmt::Display for CleanupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.target {
            CleanupTarget::File => "",
            CleanupTarget::Dir => "/",
            CleanupTarget::Wildcard(Wildcard::Files) => "/*",
            CleanupTarget::Wildcard(Wildcard::Subdirs) => "/*/",
            CleanupTarget::Wildcard(Wildcard::FilesRecursive) => "/**",
            CleanupTarget::Wildcard(Wildcard::SubdirsRecursive) => "/**/",
            CleanupTarget::Wildcard(Wildcard::All) => "/***",
        };
        if self.base.as_os_str().is_empty() {
            f.write_str(suffix.trim_start_matches('/'))
        } else {
            write!(f, "{}{}", self.base.display(), suffix)
        }
    }
}

/// A registered cleanup obligation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cleanup {
    pub kind: CleanupType,
    pub path: CleanupPath,
}

impl Cleanup {
    pub fn new(kind: CleanupType, path: CleanupPath) -> Self {
        Self { kind, path }
    }

    pub fn always(path: &str) -> Self {
        Self::new(CleanupType::Always, CleanupPath::parse(path))
    }

    pub fn maybe(path: &str) -> Self {
        Self::new(CleanupType::Maybe, CleanupPath::parse(path))
    }

    pub fn never(path: &str) -> Self {
        Self::new(CleanupType::Never, CleanupPath::parse(path))
    }
}

impl fmt::Display for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.sigil(), self.path)
    }
}
