//! Redirect and here-document model
//!
//! A redirect describes how one of a command's standard streams is sourced
//! or validated. Here-document content is kept in its pre-parsed form so
//! that its exact source text can be reproduced for diagnostics, and so a
//! regex block can be matched without re-parsing.

use std::fmt;
use std::path::PathBuf;

/// One constituent line of a here-document pattern. The variants are
/// mutually exclusive: a line is plain literal text, a sequence consisting
/// only of special characters (matched verbatim, no regex semantics), or a
/// regex with optional per-line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegexLineKind {
    Literal(String),
    Special(String),
    Regex { pattern: String, flags: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexLine {
    pub kind: RegexLineKind,
    pub line: u64,
    pub column: u64,
}

impl RegexLine {
    pub fn literal(line: u64, column: u64, text: impl Into<String>) -> Self {
        Self {
            kind: RegexLineKind::Literal(text.into()),
            line,
            column,
        }
    }

    pub fn special(line: u64, column: u64, chars: impl Into<String>) -> Self {
        Self {
            kind: RegexLineKind::Special(chars.into()),
            line,
            column,
        }
    }

    pub fn regex(
        line: u64,
        column: u64,
        pattern: impl Into<String>,
        flags: impl Into<String>,
    ) -> Self {
        Self {
            kind: RegexLineKind::Regex {
                pattern: pattern.into(),
                flags: flags.into(),
            },
            line,
            column,
        }
    }

    /// Reproduce the line's original textual form. `intro` is the block's
    /// introducer character surrounding regex expressions.
    pub fn to_source(&self, intro: char) -> String {
        match &self.kind {
            RegexLineKind::Literal(t) | RegexLineKind::Special(t) => t.clone(),
            RegexLineKind::Regex { pattern, flags } => {
                format!("{intro}{pattern}{intro}{flags}")
            }
        }
    }
}

/// A multi-line here-document pattern: the introducer character, flags
/// applying to the whole block, and the constituent lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexLines {
    pub intro: char,
    pub flags: String,
    pub lines: Vec<RegexLine>,
}

impl RegexLines {
    pub fn new(intro: char, flags: impl Into<String>) -> Self {
        Self {
            intro,
            flags: flags.into(),
            lines: Vec::new(),
        }
    }

    /// Reproduce the whole block's source text, one line per pattern.
    pub fn to_source(&self) -> String {
        let mut out = String::new();
        for l in &self.lines {
            out.push_str(&l.to_source(self.intro));
            out.push('\n');
        }
        out
    }
}

/// Output file redirect mode. Meaningless for input redirects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Compare,
    Overwrite,
    Append,
}

/// Handle to an entry of the script's shared here-document table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HereDocId(usize);

/// The here-document table a script owns. Reference redirects index into
/// it; the table never holds references itself, so a reference can only
/// ever be one level deep.
#[derive(Debug, Default)]
pub struct HereDocs(Vec<Redirect>);

impl HereDocs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shared here-document, returning its handle.
    pub fn insert(&mut self, r: Redirect) -> HereDocId {
        assert!(
            !matches!(r.kind, RedirectKind::HereDocRef(_)),
            "here-document table cannot hold references"
        );
        self.0.push(r);
        HereDocId(self.0.len() - 1)
    }

    pub fn get(&self, id: HereDocId) -> &Redirect {
        &self.0[id.0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A here-document end marker with its source location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HereEnd {
    pub marker: String,
    pub line: u64,
    pub column: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum RedirectKind {
    /// No redirect: output must be absent, input reads end-of-file
    #[default]
    None,
    /// Inherit the caller's stream
    Pass,
    /// The null device
    Null,
    /// Pass through when running verbosely, discard otherwise
    Trace,
    /// Duplicate onto the named descriptor (`2>&1` and the like)
    Merge(u32),
    /// Read from or write to a file
    File { path: PathBuf, mode: FileMode },
    HereStrLiteral(String),
    HereStrRegex(RegexLines),
    HereDocLiteral(String),
    HereDocRegex(RegexLines),
    /// A here-document shared through the script's table; never points at
    /// another reference
    HereDocRef(HereDocId),
}

/// A stream redirect: the kind plus orthogonal attributes — free-form
/// modifier flags and, for here-documents, the end marker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub modifiers: String,
    pub end: Option<HereEnd>,
}

impl Redirect {
    pub fn new(kind: RedirectKind) -> Self {
        Self {
            kind,
            modifiers: String::new(),
            end: None,
        }
    }

    pub fn with_modifiers(mut self, modifiers: impl Into<String>) -> Self {
        self.modifiers = modifiers.into();
        self
    }

    pub fn with_end(mut self, end: HereEnd) -> Self {
        self.end = Some(end);
        self
    }

    /// Resolve a reference redirect to its target; any other kind is its
    /// own effective redirect. Callers never need to special-case
    /// references beyond passing the table through.
    pub fn effective<'a>(&'a self, docs: &'a HereDocs) -> &'a Redirect {
        match self.kind {
            RedirectKind::HereDocRef(id) => docs.get(id),
            _ => self,
        }
    }
}

impl fmt::Display for RegexLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source())
    }
}
