//! Pre-parsed script line model
//!
//! The outer interpreter hands the engine scripts as a sequence of
//! classified lines, each keeping its raw token sequence so that variable
//! substitution can be replayed later and diagnostics can quote the
//! original text. Nothing here is evaluated.

use std::fmt;

/// One lexical token with its source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub line: u64,
    pub column: u64,
}

impl Token {
    pub fn new(text: impl Into<String>, line: u64, column: u64) -> Self {
        Self {
            text: text.into(),
            line,
            column,
        }
    }
}

pub type Tokens = Vec<Token>;

/// Classification of a script line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Var,
    Cmd,
    If,
    IfNot,
    Elif,
    ElifNot,
    Else,
    End,
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LineKind::Var => "var",
            LineKind::Cmd => "cmd",
            LineKind::If => "if",
            LineKind::IfNot => "if!",
            LineKind::Elif => "elif",
            LineKind::ElifNot => "elif!",
            LineKind::Else => "else",
            LineKind::End => "end",
        })
    }
}

/// Pre-resolved handle to a variable in the outer interpreter's table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub usize);

/// One pre-parsed script line: classification plus the replayable tokens.
/// `var` is the pre-resolved assignment target for `Var` lines.
#[derive(Debug, Clone)]
pub struct Line {
    pub kind: LineKind,
    pub tokens: Tokens,
    pub var: Option<VarId>,
}

impl Line {
    pub fn new(kind: LineKind, tokens: Tokens) -> Self {
        Self {
            kind,
            tokens,
            var: None,
        }
    }

    /// A variable-assignment line with its pre-resolved target.
    pub fn var(tokens: Tokens, var: VarId) -> Self {
        Self {
            kind: LineKind::Var,
            tokens,
            var: Some(var),
        }
    }

    /// The line's approximate source text, reassembled from its tokens.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for t in &self.tokens {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&t.text);
        }
        out
    }
}

pub type Lines = Vec<Line>;

/// Render a line sequence with block indentation, for tracing.
pub fn dump(out: &mut dyn fmt::Write, indent: &str, lines: &Lines) -> fmt::Result {
    let mut depth = 0usize;
    for l in lines {
        let d = match l.kind {
            LineKind::Elif | LineKind::ElifNot | LineKind::Else | LineKind::End => {
                depth.saturating_sub(1)
            }
            _ => depth,
        };
        for _ in 0..d {
            out.write_str(indent)?;
        }
        writeln!(out, "{}", l.text())?;
        match l.kind {
            LineKind::If | LineKind::IfNot => depth += 1,
            LineKind::End => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}
