//! Script errors
//!
//! A single error type covers the whole engine. Every failure carries a
//! class, a message, an optional source location, and zero or more `info:`
//! follow-up lines that render under the main message.

use std::fmt;

/// The class of a script failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A program or file path could not be resolved
    Resolution,
    /// An OS-level I/O operation failed
    Io,
    /// A redirect was used in a position it is not valid in
    Redirect,
    /// The process terminated abnormally or with a status outside [0, 255]
    InvalidStatus,
    /// Exit status or output disagreed with the command's expectation
    Mismatch,
    /// A registered cleanup could not be performed at teardown
    Cleanup,
    /// Malformed script element (empty expression, bad regex, bad flag)
    Syntax,
}

/// A source position within a script, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u64,
    pub column: u64,
}

impl Location {
    pub const fn new(line: u64, column: u64) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A script error with class, location and follow-up info lines
#[derive(Debug)]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<Location>,
    pub info: Vec<String>,
}

pub type Result<T> = std::result::Result<T, ScriptError>;

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            location: None,
            info: Vec::new(),
        }
    }

    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolution, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, msg)
    }

    pub fn redirect(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Redirect, msg)
    }

    pub fn invalid_status(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidStatus, msg)
    }

    pub fn mismatch(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Mismatch, msg)
    }

    pub fn cleanup(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cleanup, msg)
    }

    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, msg)
    }

    pub fn with_location(mut self, loc: Location) -> Self {
        self.location = Some(loc);
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info.push(info.into());
        self
    }

    /// True for failures that represent a command disagreeing with its
    /// expectation, as opposed to the engine being unable to run it.
    pub fn is_mismatch(&self) -> bool {
        self.kind == ErrorKind::Mismatch
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = self.location {
            write!(f, "{}: ", loc)?;
        }
        write!(f, "{}", self.message)?;
        for i in &self.info {
            write!(f, "\n  info: {}", i)?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}
