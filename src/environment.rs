//! Script execution environment
//!
//! An environment owns a scope's cleanup ledger and borrows the working
//! and sandbox directories, which outlive the scope. The sandbox boundary
//! is advisory: it is consulted on cleanup registration and removal, not
//! enforced by the OS.

use std::path::{Path, PathBuf};

use crate::cleanup::Cleanup;
use crate::error::Result;

/// Variable-setting capability exposed to the substitution layer. The
/// outer interpreter implements this for its own scope representation;
/// this engine never performs substitution itself.
pub trait VariableScope {
    /// Set a variable to a sequence of values, with optional (possibly
    /// empty) attribute text.
    fn set_variable(&mut self, name: &str, values: Vec<String>, attrs: &str) -> Result<()>;
}

#[derive(Debug)]
pub struct Environment<'a> {
    /// Process CWD and the base for completing relative paths. Absolute.
    pub work_dir: &'a Path,

    /// If set, removals outside this directory are rejected. Absolute.
    pub sandbox_dir: Option<&'a Path>,

    /// Directory names for diagnostics.
    pub work_dir_name: &'a str,
    pub sandbox_dir_name: &'a str,

    /// Registered cleanups, in registration order. Teardown walks this in
    /// reverse, so nested paths must be registered after their parents.
    pub cleanups: Vec<Cleanup>,

    /// Paths of files the runtime creates for its own bookkeeping
    /// (captures and their expected-content siblings). Removed before
    /// `cleanups` at teardown so user wildcards cannot sweep them up.
    pub special_cleanups: Vec<PathBuf>,
}

impl<'a> Environment<'a> {
    pub fn new(work_dir: &'a Path, work_dir_name: &'a str) -> Self {
        Self {
            work_dir,
            sandbox_dir: None,
            work_dir_name,
            sandbox_dir_name: "",
            cleanups: Vec::new(),
            special_cleanups: Vec::new(),
        }
    }

    pub fn with_sandbox(
        work_dir: &'a Path,
        work_dir_name: &'a str,
        sandbox_dir: &'a Path,
        sandbox_dir_name: &'a str,
    ) -> Self {
        Self {
            sandbox_dir: Some(sandbox_dir),
            sandbox_dir_name,
            ..Self::new(work_dir, work_dir_name)
        }
    }

    /// The directory implicit registrations are confined to.
    pub fn effective_root(&self) -> &Path {
        self.sandbox_dir.unwrap_or(self.work_dir)
    }

    /// Register a cleanup. The path is completed against the working
    /// directory and normalized. An implicit registration of a path
    /// outside the effective root is silently dropped — the runtime must
    /// never reach outside the test's own area on its own initiative. If
    /// the path is already registered, an explicit registration overrides
    /// the recorded type in place and an implicit one is a no-op; either
    /// way the original registration order is preserved.
    pub fn clean(&mut self, mut c: Cleanup, implicit: bool) {
        c.path.absolutize(self.work_dir);
        if implicit && !c.path.base().starts_with(self.effective_root()) {
            return;
        }
        if let Some(existing) = self.cleanups.iter_mut().rev().find(|e| e.path == c.path) {
            if !implicit {
                existing.kind = c.kind;
            }
            return;
        }
        self.cleanups.push(c);
    }

    /// Register a runtime bookkeeping file for cleanup. Duplicates are
    /// allowed; teardown tolerates them.
    pub fn clean_special(&mut self, path: PathBuf) {
        self.special_cleanups.push(path);
    }
}
