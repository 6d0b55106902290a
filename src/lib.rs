//! checkscript: execution engine for script-driven functional testing of
//! build artifacts
//!
//! Scripts describe commands, their input/output expectations and the
//! filesystem cleanup they owe; this crate runs them, validates the
//! outcome and reports precise failure diagnostics. The surrounding
//! build-language interpreter is a separate collaborator: it evaluates
//! variables and conditionals over the pre-parsed [`Line`] model and
//! hands this engine concrete [`Command`], [`CommandPipe`] and
//! [`CommandExpr`] values to execute against an [`Environment`].
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use checkscript::{
//!     Command, Diag, Environment, HereDocs, Location, Redirect, RedirectKind, Runner,
//! };
//!
//! fn main() -> checkscript::Result<()> {
//!     let work = Path::new("/tmp/case-1");
//!     let mut env = Environment::new(work, "test working directory");
//!     let mut runner = Runner::new(Diag::stderr(1));
//!     let docs = HereDocs::new();
//!     let loc = Location::new(1, 1);
//!
//!     let mut cmd = Command::new("echo").arg("hello");
//!     cmd.stdout = Redirect::new(RedirectKind::HereStrLiteral("hello\n".into()));
//!
//!     runner.enter(&mut env, loc)?;
//!     runner.run(&mut env, &cmd, &docs, 0, loc)?;
//!     runner.leave(&mut env, loc)
//! }
//! ```
//!
//! # Model
//!
//! - [`Line`] — pre-parsed script lines with replayable tokens
//! - [`Redirect`] — how a command's streams are sourced or validated,
//!   including literal and regex here-documents
//! - [`Cleanup`] — always/maybe/never removal obligations with wildcard
//!   scopes
//! - [`Environment`] — working/sandbox directories plus the cleanup ledger
//! - [`Runner`] — spawns, wires, waits, validates and tears down

mod cleanup;
mod command;
mod diag;
mod diff;
mod environment;
mod error;
mod line;
mod paths;
mod redirect;
mod runner;

pub use cleanup::{Cleanup, CleanupPath, CleanupTarget, CleanupType, Wildcard};
pub use command::{
    Command, CommandExit, CommandExpr, CommandPipe, ExitComparison, ExprOperator, ExprTerm,
};
pub use diag::Diag;
pub use diff::{Differ, LineDiffer};
pub use environment::{Environment, VariableScope};
pub use error::{ErrorKind, Location, Result, ScriptError};
pub use line::{dump, Line, LineKind, Lines, Token, Tokens, VarId};
pub use redirect::{
    FileMode, HereDocId, HereDocs, HereEnd, Redirect, RedirectKind, RegexLine, RegexLineKind,
    RegexLines,
};
pub use runner::Runner;
