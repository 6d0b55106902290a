//! Command, pipe and expression model
//!
//! A command bundles a program, its arguments, the three stream redirects,
//! the cleanups it promises to leave behind, and its exit expectation.
//! Commands chain into pipes (process pipelines) and pipes combine into
//! expressions with shell-style short-circuit logic.
//!
//! Everything renders back to script-like text so failure diagnostics can
//! quote what was executed.

use std::fmt;
use std::path::PathBuf;

use crate::cleanup::Cleanup;
use crate::redirect::{FileMode, Redirect, RedirectKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitComparison {
    Eq,
    Ne,
}

/// A command's exit expectation; the default is "equal to 0".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandExit {
    pub comparison: ExitComparison,
    pub code: u8,
}

impl CommandExit {
    pub fn eq(code: u8) -> Self {
        Self {
            comparison: ExitComparison::Eq,
            code,
        }
    }

    pub fn ne(code: u8) -> Self {
        Self {
            comparison: ExitComparison::Ne,
            code,
        }
    }
}

impl Default for CommandExit {
    fn default() -> Self {
        Self::eq(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Command {
    pub program: PathBuf,
    pub arguments: Vec<String>,
    pub stdin: Redirect,
    pub stdout: Redirect,
    pub stderr: Redirect,
    pub cleanups: Vec<Cleanup>,
    pub exit: CommandExit,
}

impl Command {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.arguments.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    /// The command's here-document bodies as they would appear in a script
    /// after the command line, end markers included. Reference redirects
    /// are skipped — their body belongs to the owning redirect.
    pub fn render_here_docs(&self) -> String {
        let mut out = String::new();
        for r in [&self.stdin, &self.stdout, &self.stderr] {
            let body = match &r.kind {
                RedirectKind::HereDocLiteral(text) => text.clone(),
                RedirectKind::HereDocRegex(rl) => rl.to_source(),
                _ => continue,
            };
            out.push_str(&body);
            if !body.is_empty() && !body.ends_with('\n') {
                out.push('\n');
            }
            if let Some(end) = &r.end {
                out.push_str(&end.marker);
                out.push('\n');
            }
        }
        out
    }
}

/// An ordered sequence of commands piped left to right
#[derive(Debug, Clone, Default)]
pub struct CommandPipe(pub Vec<Command>);

impl From<Command> for CommandPipe {
    fn from(c: Command) -> Self {
        Self(vec![c])
    }
}

impl From<Vec<Command>> for CommandPipe {
    fn from(cs: Vec<Command>) -> Self {
        Self(cs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOperator {
    Or,
    And,
}

impl fmt::Display for ExprOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExprOperator::Or => "||",
            ExprOperator::And => "&&",
        })
    }
}

/// One term of an expression. The first term's operator is conceptually
/// OR-ed onto an implied false, so the first pipe's result stands alone.
#[derive(Debug, Clone)]
pub struct ExprTerm {
    pub op: ExprOperator,
    pub pipe: CommandPipe,
}

/// Pipes combined with short-circuit logical operators
#[derive(Debug, Clone, Default)]
pub struct CommandExpr {
    pub terms: Vec<ExprTerm>,
}

impl CommandExpr {
    pub fn new(first: impl Into<CommandPipe>) -> Self {
        Self {
            terms: vec![ExprTerm {
                op: ExprOperator::Or,
                pipe: first.into(),
            }],
        }
    }

    pub fn or(mut self, pipe: impl Into<CommandPipe>) -> Self {
        self.terms.push(ExprTerm {
            op: ExprOperator::Or,
            pipe: pipe.into(),
        });
        self
    }

    pub fn and(mut self, pipe: impl Into<CommandPipe>) -> Self {
        self.terms.push(ExprTerm {
            op: ExprOperator::And,
            pipe: pipe.into(),
        });
        self
    }
}

fn end_marker(r: &Redirect) -> &str {
    r.end.as_ref().map(|e| e.marker.as_str()).unwrap_or_default()
}

// Renders a redirect with a leading space, or nothing for `None`. `fd` 0
// is stdin, 1 stdout, 2 stderr.
fn render_redirect(f: &mut fmt::Formatter<'_>, r: &Redirect, fd: u8) -> fmt::Result {
    if matches!(r.kind, RedirectKind::None) {
        return Ok(());
    }
    let (one, two) = match fd {
        0 => ("<", "<<"),
        1 => (">", ">>"),
        _ => ("2>", "2>>"),
    };
    f.write_str(" ")?;
    match &r.kind {
        RedirectKind::None => Ok(()),
        RedirectKind::Pass => write!(f, "{one}|"),
        RedirectKind::Null => write!(f, "{one}-"),
        RedirectKind::Trace => write!(f, "{one}!"),
        RedirectKind::Merge(d) => write!(f, "{one}&{d}"),
        RedirectKind::File { path, mode } => {
            let m = match mode {
                _ if fd == 0 => "=",
                FileMode::Overwrite => "=",
                FileMode::Append => "+",
                FileMode::Compare => "?",
            };
            write!(f, "{one}{m}{}", path.display())
        }
        RedirectKind::HereStrLiteral(s) => write!(f, "{one}{}{s:?}", r.modifiers),
        RedirectKind::HereStrRegex(rl) => {
            write!(f, "{one}{}~", r.modifiers)?;
            match rl.lines.first() {
                Some(l) => f.write_str(&l.to_source(rl.intro)),
                None => Ok(()),
            }
        }
        RedirectKind::HereDocLiteral(_) => write!(f, "{two}{}{}", r.modifiers, end_marker(r)),
        RedirectKind::HereDocRegex(_) => write!(f, "{two}{}~{}", r.modifiers, end_marker(r)),
        RedirectKind::HereDocRef(_) => write!(f, "{two}&{}", end_marker(r)),
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for a in &self.arguments {
            if a.is_empty() || a.contains(char::is_whitespace) {
                write!(f, " '{a}'")?;
            } else {
                write!(f, " {a}")?;
            }
        }
        render_redirect(f, &self.stdin, 0)?;
        render_redirect(f, &self.stdout, 1)?;
        render_redirect(f, &self.stderr, 2)?;
        for c in &self.cleanups {
            write!(f, " {c}")?;
        }
        match (self.exit.comparison, self.exit.code) {
            (ExitComparison::Eq, 0) => Ok(()),
            (ExitComparison::Eq, n) => write!(f, " == {n}"),
            (ExitComparison::Ne, n) => write!(f, " != {n}"),
        }
    }
}

impl fmt::Display for CommandPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Display for CommandExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", t.op)?;
            }
            write!(f, "{}", t.pipe)?;
        }
        Ok(())
    }
}
