//! Command execution and scope teardown
//!
//! The runner drives one script scope: it wires process I/O according to
//! the redirects, spawns the program in the scope's working directory,
//! waits, validates the exit status and captured output against the
//! command's expectations, and finally tears the scope's cleanups down in
//! reverse registration order.
//!
//! Output redirects that need validation are not read through pipes.
//! Child streams go to capture files and the files are compared after the
//! process exits; the capture doubles as troubleshooting material for a
//! failed command, so failures always point at it.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command as Process, ExitStatus, Stdio};

use regex::RegexBuilder;

use crate::cleanup::{Cleanup, CleanupPath, CleanupTarget, CleanupType, Wildcard};
use crate::command::{Command, CommandExpr, CommandPipe, ExitComparison, ExprOperator};
use crate::diag::Diag;
use crate::diff::{Differ, LineDiffer};
use crate::environment::Environment;
use crate::error::{Location, Result, ScriptError};
use crate::paths;
use crate::redirect::{FileMode, HereDocs, Redirect, RedirectKind, RegexLine, RegexLineKind, RegexLines};

pub struct Runner {
    diag: Diag,
    differ: Box<dyn Differ>,
}

/// A spawned pipeline stage awaiting completion and validation
struct Spawned {
    child: Child,
    program: PathBuf,
    stdout_path: Option<PathBuf>,
    stderr_path: Option<PathBuf>,
}

/// Resolved wiring for one output stream, kept apart from `Stdio` so a
/// merge redirect can duplicate the opposite stream's sink before it is
/// handed to the child.
enum OutSink {
    Inherit,
    Null,
    File { file: File, path: PathBuf },
    Pipe(io::PipeWriter),
    Merge,
}

impl OutSink {
    fn capture_path(&self) -> Option<PathBuf> {
        match self {
            OutSink::File { path, .. } => Some(path.clone()),
            _ => None,
        }
    }

    fn into_stdio(self) -> io::Result<Stdio> {
        match self {
            OutSink::Inherit => Ok(Stdio::inherit()),
            OutSink::Null => Ok(Stdio::null()),
            OutSink::File { file, .. } => Ok(file.into()),
            OutSink::Pipe(w) => Ok(w.into()),
            OutSink::Merge => unreachable!("merge resolved before conversion"),
        }
    }

    /// A second handle onto the same sink, for the merging stream.
    fn dup(&self, std_fd: u8) -> io::Result<Stdio> {
        match self {
            OutSink::Inherit => dup_std_stream(std_fd),
            OutSink::Null => Ok(Stdio::null()),
            OutSink::File { file, .. } => Ok(file.try_clone()?.into()),
            OutSink::Pipe(w) => Ok(w.try_clone()?.into()),
            OutSink::Merge => unreachable!("merge cannot target a merge"),
        }
    }
}

impl Runner {
    pub fn new(diag: Diag) -> Self {
        Self {
            diag,
            differ: Box::new(LineDiffer),
        }
    }

    /// A runner with a custom comparison backend.
    pub fn with_differ(diag: Diag, differ: Box<dyn Differ>) -> Self {
        Self { diag, differ }
    }

    pub fn diag(&mut self) -> &mut Diag {
        &mut self.diag
    }

    /// Enter a script scope: create the working directory, or fail if it
    /// already exists and is not empty. The directory itself is registered
    /// for cleanup, so a clean scope leaves nothing behind.
    pub fn enter(&mut self, env: &mut Environment, loc: Location) -> Result<()> {
        let wd = env.work_dir;
        if !wd.exists() {
            fs::create_dir_all(wd).map_err(|e| {
                ScriptError::io(format!("unable to create directory {}: {e}", wd.display()))
                    .with_location(loc)
            })?;
        } else {
            let mut entries = wd.read_dir().map_err(|e| {
                ScriptError::io(format!("unable to read {}: {e}", wd.display()))
                    .with_location(loc)
            })?;
            if entries.next().is_some() {
                return Err(
                    ScriptError::io(format!("directory {} is not empty", wd.display()))
                        .with_info("clean it up and rerun")
                        .with_location(loc),
                );
            }
        }
        env.clean(Cleanup::new(CleanupType::Always, CleanupPath::dir(wd)), true);
        Ok(())
    }

    /// Leave a script scope: remove the runtime's special files first,
    /// then every registered cleanup in reverse registration order. Later
    /// registrations are typically nested inside earlier ones, so the
    /// reverse walk removes children before their parent directories.
    pub fn leave(&mut self, env: &mut Environment, loc: Location) -> Result<()> {
        for p in std::mem::take(&mut env.special_cleanups).into_iter().rev() {
            match fs::remove_file(&p) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(rm_err(&p, e, loc)),
            }
        }

        let sandbox = env.sandbox_dir;
        let sandbox_name = env.sandbox_dir_name;
        let mut seen: HashSet<CleanupPath> = HashSet::new();
        for c in std::mem::take(&mut env.cleanups).into_iter().rev() {
            // The first occurrence during the reverse walk wins; earlier
            // registrations of the same path are not acted on again, and
            // its recorded type decides the semantics.
            if !seen.insert(c.path.clone()) {
                continue;
            }
            if c.kind == CleanupType::Never {
                continue;
            }
            if let Some(sb) = sandbox {
                if !c.path.base().starts_with(sb) {
                    return Err(cleanup_err(
                        format!(
                            "registered for cleanup path {} is out of {} directory",
                            c.path, sandbox_name
                        ),
                        loc,
                    ));
                }
            }
            remove_cleanup(&c, loc)?;
        }
        Ok(())
    }

    /// Execute one command and validate its exit status and output. `ci`
    /// is 0 for a standalone command, otherwise the command's 1-based
    /// position in its pipe; it suffixes the capture file names.
    pub fn run(
        &mut self,
        env: &mut Environment,
        cmd: &Command,
        docs: &HereDocs,
        ci: usize,
        loc: Location,
    ) -> Result<()> {
        let mut sp = self.spawn_command(env, cmd, docs, ci, None, None, loc)?;
        let status = sp.child.wait();
        for c in &cmd.cleanups {
            env.clean(c.clone(), false);
        }
        self.validate_status(
            cmd,
            &sp.program,
            &status,
            sp.stdout_path.as_deref(),
            sp.stderr_path.as_deref(),
            loc,
        )?;
        self.check_output(
            env,
            &sp.program,
            "stdout",
            sp.stdout_path.as_deref(),
            cmd.stdout.effective(docs),
            loc,
        )?;
        self.check_output(
            env,
            &sp.program,
            "stderr",
            sp.stderr_path.as_deref(),
            cmd.stderr.effective(docs),
            loc,
        )
    }

    /// Execute a pipe: all stages spawn connected stdout-to-stdin by OS
    /// pipes, then complete and validate in program order. Only the first
    /// stage's stdin redirect and the last stage's stdout redirect take
    /// effect; intermediate connections bypass the capture machinery.
    pub fn run_pipe(
        &mut self,
        env: &mut Environment,
        pipe: &CommandPipe,
        docs: &HereDocs,
        loc: Location,
    ) -> Result<()> {
        let cmds = &pipe.0;
        match cmds.len() {
            0 => return Err(ScriptError::syntax("empty command pipe").with_location(loc)),
            1 => return self.run(env, &cmds[0], docs, 0, loc),
            _ => {}
        }

        let mut spawned: Vec<Spawned> = Vec::with_capacity(cmds.len());
        let mut carry: Option<io::PipeReader> = None;
        for (i, c) in cmds.iter().enumerate() {
            let stdin_from = carry.take().map(Stdio::from);
            let stdout_pipe = if i + 1 < cmds.len() {
                match io::pipe() {
                    Ok((r, w)) => {
                        carry = Some(r);
                        Some(w)
                    }
                    Err(e) => {
                        reap(spawned);
                        return Err(ScriptError::io(format!("unable to create pipe: {e}"))
                            .with_location(loc));
                    }
                }
            } else {
                None
            };
            match self.spawn_command(env, c, docs, i + 1, stdin_from, stdout_pipe, loc) {
                Ok(sp) => spawned.push(sp),
                Err(e) => {
                    reap(spawned);
                    return Err(e);
                }
            }
        }

        // Reap every stage and register every declared cleanup before
        // validating, so an early failure cannot cut teardown coverage.
        let statuses: Vec<io::Result<ExitStatus>> =
            spawned.iter_mut().map(|sp| sp.child.wait()).collect();
        for c in cmds {
            for cl in &c.cleanups {
                env.clean(cl.clone(), false);
            }
        }
        let last = cmds.len() - 1;
        for (i, (c, sp)) in cmds.iter().zip(&spawned).enumerate() {
            self.validate_status(
                c,
                &sp.program,
                &statuses[i],
                sp.stdout_path.as_deref(),
                sp.stderr_path.as_deref(),
                loc,
            )?;
            if i == last {
                self.check_output(
                    env,
                    &sp.program,
                    "stdout",
                    sp.stdout_path.as_deref(),
                    c.stdout.effective(docs),
                    loc,
                )?;
            }
            self.check_output(
                env,
                &sp.program,
                "stderr",
                sp.stderr_path.as_deref(),
                c.stderr.effective(docs),
                loc,
            )?;
        }
        Ok(())
    }

    /// Evaluate an expression left to right with shell short-circuit
    /// semantics. Inside an expression a pipe failing its expectation is
    /// an ordinary false — its diagnostic is withheld while a later term
    /// can still decide the expression — but anything the engine could not
    /// execute propagates immediately.
    pub fn run_expr(
        &mut self,
        env: &mut Environment,
        expr: &CommandExpr,
        docs: &HereDocs,
        loc: Location,
    ) -> Result<()> {
        if expr.terms.is_empty() {
            return Err(ScriptError::syntax("empty command expression").with_location(loc));
        }

        let mut value = false;
        let mut failure: Option<ScriptError> = None;
        for (i, term) in expr.terms.iter().enumerate() {
            let evaluate = i == 0
                || match term.op {
                    ExprOperator::Or => !value,
                    ExprOperator::And => value,
                };
            if !evaluate {
                continue;
            }
            match self.run_pipe(env, &term.pipe, docs, loc) {
                Ok(()) => {
                    value = true;
                    failure = None;
                }
                Err(e) if e.is_mismatch() => {
                    value = false;
                    failure = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        if value {
            Ok(())
        } else {
            Err(failure.unwrap_or_else(|| {
                ScriptError::mismatch("command expression evaluated to false").with_location(loc)
            }))
        }
    }

    fn spawn_command(
        &mut self,
        env: &mut Environment,
        cmd: &Command,
        docs: &HereDocs,
        ci: usize,
        stdin_from: Option<Stdio>,
        stdout_pipe: Option<io::PipeWriter>,
        loc: Location,
    ) -> Result<Spawned> {
        if self.diag.verbosity() >= 3 {
            let text = cmd.to_string();
            self.diag.text(3, &text);
        }

        // Resolve up front so diagnostics name the path actually executed.
        let program = resolve_program(&cmd.program, env.work_dir).ok_or_else(|| {
            ScriptError::resolution(format!(
                "unable to find program {}",
                cmd.program.display()
            ))
            .with_location(loc)
        })?;

        let (stdin, here_text) = match stdin_from {
            Some(s) => (s, None),
            None => self.open_input(env, cmd.stdin.effective(docs), loc)?,
        };

        let out_sink = match stdout_pipe {
            Some(w) => OutSink::Pipe(w),
            None => self.open_output(env, cmd.stdout.effective(docs), 1, ci, loc)?,
        };
        let err_sink = self.open_output(env, cmd.stderr.effective(docs), 2, ci, loc)?;

        let stdout_path = out_sink.capture_path();
        let stderr_path = err_sink.capture_path();

        let out_is_merge = matches!(out_sink, OutSink::Merge);
        let err_is_merge = matches!(err_sink, OutSink::Merge);
        if out_is_merge && err_is_merge {
            return Err(ScriptError::redirect(
                "stdout and stderr cannot be merged into each other",
            )
            .with_location(loc));
        }
        let wire = |r: io::Result<Stdio>| -> Result<Stdio> {
            r.map_err(|e| {
                ScriptError::io(format!("unable to set up redirects: {e}")).with_location(loc)
            })
        };
        let (out_stdio, err_stdio) = if err_is_merge {
            let err = wire(out_sink.dup(1))?;
            (wire(out_sink.into_stdio())?, err)
        } else if out_is_merge {
            let out = wire(err_sink.dup(2))?;
            (out, wire(err_sink.into_stdio())?)
        } else {
            (wire(out_sink.into_stdio())?, wire(err_sink.into_stdio())?)
        };

        if self.diag.verbosity() >= 2 {
            let mut line = program.display().to_string();
            for a in &cmd.arguments {
                line.push(' ');
                line.push_str(a);
            }
            self.diag.text(2, &line);
        }

        let mut child = Process::new(&program)
            .args(&cmd.arguments)
            .current_dir(env.work_dir)
            .stdin(stdin)
            .stdout(out_stdio)
            .stderr(err_stdio)
            .spawn()
            .map_err(|e| {
                ScriptError::io(format!("unable to execute {}: {e}", program.display()))
                    .with_location(loc)
            })?;

        // Feed the here-document and close the pipe so the child sees
        // EOF. A child that exits without reading its input is judged by
        // its exit status, not by the broken pipe.
        if let Some(text) = here_text {
            if let Some(mut si) = child.stdin.take() {
                if let Err(e) = si.write_all(text.as_bytes()) {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ScriptError::io(format!(
                            "unable to write stdin of {}: {e}",
                            program.display()
                        ))
                        .with_location(loc));
                    }
                }
            }
        }

        Ok(Spawned {
            child,
            program,
            stdout_path,
            stderr_path,
        })
    }

    fn open_input<'c>(
        &mut self,
        env: &Environment,
        r: &'c Redirect,
        loc: Location,
    ) -> Result<(Stdio, Option<&'c str>)> {
        match &r.kind {
            RedirectKind::Pass => Ok((Stdio::inherit(), None)),
            RedirectKind::HereStrLiteral(s) | RedirectKind::HereDocLiteral(s) => {
                Ok((Stdio::piped(), Some(s.as_str())))
            }
            // Regex-typed content only validates output; there is nothing
            // to write to a child.
            RedirectKind::HereStrRegex(_) | RedirectKind::HereDocRegex(_) => Err(
                ScriptError::redirect("stdin cannot be supplied from a regex here-document")
                    .with_location(loc),
            ),
            // Best effort: the child observes immediate EOF. One that
            // ignores an expected-empty stdin and blocks is not detected.
            RedirectKind::Null | RedirectKind::None => Ok((Stdio::null(), None)),
            RedirectKind::File { path, .. } => {
                let p = paths::normalize(path, env.work_dir);
                let f = File::open(&p).map_err(|e| {
                    ScriptError::io(format!("unable to read {}: {e}", p.display()))
                        .with_location(loc)
                })?;
                Ok((f.into(), None))
            }
            RedirectKind::Merge(_) => Err(ScriptError::redirect(
                "stdin cannot be a merge redirect",
            )
            .with_location(loc)),
            RedirectKind::Trace => Err(ScriptError::redirect(
                "stdin cannot be a trace redirect",
            )
            .with_location(loc)),
            RedirectKind::HereDocRef(_) => unreachable!("effective redirect"),
        }
    }

    fn open_output(
        &mut self,
        env: &mut Environment,
        r: &Redirect,
        fd: u8,
        ci: usize,
        loc: Location,
    ) -> Result<OutSink> {
        let name = if fd == 1 { "stdout" } else { "stderr" };
        match &r.kind {
            RedirectKind::Pass => Ok(OutSink::Inherit),
            RedirectKind::Null => Ok(OutSink::Null),
            RedirectKind::Trace => Ok(if self.diag.verbosity() >= 2 {
                OutSink::Inherit
            } else {
                OutSink::Null
            }),
            RedirectKind::Merge(d) => {
                let want = if fd == 1 { 2 } else { 1 };
                if *d != want {
                    return Err(ScriptError::redirect(format!(
                        "{name} can only be merged into file descriptor {want}"
                    ))
                    .with_location(loc));
                }
                Ok(OutSink::Merge)
            }
            RedirectKind::File { path, mode: FileMode::Overwrite } => {
                let p = paths::normalize(path, env.work_dir);
                let file = File::create(&p).map_err(|e| write_err(&p, e, loc))?;
                env.clean(
                    Cleanup::new(CleanupType::Always, CleanupPath::file(p.clone())),
                    true,
                );
                Ok(OutSink::File { file, path: p })
            }
            RedirectKind::File { path, mode: FileMode::Append } => {
                let p = paths::normalize(path, env.work_dir);
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&p)
                    .map_err(|e| write_err(&p, e, loc))?;
                env.clean(
                    Cleanup::new(CleanupType::Always, CleanupPath::file(p.clone())),
                    true,
                );
                Ok(OutSink::File { file, path: p })
            }
            // Whatever still needs validation is captured to a file,
            // regardless of what the redirect said about wiring.
            RedirectKind::None
            | RedirectKind::File { mode: FileMode::Compare, .. }
            | RedirectKind::HereStrLiteral(_)
            | RedirectKind::HereStrRegex(_)
            | RedirectKind::HereDocLiteral(_)
            | RedirectKind::HereDocRegex(_) => {
                let mut n = String::from(name);
                if ci > 0 {
                    n.push('-');
                    n.push_str(&ci.to_string());
                }
                let p = env.work_dir.join(n);
                let file = File::create(&p).map_err(|e| write_err(&p, e, loc))?;
                env.clean_special(p.clone());
                Ok(OutSink::File { file, path: p })
            }
            RedirectKind::HereDocRef(_) => unreachable!("effective redirect"),
        }
    }

    fn validate_status(
        &mut self,
        cmd: &Command,
        program: &Path,
        status: &io::Result<ExitStatus>,
        stdout_path: Option<&Path>,
        stderr_path: Option<&Path>,
        loc: Location,
    ) -> Result<()> {
        let status = match status {
            Ok(s) => s,
            Err(e) => {
                return Err(ScriptError::io(format!(
                    "unable to obtain exit status of {}: {e}",
                    program.display()
                ))
                .with_location(loc));
            }
        };

        let code = status.code();
        let valid = matches!(code, Some(0..=255));
        let eq = cmd.exit.comparison == ExitComparison::Eq;
        let correct = valid && ((code == Some(i32::from(cmd.exit.code))) == eq);
        if correct {
            return Ok(());
        }

        // Replay the captured stderr; it usually explains the status.
        if let Some(p) = stderr_path {
            if let Ok(bytes) = fs::read(p) {
                if !bytes.is_empty() {
                    self.diag.raw(&bytes);
                }
            }
        }

        let mut err = match code {
            None => ScriptError::invalid_status(format!(
                "{} terminated abnormally",
                program.display()
            )),
            Some(c) if !valid => ScriptError::invalid_status(format!(
                "{} exit status {c} is invalid",
                program.display()
            ))
            .with_info("must be an unsigned integer < 256"),
            Some(c) => ScriptError::mismatch(format!(
                "{} exit status {c} {} {}",
                program.display(),
                if eq { "!=" } else { "==" },
                cmd.exit.code
            )),
        };
        if let Some(p) = stdout_path {
            if non_empty_path(p) {
                err = err.with_info(format!("stdout is saved to {}", p.display()));
            }
        }
        if let Some(p) = stderr_path {
            if non_empty_path(p) {
                err = err.with_info(format!("stderr is saved to {}", p.display()));
            }
        }
        Err(err.with_location(loc))
    }

    /// Check a captured stream against its redirect's expectation. A no-op
    /// for redirects that are satisfied by construction.
    fn check_output(
        &mut self,
        env: &mut Environment,
        program: &Path,
        name: &str,
        capture: Option<&Path>,
        r: &Redirect,
        loc: Location,
    ) -> Result<()> {
        // Intermediate pipeline stages have no capture to check.
        let Some(capture) = capture else {
            return Ok(());
        };
        match &r.kind {
            RedirectKind::None => {
                if non_empty_path(capture) {
                    Err(ScriptError::mismatch(format!(
                        "{} unexpectedly writes to {name}",
                        program.display()
                    ))
                    .with_info(format!("{name} is saved to {}", capture.display()))
                    .with_location(loc))
                } else {
                    Ok(())
                }
            }
            RedirectKind::HereStrLiteral(text) | RedirectKind::HereDocLiteral(text) => {
                let orig = orig_path(capture);
                fs::write(&orig, text).map_err(|e| write_err(&orig, e, loc))?;
                env.clean_special(orig.clone());
                self.compare_outputs(program, name, &orig, capture, loc)
            }
            RedirectKind::HereStrRegex(rl) | RedirectKind::HereDocRegex(rl) => {
                let orig = orig_path(capture);
                fs::write(&orig, rl.to_source()).map_err(|e| write_err(&orig, e, loc))?;
                env.clean_special(orig.clone());
                self.check_regex(program, name, capture, &orig, rl, loc)
            }
            RedirectKind::File { path, mode: FileMode::Compare } => {
                let expected = paths::normalize(path, env.work_dir);
                self.compare_outputs(program, name, &expected, capture, loc)
            }
            _ => Ok(()),
        }
    }

    fn compare_outputs(
        &mut self,
        program: &Path,
        name: &str,
        expected: &Path,
        actual: &Path,
        loc: Location,
    ) -> Result<()> {
        let Runner { differ, diag } = self;
        let equal = differ
            .compare(expected, actual, diag.writer())
            .map_err(|e| {
                ScriptError::io(format!(
                    "unable to compare {name} of {}: {e}",
                    program.display()
                ))
                .with_location(loc)
            })?;
        if equal {
            return Ok(());
        }
        Err(ScriptError::mismatch(format!(
            "{} {name} doesn't match the expected output",
            program.display()
        ))
        .with_info(saved_info(name, "", actual))
        .with_info(saved_info(name, "expected ", expected))
        .with_location(loc))
    }

    /// Sequential matching: output line i must satisfy pattern line i.
    /// There is no backtracking across lines.
    fn check_regex(
        &mut self,
        program: &Path,
        name: &str,
        capture: &Path,
        orig: &Path,
        rl: &RegexLines,
        loc: Location,
    ) -> Result<()> {
        let bytes = fs::read(capture).map_err(|e| {
            ScriptError::io(format!("unable to read {}: {e}", capture.display()))
                .with_location(loc)
        })?;
        let content = String::from_utf8_lossy(&bytes);
        let actual: Vec<&str> = content.lines().collect();

        let fail = |msg: String| {
            ScriptError::mismatch(format!("{} {name} {msg}", program.display()))
                .with_info(saved_info(name, "", capture))
                .with_info(saved_info(name, "expected ", orig))
                .with_location(loc)
        };

        for (i, line) in actual.iter().enumerate() {
            let Some(expected) = rl.lines.get(i) else {
                return Err(fail(format!("has unexpected line {}: '{line}'", i + 1)));
            };
            if !regex_line_matches(expected, line, &rl.flags)? {
                return Err(fail(format!(
                    "doesn't match '{}' at line {}",
                    expected.to_source(rl.intro),
                    i + 1
                )));
            }
        }
        if rl.lines.len() > actual.len() {
            let next = &rl.lines[actual.len()];
            return Err(fail(format!(
                "ends before the expected '{}'",
                next.to_source(rl.intro)
            )));
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────────────────
// Program resolution
// ──────────────────────────────────────────────────────────

/// Resolve a program to an executable path. A program with a directory
/// component is completed against the working directory; a bare name is
/// searched for on PATH.
fn resolve_program(program: &Path, work_dir: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        let p = paths::normalize(program, work_dir);
        return is_executable(&p).then_some(p);
    }
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let candidate = dir.join(program);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(p: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(p)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(p: &Path) -> bool {
    p.is_file()
}

#[cfg(unix)]
fn dup_std_stream(fd: u8) -> io::Result<Stdio> {
    use std::os::fd::AsFd;
    let owned = if fd == 1 {
        io::stdout().as_fd().try_clone_to_owned()?
    } else {
        io::stderr().as_fd().try_clone_to_owned()?
    };
    Ok(Stdio::from(owned))
}

#[cfg(windows)]
fn dup_std_stream(fd: u8) -> io::Result<Stdio> {
    use std::os::windows::io::AsHandle;
    let owned = if fd == 1 {
        io::stdout().as_handle().try_clone_to_owned()?
    } else {
        io::stderr().as_handle().try_clone_to_owned()?
    };
    Ok(Stdio::from(owned))
}

fn reap(spawned: Vec<Spawned>) {
    for mut sp in spawned {
        let _ = sp.child.kill();
        let _ = sp.child.wait();
    }
}

// ──────────────────────────────────────────────────────────
// Regex-line matching
// ──────────────────────────────────────────────────────────

fn regex_line_matches(expected: &RegexLine, line: &str, global_flags: &str) -> Result<bool> {
    match &expected.kind {
        // Special-character lines match verbatim, no regex semantics.
        RegexLineKind::Literal(t) | RegexLineKind::Special(t) => Ok(line == t),
        RegexLineKind::Regex { pattern, flags } => {
            let at = Location::new(expected.line, expected.column);
            let mut b = RegexBuilder::new(&format!("^(?:{pattern})$"));
            b.size_limit(1 << 20);
            for f in global_flags.chars().chain(flags.chars()) {
                match f {
                    'i' => {
                        b.case_insensitive(true);
                    }
                    'd' => {
                        b.dot_matches_new_line(true);
                    }
                    _ => {
                        return Err(ScriptError::syntax(format!("invalid regex flag '{f}'"))
                            .with_location(at))
                    }
                }
            }
            let re = b.build().map_err(|e| {
                ScriptError::syntax(format!("invalid regex: {e}")).with_location(at)
            })?;
            Ok(re.is_match(line))
        }
    }
}

// ──────────────────────────────────────────────────────────
// Cleanup removal
// ──────────────────────────────────────────────────────────

fn remove_cleanup(c: &Cleanup, loc: Location) -> Result<()> {
    let p = c.path.base();
    let tolerate = c.kind == CleanupType::Maybe;
    match c.path.target() {
        CleanupTarget::File => match fs::remove_file(p) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                missing_entry(tolerate, "file", &c.path, loc)
            }
            Err(e) => Err(rm_err(p, e, loc)),
        },
        CleanupTarget::Dir => remove_dir_entry(p, tolerate, &c.path, loc),
        CleanupTarget::Wildcard(w) => {
            if !p.is_dir() {
                return missing_entry(tolerate, "directory", &c.path, loc);
            }
            match w {
                Wildcard::Files => remove_immediate(p, false, loc),
                Wildcard::Subdirs => remove_immediate(p, true, loc),
                Wildcard::FilesRecursive => remove_files_recursive(p, loc),
                Wildcard::SubdirsRecursive => remove_subdirs_recursive(p, loc),
                Wildcard::All => fs::remove_dir_all(p).map_err(|e| rm_err(p, e, loc)),
            }
        }
    }
}

// A directory registered for cleanup must be empty by the time its turn
// comes; "not empty" and "does not exist" are distinct diagnostics.
fn remove_dir_entry(p: &Path, tolerate: bool, path: &CleanupPath, loc: Location) -> Result<()> {
    match fs::remove_dir(p) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            missing_entry(tolerate, "directory", path, loc)
        }
        Err(e) => {
            if p.read_dir().map(|mut it| it.next().is_some()).unwrap_or(false) {
                Err(cleanup_err(
                    format!("registered for cleanup directory {path} is not empty"),
                    loc,
                ))
            } else {
                Err(rm_err(p, e, loc))
            }
        }
    }
}

fn remove_immediate(dir: &Path, subdirs: bool, loc: Location) -> Result<()> {
    for entry in read_dir_checked(dir, loc)? {
        let entry = entry.map_err(|e| read_err(dir, e, loc))?;
        let p = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if subdirs && is_dir {
            remove_dir_entry(&p, true, &CleanupPath::dir(p.clone()), loc)?;
        } else if !subdirs && !is_dir {
            fs::remove_file(&p).map_err(|e| rm_err(&p, e, loc))?;
        }
    }
    Ok(())
}

fn remove_files_recursive(dir: &Path, loc: Location) -> Result<()> {
    for entry in read_dir_checked(dir, loc)? {
        let entry = entry.map_err(|e| read_err(dir, e, loc))?;
        let p = entry.path();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            remove_files_recursive(&p, loc)?;
        } else {
            fs::remove_file(&p).map_err(|e| rm_err(&p, e, loc))?;
        }
    }
    Ok(())
}

// Post-order so each sub-directory only has to be empty of directories by
// the time it is removed; remaining files make it fail as "not empty".
fn remove_subdirs_recursive(dir: &Path, loc: Location) -> Result<()> {
    for entry in read_dir_checked(dir, loc)? {
        let entry = entry.map_err(|e| read_err(dir, e, loc))?;
        let p = entry.path();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            remove_subdirs_recursive(&p, loc)?;
            remove_dir_entry(&p, true, &CleanupPath::dir(p.clone()), loc)?;
        }
    }
    Ok(())
}

fn read_dir_checked(dir: &Path, loc: Location) -> Result<fs::ReadDir> {
    fs::read_dir(dir).map_err(|e| read_err(dir, e, loc))
}

fn missing_entry(tolerate: bool, what: &str, path: &CleanupPath, loc: Location) -> Result<()> {
    if tolerate {
        Ok(())
    } else {
        Err(cleanup_err(
            format!("registered for cleanup {what} {path} does not exist"),
            loc,
        ))
    }
}

// ──────────────────────────────────────────────────────────
// Small helpers
// ──────────────────────────────────────────────────────────

fn cleanup_err(msg: String, loc: Location) -> ScriptError {
    ScriptError::cleanup(msg).with_location(loc)
}

fn rm_err(p: &Path, e: io::Error, loc: Location) -> ScriptError {
    cleanup_err(format!("unable to remove {}: {e}", p.display()), loc)
}

fn read_err(p: &Path, e: io::Error, loc: Location) -> ScriptError {
    cleanup_err(format!("unable to read {}: {e}", p.display()), loc)
}

fn write_err(p: &Path, e: io::Error, loc: Location) -> ScriptError {
    ScriptError::io(format!("unable to write {}: {e}", p.display())).with_location(loc)
}

fn non_empty_path(p: &Path) -> bool {
    fs::metadata(p).map(|m| m.len() > 0).unwrap_or(false)
}

fn orig_path(capture: &Path) -> PathBuf {
    let mut s = capture.as_os_str().to_owned();
    s.push(".orig");
    PathBuf::from(s)
}

fn saved_info(name: &str, prefix: &str, p: &Path) -> String {
    if non_empty_path(p) {
        format!("{prefix}{name} is saved to {}", p.display())
    } else {
        format!("{prefix}{name} is empty")
    }
}
