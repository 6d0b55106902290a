//! Integration tests: real processes against a scratch working directory
//!
//! These spawn `sh` and friends, so they are Unix-only. Each test gets its
//! own scope under a tempdir; `enter`/`leave` run the full lifecycle, so a
//! passing test also proves the scope tore down cleanly.

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use checkscript::{
    Cleanup, CleanupPath, CleanupType, Command, CommandExit, CommandExpr, CommandPipe, Diag,
    Environment, ErrorKind, HereDocs, Location, Redirect, RedirectKind, RegexLine, RegexLines,
    Runner,
};

const LOC: Location = Location::new(1, 1);

fn runner() -> Runner {
    Runner::new(Diag::silent())
}

fn sh(script: &str) -> Command {
    Command::new("sh").arg("-c").arg(script)
}

fn here_str(text: &str) -> Redirect {
    Redirect::new(RedirectKind::HereStrLiteral(text.into()))
}

/// Scratch root plus the scope's working directory path (not yet created).
fn scratch() -> Result<(tempfile::TempDir, PathBuf)> {
    let root = tempfile::tempdir()?;
    let work = root.path().join("work");
    Ok((root, work))
}

#[test]
fn here_string_stdout_matches() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();

    let mut cmd = Command::new("echo").arg("hello");
    cmd.stdout = here_str("hello\n");

    r.enter(&mut env, LOC)?;
    r.run(&mut env, &cmd, &docs, 0, LOC)?;
    r.leave(&mut env, LOC)?;
    assert!(!work.exists(), "scope must tear down its working directory");
    Ok(())
}

#[test]
fn here_string_stdout_mismatch_reports_both_captures() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();

    let mut cmd = Command::new("echo").arg("hello");
    cmd.stdout = here_str("goodbye\n");

    r.enter(&mut env, LOC)?;
    let err = r.run(&mut env, &cmd, &docs, 0, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Mismatch);
    assert!(err.message.contains("doesn't match"), "{err}");
    assert!(
        err.info.iter().any(|i| i.contains("stdout is saved to")),
        "{err}"
    );
    assert!(
        err.info.iter().any(|i| i.contains("expected stdout is saved to")),
        "{err}"
    );
    // The captures are special cleanups; teardown still succeeds.
    r.leave(&mut env, LOC)?;
    Ok(())
}

#[test]
fn none_redirect_creates_empty_capture() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();

    let cmd = sh(":");
    r.enter(&mut env, LOC)?;
    r.run(&mut env, &cmd, &docs, 0, LOC)?;

    let capture = work.join("stdout");
    assert!(capture.exists());
    assert_eq!(fs::metadata(&capture)?.len(), 0);
    r.leave(&mut env, LOC)?;
    Ok(())
}

#[test]
fn none_redirect_rejects_output() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();

    let cmd = Command::new("echo").arg("surprise");
    r.enter(&mut env, LOC)?;
    let err = r.run(&mut env, &cmd, &docs, 0, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Mismatch);
    assert!(err.message.contains("unexpectedly writes to stdout"), "{err}");
    Ok(())
}

#[test]
fn exit_code_expectations() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();
    r.enter(&mut env, LOC)?;

    // Default expectation is == 0.
    let err = r.run(&mut env, &sh("exit 1"), &docs, 0, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Mismatch);
    assert!(err.message.contains("exit status 1 != 0"), "{err}");

    let mut expected_failure = sh("exit 1");
    expected_failure.exit = CommandExit::ne(0);
    r.run(&mut env, &expected_failure, &docs, 0, LOC)?;

    let mut exact = sh("exit 7");
    exact.exit = CommandExit::eq(7);
    r.run(&mut env, &exact, &docs, 0, LOC)?;

    r.leave(&mut env, LOC)?;
    Ok(())
}

#[test]
fn signal_termination_is_invalid_status() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();
    r.enter(&mut env, LOC)?;

    let err = r.run(&mut env, &sh("kill -9 $$"), &docs, 0, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidStatus);
    assert!(err.message.contains("terminated abnormally"), "{err}");
    Ok(())
}

#[test]
fn program_resolution_failure_is_fatal() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();
    r.enter(&mut env, LOC)?;

    let err = r
        .run(&mut env, &Command::new("no-such-program-here"), &docs, 0, LOC)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Resolution);
    assert!(err.message.contains("no-such-program-here"), "{err}");
    Ok(())
}

#[test]
fn stdin_here_string_feeds_the_child() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();

    let mut cmd = Command::new("cat");
    cmd.stdin = here_str("ping\n");
    cmd.stdout = here_str("ping\n");

    r.enter(&mut env, LOC)?;
    r.run(&mut env, &cmd, &docs, 0, LOC)?;
    r.leave(&mut env, LOC)?;
    Ok(())
}

#[test]
fn regex_stdin_is_rejected() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();

    let mut rl = RegexLines::new('/', "");
    rl.lines.push(RegexLine::regex(1, 1, ".*", ""));
    let mut cmd = Command::new("cat");
    cmd.stdin = Redirect::new(RedirectKind::HereDocRegex(rl));

    r.enter(&mut env, LOC)?;
    let err = r.run(&mut env, &cmd, &docs, 0, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Redirect);
    Ok(())
}

#[test]
fn file_redirects_write_and_append() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();
    r.enter(&mut env, LOC)?;

    let mut first = Command::new("echo").arg("one");
    first.stdout = Redirect::new(RedirectKind::File {
        path: "log.txt".into(),
        mode: checkscript::FileMode::Overwrite,
    });
    r.run(&mut env, &first, &docs, 0, LOC)?;
    assert_eq!(fs::read_to_string(work.join("log.txt"))?, "one\n");

    let mut second = Command::new("echo").arg("two");
    second.stdout = Redirect::new(RedirectKind::File {
        path: "log.txt".into(),
        mode: checkscript::FileMode::Append,
    });
    r.run(&mut env, &second, &docs, 0, LOC)?;
    assert_eq!(fs::read_to_string(work.join("log.txt"))?, "one\ntwo\n");

    // The redirect registered the file implicitly; teardown removes it.
    r.leave(&mut env, LOC)?;
    assert!(!work.exists());
    Ok(())
}

#[test]
fn file_compare_redirect_checks_content() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();
    r.enter(&mut env, LOC)?;

    fs::write(work.join("golden.txt"), "hello\n")?;
    env.clean(Cleanup::always("golden.txt"), false);

    let mut ok = Command::new("echo").arg("hello");
    ok.stdout = Redirect::new(RedirectKind::File {
        path: "golden.txt".into(),
        mode: checkscript::FileMode::Compare,
    });
    r.run(&mut env, &ok, &docs, 0, LOC)?;

    let mut bad = Command::new("echo").arg("other");
    bad.stdout = Redirect::new(RedirectKind::File {
        path: "golden.txt".into(),
        mode: checkscript::FileMode::Compare,
    });
    let err = r.run(&mut env, &bad, &docs, 0, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Mismatch);

    r.leave(&mut env, LOC)?;
    Ok(())
}

#[test]
fn stderr_merges_into_stdout() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();

    let mut cmd = sh("echo oops >&2");
    cmd.stdout = here_str("oops\n");
    cmd.stderr = Redirect::new(RedirectKind::Merge(1));

    r.enter(&mut env, LOC)?;
    r.run(&mut env, &cmd, &docs, 0, LOC)?;
    r.leave(&mut env, LOC)?;
    Ok(())
}

#[test]
fn merge_on_stdin_is_rejected() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();

    let mut cmd = Command::new("cat");
    cmd.stdin = Redirect::new(RedirectKind::Merge(1));

    r.enter(&mut env, LOC)?;
    let err = r.run(&mut env, &cmd, &docs, 0, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Redirect);
    Ok(())
}

#[test]
fn here_doc_reference_shares_content() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();

    let mut docs = HereDocs::new();
    let id = docs.insert(Redirect::new(RedirectKind::HereDocLiteral("shared\n".into())));

    let mut cmd = Command::new("cat");
    cmd.stdin = Redirect::new(RedirectKind::HereDocRef(id));
    cmd.stdout = Redirect::new(RedirectKind::HereDocRef(id));

    r.enter(&mut env, LOC)?;
    r.run(&mut env, &cmd, &docs, 0, LOC)?;
    r.leave(&mut env, LOC)?;
    Ok(())
}

#[test]
fn pipe_connects_stages_and_numbers_captures() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();

    let mut last = Command::new("cat");
    last.stdout = here_str("hello\n");
    let pipe = CommandPipe(vec![Command::new("echo").arg("hello"), last]);

    r.enter(&mut env, LOC)?;
    r.run_pipe(&mut env, &pipe, &docs, LOC)?;
    // Stage captures carry the 1-based pipeline position.
    assert!(work.join("stdout-2").exists());
    assert!(work.join("stderr-1").exists());
    r.leave(&mut env, LOC)?;
    Ok(())
}

#[test]
fn pipe_fails_on_any_stage_with_default_expectation() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();

    let pipe = CommandPipe(vec![sh("exit 3"), Command::new("cat")]);

    r.enter(&mut env, LOC)?;
    let err = r.run_pipe(&mut env, &pipe, &docs, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Mismatch);
    assert!(err.message.contains("exit status 3"), "{err}");
    Ok(())
}

#[test]
fn expression_or_recovers_and_short_circuits() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();
    r.enter(&mut env, LOC)?;

    // First pipe fails its expectation, OR recovers with the second.
    let expr = CommandExpr::new(sh("exit 1")).or(sh("exit 0"));
    r.run_expr(&mut env, &expr, &docs, LOC)?;

    // A satisfied prefix short-circuits the rest: the touch never runs.
    let expr = CommandExpr::new(sh("exit 0")).or(sh("touch sentinel"));
    r.run_expr(&mut env, &expr, &docs, LOC)?;
    assert!(!work.join("sentinel").exists());

    // AND propagates the failing term's diagnostic.
    let expr = CommandExpr::new(sh("exit 0")).and(sh("exit 1"));
    let err = r.run_expr(&mut env, &expr, &docs, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Mismatch);

    // A false AND term short-circuits the rest.
    let expr = CommandExpr::new(sh("exit 1"))
        .and(sh("touch sentinel"))
        .or(sh("exit 0"));
    r.run_expr(&mut env, &expr, &docs, LOC)?;
    assert!(!work.join("sentinel").exists());

    r.leave(&mut env, LOC)?;
    Ok(())
}

#[test]
fn regex_lines_match_sequentially() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();
    r.enter(&mut env, LOC)?;

    let mut expected = RegexLines::new('/', "");
    expected.lines.push(RegexLine::literal(1, 1, "foo"));
    expected.lines.push(RegexLine::regex(2, 1, "ba[rz]", ""));

    let mut ok = sh("printf 'foo\\nbar\\n'");
    ok.stdout = Redirect::new(RedirectKind::HereDocRegex(expected.clone()));
    r.run(&mut env, &ok, &docs, 0, LOC)?;

    // A trailing extra line fails even though the prefix matched.
    let mut extra = sh("printf 'foo\\nbaz\\nqux\\n'");
    extra.stdout = Redirect::new(RedirectKind::HereDocRegex(expected.clone()));
    let err = r.run(&mut env, &extra, &docs, 0, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Mismatch);
    assert!(err.message.contains("unexpected line 3"), "{err}");

    // Output ending early fails naming the next expected pattern.
    let mut short = sh("printf 'foo\\n'");
    short.stdout = Redirect::new(RedirectKind::HereDocRegex(expected));
    let err = r.run(&mut env, &short, &docs, 0, LOC).unwrap_err();
    assert!(err.message.contains("ends before"), "{err}");

    r.leave(&mut env, LOC)?;
    Ok(())
}

#[test]
fn command_cleanups_register_after_execution() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();

    let mut cmd = sh("mkdir d && touch d/f");
    cmd.cleanups.push(Cleanup::always("d/"));
    cmd.cleanups.push(Cleanup::always("d/f"));

    r.enter(&mut env, LOC)?;
    r.run(&mut env, &cmd, &docs, 0, LOC)?;
    r.leave(&mut env, LOC)?;
    assert!(!work.exists());
    Ok(())
}

#[test]
fn always_cleanup_missing_fails_maybe_tolerates() -> Result<()> {
    let (_root, work) = scratch()?;
    fs::create_dir_all(&work)?;

    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::maybe("not-there"), false);
    runner().leave(&mut env, LOC)?;

    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::always("not-there"), false);
    let err = runner().leave(&mut env, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cleanup);
    assert!(err.message.contains("does not exist"), "{err}");
    Ok(())
}

#[test]
fn never_cleanup_is_not_removed() -> Result<()> {
    let (_root, work) = scratch()?;
    fs::create_dir_all(&work)?;
    fs::write(work.join("keep.txt"), "kept")?;

    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::never("keep.txt"), false);
    runner().leave(&mut env, LOC)?;
    assert!(work.join("keep.txt").exists());
    Ok(())
}

#[test]
fn reverse_order_teardown_handles_nesting() -> Result<()> {
    let (_root, work) = scratch()?;
    fs::create_dir_all(work.join("a/b"))?;
    fs::write(work.join("a/b/f"), "x")?;

    // Parents registered before children; the reverse walk removes the
    // file, then the inner directory, then the outer one.
    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::always("a/"), false);
    env.clean(Cleanup::always("a/b/"), false);
    env.clean(Cleanup::always("a/b/f"), false);
    runner().leave(&mut env, LOC)?;
    assert!(!work.join("a").exists());
    Ok(())
}

#[test]
fn duplicate_registration_removes_once() -> Result<()> {
    let (_root, work) = scratch()?;
    fs::create_dir_all(&work)?;
    fs::write(work.join("f"), "x")?;

    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::always("f"), false);
    env.clean(Cleanup::always("f"), false);
    runner().leave(&mut env, LOC)?;
    assert!(!work.join("f").exists());
    Ok(())
}

#[test]
fn latest_registration_type_wins_at_teardown() -> Result<()> {
    let (_root, work) = scratch()?;
    fs::create_dir_all(&work)?;

    // Registered maybe first, then explicitly re-registered as always:
    // the override applies, and the missing path fails teardown.
    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::maybe("gone"), false);
    env.clean(Cleanup::always("gone"), false);
    let err = runner().leave(&mut env, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cleanup);
    Ok(())
}

#[test]
fn wildcard_scopes_select_entries() -> Result<()> {
    let build = |work: &Path| -> Result<()> {
        fs::create_dir_all(work.join("dir/sub"))?;
        fs::write(work.join("dir/f1"), "1")?;
        fs::write(work.join("dir/f2"), "2")?;
        fs::write(work.join("dir/sub/f3"), "3")?;
        Ok(())
    };

    // dir/* removes immediate files only.
    let (_root, work) = scratch()?;
    build(&work)?;
    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::always("dir/*"), false);
    runner().leave(&mut env, LOC)?;
    assert!(!work.join("dir/f1").exists());
    assert!(!work.join("dir/f2").exists());
    assert!(work.join("dir/sub/f3").exists());

    // dir/** removes files recursively, leaving directories.
    let (_root, work) = scratch()?;
    build(&work)?;
    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::always("dir/**"), false);
    runner().leave(&mut env, LOC)?;
    assert!(!work.join("dir/sub/f3").exists());
    assert!(work.join("dir/sub").exists());

    // dir/*** removes the directory with everything under it.
    let (_root, work) = scratch()?;
    build(&work)?;
    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::always("dir/***"), false);
    runner().leave(&mut env, LOC)?;
    assert!(!work.join("dir").exists());

    // dir/*/ removes immediate empty sub-directories only.
    let (_root, work) = scratch()?;
    fs::create_dir_all(work.join("dir/empty"))?;
    fs::write(work.join("dir/f"), "x")?;
    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::always("dir/*/"), false);
    runner().leave(&mut env, LOC)?;
    assert!(!work.join("dir/empty").exists());
    assert!(work.join("dir/f").exists());

    // dir/**/ removes sub-directories recursively; files make it fail.
    let (_root, work) = scratch()?;
    fs::create_dir_all(work.join("dir/a/b"))?;
    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::always("dir/**/"), false);
    runner().leave(&mut env, LOC)?;
    assert!(!work.join("dir/a").exists());
    assert!(work.join("dir").exists());
    Ok(())
}

#[test]
fn nonempty_marked_directory_fails_teardown() -> Result<()> {
    let (_root, work) = scratch()?;
    fs::create_dir_all(work.join("d"))?;
    fs::write(work.join("d/f"), "x")?;

    let mut env = Environment::new(&work, "work");
    env.clean(Cleanup::always("d/"), false);
    let err = runner().leave(&mut env, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cleanup);
    assert!(err.message.contains("is not empty"), "{err}");
    Ok(())
}

#[test]
fn sandbox_rejects_explicit_cleanup_outside() -> Result<()> {
    let root = tempfile::tempdir()?;
    let sandbox = root.path().join("sandbox");
    let work = sandbox.join("case");
    fs::create_dir_all(&work)?;
    let outside = root.path().join("outside.txt");
    fs::write(&outside, "x")?;

    let mut env = Environment::with_sandbox(&work, "work", &sandbox, "test root");
    env.clean(
        Cleanup::new(CleanupType::Always, CleanupPath::file(outside.clone())),
        false,
    );
    let err = runner().leave(&mut env, LOC).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Cleanup);
    assert!(err.message.contains("out of test root directory"), "{err}");
    assert!(outside.exists(), "the boundary must prevent the removal");
    Ok(())
}

#[test]
fn implicit_cleanup_outside_sandbox_is_dropped() -> Result<()> {
    let root = tempfile::tempdir()?;
    let sandbox = root.path().join("sandbox");
    let work = sandbox.join("case");
    fs::create_dir_all(&work)?;
    let outside = root.path().join("outside.txt");
    fs::write(&outside, "x")?;

    let mut env = Environment::with_sandbox(&work, "work", &sandbox, "test root");
    env.clean(
        Cleanup::new(CleanupType::Always, CleanupPath::file(outside.clone())),
        true,
    );
    assert!(env.cleanups.is_empty());
    runner().leave(&mut env, LOC)?;
    assert!(outside.exists());
    Ok(())
}

#[test]
fn enter_requires_pristine_directory() -> Result<()> {
    let (_root, work) = scratch()?;
    fs::create_dir_all(&work)?;
    fs::write(work.join("leftover"), "x")?;

    let mut env = Environment::new(&work, "work");
    let err = runner().enter(&mut env, LOC).unwrap_err();
    assert!(err.message.contains("is not empty"), "{err}");
    assert!(
        err.info.iter().any(|i| i.contains("clean it up and rerun")),
        "{err}"
    );
    Ok(())
}

#[test]
fn failure_diagnostics_include_location() -> Result<()> {
    let (_root, work) = scratch()?;
    let mut env = Environment::new(&work, "work");
    let mut r = runner();
    let docs = HereDocs::new();
    let loc = Location::new(12, 3);

    r.enter(&mut env, loc)?;
    let err = r.run(&mut env, &sh("exit 1"), &docs, 0, loc).unwrap_err();
    assert_eq!(err.location, Some(loc));
    assert!(err.to_string().starts_with("12:3: "), "{err}");
    Ok(())
}
