//! End-to-end tests driving the spelt binary against scratch repos.

use std::path::{Path, PathBuf};
use std::process::Command;

fn git(dir: &Path, args: &[&str]) {
  let status = Command::new("git")
    .arg("-c")
    .arg("user.name=test")
    .arg("-c")
    .arg("user.email=test@example.com")
    .args(args)
    .current_dir(dir)
    .status()
    .expect("failed to run git");
  assert!(status.success(), "git {args:?} failed");
}

fn write(dir: &Path, path: &str, contents: &str) {
  let full = dir.join(path);
  std::fs::create_dir_all(full.parent().unwrap()).unwrap();
  std::fs::write(full, contents).unwrap();
}

fn blog_repo() -> tempfile::TempDir {
  let dir = tempfile::tempdir().expect("failed to create temp dir");
  git(dir.path(), &["init", "-q"]);
  write(
    dir.path(),
    "articles/intro.markdown",
    "Title: Intro\nAuthor: jane\nDate: 2010-06-25\n\nWelcome.\n",
  );
  write(
    dir.path(),
    "authors/jane.markdown",
    "Email: jane@example.com\n\nBio.\n",
  );
  git(dir.path(), &["add", "."]);
  git(dir.path(), &["commit", "-q", "-m", "seed blog content"]);
  dir
}

/// A `git` wrapper first on PATH that logs every invocation to a file
/// before delegating to the real binary.
fn logging_git(dir: &Path) -> (PathBuf, PathBuf) {
  let log = dir.join("git-calls.log");
  let bin = dir.join("bin");
  std::fs::create_dir_all(&bin).unwrap();

  let real = Command::new("sh")
    .arg("-c")
    .arg("command -v git")
    .output()
    .expect("failed to locate git");
  let real = String::from_utf8(real.stdout).unwrap().trim().to_string();

  let shim = bin.join("git");
  std::fs::write(
    &shim,
    format!("#!/bin/sh\necho \"$@\" >> {}\nexec {} \"$@\"\n", log.display(), real),
  )
  .unwrap();
  {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&shim, std::fs::Permissions::from_mode(0o755)).unwrap();
  }
  (bin, log)
}

fn spelt(repo: &Path, shim_bin: &Path, args: &[&str]) -> std::process::Output {
  let path = format!(
    "{}:{}",
    shim_bin.display(),
    std::env::var("PATH").unwrap_or_default()
  );
  Command::new(env!("CARGO_BIN_EXE_spelt"))
    .arg("--repo")
    .arg(repo)
    .args(args)
    .env("PATH", path)
    .output()
    .expect("failed to run spelt")
}

#[test]
fn head_prints_the_sha_and_resolves_it_once() {
  let repo = blog_repo();
  let scratch = tempfile::tempdir().unwrap();
  let (bin, log) = logging_git(scratch.path());

  let expected = Command::new("git")
    .args(["rev-parse", "HEAD"])
    .current_dir(repo.path())
    .output()
    .unwrap();
  let expected = String::from_utf8(expected.stdout).unwrap().trim().to_string();

  let output = spelt(repo.path(), &bin, &["head"]);
  assert!(
    output.status.success(),
    "{}",
    String::from_utf8_lossy(&output.stderr)
  );
  assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), expected);

  let calls = std::fs::read_to_string(&log).unwrap();
  let resolves = calls.lines().filter(|l| l.contains("rev-parse")).count();
  assert_eq!(resolves, 1, "unexpected git calls:\n{calls}");
}

#[test]
fn show_embeds_the_author() {
  let repo = blog_repo();
  let scratch = tempfile::tempdir().unwrap();
  let (bin, _log) = logging_git(scratch.path());

  let output = spelt(repo.path(), &bin, &["show", "intro"]);
  assert!(
    output.status.success(),
    "{}",
    String::from_utf8_lossy(&output.stderr)
  );
  let stdout = String::from_utf8_lossy(&output.stdout);
  assert!(stdout.contains("\"title\": \"Intro\""));
  assert!(stdout.contains("jane@example.com"));
}
