//! The git subprocess wrapper.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::cache::{ReadCache, ReadKey};
use crate::error::GitFsError;
use crate::version::Version;

/// A directory listing at a version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Listing {
  pub files: Vec<String>,
  pub dirs: Vec<String>,
}

/// Git-backed versioned content source.
///
/// Works against either a working repository (`<repo>/.git` present)
/// or a bare one. Cloning the handle shares the pinned-read caches.
#[derive(Debug, Clone)]
pub struct GitFs {
  git_dir: PathBuf,
  work_tree: Option<PathBuf>,
  file_cache: ReadCache<Vec<u8>>,
  dir_cache: ReadCache<Listing>,
}

impl GitFs {
  /// Open a repository. Fails if the path does not exist; layout
  /// detection follows git itself (a `.git` subdirectory means a
  /// working repository, otherwise the path is taken as bare).
  pub fn new(repo: impl AsRef<Path>) -> Result<Self, GitFsError> {
    let repo = repo.as_ref();
    if !repo.exists() {
      return Err(GitFsError::BadRepo {
        path: repo.display().to_string(),
      });
    }

    let dot_git = repo.join(".git");
    let (git_dir, work_tree) = if dot_git.exists() {
      (dot_git, Some(repo.to_path_buf()))
    } else {
      (repo.to_path_buf(), None)
    };

    Ok(Self {
      git_dir,
      work_tree,
      file_cache: ReadCache::new(),
      dir_cache: ReadCache::new(),
    })
  }

  /// Whether the repository has a working tree.
  pub fn has_work_tree(&self) -> bool {
    self.work_tree.is_some()
  }

  /// Read a file's bytes at a version.
  ///
  /// For the symbolic `HEAD` of a working repository the bytes come
  /// straight from the working tree, so uncommitted edits are visible.
  #[instrument(skip(self), fields(version = %version, path))]
  pub async fn read_file(&self, version: &Version, path: &str) -> Result<Vec<u8>, GitFsError> {
    if version == &Version::Head {
      if let Some(work_tree) = &self.work_tree {
        return tokio::fs::read(work_tree.join(path)).await.map_err(|e| {
          if e.kind() == std::io::ErrorKind::NotFound {
            GitFsError::NotFound {
              version: version.to_string(),
              path: path.to_string(),
            }
          } else {
            GitFsError::WorkTree {
              path: path.to_string(),
              message: e.to_string(),
            }
          }
        });
      }
    }

    let key = pinned_key(version, path);
    if let Some(key) = &key {
      if let Some(bytes) = self.file_cache.get(key) {
        debug!(version = %version, path, "file cache hit");
        return Ok(bytes);
      }
    }

    let bytes = self.show(version, path).await?;
    if let Some(key) = key {
      self.file_cache.insert(key, bytes.clone());
    }
    Ok(bytes)
  }

  /// Read a directory listing at a version.
  #[instrument(skip(self), fields(version = %version, path))]
  pub async fn read_dir(&self, version: &Version, path: &str) -> Result<Listing, GitFsError> {
    let key = pinned_key(version, path);
    if let Some(key) = &key {
      if let Some(listing) = self.dir_cache.get(key) {
        debug!(version = %version, path, "dir cache hit");
        return Ok(listing);
      }
    }

    let bytes = self.show(version, path).await?;
    let listing = parse_tree_listing(&bytes).ok_or_else(|| GitFsError::NotDirectory {
      version: version.to_string(),
      path: path.to_string(),
    })?;

    if let Some(key) = key {
      self.dir_cache.insert(key, listing.clone());
    }
    Ok(listing)
  }

  /// Resolve the symbolic `HEAD` to a pinned commit.
  pub async fn resolve_head(&self) -> Result<Version, GitFsError> {
    let stdout = self.exec(&["rev-parse", "HEAD"]).await?;
    let sha = String::from_utf8_lossy(&stdout).trim().to_string();
    Ok(Version::Commit(sha))
  }

  /// List tags: tag name to commit sha.
  pub async fn tags(&self) -> Result<HashMap<String, String>, GitFsError> {
    // `show-ref --tags` exits nonzero with empty stderr when the repo
    // simply has no tags.
    let stdout = match self.exec(&["show-ref", "--tags"]).await {
      Ok(stdout) => stdout,
      Err(GitFsError::Git { stderr, .. }) if stderr.trim().is_empty() => {
        return Ok(HashMap::new());
      }
      Err(e) => return Err(e),
    };

    let text = String::from_utf8_lossy(&stdout);
    let mut tags = HashMap::new();
    for line in text.lines() {
      if let Some((sha, reference)) = line.split_once(' ') {
        if let Some(name) = reference.strip_prefix("refs/tags/") {
          tags.insert(name.to_string(), sha.to_string());
        }
      }
    }
    Ok(tags)
  }

  /// Revisions at which `path` exists: every tag plus the symbolic
  /// `HEAD`, mapped to the revision each name points at.
  #[instrument(skip(self), fields(path))]
  pub async fn exists(&self, path: &str) -> Result<HashMap<String, String>, GitFsError> {
    let mut revisions: Vec<(String, Version)> = self
      .tags()
      .await?
      .into_iter()
      .map(|(name, sha)| (name, Version::Commit(sha)))
      .collect();
    revisions.push(("HEAD".to_string(), Version::Head));

    let checks = revisions.into_iter().map(|(name, version)| {
      let fs = self.clone();
      let path = path.to_string();
      async move {
        match fs.read_file(&version, &path).await {
          Ok(_) => Ok(Some((name, version.to_string()))),
          Err(e) if e.is_not_found() => Ok(None),
          Err(e) => Err(e),
        }
      }
    });

    let mut found = HashMap::new();
    for check in join_all(checks).await {
      if let Some((name, revision)) = check? {
        found.insert(name, revision);
      }
    }
    Ok(found)
  }

  /// Drop every cached pinned read.
  pub fn clear_cache(&self) {
    self.file_cache.clear();
    self.dir_cache.clear();
  }

  /// `git show <version>:<path>`, with missing paths/objects mapped to
  /// `NotFound`.
  async fn show(&self, version: &Version, path: &str) -> Result<Vec<u8>, GitFsError> {
    let spec = format!("{version}:{path}");
    match self.exec(&["show", &spec]).await {
      Ok(stdout) => Ok(stdout),
      Err(GitFsError::Git { stderr, command }) => {
        if looks_like_not_found(&stderr) {
          Err(GitFsError::NotFound {
            version: version.to_string(),
            path: path.to_string(),
          })
        } else {
          Err(GitFsError::Git { stderr, command })
        }
      }
      Err(e) => Err(e),
    }
  }

  async fn exec(&self, args: &[&str]) -> Result<Vec<u8>, GitFsError> {
    let mut command = Command::new("git");
    command.arg(format!("--git-dir={}", self.git_dir.display()));
    if let Some(work_tree) = &self.work_tree {
      command.arg(format!("--work-tree={}", work_tree.display()));
    }
    command.args(args);

    debug!(args = %args.join(" "), "running git");
    let output = command.output().await.map_err(|e| GitFsError::Spawn {
      message: e.to_string(),
    })?;

    if !output.status.success() {
      return Err(GitFsError::Git {
        command: args.join(" "),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
      });
    }
    Ok(output.stdout)
  }
}

fn pinned_key(version: &Version, path: &str) -> Option<ReadKey> {
  match version {
    Version::Commit(sha) => Some(ReadKey::new(sha.clone(), path)),
    Version::Head => None,
  }
}

/// `git show` prints `tree <rev>:<path>`, a blank line, then one entry
/// per line with a trailing `/` on directories. Returns `None` when
/// the output is not a tree.
fn parse_tree_listing(bytes: &[u8]) -> Option<Listing> {
  let text = String::from_utf8_lossy(bytes);
  let rest = text.strip_prefix("tree ")?;
  let (_, body) = rest.split_once("\n\n")?;

  let mut listing = Listing::default();
  for entry in body.lines() {
    let entry = entry.trim_end();
    if entry.is_empty() {
      continue;
    }
    match entry.strip_suffix('/') {
      Some(dir) => listing.dirs.push(dir.to_string()),
      None => listing.files.push(entry.to_string()),
    }
  }
  Some(listing)
}

fn looks_like_not_found(stderr: &str) -> bool {
  stderr.contains("does not exist")
    || stderr.contains("exists on disk, but not in")
    || stderr.contains("invalid object name")
    || stderr.contains("bad revision")
}
