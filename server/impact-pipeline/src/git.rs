//! Git-backed revision source and per-repository working directories.

use git2::{
  build::RepoBuilder, Delta, DiffFindOptions, DiffFormat, DiffOptions, ErrorCode, FetchOptions, Patch,
  RemoteCallbacks, Repository,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use impact_engine::{EngineError, FileStatus, FileStatusEntry, RevisionSource};

use crate::config::Config;
use crate::error::PipelineError;

fn git_err(e: git2::Error) -> EngineError {
  EngineError::source(e.message().to_string())
}

/// Reads revisions from one local (bare) repository.
pub struct GitRevisionSource {
  repo: Repository,
}

impl GitRevisionSource {
  pub fn open(path: &Path) -> Result<Self, PipelineError> {
    Ok(Self {
      repo: Repository::open(path)?,
    })
  }

  fn tree(&self, revision: &str) -> Result<git2::Tree<'_>, EngineError> {
    self
      .repo
      .revparse_single(revision)
      .and_then(|obj| obj.peel_to_commit())
      .and_then(|commit| commit.tree())
      .map_err(|_| EngineError::revision_not_found(revision))
  }

  fn diff(&self, before: &str, after: &str, context_lines: u32) -> Result<git2::Diff<'_>, EngineError> {
    let old_tree = self.tree(before)?;
    let new_tree = self.tree(after)?;
    let mut opts = DiffOptions::new();
    opts.context_lines(context_lines);
    let mut diff = self
      .repo
      .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))
      .map_err(git_err)?;
    diff
      .find_similar(Some(DiffFindOptions::new().renames(true)))
      .map_err(git_err)?;
    Ok(diff)
  }
}

fn delta_path(file: git2::DiffFile<'_>) -> Option<String> {
  file.path().and_then(|p| p.to_str()).map(String::from)
}

impl RevisionSource for GitRevisionSource {
  fn list_changed_files(&self, before: &str, after: &str) -> Result<Vec<FileStatusEntry>, EngineError> {
    let mut diff = self.diff(before, after, 0)?;
    let mut entries = Vec::new();

    for idx in 0..diff.deltas().count() {
      let Some(delta) = diff.get_delta(idx) else {
        continue;
      };
      let status = match delta.status() {
        Delta::Added | Delta::Copied => FileStatus::Added,
        Delta::Deleted => FileStatus::Deleted,
        Delta::Renamed => FileStatus::Renamed,
        _ => FileStatus::Modified,
      };
      let new_path = delta_path(delta.new_file());
      let old_path = delta_path(delta.old_file());
      let Some(path) = new_path.clone().or_else(|| old_path.clone()) else {
        continue;
      };

      let mut entry = FileStatusEntry::new(path, status);
      if status == FileStatus::Renamed {
        entry.old_path = old_path;
      }
      if let Ok(Some(patch)) = Patch::from_diff(&mut diff, idx) {
        if let Ok((_, additions, deletions)) = patch.line_stats() {
          entry.additions = Some(additions as u32);
          entry.deletions = Some(deletions as u32);
        }
      }
      entries.push(entry);
    }
    debug!(before, after, files = entries.len(), "listed changed files");
    Ok(entries)
  }

  fn diff_text(&self, before: &str, after: &str, context_lines: u32) -> Result<String, EngineError> {
    let diff = self.diff(before, after, context_lines)?;
    let mut out = String::new();
    diff
      .print(DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
          out.push(line.origin());
        }
        out.push_str(&String::from_utf8_lossy(line.content()));
        true
      })
      .map_err(git_err)?;
    Ok(out)
  }

  fn file_content(&self, revision: &str, path: &str) -> Result<Option<String>, EngineError> {
    let tree = self.tree(revision)?;
    let entry = match tree.get_path(Path::new(path)) {
      Ok(entry) => entry,
      Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
      Err(e) => return Err(git_err(e)),
    };
    let blob = self.repo.find_blob(entry.id()).map_err(git_err)?;
    Ok(String::from_utf8(blob.content().to_vec()).ok())
  }
}

// ---------------------------------------------------------------------------
// Working directories
// ---------------------------------------------------------------------------

/// One bare clone per repository; clone/fetch serialized per repository.
pub struct WorkdirManager {
  config: Arc<Config>,
  // One entry per repository ever prepared; the set of repositories is bounded.
  locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// `owner/name` with no empty, dot or dot-dot segments.
fn validate_repo_name(repo: &str) -> Result<(), PipelineError> {
  let parts: Vec<&str> = repo.split('/').collect();
  let ok = parts.len() == 2
    && parts
      .iter()
      .all(|p| !p.is_empty() && *p != "." && *p != ".." && !p.contains('\\'));
  if ok {
    Ok(())
  } else {
    Err(PipelineError::validation("repository", "expected owner/name"))
  }
}

/// Transfer callbacks that abort once `cancel` is set.
fn cancellable_fetch_options(cancel: &AtomicBool) -> FetchOptions<'_> {
  let mut callbacks = RemoteCallbacks::new();
  callbacks.transfer_progress(move |_stats| !cancel.load(Ordering::Relaxed));
  let mut options = FetchOptions::new();
  options.remote_callbacks(callbacks);
  options
}

/// Remove what a failed clone left behind.
fn discard_partial_clone(path: &Path) {
  match std::fs::remove_dir_all(path) {
    Ok(()) => debug!(path = %path.display(), "removed partial clone"),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
    Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial clone"),
  }
}

impl WorkdirManager {
  pub fn new(config: Arc<Config>) -> Self {
    Self {
      config,
      locks: Mutex::new(HashMap::new()),
    }
  }

  pub fn path_for(&self, repo: &str) -> PathBuf {
    self.config.repos_base_path.join(repo)
  }

  async fn lock_for(&self, repo: &str) -> Arc<Mutex<()>> {
    let mut locks = self.locks.lock().await;
    locks.entry(repo.to_string()).or_default().clone()
  }

  /// Clone if missing, otherwise fetch. Returns the bare repository path.
  ///
  /// The repository guard travels with the blocking git job, so a clone or
  /// fetch that outlives its deadline keeps the repository locked until
  /// git2 returns.
  pub async fn prepare(&self, repo: &str) -> Result<PathBuf, PipelineError> {
    validate_repo_name(repo)?;
    let guard = self.lock_for(repo).await.lock_owned().await;

    let path = self.path_for(repo);
    if path.exists() {
      self.fetch(repo, path.clone(), guard).await?;
    } else {
      self.clone_bare(repo, path.clone(), guard).await?;
    }
    Ok(path)
  }

  async fn clone_bare(&self, repo: &str, path: PathBuf, guard: OwnedMutexGuard<()>) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let url = self.config.clone_url(repo);
    info!(repo, path = %path.display(), "cloning repository");

    let secs = self.config.clone_timeout.as_secs();
    let job = move |cancel: &AtomicBool| {
      let mut builder = RepoBuilder::new();
      builder.bare(true).fetch_options(cancellable_fetch_options(cancel));
      let cloned = builder.clone(&url, &path).map(|_| ());
      if cloned.is_err() {
        discard_partial_clone(&path);
      }
      cloned
    };
    run_locked(guard, self.config.clone_timeout, job, || PipelineError::clone_timeout(repo, secs)).await
  }

  async fn fetch(&self, repo: &str, path: PathBuf, guard: OwnedMutexGuard<()>) -> Result<(), PipelineError> {
    let url = self.config.clone_url(repo);
    debug!(repo, "fetching repository");

    let secs = self.config.fetch_timeout.as_secs();
    let job = move |cancel: &AtomicBool| {
      let repository = Repository::open_bare(&path)?;
      let mut remote = repository.remote_anonymous(&url)?;
      let mut options = cancellable_fetch_options(cancel);
      remote.fetch(&["+refs/heads/*:refs/heads/*"], Some(&mut options), None)
    };
    run_locked(guard, self.config.fetch_timeout, job, || PipelineError::clone_timeout(repo, secs)).await
  }
}

/// Run a git job on the blocking pool under a deadline, holding `guard`
/// until the job returns. An elapsed deadline sets the job's cancel flag.
async fn run_locked<F>(
  guard: OwnedMutexGuard<()>,
  limit: Duration,
  job: F,
  on_timeout: impl FnOnce() -> PipelineError,
) -> Result<(), PipelineError>
where
  F: FnOnce(&AtomicBool) -> Result<(), git2::Error> + Send + 'static,
{
  let cancel = Arc::new(AtomicBool::new(false));
  let flag = Arc::clone(&cancel);
  let task = tokio::task::spawn_blocking(move || {
    let _guard = guard;
    job(flag.as_ref())
  });
  match tokio::time::timeout(limit, task).await {
    Ok(joined) => Ok(joined??),
    Err(_) => {
      cancel.store(true, Ordering::Relaxed);
      Err(on_timeout())
    }
  }
}
