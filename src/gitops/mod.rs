//! Repository cloning via libgit2.
//!
//! Performs a shallow (depth 1) clone of a remote repository, using the
//! current access token as clone credentials when one is held (GitHub
//! accepts `oauth2` as the username with the token as password). libgit2
//! is synchronous, so the clone runs on the blocking pool; progress ticks
//! are forwarded to the caller's callback as they arrive.

use crate::credentials::TokenHolder;
use crate::error::{Error, Result};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, FetchOptions, RemoteCallbacks};
use serde::Serialize;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Username GitHub expects when authenticating a clone with an OAuth token.
const CLONE_USERNAME: &str = "oauth2";

/// A progress tick streamed to the caller during a clone.
///
/// Phases advance monotonically: `receiving` (objects over the wire),
/// `resolving` (delta resolution), then `checkout` (working tree).
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct CloneProgress {
    pub phase: String,
    pub loaded: usize,
    pub total: usize,
}

/// Callback invoked with each [`CloneProgress`] tick.
///
/// Invoked on the blocking worker running the transfer; it must not block
/// materially or it will stall the clone.
pub type ProgressCallback = Box<dyn FnMut(CloneProgress) + Send + 'static>;

/// Clones repositories using the shared token for authentication.
pub struct CloneOrchestrator {
    holder: TokenHolder,
}

impl CloneOrchestrator {
    pub fn new(holder: TokenHolder) -> Self {
        Self { holder }
    }

    /// Shallow-clone `url` into `target_dir`, creating the directory (and
    /// parents) as needed.
    ///
    /// The fetch uses the remote's default refspec, so the depth-1 tips of
    /// all branches transfer; the default branch is checked out. A caller
    /// that knows the branch up front could narrow the fetch further with
    /// a custom remote refspec, but no branch selection is exposed here.
    ///
    /// When a token is held it is supplied as clone credentials; without
    /// one the clone proceeds unauthenticated, which is sufficient for
    /// public repositories. Every failure is wrapped in [`Error::Clone`]
    /// with the underlying cause's message.
    ///
    /// The orchestrator does not require `target_dir` to be empty; callers
    /// that want to warn first can use [`is_directory_empty`].
    pub async fn clone_repository(
        &self,
        url: &str,
        target_dir: &Path,
        on_progress: Option<ProgressCallback>,
    ) -> Result<PathBuf> {
        self.clone_inner(url, target_dir, Some(1), on_progress).await
    }

    async fn clone_inner(
        &self,
        url: &str,
        target_dir: &Path,
        depth: Option<i32>,
        on_progress: Option<ProgressCallback>,
    ) -> Result<PathBuf> {
        // Read the token once for this operation; later invalidation
        // affects the next operation, not one already in flight
        let token = self.holder.get();
        let url = url.to_string();
        let target = target_dir.to_path_buf();

        info!(url = %url, target = %target.display(), authenticated = token.is_some(), "Starting clone");

        let result = tokio::task::spawn_blocking(move || {
            clone_blocking(&url, &target, depth, token, on_progress)
        })
        .await
        .map_err(|e| Error::Clone(format!("Clone task failed: {}", e)))?;

        if result.is_ok() {
            debug!("Clone finished");
        }
        result
    }
}

fn clone_blocking(
    url: &str,
    target: &Path,
    depth: Option<i32>,
    token: Option<String>,
    on_progress: Option<ProgressCallback>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(target).map_err(|e| {
        Error::Clone(format!(
            "Failed to create target directory {}: {}",
            target.display(),
            e
        ))
    })?;

    // Shared between the transfer and checkout callbacks, which both run
    // on this thread
    let progress = RefCell::new(on_progress);
    let report = |tick: CloneProgress| {
        if let Some(cb) = progress.borrow_mut().as_mut() {
            cb(tick);
        }
    };

    let mut callbacks = RemoteCallbacks::new();
    if let Some(token) = token {
        callbacks.credentials(move |_url, _username_from_url, _allowed| {
            Cred::userpass_plaintext(CLONE_USERNAME, &token)
        });
    }
    callbacks.transfer_progress(|stats| {
        report(transfer_tick(
            stats.received_objects(),
            stats.total_objects(),
            stats.indexed_deltas(),
            stats.total_deltas(),
        ));
        true
    });

    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);
    if let Some(depth) = depth {
        fetch_options.depth(depth);
    }

    let mut checkout = CheckoutBuilder::new();
    checkout.progress(|_path, completed, total| {
        report(CloneProgress {
            phase: "checkout".to_string(),
            loaded: completed,
            total,
        });
    });

    let repo = RepoBuilder::new()
        .fetch_options(fetch_options)
        .with_checkout(checkout)
        .clone(url, target)
        .map_err(|e| Error::Clone(format!("Failed to clone {}: {}", url, e.message())))?;

    let workdir = repo
        .workdir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| target.to_path_buf());
    Ok(workdir)
}

/// Map raw transfer counters onto a progress tick.
///
/// Object receipt is reported first; once every object has arrived the
/// phase switches to delta resolution.
fn transfer_tick(
    received_objects: usize,
    total_objects: usize,
    indexed_deltas: usize,
    total_deltas: usize,
) -> CloneProgress {
    if received_objects < total_objects || total_deltas == 0 {
        CloneProgress {
            phase: "receiving".to_string(),
            loaded: received_objects,
            total: total_objects,
        }
    } else {
        CloneProgress {
            phase: "resolving".to_string(),
            loaded: indexed_deltas,
            total: total_deltas,
        }
    }
}

/// Whether `dir` contains no entries. A directory that does not exist
/// counts as empty, since a clone into it may proceed.
pub fn is_directory_empty(dir: &Path) -> std::io::Result<bool> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}
