//! Worktree lifecycle management.
//!
//! Provisions and releases isolated, branch-bound workspaces keyed by
//! `(base_path, repo_name, branch_name)`. Creation is idempotent: an
//! existing path at the target location is returned unchanged with no git
//! mutation, which is also how a crash mid-create is recovered after a
//! restart — path existence on disk decides, not registry membership.
//!
//! Commit and push are separate capabilities invoked by the orchestrator
//! only after successful execution, never from the provisioning or release
//! paths.

pub mod git;

use std::path::{Path, PathBuf};

use tracing::{info, info_span, warn, Instrument};

use crate::worktree::git::Git;
use crate::{AppError, Result};

/// Result of a worktree provisioning call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedWorktree {
    /// Absolute path of the workspace.
    pub path: PathBuf,
    /// `false` when the path already existed and nothing was done.
    pub created: bool,
}

/// Creates and removes branch-bound worktrees.
#[derive(Debug, Clone, Default)]
pub struct WorktreeManager {
    git: Git,
}

impl WorktreeManager {
    /// Create a manager.
    #[must_use]
    pub fn new() -> Self {
        Self { git: Git::new() }
    }

    /// Deterministic workspace location for `(base, repo, branch)`.
    ///
    /// Branch separators are flattened so the path stays a single directory
    /// under `<base>/worktrees/`.
    #[must_use]
    pub fn worktree_path(base: &Path, repo_name: &str, branch: &str) -> PathBuf {
        base.join("worktrees")
            .join(format!("{repo_name}--{}", branch.replace('/', "-")))
    }

    /// Provision a worktree for `branch`, cut from `base_branch` if new.
    ///
    /// Idempotent: if the target path already exists it is returned with
    /// `created == false` and no git command runs. Otherwise the base branch
    /// is fetched from `origin`; a branch already known locally or on the
    /// remote is checked out as-is (resuming prior work), else a fresh
    /// branch is cut from the fetched base.
    ///
    /// # Errors
    ///
    /// - `AppError::Git` if the primary checkout is missing, the fetch
    ///   fails (retryable), or the worktree cannot be created.
    /// - `AppError::Io` if the parent directory cannot be created.
    pub async fn create(
        &self,
        base: &Path,
        repo_name: &str,
        branch: &str,
        base_branch: &str,
    ) -> Result<ProvisionedWorktree> {
        let span = info_span!("worktree_create", repo = repo_name, branch);
        async {
            let repo = base.join(repo_name);
            if !repo.is_dir() {
                return Err(AppError::Git(format!(
                    "primary checkout missing at {}",
                    repo.display()
                )));
            }

            let path = Self::worktree_path(base, repo_name, branch);
            if path.exists() {
                info!(path = %path.display(), "worktree already present — reusing");
                return Ok(ProvisionedWorktree {
                    path,
                    created: false,
                });
            }

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            self.git.fetch(&repo, base_branch).await?;

            if self.git.local_branch_exists(&repo, branch).await? {
                self.git.worktree_add_existing(&repo, &path, branch).await?;
            } else if self.git.remote_branch_exists(&repo, branch).await? {
                self.git.fetch(&repo, branch).await?;
                self.git.worktree_add_tracking(&repo, &path, branch).await?;
            } else {
                self.git
                    .worktree_add_new(&repo, &path, branch, &format!("origin/{base_branch}"))
                    .await?;
            }

            info!(path = %path.display(), "worktree created");
            Ok(ProvisionedWorktree {
                path,
                created: true,
            })
        }
        .instrument(span)
        .await
    }

    /// Force-remove the worktree for `branch` and prune stale metadata.
    ///
    /// Discards uncommitted state. "Already removed" is success; failures
    /// are logged and swallowed — cleanup must never block on them. After
    /// the git removal a leftover directory is deleted directly so the
    /// workspace is absent from disk in every case.
    pub async fn remove(&self, base: &Path, repo_name: &str, branch: &str) {
        let span = info_span!("worktree_remove", repo = repo_name, branch);
        async {
            let repo = base.join(repo_name);
            let path = Self::worktree_path(base, repo_name, branch);

            if path.exists() {
                if let Err(err) = self.git.worktree_remove(&repo, &path).await {
                    warn!(%err, path = %path.display(), "git worktree remove failed");
                }
            }

            if path.exists() {
                if let Err(err) = tokio::fs::remove_dir_all(&path).await {
                    warn!(%err, path = %path.display(), "leftover worktree directory not removed");
                }
            }

            if let Err(err) = self.git.worktree_prune(&repo).await {
                warn!(%err, "worktree prune failed");
            }

            info!(path = %path.display(), "worktree released");
        }
        .instrument(span)
        .await;
    }

    /// Commit all changes in the worktree and push its branch to `origin`.
    ///
    /// Invoked only after successful execution. A clean tree skips the
    /// commit but still pushes so the branch exists on the remote.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` if the commit or push fails (retryable at
    /// the caller's discretion).
    pub async fn commit_and_push(
        &self,
        base: &Path,
        repo_name: &str,
        branch: &str,
        message: &str,
    ) -> Result<()> {
        let path = Self::worktree_path(base, repo_name, branch);

        if self.git.has_changes(&path).await? {
            self.git.commit_all(&path, message).await?;
        }
        self.git.push(&path, branch).await?;
        Ok(())
    }
}
