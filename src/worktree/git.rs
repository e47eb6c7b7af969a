//! Thin async wrapper over the `git` CLI.
//!
//! Working-tree mutations go through the CLI rather than a libgit2 binding:
//! the CLI refuses to clobber uncommitted state unless forced and respects
//! sparse-checkout, which keeps worktree provisioning safe without
//! re-implementing those checks. Every call takes the repository directory
//! as an explicit parameter; the ambient process CWD is never touched.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::{AppError, Result};

/// Async git CLI runner.
#[derive(Debug, Clone)]
pub struct Git {
    program: String,
}

impl Default for Git {
    fn default() -> Self {
        Self::new()
    }
}

impl Git {
    /// Create a runner invoking the `git` binary from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "git".into(),
        }
    }

    /// Run `git <args>` in `dir` and return trimmed stdout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` if the binary cannot be spawned or exits
    /// non-zero; the message carries the captured stderr.
    pub async fn run<I, S>(&self, dir: &Path, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_owned()).collect();
        debug!(dir = %dir.display(), ?args, "git");

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| AppError::Git(format!("failed to spawn git: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Git(format!(
                "git {:?} exited with {}: {}",
                args,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }

    /// Run `git <args>` in `dir` and return only whether it exited zero.
    ///
    /// Used for probes where a non-zero exit is an answer, not a failure.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` only if the binary cannot be spawned.
    pub async fn probe<I, S>(&self, dir: &Path, args: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let status = Command::new(&self.program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|err| AppError::Git(format!("failed to spawn git: {err}")))?;
        Ok(status.success())
    }

    /// Fetch `refspec` from `origin`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` on network or remote failure (retryable).
    pub async fn fetch(&self, repo: &Path, refspec: &str) -> Result<()> {
        self.run(repo, ["fetch", "origin", refspec]).await?;
        Ok(())
    }

    /// Whether a local branch named `branch` exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` if git cannot be spawned.
    pub async fn local_branch_exists(&self, repo: &Path, branch: &str) -> Result<bool> {
        self.probe(
            repo,
            [
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ],
        )
        .await
    }

    /// Whether `origin` has a branch named `branch`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` if git cannot be spawned.
    pub async fn remote_branch_exists(&self, repo: &Path, branch: &str) -> Result<bool> {
        self.probe(
            repo,
            ["ls-remote", "--exit-code", "--heads", "origin", branch],
        )
        .await
    }

    /// `git worktree add <path> <branch>` for an existing local branch.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` if the worktree cannot be created.
    pub async fn worktree_add_existing(&self, repo: &Path, path: &Path, branch: &str) -> Result<()> {
        self.run(
            repo,
            [
                OsStr::new("worktree"),
                OsStr::new("add"),
                path.as_os_str(),
                OsStr::new(branch),
            ],
        )
        .await?;
        Ok(())
    }

    /// `git worktree add --track -b <branch> <path> origin/<branch>`.
    ///
    /// Resumes prior work on a branch that already exists on the remote.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` if the worktree cannot be created.
    pub async fn worktree_add_tracking(&self, repo: &Path, path: &Path, branch: &str) -> Result<()> {
        self.run(
            repo,
            [
                OsStr::new("worktree"),
                OsStr::new("add"),
                OsStr::new("--track"),
                OsStr::new("-b"),
                OsStr::new(branch),
                path.as_os_str(),
                OsStr::new(&format!("origin/{branch}")),
            ],
        )
        .await?;
        Ok(())
    }

    /// `git worktree add -b <branch> <path> <start_point>` for a new branch.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` if the worktree cannot be created.
    pub async fn worktree_add_new(
        &self,
        repo: &Path,
        path: &Path,
        branch: &str,
        start_point: &str,
    ) -> Result<()> {
        self.run(
            repo,
            [
                OsStr::new("worktree"),
                OsStr::new("add"),
                OsStr::new("-b"),
                OsStr::new(branch),
                path.as_os_str(),
                OsStr::new(start_point),
            ],
        )
        .await?;
        Ok(())
    }

    /// `git worktree remove --force <path>`, discarding uncommitted state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` if removal fails; callers on the cleanup path
    /// swallow this.
    pub async fn worktree_remove(&self, repo: &Path, path: &Path) -> Result<()> {
        self.run(
            repo,
            [
                OsStr::new("worktree"),
                OsStr::new("remove"),
                OsStr::new("--force"),
                path.as_os_str(),
            ],
        )
        .await?;
        Ok(())
    }

    /// Prune stale worktree metadata.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` if the prune fails.
    pub async fn worktree_prune(&self, repo: &Path) -> Result<()> {
        self.run(repo, ["worktree", "prune"]).await?;
        Ok(())
    }

    /// Whether the working tree has any staged or unstaged changes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` if the status check fails.
    pub async fn has_changes(&self, worktree: &Path) -> Result<bool> {
        let out = self
            .run(worktree, ["--no-optional-locks", "status", "--porcelain"])
            .await?;
        Ok(!out.is_empty())
    }

    /// Stage everything and commit with `message`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` if staging or the commit fails.
    pub async fn commit_all(&self, worktree: &Path, message: &str) -> Result<()> {
        self.run(worktree, ["add", "-A"]).await?;
        self.run(worktree, ["commit", "-m", message]).await?;
        Ok(())
    }

    /// Push `branch` to `origin`, setting upstream.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Git` on rejection or network failure (retryable).
    pub async fn push(&self, worktree: &Path, branch: &str) -> Result<()> {
        self.run(worktree, ["push", "-u", "origin", branch]).await?;
        Ok(())
    }
}
