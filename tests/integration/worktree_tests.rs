//! Worktree provisioning tests against real git repositories, plus the
//! full assignment lifecycle (provision → execute → commit/push →
//! release).

use std::path::{Path, PathBuf};
use std::process::Command;

use serial_test::serial;

use agent_dispatch::adapter::{AdapterEvent, ExecutionOutcome};
use agent_dispatch::worktree::WorktreeManager;
use agent_dispatch::AppError;

use super::test_helpers::{assignment_event, harness_with_root, wait_for_unregister, Step};

const REPO: &str = "widgets";
const BASE: &str = "main";

fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap_or_else(|err| panic!("spawn git {args:?}: {err}"));
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_owned()
}

fn configure_user(repo: &Path) {
    run_git(repo, &["config", "user.email", "tests@example.com"]);
    run_git(repo, &["config", "user.name", "Test Runner"]);
}

/// Build a bare origin with one commit on `main` and a primary checkout of
/// it under `<root>/widgets`. Returns `(tempdir, repos_root, origin)`.
fn git_fixture() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let origin = tmp.path().join("origin.git");
    run_git(tmp.path(), &["init", "--bare", "--initial-branch=main", "origin.git"]);

    let seed = tmp.path().join("seed");
    run_git(tmp.path(), &["init", "--initial-branch=main", "seed"]);
    configure_user(&seed);
    std::fs::write(seed.join("README.md"), "# widgets\n").expect("seed file");
    run_git(&seed, &["add", "-A"]);
    run_git(&seed, &["commit", "-m", "initial"]);
    run_git(&seed, &["remote", "add", "origin", origin.to_str().expect("utf8 path")]);
    run_git(&seed, &["push", "-u", "origin", "main"]);

    let repos_root = tmp.path().join("repos");
    std::fs::create_dir_all(&repos_root).expect("repos root");
    // Config validation canonicalizes the root; derive paths the same way.
    let repos_root = repos_root.canonicalize().expect("canonical repos root");
    run_git(
        &repos_root,
        &["clone", origin.to_str().expect("utf8 path"), REPO],
    );
    configure_user(&repos_root.join(REPO));

    (tmp, repos_root, origin)
}

#[tokio::test]
#[serial]
async fn create_provisions_a_branch_bound_worktree() {
    let (_tmp, root, _origin) = git_fixture();
    let manager = WorktreeManager::new();

    let provisioned = manager
        .create(&root, REPO, "agent/T-1", BASE)
        .await
        .expect("provisioning succeeds");

    assert!(provisioned.created);
    assert!(provisioned.path.is_dir());
    assert!(provisioned.path.join("README.md").is_file());
    assert_eq!(
        run_git(&provisioned.path, &["rev-parse", "--abbrev-ref", "HEAD"]),
        "agent/T-1"
    );
}

#[tokio::test]
#[serial]
async fn create_is_idempotent_for_the_same_key() {
    let (_tmp, root, _origin) = git_fixture();
    let manager = WorktreeManager::new();

    let first = manager
        .create(&root, REPO, "agent/T-2", BASE)
        .await
        .expect("first create");
    let second = manager
        .create(&root, REPO, "agent/T-2", BASE)
        .await
        .expect("second create");

    assert!(first.created);
    assert!(!second.created, "existing path is reused, not re-provisioned");
    assert_eq!(first.path, second.path);
}

#[tokio::test]
#[serial]
async fn create_resumes_a_branch_that_exists_on_the_remote() {
    let (_tmp, root, origin) = git_fixture();
    let manager = WorktreeManager::new();

    // Prior work: the branch exists on origin with a commit main lacks.
    let prior = manager
        .create(&root, REPO, "agent/T-3", BASE)
        .await
        .expect("prior create");
    std::fs::write(prior.path.join("work.txt"), "earlier session\n").expect("write");
    run_git(&prior.path, &["add", "-A"]);
    run_git(&prior.path, &["commit", "-m", "earlier work"]);
    run_git(&prior.path, &["push", "-u", "origin", "agent/T-3"]);
    manager.remove(&root, REPO, "agent/T-3").await;
    assert!(!prior.path.exists());

    // A new provisioning for the same ticket picks the remote branch up.
    let resumed = manager
        .create(&root, REPO, "agent/T-3", BASE)
        .await
        .expect("resume create");
    assert!(resumed.created);
    assert!(
        resumed.path.join("work.txt").is_file(),
        "prior work must be present in the resumed worktree"
    );
    assert!(origin.is_dir());
}

#[tokio::test]
#[serial]
async fn remove_is_tolerant_of_already_removed_worktrees() {
    let (_tmp, root, _origin) = git_fixture();
    let manager = WorktreeManager::new();

    let provisioned = manager
        .create(&root, REPO, "agent/T-4", BASE)
        .await
        .expect("create");
    manager.remove(&root, REPO, "agent/T-4").await;
    assert!(!provisioned.path.exists());

    // Second removal is a no-op, not a failure.
    manager.remove(&root, REPO, "agent/T-4").await;
    assert!(!provisioned.path.exists());
}

#[tokio::test]
#[serial]
async fn remove_discards_uncommitted_changes() {
    let (_tmp, root, _origin) = git_fixture();
    let manager = WorktreeManager::new();

    let provisioned = manager
        .create(&root, REPO, "agent/T-5", BASE)
        .await
        .expect("create");
    std::fs::write(provisioned.path.join("dirty.txt"), "uncommitted\n").expect("write");

    manager.remove(&root, REPO, "agent/T-5").await;
    assert!(!provisioned.path.exists(), "forced removal discards dirt");
}

#[tokio::test]
#[serial]
async fn commit_and_push_publishes_the_branch() {
    let (_tmp, root, origin) = git_fixture();
    let manager = WorktreeManager::new();

    let provisioned = manager
        .create(&root, REPO, "agent/T-6", BASE)
        .await
        .expect("create");
    std::fs::write(provisioned.path.join("feature.rs"), "// new\n").expect("write");

    manager
        .commit_and_push(&root, REPO, "agent/T-6", "Agent changes for T-6")
        .await
        .expect("commit and push");

    let heads = run_git(&origin, &["branch", "--list", "agent/T-6"]);
    assert!(heads.contains("agent/T-6"), "branch must exist on origin");
    let subject = run_git(&origin, &["log", "-1", "--format=%s", "agent/T-6"]);
    assert_eq!(subject, "Agent changes for T-6");
}

#[tokio::test]
#[serial]
async fn clean_tree_still_pushes_the_branch() {
    let (_tmp, root, origin) = git_fixture();
    let manager = WorktreeManager::new();

    manager
        .create(&root, REPO, "agent/T-7", BASE)
        .await
        .expect("create");
    manager
        .commit_and_push(&root, REPO, "agent/T-7", "unused message")
        .await
        .expect("push without commit");

    let heads = run_git(&origin, &["branch", "--list", "agent/T-7"]);
    assert!(heads.contains("agent/T-7"));
}

#[tokio::test]
#[serial]
async fn missing_primary_checkout_is_a_git_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let manager = WorktreeManager::new();

    let err = manager
        .create(tmp.path(), REPO, "agent/T-8", BASE)
        .await
        .expect_err("must fail");
    assert!(matches!(err, AppError::Git(_)), "got {err:?}");
}

#[tokio::test]
#[serial]
async fn assignment_lifecycle_provisions_publishes_and_releases() {
    let (_tmp, root, origin) = git_fixture();

    let h = harness_with_root(
        vec![
            Step::Emit(AdapterEvent::AssistantText {
                text: "Implementing the ticket.".into(),
            }),
            Step::Emit(AdapterEvent::Completed {
                outcome: ExecutionOutcome::Success {
                    summary: "Implemented T-9.".into(),
                },
            }),
        ],
        &root,
        30,
        10,
    )
    .await;

    h.orchestrator
        .handle_event(assignment_event("d-1", "s-assign", "T-9"))
        .await;
    wait_for_unregister(&h.registry, "s-assign").await;

    // Worktree released from disk, branch published to origin.
    let path = WorktreeManager::worktree_path(&root, REPO, "agent/T-9");
    assert!(!path.exists(), "worktree must be released after the session");
    let heads = run_git(&origin, &["branch", "--list", "agent/T-9"]);
    assert!(heads.contains("agent/T-9"), "branch must be pushed to origin");

    assert_eq!(h.tracker.statuses("s-assign"), vec!["started", "complete"]);
    let activities = h.tracker.activities("s-assign");
    assert!(
        activities
            .iter()
            .any(|(kind, body)| kind == "response" && body == "Implemented T-9."),
        "expected final response, got {activities:?}"
    );
}

#[tokio::test]
#[serial]
async fn aborted_assignment_still_releases_the_worktree() {
    let (_tmp, root, _origin) = git_fixture();

    let h = harness_with_root(vec![Step::HangUntilCancelled], &root, 30, 10).await;

    h.orchestrator
        .handle_event(assignment_event("d-1", "s-abort", "T-10"))
        .await;

    // Wait for the worktree to be bound before stopping.
    let path = WorktreeManager::worktree_path(&root, REPO, "agent/T-10");
    for _ in 0..600 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(path.exists(), "worktree must be provisioned first");

    h.orchestrator.stop_session("s-abort").await;
    wait_for_unregister(&h.registry, "s-abort").await;

    assert!(!path.exists(), "cleanup must run on the aborted path too");
    assert_eq!(h.tracker.statuses("s-abort"), vec!["started", "stopped"]);
}

#[tokio::test]
#[serial]
async fn shutdown_drain_releases_worktrees_before_returning() {
    let (_tmp, root, _origin) = git_fixture();

    let h = harness_with_root(vec![Step::HangUntilCancelled], &root, 30, 10).await;

    h.orchestrator
        .handle_event(assignment_event("d-1", "s-down", "T-11"))
        .await;

    let path = WorktreeManager::worktree_path(&root, REPO, "agent/T-11");
    for _ in 0..600 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(path.exists(), "worktree must be provisioned first");

    // Shutdown sequence; once drain returns the process may exit, so the
    // worktree and the final notification must already be settled.
    h.orchestrator.abort_all().await;
    h.orchestrator.drain().await;

    assert!(!path.exists(), "worktree must be released before drain returns");
    assert!(h.registry.snapshots().await.is_empty());
    assert_eq!(h.tracker.statuses("s-down"), vec!["started", "stopped"]);
}
