//! Shared fixtures for unit tests across the crate.
#![cfg(test)]

use git2::{Repository, Signature};
use std::path::Path;
use tempfile::TempDir;

/// Creates a temporary repository with `user.name`/`user.email` configured
/// and an initial branch named `main`.
pub fn init_repo() -> (TempDir, Repository) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut opts = git2::RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(temp_dir.path(), &opts).expect("failed to init repo");

    let mut config = repo.config().expect("failed to get config");
    config.set_str("user.name", "Test User").unwrap();
    config.set_str("user.email", "test@example.com").unwrap();

    (temp_dir, repo)
}

/// Writes `content` to `path` under the repo's working directory.
pub fn write_file(repo: &Repository, path: &str, content: &str) {
    let workdir = repo.workdir().expect("no workdir");
    let full_path = workdir.join(path);
    if let Some(parent) = full_path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&full_path, content).unwrap();
}

/// Stages everything currently in the index's tracked paths and commits.
pub fn commit(repo: &Repository, message: &str) -> git2::Oid {
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    let mut index = repo.index().unwrap();
    let tree_oid = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();

    let parent_commit = repo
        .head()
        .ok()
        .and_then(|head| head.target())
        .and_then(|oid| repo.find_commit(oid).ok());
    let parents: Vec<&git2::Commit> = parent_commit.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Writes `content` to `path`, stages it, and commits.
pub fn commit_file(repo: &Repository, path: &str, content: &str, message: &str) -> git2::Oid {
    write_file(repo, path, content);
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(path)).unwrap();
    index.write().unwrap();
    commit(repo, message)
}

/// Commits `path` with its own message on a merge commit with two parents,
/// useful for constructing the two-parent graph fixtures in S2-style tests.
pub fn merge_commit(
    repo: &Repository,
    message: &str,
    parents: &[git2::Oid],
) -> git2::Oid {
    let sig = Signature::now("Test User", "test@example.com").unwrap();
    let mut index = repo.index().unwrap();
    let tree_oid = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let parent_commits: Vec<git2::Commit> = parents
        .iter()
        .map(|oid| repo.find_commit(*oid).unwrap())
        .collect();
    let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .unwrap()
}
