//! C7 StagingOps — working-tree/index status and the stage/unstage/discard
//! cycle, built on `StatusOptions` with untracked recursion and a
//! force-checkout restore for discards.

use std::io::Write;

use git2::{Repository, StatusOptions};

use crate::error::Result;
use crate::model::FileStatus;

fn status_chars(s: git2::Status) -> (char, char) {
    let index_state = if s.contains(git2::Status::INDEX_NEW) {
        'A'
    } else if s.contains(git2::Status::INDEX_MODIFIED) {
        'M'
    } else if s.contains(git2::Status::INDEX_DELETED) {
        'D'
    } else if s.contains(git2::Status::INDEX_RENAMED) {
        'R'
    } else if s.contains(git2::Status::INDEX_TYPECHANGE) {
        'T'
    } else {
        ' '
    };
    let worktree_state = if s.contains(git2::Status::WT_NEW) {
        '?'
    } else if s.contains(git2::Status::WT_MODIFIED) {
        'M'
    } else if s.contains(git2::Status::WT_DELETED) {
        'D'
    } else if s.contains(git2::Status::WT_RENAMED) {
        'R'
    } else if s.contains(git2::Status::WT_TYPECHANGE) {
        'T'
    } else {
        ' '
    };
    (index_state, worktree_state)
}

/// `[FileStatus]` including untracked files and HEAD→index renames.
pub fn status(repo: &Repository) -> Result<Vec<FileStatus>> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .renames_head_to_index(true);

    let statuses = repo.statuses(Some(&mut opts))?;
    let mut out = Vec::with_capacity(statuses.len());
    for entry in statuses.iter() {
        let path = entry.path().unwrap_or("?").to_string();
        let s = entry.status();
        if s.contains(git2::Status::WT_NEW) && !s.contains(git2::Status::INDEX_NEW) {
            out.push(FileStatus::new(path, ' ', '?'));
            continue;
        }
        let (index_state, worktree_state) = status_chars(s);
        out.push(FileStatus::new(path, index_state, worktree_state));
    }
    Ok(out)
}

/// `add_bypath` for a live file, `remove_bypath` for a deletion.
pub fn stage_file(repo: &Repository, path: &str) -> Result<()> {
    let mut index = repo.index()?;
    let workdir = repo
        .workdir()
        .ok_or_else(|| crate::error::CoreError::invalid("bare repository has no workdir"))?;
    if workdir.join(path).exists() {
        index.add_path(std::path::Path::new(path))?;
    } else {
        index.remove_path(std::path::Path::new(path))?;
    }
    index.write()?;
    Ok(())
}

/// Resets `path` back to HEAD's index entry, or drops it from the index if
/// there is no HEAD yet (first commit still pending).
pub fn unstage_file(repo: &Repository, path: &str) -> Result<()> {
    match repo.head() {
        Ok(head) => {
            let head_commit = head.peel_to_commit()?;
            repo.reset_default(Some(head_commit.as_object()), [path])?;
        }
        Err(_) => {
            let mut index = repo.index()?;
            index.remove_path(std::path::Path::new(path))?;
            index.write()?;
        }
    }
    Ok(())
}

/// Deletes untracked files outright; force-checks out tracked ones from the
/// index, recreating the path if it was removed on disk.
pub fn discard_changes(repo: &Repository, path: &str) -> Result<()> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| crate::error::CoreError::invalid("bare repository has no workdir"))?;
    let index = repo.index()?;
    if index.get_path(std::path::Path::new(path), 0).is_none() {
        let full = workdir.join(path);
        if full.exists() {
            std::fs::remove_file(full)?;
        }
        return Ok(());
    }

    let mut checkout = git2::build::CheckoutBuilder::new();
    checkout
        .force()
        .recreate_missing(true)
        .path(path);
    repo.checkout_index(None, Some(&mut checkout))?;
    Ok(())
}

/// Appends `pattern` (with a trailing newline) to `.gitignore` at the
/// working-tree root, creating the file if absent.
pub fn add_to_gitignore(repo: &Repository, pattern: &str) -> Result<()> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| crate::error::CoreError::invalid("bare repository has no workdir"))?;
    let gitignore = workdir.join(".gitignore");
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(gitignore)?;
    writeln!(file, "{pattern}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn status_reports_untracked_and_modified() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "one\n", "initial");
        write_file(&repo, "a.txt", "two\n");
        write_file(&repo, "b.txt", "new\n");

        let entries = status(&repo).unwrap();
        let a = entries.iter().find(|e| e.path == "a.txt").unwrap();
        assert_eq!(a.worktree_state(), 'M');
        let b = entries.iter().find(|e| e.path == "b.txt").unwrap();
        assert!(b.is_untracked());
    }

    #[test]
    fn stage_then_unstage_round_trips_to_original_state() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "one\n", "initial");
        write_file(&repo, "a.txt", "two\n");

        stage_file(&repo, "a.txt").unwrap();
        let staged = status(&repo).unwrap();
        assert_eq!(staged.iter().find(|e| e.path == "a.txt").unwrap().index_state(), 'M');

        unstage_file(&repo, "a.txt").unwrap();
        let after = status(&repo).unwrap();
        let entry = after.iter().find(|e| e.path == "a.txt").unwrap();
        assert_eq!(entry.index_state(), ' ');
        assert_eq!(entry.worktree_state(), 'M');
    }

    #[test]
    fn discard_untracked_deletes_file() {
        let (dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "one\n", "initial");
        write_file(&repo, "new.txt", "x\n");
        discard_changes(&repo, "new.txt").unwrap();
        assert!(!dir.path().join("new.txt").exists());
    }

    #[test]
    fn discard_tracked_restores_index_content() {
        let (dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "one\n", "initial");
        write_file(&repo, "a.txt", "two\n");
        discard_changes(&repo, "a.txt").unwrap();
        let content = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert_eq!(content, "one\n");
    }

    #[test]
    fn gitignore_pattern_is_appended() {
        let (dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "one\n", "initial");
        add_to_gitignore(&repo, "*.log").unwrap();
        add_to_gitignore(&repo, "target/").unwrap();
        let content = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(content, "*.log\ntarget/\n");
    }
}
