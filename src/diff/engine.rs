//! C4 DiffEngine — tree/index/workdir diffs, rendered either as raw
//! unified-diff text (for `DiffParser`) or as structured `[DiffFile]`
//! summaries via delta iteration and per-delta `Patch::line_stats` for
//! additions/deletions.

use git2::{Diff, DiffOptions, Repository};

use crate::error::Result;
use crate::model::DiffFile;

fn render(diff: &Diff) -> Result<String> {
    let mut buf = Vec::new();
    diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
            buf.push(line.origin() as u8);
        }
        buf.extend_from_slice(line.content());
        true
    })?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn files_from_diff(diff: &Diff) -> Result<Vec<DiffFile>> {
    let mut out = Vec::new();
    for (idx, delta) in diff.deltas().enumerate() {
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .and_then(|p| p.to_str())
            .unwrap_or("?")
            .to_string();
        let (additions, deletions) = match git2::Patch::from_diff(diff, idx) {
            Ok(Some(patch)) => patch.line_stats().map(|(_, a, d)| (a, d)).unwrap_or((0, 0)),
            _ => (0, 0),
        };
        out.push(DiffFile {
            path,
            additions,
            deletions,
        });
    }
    Ok(out)
}

/// `commit^` vs `commit`; a root commit diffs against an empty tree.
pub fn diff_for_commit(repo: &Repository, hash: &str) -> Result<String> {
    let oid = git2::Oid::from_str(hash)?;
    let commit = repo.find_commit(oid)?;
    let tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    render(&diff)
}

pub fn commit_files(repo: &Repository, hash: &str) -> Result<Vec<DiffFile>> {
    let oid = git2::Oid::from_str(hash)?;
    let commit = repo.find_commit(oid)?;
    let tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
    files_from_diff(&diff)
}

/// HEAD tree vs index.
pub fn diff_staged(repo: &Repository) -> Result<String> {
    let head_tree = head_tree(repo)?;
    let diff = repo.diff_tree_to_index(head_tree.as_ref(), None, None)?;
    render(&diff)
}

pub fn staged_files(repo: &Repository) -> Result<Vec<DiffFile>> {
    let head_tree = head_tree(repo)?;
    let diff = repo.diff_tree_to_index(head_tree.as_ref(), None, None)?;
    files_from_diff(&diff)
}

/// Index vs working tree.
pub fn diff_unstaged(repo: &Repository) -> Result<String> {
    let diff = repo.diff_index_to_workdir(None, None)?;
    render(&diff)
}

pub fn unstaged_files(repo: &Repository) -> Result<Vec<DiffFile>> {
    let diff = repo.diff_index_to_workdir(None, None)?;
    files_from_diff(&diff)
}

/// Committed tree (`hash`) vs working tree, optionally scoped to `path`.
pub fn diff_compare(repo: &Repository, hash: &str, path: Option<&str>) -> Result<String> {
    let oid = git2::Oid::from_str(hash)?;
    let tree = repo.find_commit(oid)?.tree()?;
    let mut opts = DiffOptions::new();
    if let Some(p) = path {
        opts.pathspec(p);
    }
    let diff = repo.diff_tree_to_workdir_with_index(Some(&tree), Some(&mut opts))?;
    render(&diff)
}

/// Union of staged and unstaged file lists; on path collision the staged
/// entry wins.
pub fn uncommitted_diff_files(repo: &Repository) -> Result<Vec<DiffFile>> {
    let staged = staged_files(repo)?;
    let unstaged = unstaged_files(repo)?;
    let mut by_path: std::collections::HashMap<String, DiffFile> =
        unstaged.into_iter().map(|f| (f.path.clone(), f)).collect();
    for f in staged {
        by_path.insert(f.path.clone(), f);
    }
    let mut out: Vec<DiffFile> = by_path.into_values().collect();
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
}

pub fn file_diff(repo: &Repository, hash: &str, path: &str) -> Result<String> {
    let oid = git2::Oid::from_str(hash)?;
    let commit = repo.find_commit(oid)?;
    let tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };
    let mut opts = DiffOptions::new();
    opts.pathspec(path);
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;
    render(&diff)
}

pub fn staged_file_diff(repo: &Repository, path: &str) -> Result<String> {
    let head_tree = head_tree(repo)?;
    let mut opts = DiffOptions::new();
    opts.pathspec(path);
    let diff = repo.diff_tree_to_index(head_tree.as_ref(), None, Some(&mut opts))?;
    render(&diff)
}

pub fn unstaged_file_diff(repo: &Repository, path: &str) -> Result<String> {
    let mut opts = DiffOptions::new();
    opts.pathspec(path);
    let diff = repo.diff_index_to_workdir(None, Some(&mut opts))?;
    render(&diff)
}

/// For untracked files (`status_code == "??"`), synthesizes a `new file
/// mode` diff with every line prefixed `+` instead of asking git2 for one
/// (an untracked file has no index entry to diff against).
pub fn uncommitted_file_diff(repo: &Repository, path: &str, status_code: &str) -> Result<String> {
    if status_code == "??" {
        let workdir = repo
            .workdir()
            .ok_or_else(|| crate::error::CoreError::invalid("bare repository has no workdir"))?;
        let content = std::fs::read_to_string(workdir.join(path)).unwrap_or_default();
        let mut out = format!("diff --git a/{path} b/{path}\nnew file mode 100644\n--- /dev/null\n+++ b/{path}\n");
        let line_count = content.lines().count().max(1);
        out.push_str(&format!("@@ -0,0 +1,{line_count} @@\n"));
        for line in content.lines() {
            out.push('+');
            out.push_str(line);
            out.push('\n');
        }
        return Ok(out);
    }
    let staged = staged_file_diff(repo, path)?;
    if !staged.is_empty() {
        return Ok(staged);
    }
    unstaged_file_diff(repo, path)
}

fn head_tree(repo: &Repository) -> Result<Option<git2::Tree>> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_tree()?)),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn commit_diff_reports_additions_and_deletions() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "foo\nbar\n", "initial");
        commit_file(&repo, "a.txt", "foo\nbaz\n", "second");
        let head = repo.head().unwrap().target().unwrap().to_string();
        let files = commit_files(&repo, &head).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].additions, 1);
        assert_eq!(files[0].deletions, 1);
    }

    #[test]
    fn uncommitted_union_prefers_staged_entry() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "foo\n", "initial");
        write_file(&repo, "a.txt", "foo\nbar\n");
        let mut index = repo.index().unwrap();
        index.add_path(std::path::Path::new("a.txt")).unwrap();
        index.write().unwrap();
        write_file(&repo, "a.txt", "foo\nbar\nbaz\n");

        let files = uncommitted_diff_files(&repo).unwrap();
        assert_eq!(files.len(), 1);
        // The staged additions count (1 line) should win over whatever the
        // unstaged comparison would have reported.
        assert_eq!(files[0].additions, 1);
    }

    #[test]
    fn untracked_file_synthesizes_new_file_diff() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "foo\n", "initial");
        write_file(&repo, "new.txt", "hello\nworld\n");
        let out = uncommitted_file_diff(&repo, "new.txt", "??").unwrap();
        assert!(out.contains("new file mode"));
        assert!(out.contains("+hello"));
        assert!(out.contains("+world"));
    }
}
