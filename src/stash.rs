//! Stash operations exposed by RepoFacade: save/pop/apply/drop, backed
//! directly by libgit2's stash API as thin wrappers around a single git2
//! call each, in the same shape as `branch.rs`/`commit_ops.rs`.

use git2::{Repository, StashApplyOptions, StashFlags};

use crate::error::Result;
use crate::model::StashInfo;

pub fn stash_save(repo: &mut Repository, message: Option<&str>, include_untracked: bool) -> Result<git2::Oid> {
    let sig = repo.signature()?;
    let mut flags = StashFlags::DEFAULT;
    if include_untracked {
        flags |= StashFlags::INCLUDE_UNTRACKED;
    }
    let oid = repo.stash_save(&sig, message.unwrap_or("WIP"), Some(flags))?;
    Ok(oid)
}

pub fn list_stashes(repo: &mut Repository) -> Result<Vec<StashInfo>> {
    let mut out = Vec::new();
    repo.stash_foreach(|index, message, _oid| {
        out.push(StashInfo {
            index,
            message: message.to_string(),
        });
        true
    })?;
    Ok(out)
}

pub fn stash_apply(repo: &mut Repository, index: usize) -> Result<()> {
    let mut opts = StashApplyOptions::new();
    repo.stash_apply(index, Some(&mut opts))?;
    Ok(())
}

pub fn stash_pop(repo: &mut Repository, index: usize) -> Result<()> {
    let mut opts = StashApplyOptions::new();
    repo.stash_pop(index, Some(&mut opts))?;
    Ok(())
}

pub fn stash_drop(repo: &mut Repository, index: usize) -> Result<()> {
    repo.stash_drop(index)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn save_list_pop_round_trip() {
        let (dir, mut repo) = init_repo();
        commit_file(&repo, "a.txt", "one\n", "initial");
        write_file(&repo, "a.txt", "two\n");

        stash_save(&mut repo, Some("wip work"), false).unwrap();
        let content = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert_eq!(content, "one\n");

        let stashes = list_stashes(&mut repo).unwrap();
        assert_eq!(stashes.len(), 1);
        assert_eq!(stashes[0].message.contains("wip work"), true);
        assert_eq!(stashes[0].label(), "stash@{0}");

        stash_pop(&mut repo, 0).unwrap();
        let content = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert_eq!(content, "two\n");
        assert!(list_stashes(&mut repo).unwrap().is_empty());
    }

    #[test]
    fn drop_removes_without_applying() {
        let (dir, mut repo) = init_repo();
        commit_file(&repo, "a.txt", "one\n", "initial");
        write_file(&repo, "a.txt", "two\n");
        stash_save(&mut repo, None, false).unwrap();

        stash_drop(&mut repo, 0).unwrap();
        assert!(list_stashes(&mut repo).unwrap().is_empty());
        let content = std::fs::read_to_string(dir.path().join("a.txt")).unwrap();
        assert_eq!(content, "one\n");
    }
}
