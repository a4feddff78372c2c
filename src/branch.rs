//! C9 BranchOps — branch and tag lifecycle: create/rename/delete,
//! checkout, upstream tracking, tags, and reset.

use git2::{BranchType, Repository};

use crate::error::{CoreError, Result};
use crate::model::ResetMode;

pub fn create_branch(repo: &Repository, name: &str, start_point: Option<&str>) -> Result<()> {
    let target = match start_point {
        Some(s) => repo.revparse_single(s)?.peel_to_commit()?,
        None => repo.head()?.peel_to_commit()?,
    };
    repo.branch(name, &target, false)?;
    Ok(())
}

pub fn rename_branch(repo: &Repository, old_name: &str, new_name: &str) -> Result<()> {
    let mut branch = repo.find_branch(old_name, BranchType::Local)?;
    branch.rename(new_name, false)?;
    Ok(())
}

/// Refuses to delete an unmerged branch unless `force` — checked via
/// ahead-count against HEAD.
pub fn delete_branch(repo: &Repository, name: &str, force: bool) -> Result<()> {
    let mut branch = repo.find_branch(name, BranchType::Local)?;
    if !force {
        let head_oid = repo.head()?.target().ok_or_else(|| CoreError::invalid("HEAD has no target"))?;
        let branch_oid = branch
            .get()
            .target()
            .ok_or_else(|| CoreError::invalid("branch has no target"))?;
        let (ahead, _behind) = repo.graph_ahead_behind(branch_oid, head_oid)?;
        if ahead > 0 {
            return Err(CoreError::BranchNotFullyMerged { name: name.to_string() });
        }
    }
    branch.delete()?;
    Ok(())
}

pub fn delete_remote_branch(repo_dir: &std::path::Path, remote: &str, branch: &str) -> Result<()> {
    crate::subprocess::run_git(
        repo_dir,
        &["push", remote, "--delete", branch],
        &std::collections::HashMap::new(),
    )?;
    Ok(())
}

pub fn checkout_branch(repo: &Repository, name: &str) -> Result<()> {
    let branch_ref = format!("refs/heads/{name}");
    let obj = repo.revparse_single(&branch_ref)?;
    let mut checkout = git2::build::CheckoutBuilder::new();
    checkout.safe();
    repo.checkout_tree(&obj, Some(&mut checkout))?;
    repo.set_head(&branch_ref)?;
    Ok(())
}

pub fn checkout_detached(repo: &Repository, hash: &str) -> Result<()> {
    let oid = git2::Oid::from_str(hash)?;
    let commit = repo.find_commit(oid)?;
    let mut checkout = git2::build::CheckoutBuilder::new();
    checkout.safe();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
    repo.set_head_detached(oid)?;
    Ok(())
}

pub fn set_upstream(repo: &Repository, branch_name: &str, upstream: Option<&str>) -> Result<()> {
    let mut branch = repo.find_branch(branch_name, BranchType::Local)?;
    branch.set_upstream(upstream)?;
    Ok(())
}

pub fn create_lightweight_tag(repo: &Repository, name: &str, target: &str) -> Result<()> {
    let obj = repo.revparse_single(target)?;
    repo.tag_lightweight(name, &obj, false)?;
    Ok(())
}

pub fn create_annotated_tag(repo: &Repository, name: &str, target: &str, message: &str) -> Result<()> {
    let obj = repo.revparse_single(target)?;
    let sig = repo.signature()?;
    repo.tag(name, &obj, &sig, message, false)?;
    Ok(())
}

pub fn delete_tag(repo: &Repository, name: &str) -> Result<()> {
    repo.tag_delete(name)?;
    Ok(())
}

pub fn reset(repo: &Repository, hash: &str, mode: ResetMode) -> Result<()> {
    let oid = git2::Oid::from_str(hash)?;
    let object = repo.find_object(oid, None)?;
    let mut checkout = git2::build::CheckoutBuilder::new();
    checkout.force();
    repo.reset(&object, mode.to_git2(), Some(&mut checkout))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn delete_unmerged_branch_without_force_fails() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "1", "initial");
        create_branch(&repo, "feature", None).unwrap();
        {
            let branch_ref = repo.find_branch("feature", BranchType::Local).unwrap();
            let commit = branch_ref.get().peel_to_commit().unwrap();
            repo.checkout_tree(commit.as_object(), None).unwrap();
            repo.set_head("refs/heads/feature").unwrap();
        }
        commit_file(&repo, "a.txt", "2", "on feature");
        repo.set_head("refs/heads/main").unwrap();

        let err = delete_branch(&repo, "feature", false).unwrap_err();
        assert!(matches!(err, CoreError::BranchNotFullyMerged { .. }));

        delete_branch(&repo, "feature", true).unwrap();
        assert!(repo.find_branch("feature", BranchType::Local).is_err());
    }

    #[test]
    fn reset_modes_map_to_git2_reset_types() {
        assert_eq!(ResetMode::Soft.to_git2(), git2::ResetType::Soft);
        assert_eq!(ResetMode::Mixed.to_git2(), git2::ResetType::Mixed);
        assert_eq!(ResetMode::Hard.to_git2(), git2::ResetType::Hard);
    }

    #[test]
    fn rename_branch_updates_reference_name() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "1", "initial");
        create_branch(&repo, "old-name", None).unwrap();
        rename_branch(&repo, "old-name", "new-name").unwrap();
        assert!(repo.find_branch("new-name", BranchType::Local).is_ok());
        assert!(repo.find_branch("old-name", BranchType::Local).is_err());
    }
}
