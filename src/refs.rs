//! C1 RefIndex — enumerates branches, tags, remotes, stashes, submodules,
//! and HEAD state, and builds the `commit hash -> [ref label]` map the
//! commit walker decorates each row with.
//!
//! Enumerates refs into an oid index, and splits branches into local/remote
//! with ahead/behind counts via `graph_ahead_behind`.

use std::collections::HashMap;

use git2::{BranchType, Repository};
use tracing::warn;

use crate::error::Result;
use crate::model::{
    sort_ref_labels, BranchInfo, RefClass, RefLabel, RemoteInfo, StashInfo, SubmoduleInfo, Tag,
};

#[derive(Debug, Clone, Default)]
pub struct RepoMetadata {
    pub branches: Vec<BranchInfo>,
    pub remotes: Vec<RemoteInfo>,
    pub tags: Vec<Tag>,
    pub stashes: Vec<StashInfo>,
    pub submodules: Vec<SubmoduleInfo>,
    pub current_branch: Option<String>,
    pub is_detached: bool,
    pub head_hash: Option<String>,
}

/// The `hash -> [ref label]` map a walked commit is decorated with,
/// ordered HEAD -> local -> remote -> tag.
#[derive(Debug, Clone, Default)]
pub struct RefIndex {
    by_hash: HashMap<String, Vec<RefLabel>>,
}

impl RefIndex {
    /// Builds the index once, before a walk starts.
    pub fn build(repo: &Repository) -> Result<Self> {
        let mut by_hash: HashMap<String, Vec<RefLabel>> = HashMap::new();

        let head_hash = repo
            .head()
            .ok()
            .and_then(|h| h.target())
            .map(|oid| oid.to_string());
        if let Some(ref hash) = head_hash {
            by_hash.entry(hash.clone()).or_default().push(RefLabel {
                class: RefClass::Head,
                name: "HEAD".to_string(),
            });
        }

        for reference in repo.references()? {
            let reference = match reference {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable reference");
                    continue;
                }
            };
            let full_name = reference.name().unwrap_or_default();
            // Unreachable symrefs such as refs/remotes/origin/HEAD must be
            // skipped silently.
            if reference.kind() == Some(git2::ReferenceType::Symbolic) {
                continue;
            }
            let Some(oid) = reference.target() else {
                continue;
            };
            let Some(shorthand) = reference.shorthand() else {
                continue;
            };

            let class = if full_name.starts_with("refs/heads/") {
                RefClass::Local
            } else if full_name.starts_with("refs/remotes/") {
                if shorthand.ends_with("/HEAD") {
                    continue;
                }
                RefClass::Remote
            } else if full_name.starts_with("refs/tags/") {
                RefClass::Tag
            } else {
                continue;
            };

            by_hash
                .entry(oid.to_string())
                .or_default()
                .push(RefLabel {
                    class,
                    name: shorthand.to_string(),
                });
        }

        for labels in by_hash.values_mut() {
            sort_ref_labels(labels);
            labels.dedup_by(|a, b| a.class == b.class && a.name == b.name);
        }

        Ok(Self { by_hash })
    }

    pub fn refs_for(&self, hash: &str) -> Vec<RefLabel> {
        self.by_hash.get(hash).cloned().unwrap_or_default()
    }
}

/// Enumerates local and remote branches with ahead/behind against upstream.
pub fn list_branches(repo: &Repository) -> Result<Vec<BranchInfo>> {
    let mut branches = Vec::new();
    let head_name = repo
        .head()
        .ok()
        .and_then(|h| h.shorthand().map(String::from));

    for entry in repo.branches(Some(BranchType::Local))? {
        let (branch, _) = entry?;
        let name = branch.name()?.unwrap_or("?").to_string();
        let is_current = head_name.as_deref() == Some(name.as_str());
        let commit = branch.get().peel_to_commit()?;
        let short_hash = commit.id().to_string()[..7].to_string();
        let upstream = branch
            .upstream()
            .ok()
            .and_then(|u| u.name().ok().flatten().map(String::from));

        let (ahead, behind) = match branch.upstream() {
            Ok(upstream) => match upstream.get().peel_to_commit() {
                Ok(upstream_commit) => repo
                    .graph_ahead_behind(commit.id(), upstream_commit.id())
                    .map(|(a, b)| (Some(a), Some(b)))
                    .unwrap_or((None, None)),
                Err(_) => (None, None),
            },
            Err(_) => (None, None),
        };

        branches.push(BranchInfo {
            name,
            short_hash,
            upstream,
            is_current,
            is_remote: false,
            ahead,
            behind,
        });
    }

    for entry in repo.branches(Some(BranchType::Remote))? {
        let (branch, _) = entry?;
        let name = branch.name()?.unwrap_or("?").to_string();
        let commit = branch.get().peel_to_commit()?;
        let short_hash = commit.id().to_string()[..7].to_string();
        branches.push(BranchInfo {
            name,
            short_hash,
            upstream: None,
            is_current: false,
            is_remote: true,
            ahead: None,
            behind: None,
        });
    }

    Ok(branches)
}

pub fn list_remotes(repo: &Repository) -> Result<Vec<RemoteInfo>> {
    let mut remotes = Vec::new();
    for name in repo.remotes()?.iter().flatten() {
        if let Ok(remote) = repo.find_remote(name) {
            remotes.push(RemoteInfo {
                name: name.to_string(),
                url: remote.url().unwrap_or("").to_string(),
            });
        }
    }
    Ok(remotes)
}

pub fn list_tags(repo: &Repository) -> Result<Vec<Tag>> {
    let mut tags = Vec::new();
    repo.tag_foreach(|_oid, name| {
        if let Ok(name) = std::str::from_utf8(name) {
            if let Some(short) = name.strip_prefix("refs/tags/") {
                tags.push(Tag {
                    name: short.to_string(),
                });
            }
        }
        true
    })?;
    Ok(tags)
}

pub fn list_stashes(repo: &mut Repository) -> Result<Vec<StashInfo>> {
    let mut entries = Vec::new();
    repo.stash_foreach(|index, message, _oid| {
        entries.push(StashInfo {
            index,
            message: message.to_string(),
        });
        true
    })?;
    Ok(entries)
}

pub fn list_submodules(repo: &Repository) -> Result<Vec<SubmoduleInfo>> {
    let mut out = Vec::new();
    for sm in repo.submodules()? {
        let name = sm.name().unwrap_or("?").to_string();
        let head_hash = sm
            .head_id()
            .or_else(|| sm.workdir_id())
            .map(|oid| oid.to_string())
            .unwrap_or_default();
        out.push(SubmoduleInfo { name, head_hash });
    }
    Ok(out)
}

pub fn current_branch(repo: &Repository) -> (Option<String>, bool) {
    match repo.head() {
        Ok(head) => match head.shorthand() {
            Some(name) if head.is_branch() => (Some(name.to_string()), false),
            _ => (None, true),
        },
        Err(_) => (None, true),
    }
}

/// Builds the full metadata snapshot for `RepoFacade::load_metadata`.
pub fn load_metadata(repo: &mut Repository) -> Result<RepoMetadata> {
    let (current_branch, is_detached) = current_branch(repo);
    let head_hash = repo.head().ok().and_then(|h| h.target()).map(|o| o.to_string());

    Ok(RepoMetadata {
        branches: list_branches(repo)?,
        remotes: list_remotes(repo)?,
        tags: list_tags(repo)?,
        stashes: list_stashes(repo)?,
        submodules: list_submodules(repo)?,
        current_branch,
        is_detached,
        head_hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn ref_index_attaches_head_and_branch_labels() {
        let (_dir, repo) = init_repo();
        let oid = commit_file(&repo, "a.txt", "hi", "initial");

        let index = RefIndex::build(&repo).unwrap();
        let labels = index.refs_for(&oid.to_string());
        let names: Vec<_> = labels.iter().map(|l| l.name.as_str()).collect();
        assert!(names.contains(&"HEAD"));
        assert!(names.contains(&"main"));
    }

    #[test]
    fn list_branches_flags_current_branch() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "hi", "initial");
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        repo.branch("feature", &head, false).unwrap();

        let branches = list_branches(&repo).unwrap();
        assert_eq!(branches.len(), 2);
        let main = branches.iter().find(|b| b.name == "main").unwrap();
        assert!(main.is_current);
        let feature = branches.iter().find(|b| b.name == "feature").unwrap();
        assert!(!feature.is_current);
    }

    #[test]
    fn remote_head_symref_is_skipped() {
        let (_dir, repo) = init_repo();
        let oid = commit_file(&repo, "a.txt", "hi", "initial");
        repo.reference(
            "refs/remotes/origin/HEAD",
            oid,
            true,
            "set up remote head",
        )
        .unwrap();
        let index = RefIndex::build(&repo).unwrap();
        let labels = index.refs_for(&oid.to_string());
        assert!(!labels.iter().any(|l| l.name == "origin/HEAD"));
    }
}
