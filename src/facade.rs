//! C13 RepoFacade — single entry point binding one process-wide repository
//! handle to the rest of the core. Every mutating call takes `&mut self` so
//! the borrow checker enforces single-writer access in place of the async
//! task queue a host with a runtime would use, and failures/state changes
//! are surfaced as `[FacadeEvent]`s a caller can poll for.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};

use git2::Repository;

use crate::context::{ensure_git_initialized, CoreConfig};
use crate::error::{CoreError, Result};
use crate::graph::LazyGraphProcessor;
use crate::model::{
    CommitGraphEntry, CommitInfo, ConflictFile, ConflictKind, ConflictSides, DiffFile, FileStatus,
    RebaseState, RemoteInfo, ResetMode, StashInfo,
};
use crate::refs::RepoMetadata;
use crate::walker::{CancelToken, CommitWalker};
use crate::watcher::{ChangeKind, RepoWatcher};

/// Events a caller may poll for via `[RepoFacade::try_recv_event]`.
#[derive(Debug, Clone)]
pub enum FacadeEvent {
    MetadataChanged,
    CommitsExtended(usize),
    StatusChanged,
    ConflictStateChanged,
    OperationFailed(String),
}

/// Whether a filesystem-change batch calls for a full reload or a
/// lightweight refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    FullReload,
    LightweightRefresh,
}

pub fn refresh_policy_for(kinds: &HashSet<ChangeKind>) -> RefreshPolicy {
    if kinds.contains(&ChangeKind::Head) || kinds.contains(&ChangeKind::Refs) {
        RefreshPolicy::FullReload
    } else {
        RefreshPolicy::LightweightRefresh
    }
}

pub struct RepoFacade {
    repo: Repository,
    path: PathBuf,
    config: CoreConfig,
    graph: LazyGraphProcessor,
    walker: Option<CommitWalker>,
    cancel_token: CancelToken,
    watcher: Option<RepoWatcher>,
    events_tx: Sender<FacadeEvent>,
    events_rx: Receiver<FacadeEvent>,
}

impl RepoFacade {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, CoreConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: CoreConfig) -> Result<Self> {
        ensure_git_initialized();
        let path = path.as_ref().to_path_buf();
        let repo = Repository::open(&path).map_err(|_| CoreError::RepoNotOpen { path: path.clone() })?;
        let (events_tx, events_rx) = channel();
        Ok(Self {
            repo,
            path,
            config,
            graph: LazyGraphProcessor::new(config.graph_palette_size),
            walker: None,
            cancel_token: CancelToken::new(),
            watcher: None,
            events_tx,
            events_rx,
        })
    }

    /// Starts the filesystem watcher over the working tree and `.git/`.
    pub fn start_watching(&mut self) -> Result<()> {
        let workdir = self
            .repo
            .workdir()
            .ok_or_else(|| CoreError::invalid("bare repository cannot be watched"))?
            .to_path_buf();
        let git_dir = self.repo.path().to_path_buf();
        self.watcher = Some(RepoWatcher::new(&workdir, &git_dir)?);
        Ok(())
    }

    /// Drains one pending watcher batch, if any, and returns the reload
    /// policy it implies.
    pub fn poll_watcher(&mut self) -> Option<RefreshPolicy> {
        let kinds = self.watcher.as_mut()?.try_recv()?;
        Some(refresh_policy_for(&kinds))
    }

    pub fn try_recv_event(&mut self) -> Option<FacadeEvent> {
        self.events_rx.try_recv().ok()
    }

    fn emit(&self, event: FacadeEvent) {
        let _ = self.events_tx.send(event);
    }

    fn run<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        op().map_err(|e| {
            self.emit(FacadeEvent::OperationFailed(e.to_string()));
            e
        })
    }

    /// Like `[Self::run]` but for call sites that must borrow `self.repo`
    /// mutably to produce `result` before this call — evaluating the
    /// operation up front keeps that borrow from overlapping the `&self`
    /// this method needs to emit on failure.
    fn finish<T>(&self, result: Result<T>, on_success: FacadeEvent) -> Result<T> {
        match &result {
            Ok(_) => self.emit(on_success),
            Err(e) => self.emit(FacadeEvent::OperationFailed(e.to_string())),
        }
        result
    }

    // -- Loading & streaming --------------------------------------------

    pub fn load_metadata(&mut self) -> Result<RepoMetadata> {
        let metadata = crate::refs::load_metadata(&mut self.repo)?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(metadata)
    }

    /// (Re)starts a commit walk, discarding any in-flight one.
    pub fn create_commit_walker(&mut self) -> Result<()> {
        self.cancel_token = CancelToken::new();
        self.graph.reset();
        self.walker = Some(CommitWalker::create_with_cancel(&self.path, self.cancel_token.clone())?);
        Ok(())
    }

    pub fn load_more_commits(&mut self, n: usize) -> Result<Vec<CommitInfo>> {
        let walker = self
            .walker
            .as_mut()
            .ok_or_else(|| CoreError::invalid("no commit walk in progress"))?;
        let batch = walker.next_batch(n)?;
        self.graph.extend_commits(batch.clone());
        self.emit(FacadeEvent::CommitsExtended(batch.len()));
        Ok(batch)
    }

    pub fn graph_entry(&mut self, row: usize) -> Result<Option<CommitGraphEntry>> {
        self.graph.ensure_processed_through(row)?;
        Ok(self.graph.entry(row).cloned())
    }

    pub fn cancel_walk(&self) {
        self.cancel_token.cancel();
    }

    // -- Selection & diff -------------------------------------------------

    pub fn commit_files(&self, hash: &str) -> Result<Vec<DiffFile>> {
        self.run(|| crate::diff::engine::commit_files(&self.repo, hash))
    }

    pub fn uncommitted_diff_files(&self) -> Result<Vec<DiffFile>> {
        self.run(|| crate::diff::engine::uncommitted_diff_files(&self.repo))
    }

    pub fn file_diff(&self, hash: &str, path: &str) -> Result<String> {
        self.run(|| crate::diff::engine::file_diff(&self.repo, hash, path))
    }

    pub fn staged_file_diff(&self, path: &str) -> Result<String> {
        self.run(|| crate::diff::engine::staged_file_diff(&self.repo, path))
    }

    pub fn unstaged_file_diff(&self, path: &str) -> Result<String> {
        self.run(|| crate::diff::engine::unstaged_file_diff(&self.repo, path))
    }

    // -- Staging -----------------------------------------------------------

    pub fn status(&self) -> Result<Vec<FileStatus>> {
        crate::staging::status(&self.repo)
    }

    pub fn stage_file(&mut self, path: &str) -> Result<()> {
        self.run(|| crate::staging::stage_file(&self.repo, path))?;
        self.emit(FacadeEvent::StatusChanged);
        Ok(())
    }

    pub fn unstage_file(&mut self, path: &str) -> Result<()> {
        self.run(|| crate::staging::unstage_file(&self.repo, path))?;
        self.emit(FacadeEvent::StatusChanged);
        Ok(())
    }

    pub fn stage_all(&mut self) -> Result<()> {
        for entry in self.status()? {
            self.run(|| crate::staging::stage_file(&self.repo, &entry.path))?;
        }
        self.emit(FacadeEvent::StatusChanged);
        Ok(())
    }

    pub fn unstage_all(&mut self) -> Result<()> {
        for entry in self.status()?.into_iter().filter(|e| e.has_staged()) {
            self.run(|| crate::staging::unstage_file(&self.repo, &entry.path))?;
        }
        self.emit(FacadeEvent::StatusChanged);
        Ok(())
    }

    pub fn discard_changes(&mut self, paths: &[String]) -> Result<()> {
        for path in paths {
            self.run(|| crate::staging::discard_changes(&self.repo, path))?;
        }
        self.emit(FacadeEvent::StatusChanged);
        Ok(())
    }

    pub fn add_to_gitignore(&mut self, pattern: &str) -> Result<()> {
        self.run(|| crate::staging::add_to_gitignore(&self.repo, pattern))
    }

    // -- Patch ---------------------------------------------------------------

    pub fn apply_patch(&mut self, patch_text: &str, cached: bool, reverse: bool) -> Result<()> {
        self.run(|| crate::diff::patch::apply(&self.repo, patch_text, cached, reverse))?;
        self.emit(FacadeEvent::StatusChanged);
        Ok(())
    }

    // -- Branches & refs --------------------------------------------------

    pub fn create_branch(&mut self, name: &str, at: Option<&str>, checkout: bool) -> Result<()> {
        self.run(|| crate::branch::create_branch(&self.repo, name, at))?;
        if checkout {
            self.run(|| crate::branch::checkout_branch(&self.repo, name))?;
        }
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn rename_branch(&mut self, old: &str, new: &str) -> Result<()> {
        self.run(|| crate::branch::rename_branch(&self.repo, old, new))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn delete_branch(&mut self, name: &str, force: bool) -> Result<()> {
        self.run(|| crate::branch::delete_branch(&self.repo, name, force))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn checkout_branch(&mut self, name: &str) -> Result<()> {
        self.run(|| crate::branch::checkout_branch(&self.repo, name))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn checkout_commit(&mut self, hash: &str) -> Result<()> {
        self.run(|| crate::branch::checkout_detached(&self.repo, hash))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn set_upstream(&mut self, remote: &str, branch: &str) -> Result<()> {
        let upstream = format!("{remote}/{branch}");
        self.run(|| crate::branch::set_upstream(&self.repo, branch, Some(&upstream)))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn create_tag(&mut self, name: &str, at: &str, message: Option<&str>) -> Result<()> {
        self.run(|| match message {
            Some(m) => crate::branch::create_annotated_tag(&self.repo, name, at, m),
            None => crate::branch::create_lightweight_tag(&self.repo, name, at),
        })?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn delete_remote_branch(&mut self, remote: &str, name: &str) -> Result<()> {
        self.run(|| crate::branch::delete_remote_branch(&self.path, remote, name))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    // -- Commits --------------------------------------------------------

    pub fn commit(&mut self, message: &str) -> Result<git2::Oid> {
        let oid = self.run(|| crate::commit_ops::commit(&self.repo, message))?;
        self.emit(FacadeEvent::StatusChanged);
        Ok(oid)
    }

    pub fn amend(&mut self, message: Option<&str>) -> Result<git2::Oid> {
        let oid = self.run(|| crate::commit_ops::amend_commit(&self.repo, message))?;
        self.emit(FacadeEvent::StatusChanged);
        Ok(oid)
    }

    pub fn reword(&mut self, hash: &str, message: &str) -> Result<()> {
        self.run(|| crate::commit_ops::reword_commit(&self.repo, hash, message))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn squash(&mut self, hashes: &[String]) -> Result<()> {
        self.run(|| crate::commit_ops::squash_commits(&self.repo, hashes))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn cherry_pick(&mut self, hash: &str) -> Result<git2::Oid> {
        let result = crate::commit_ops::cherry_pick(&self.repo, hash);
        if result.is_err() {
            self.emit(FacadeEvent::ConflictStateChanged);
        }
        result
    }

    pub fn revert(&mut self, hash: &str) -> Result<git2::Oid> {
        let result = crate::commit_ops::revert(&self.repo, hash);
        if result.is_err() {
            self.emit(FacadeEvent::ConflictStateChanged);
        }
        result
    }

    pub fn reset(&mut self, hash: &str, mode: ResetMode) -> Result<()> {
        self.run(|| crate::branch::reset(&self.repo, hash, mode))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    // -- Remote -------------------------------------------------------------

    pub fn fetch(&mut self, remote: &str) -> Result<String> {
        let out = self.run(|| crate::remote::fetch(&self.repo, remote))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(out)
    }

    pub fn pull(&mut self, remote: &str, branch: &str) -> Result<String> {
        let out = self.run(|| crate::remote::pull(&self.repo, remote, branch))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(out)
    }

    pub fn push(&mut self, remote: &str, branch: &str, set_upstream: bool) -> Result<String> {
        self.run(|| crate::remote::push(&self.repo, remote, branch, set_upstream))
    }

    pub fn add_remote(&mut self, name: &str, url: &str) -> Result<()> {
        self.run(|| crate::remote::add_remote(&self.repo, name, url))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn delete_remote(&mut self, name: &str) -> Result<()> {
        self.run(|| crate::remote::remove_remote(&self.repo, name))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn rename_remote(&mut self, old: &str, new: &str) -> Result<()> {
        self.run(|| crate::remote::rename_remote(&self.repo, old, new))?;
        self.emit(FacadeEvent::MetadataChanged);
        Ok(())
    }

    pub fn set_remote_url(&mut self, name: &str, url: &str) -> Result<()> {
        self.run(|| crate::remote::set_remote_url(&self.repo, name, url))
    }

    pub fn accept_host_key(&mut self, host: &str) -> Result<()> {
        self.run(|| crate::remote::accept_host_key(host))
    }

    pub fn remotes(&self) -> Result<Vec<RemoteInfo>> {
        crate::remote::list_remotes(&self.repo)
    }

    // -- Stash -------------------------------------------------------------

    pub fn stash_save(&mut self, message: Option<&str>, include_untracked: bool) -> Result<()> {
        let result = crate::stash::stash_save(&mut self.repo, message, include_untracked).map(|_| ());
        self.finish(result, FacadeEvent::StatusChanged)
    }

    pub fn stash_list(&mut self) -> Result<Vec<StashInfo>> {
        crate::stash::list_stashes(&mut self.repo)
    }

    pub fn stash_apply(&mut self, index: usize) -> Result<()> {
        let result = crate::stash::stash_apply(&mut self.repo, index);
        self.finish(result, FacadeEvent::StatusChanged)
    }

    pub fn stash_pop(&mut self, index: usize) -> Result<()> {
        let result = crate::stash::stash_pop(&mut self.repo, index);
        self.finish(result, FacadeEvent::StatusChanged)
    }

    pub fn stash_drop(&mut self, index: usize) -> Result<()> {
        let result = crate::stash::stash_drop(&mut self.repo, index);
        match &result {
            Ok(()) => {}
            Err(e) => self.emit(FacadeEvent::OperationFailed(e.to_string())),
        }
        result
    }

    // -- Conflict ------------------------------------------------------------

    pub fn conflict_state(&self) -> Result<Option<ConflictKind>> {
        crate::conflict::detect_conflict_kind(&self.repo)
    }

    pub fn conflicted_files(&self) -> Result<Vec<ConflictFile>> {
        crate::conflict::conflicted_files(&self.repo)
    }

    pub fn resolved_files(&self) -> Result<Vec<String>> {
        crate::conflict::resolved_files(&self.repo)
    }

    pub fn rebase_state(&self) -> Result<Option<RebaseState>> {
        crate::conflict::rebase_state(&self.repo)
    }

    pub fn read_conflict_sides(&self, path: &str) -> Result<ConflictSides> {
        crate::conflict::read_conflict_sides(&self.repo, path)
    }

    pub fn save_conflict_resolution(&mut self, path: &str, content: &str) -> Result<()> {
        self.run(|| crate::conflict::save_conflict_resolution(&self.repo, path, content))
    }

    pub fn mark_resolved(&mut self, path: &str) -> Result<()> {
        self.run(|| crate::conflict::mark_resolved(&self.repo, path))?;
        self.emit(FacadeEvent::ConflictStateChanged);
        Ok(())
    }

    pub fn mark_all_resolved(&mut self) -> Result<()> {
        self.run(|| crate::conflict::mark_all_resolved(&self.repo))?;
        self.emit(FacadeEvent::ConflictStateChanged);
        Ok(())
    }

    pub fn mark_conflicted(&mut self, path: &str) -> Result<()> {
        self.run(|| crate::conflict::mark_conflicted(&self.repo, path))?;
        self.emit(FacadeEvent::ConflictStateChanged);
        Ok(())
    }

    pub fn conflict_continue(&mut self, message: Option<&str>) -> Result<()> {
        let kind = self
            .conflict_state()?
            .ok_or_else(|| CoreError::invalid("no conflict operation in progress"))?;
        self.run(|| crate::conflict::continue_operation(&self.repo, &kind, message))?;
        self.emit(FacadeEvent::ConflictStateChanged);
        Ok(())
    }

    pub fn conflict_skip(&mut self) -> Result<()> {
        let kind = self
            .conflict_state()?
            .ok_or_else(|| CoreError::invalid("no conflict operation in progress"))?;
        self.run(|| crate::conflict::skip_operation(&self.repo, &kind))?;
        self.emit(FacadeEvent::ConflictStateChanged);
        Ok(())
    }

    pub fn conflict_abort(&mut self) -> Result<()> {
        let kind = self
            .conflict_state()?
            .ok_or_else(|| CoreError::invalid("no conflict operation in progress"))?;
        self.run(|| crate::conflict::abort_operation(&self.repo, &kind))?;
        self.emit(FacadeEvent::ConflictStateChanged);
        Ok(())
    }

    // -- File history ---------------------------------------------------

    pub fn file_log(&self, path: &str, limit: usize) -> Result<Vec<(String, String)>> {
        let entries = crate::commit_ops::file_log(&self.repo, path)?;
        Ok(entries.into_iter().take(limit).collect())
    }

    pub fn file_log_diff(&self, hash: &str, path: &str) -> Result<String> {
        crate::commit_ops::file_log_diff(&self.repo, hash, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn open_load_metadata_and_walk_commits() {
        let (dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "one\n", "initial");
        drop(repo);

        let mut facade = RepoFacade::open(dir.path()).unwrap();
        let metadata = facade.load_metadata().unwrap();
        assert_eq!(metadata.current_branch.as_deref(), Some("main"));

        facade.create_commit_walker().unwrap();
        let batch = facade.load_more_commits(10).unwrap();
        assert_eq!(batch.len(), 1);

        let entry = facade.graph_entry(0).unwrap().unwrap();
        assert_eq!(entry.position, 1);

        matches!(facade.try_recv_event(), Some(FacadeEvent::MetadataChanged));
    }

    #[test]
    fn stage_and_commit_through_facade() {
        let (dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "one\n", "initial");
        write_file(&repo, "a.txt", "two\n");
        drop(repo);

        let mut facade = RepoFacade::open(dir.path()).unwrap();
        facade.stage_file("a.txt").unwrap();
        let status = facade.status().unwrap();
        assert_eq!(status[0].index_state(), 'M');

        facade.commit("second").unwrap();
        assert!(facade.status().unwrap().is_empty());
    }

    #[test]
    fn refresh_policy_prefers_full_reload_on_head_or_refs() {
        let mut head_only = HashSet::new();
        head_only.insert(ChangeKind::Head);
        assert_eq!(refresh_policy_for(&head_only), RefreshPolicy::FullReload);

        let mut workdir_only = HashSet::new();
        workdir_only.insert(ChangeKind::Workdir);
        assert_eq!(refresh_policy_for(&workdir_only), RefreshPolicy::LightweightRefresh);
    }
}
