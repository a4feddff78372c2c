//! C2 CommitWalker — pull-based, batched topological enumeration over
//! `refs/heads/*` ∪ `refs/remotes/*`.
//!
//! A revwalk seeded from every reference (`Sort::TIME | Sort::TOPOLOGICAL`)
//! is exposed as a resumable cursor instead of a one-shot `Vec`. The walker
//! owns a second, independently opened `Repository` handle so background
//! iteration does not block mutating operations on the main handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use git2::{Repository, Sort};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::CommitInfo;
use crate::refs::RefIndex;

/// Cancellation token shared between a caller and an in-flight walk.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

pub struct CommitWalker {
    repo: Repository,
    revwalk_cursor: Vec<git2::Oid>,
    position: usize,
    ref_index: RefIndex,
    exhausted: bool,
    cancel: CancelToken,
}

impl CommitWalker {
    /// Opens a second handle against `path`, seeds a topological ∧
    /// time-descending walk from every local and remote branch head.
    pub fn create(path: &std::path::Path) -> Result<Self> {
        Self::create_with_cancel(path, CancelToken::new())
    }

    pub fn create_with_cancel(path: &std::path::Path, cancel: CancelToken) -> Result<Self> {
        let repo = Repository::open(path)?;
        let ref_index = RefIndex::build(&repo)?;

        let mut revwalk = repo.revwalk()?;
        revwalk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;
        for reference in repo.references()? {
            let reference = match reference {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable reference during walk seeding");
                    continue;
                }
            };
            let name = reference.name().unwrap_or_default();
            if !(name.starts_with("refs/heads/") || name.starts_with("refs/remotes/")) {
                continue;
            }
            if name.ends_with("/HEAD") {
                // Unreachable remote HEAD symref; skip silently.
                continue;
            }
            if let Some(oid) = reference.target() {
                // push() on an unreachable/broken target must not abort
                // seeding the rest of the walk.
                let _ = revwalk.push(oid);
            }
        }

        let mut cursor = Vec::new();
        for oid in revwalk {
            match oid {
                Ok(oid) => cursor.push(oid),
                Err(e) => {
                    // A corrupt object terminates the walk cleanly: stop
                    // collecting further oids but keep what's already valid.
                    warn!(error = %e, "revwalk terminated on corrupt object");
                    break;
                }
            }
        }

        Ok(Self {
            repo,
            revwalk_cursor: cursor,
            position: 0,
            ref_index,
            exhausted: false,
            cancel,
        })
    }

    /// Returns up to `n` commits in walk order. An empty batch signals
    /// exhaustion; subsequent calls stay empty.
    pub fn next_batch(&mut self, n: usize) -> Result<Vec<CommitInfo>> {
        if self.exhausted || self.position >= self.revwalk_cursor.len() {
            self.exhausted = true;
            return Ok(Vec::new());
        }

        let mut batch = Vec::with_capacity(n);
        let end = (self.position + n).min(self.revwalk_cursor.len());

        for oid in &self.revwalk_cursor[self.position..end] {
            if self.cancel.is_cancelled() {
                debug!("commit walk cancelled mid-batch");
                self.exhausted = true;
                break;
            }
            let commit = match self.repo.find_commit(*oid) {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, oid = %oid, "corrupt commit object, terminating walk");
                    self.exhausted = true;
                    break;
                }
            };
            batch.push(build_commit_info(&commit, &self.ref_index));
        }

        self.position += batch.len();
        if self.position >= self.revwalk_cursor.len() {
            self.exhausted = true;
        }

        Ok(batch)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

pub(crate) fn build_commit_info(commit: &git2::Commit, ref_index: &RefIndex) -> CommitInfo {
    let hash = commit.id().to_string();
    let time = commit.time();
    CommitInfo {
        hash: hash.clone(),
        parent_hashes: commit.parent_ids().map(|o| o.to_string()).collect(),
        author_name: commit.author().name().unwrap_or("").to_string(),
        author_email: commit.author().email().unwrap_or("").to_string(),
        timestamp: time.seconds(),
        tz_offset_minutes: time.offset_minutes(),
        message: commit.summary().unwrap_or("").to_string(),
        refs: ref_index.refs_for(&hash),
        is_uncommitted: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn walker_yields_batches_in_topo_order_then_empties() {
        let (dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "1", "first");
        commit_file(&repo, "a.txt", "2", "second");
        commit_file(&repo, "a.txt", "3", "third");
        drop(repo);

        let mut walker = CommitWalker::create(dir.path()).unwrap();
        let first = walker.next_batch(2).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].message, "third");
        assert_eq!(first[1].message, "second");

        let second = walker.next_batch(2).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].message, "first");

        let third = walker.next_batch(2).unwrap();
        assert!(third.is_empty());
        assert!(walker.is_exhausted());
    }

    #[test]
    fn cancellation_stops_mid_batch() {
        let (dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "1", "first");
        commit_file(&repo, "a.txt", "2", "second");
        commit_file(&repo, "a.txt", "3", "third");
        drop(repo);

        let cancel = CancelToken::new();
        let mut walker = CommitWalker::create_with_cancel(dir.path(), cancel.clone()).unwrap();
        cancel.cancel();
        let batch = walker.next_batch(10).unwrap();
        assert!(batch.is_empty());
        assert!(walker.is_exhausted());
    }
}
