//! C12 RepoWatcher — recursive, debounced filesystem change source over the
//! working tree and `.git/` directory. Classifies raw filesystem events into
//! head/refs/index/workdir changes (excluding `objects/**` and `*.lock`
//! noise) and coalesces them through `notify`/`notify-debouncer-full`'s
//! 300ms debounce window instead of polling.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use tracing::warn;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Head,
    Refs,
    Index,
    Workdir,
}

/// Watches `workdir_root` and `git_dir`, delivering coalesced sets of
/// `[ChangeKind]` on `receiver` every 300ms while changes are pending.
pub struct RepoWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher, RecommendedCache>,
    receiver: Receiver<HashSet<ChangeKind>>,
    last_index_mtime: Option<std::time::SystemTime>,
    git_dir: PathBuf,
}

impl RepoWatcher {
    pub fn new(workdir_root: &Path, git_dir: &Path) -> Result<Self> {
        let (tx, rx) = std::sync::mpsc::channel::<HashSet<ChangeKind>>();
        let git_dir_owned = git_dir.to_path_buf();

        let emit = move |kinds: HashSet<ChangeKind>, tx: &Sender<HashSet<ChangeKind>>| {
            if !kinds.is_empty() {
                let _ = tx.send(kinds);
            }
        };

        let git_dir_for_cb = git_dir_owned.clone();
        let tx_for_cb = tx.clone();
        let mut debouncer = new_debouncer(
            Duration::from_millis(300),
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    let mut kinds = HashSet::new();
                    for event in events {
                        for path in &event.paths {
                            if let Some(kind) = classify(path, &git_dir_for_cb) {
                                kinds.insert(kind);
                            }
                        }
                    }
                    emit(kinds, &tx_for_cb);
                }
                Err(errors) => {
                    for e in errors {
                        warn!(error = %e, "watcher error");
                    }
                }
            },
        )
        .map_err(|e| CoreError::other(format!("failed to start watcher: {e}")))?;

        debouncer
            .watch(workdir_root, RecursiveMode::Recursive)
            .map_err(|e| CoreError::other(format!("failed to watch working tree: {e}")))?;
        debouncer
            .watch(git_dir, RecursiveMode::Recursive)
            .map_err(|e| CoreError::other(format!("failed to watch git dir: {e}")))?;

        Ok(Self {
            _debouncer: debouncer,
            receiver: rx,
            last_index_mtime: index_mtime(git_dir),
            git_dir: git_dir.to_path_buf(),
        })
    }

    /// Drains one coalesced batch, if any has arrived, applying the index
    /// mtime guard so a no-op touch of `.git/index` doesn't produce a
    /// spurious `Index` kind.
    pub fn try_recv(&mut self) -> Option<HashSet<ChangeKind>> {
        let mut kinds = self.receiver.try_recv().ok()?;
        if kinds.contains(&ChangeKind::Index) {
            let current = index_mtime(&self.git_dir);
            if current == self.last_index_mtime {
                kinds.remove(&ChangeKind::Index);
            } else {
                self.last_index_mtime = current;
            }
        }
        if kinds.is_empty() {
            None
        } else {
            Some(kinds)
        }
    }
}

fn index_mtime(git_dir: &Path) -> Option<std::time::SystemTime> {
    std::fs::metadata(git_dir.join("index")).ok()?.modified().ok()
}

/// Classifies a changed path into a `[ChangeKind]`, or `None` if it falls
/// under an exclusion (`objects/**`, `*.lock`).
fn classify(path: &Path, git_dir: &Path) -> Option<ChangeKind> {
    if path.extension().map(|e| e == "lock").unwrap_or(false) {
        return None;
    }

    let relative = path.strip_prefix(git_dir).ok();
    match relative {
        Some(rel) => {
            if rel.starts_with("objects") {
                return None;
            }
            let rel_str = rel.to_string_lossy();
            if rel_str == "index" {
                Some(ChangeKind::Index)
            } else if matches!(
                rel_str.as_ref(),
                "HEAD" | "MERGE_HEAD" | "REBASE_HEAD" | "CHERRY_PICK_HEAD"
            ) {
                Some(ChangeKind::Head)
            } else if rel_str.starts_with("refs/") || rel_str == "packed-refs" {
                Some(ChangeKind::Refs)
            } else {
                None
            }
        }
        None => Some(ChangeKind::Workdir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_excludes_objects_and_lock_files() {
        let git_dir = Path::new("/repo/.git");
        assert_eq!(classify(Path::new("/repo/.git/objects/ab/cd"), git_dir), None);
        assert_eq!(classify(Path::new("/repo/.git/index.lock"), git_dir), None);
    }

    #[test]
    fn classify_recognizes_head_refs_and_index() {
        let git_dir = Path::new("/repo/.git");
        assert_eq!(classify(Path::new("/repo/.git/HEAD"), git_dir), Some(ChangeKind::Head));
        assert_eq!(classify(Path::new("/repo/.git/MERGE_HEAD"), git_dir), Some(ChangeKind::Head));
        assert_eq!(
            classify(Path::new("/repo/.git/refs/heads/main"), git_dir),
            Some(ChangeKind::Refs)
        );
        assert_eq!(classify(Path::new("/repo/.git/packed-refs"), git_dir), Some(ChangeKind::Refs));
        assert_eq!(classify(Path::new("/repo/.git/index"), git_dir), Some(ChangeKind::Index));
    }

    #[test]
    fn classify_anything_outside_git_dir_is_workdir() {
        let git_dir = Path::new("/repo/.git");
        assert_eq!(classify(Path::new("/repo/src/main.rs"), git_dir), Some(ChangeKind::Workdir));
    }

    #[test]
    fn watcher_reports_workdir_change_after_write() {
        let temp = tempfile::TempDir::new().unwrap();
        let workdir = temp.path();
        let git_dir = workdir.join(".git");
        std::fs::create_dir_all(&git_dir).unwrap();
        std::fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n").unwrap();

        let mut watcher = RepoWatcher::new(workdir, &git_dir).unwrap();
        std::fs::write(workdir.join("file.txt"), "hello").unwrap();

        let mut observed = None;
        for _ in 0..20 {
            std::thread::sleep(Duration::from_millis(50));
            if let Some(kinds) = watcher.try_recv() {
                observed = Some(kinds);
                break;
            }
        }
        assert_eq!(observed, Some(HashSet::from([ChangeKind::Workdir])));
    }
}
