//! Process-wide state shared by every open repository.
//!
//! libgit2 requires a one-time global init. A host process may open and
//! drop many `RepoFacade`s over its lifetime, so that init is guarded by a
//! `std::sync::Once` rather than assumed to happen exactly once per
//! process run.

use std::sync::Once;

static INIT: Once = Once::new();

/// Ensures libgit2's global state is initialized exactly once per process.
/// Cheap to call repeatedly; every `RepoFacade::open` does so.
pub fn ensure_git_initialized() {
    INIT.call_once(|| {
        git2::opts::strict_hash_verification(true);
    });
}

/// Tunables pulled out of their callers so a host can override them (e.g. a
/// test harness wanting small batches).
#[derive(Debug, Clone, Copy)]
pub struct CoreConfig {
    /// Size of the first batch returned by `CommitWalker::next_batch` for
    /// fast first paint.
    pub first_batch_size: usize,
    /// Size of subsequent batches.
    pub subsequent_batch_size: usize,
    /// Filesystem-watcher debounce window.
    pub watch_debounce: std::time::Duration,
    /// Number of distinct colors in the graph lane palette before indices
    /// wrap (`dot_color_index` is the palette index modulo this size).
    pub graph_palette_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            first_batch_size: 500,
            subsequent_batch_size: 2000,
            watch_debounce: std::time::Duration::from_millis(300),
            graph_palette_size: 16,
        }
    }
}
