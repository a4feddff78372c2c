//! C3 GraphLayoutEngine — incremental lane allocation for the commit graph.
//!
//! Building the whole graph eagerly into a single `Vec<GraphRow>` with
//! `Rc<RefCell<Lane>>` lanes shared between rows doesn't scale to a
//! lazily-scrolled, incrementally-walked history, and that sharing doesn't
//! translate cleanly to a processor that must stop and resume mid-history:
//! a lane must outlive the row that allocated it *and* be mutated by the
//! next row. This engine keeps the core idea (a palette of colored lanes,
//! each waiting for a specific parent hash) but stores lanes in a freeing
//! arena addressed by integer `LaneId`s, so `previous_lanes`/`current_lanes`
//! are plain `Vec<Option<LaneId>>` with no interior mutability.

use std::collections::HashMap;

use crate::error::{CoreError, Result};
use crate::model::{CommitGraphEntry, CommitInfo, GraphLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LaneId(usize);

#[derive(Debug, Clone)]
struct Lane {
    parent_hash: String,
    color_index: usize,
    from_uncommitted: bool,
}

#[derive(Default)]
struct LaneArena {
    slots: Vec<Option<Lane>>,
    free: Vec<usize>,
}

impl LaneArena {
    fn alloc(&mut self, lane: Lane) -> LaneId {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(lane);
            LaneId(idx)
        } else {
            self.slots.push(Some(lane));
            LaneId(self.slots.len() - 1)
        }
    }

    fn get(&self, id: LaneId) -> &Lane {
        self.slots[id.0].as_ref().expect("dangling LaneId")
    }

    fn get_mut(&mut self, id: LaneId) -> &mut Lane {
        self.slots[id.0].as_mut().expect("dangling LaneId")
    }

    fn free(&mut self, id: LaneId) {
        self.slots[id.0] = None;
        self.free.push(id.0);
    }
}

/// Stateful lane allocator. Feed it commits one at a time in walk order;
/// each call to `process_next` depends only on the lane state left by the
/// previous call, which is what makes the lazy wrapper below safe to extend
/// incrementally.
pub struct GraphLayoutEngine {
    arena: LaneArena,
    previous_lanes: Vec<Option<LaneId>>,
    next_color: usize,
    palette_size: usize,
}

impl GraphLayoutEngine {
    pub fn new(palette_size: usize) -> Self {
        Self {
            arena: LaneArena::default(),
            previous_lanes: Vec::new(),
            next_color: 0,
            palette_size: palette_size.max(1),
        }
    }

    fn allocate_color(&mut self) -> usize {
        let c = self.next_color;
        self.next_color += 1;
        c
    }

    /// Runs the per-commit algorithm described by the module docs and
    /// returns the row's drawing instructions.
    pub fn process_next(&mut self, commit: &CommitInfo) -> CommitGraphEntry {
        let mut current_lanes: Vec<Option<LaneId>> = Vec::new();
        let mut lines: Vec<GraphLine> = Vec::new();
        let mut new_pos: Option<usize> = None;
        let mut dot_color = 0usize;
        let mut did_first = false;

        for (idx, slot) in self.previous_lanes.iter().enumerate() {
            let i = idx + 1;
            let Some(lane_id) = *slot else { continue };
            let lane = self.arena.get(lane_id);
            if lane.parent_hash == commit.hash {
                if !did_first {
                    did_first = true;
                    let uncommitted_link = lane.from_uncommitted;
                    let color = lane.color_index;
                    current_lanes.push(Some(lane_id));
                    let pos = current_lanes.len();
                    new_pos = Some(pos);
                    dot_color = color;
                    lines.push(GraphLine {
                        upper: true,
                        from: i,
                        to: pos,
                        color_index: color,
                        is_uncommitted_link: uncommitted_link,
                    });
                    if !commit.parent_hashes.is_empty() {
                        lines.push(GraphLine {
                            upper: false,
                            from: pos,
                            to: pos,
                            color_index: color,
                            is_uncommitted_link: false,
                        });
                    }
                    self.arena.get_mut(lane_id).from_uncommitted = false;
                } else {
                    let pos = new_pos.expect("did_first implies new_pos set");
                    let uncommitted_link = lane.from_uncommitted;
                    let color = lane.color_index;
                    lines.push(GraphLine {
                        upper: true,
                        from: i,
                        to: pos,
                        color_index: color,
                        is_uncommitted_link: uncommitted_link,
                    });
                    self.arena.free(lane_id);
                }
            } else {
                let color = lane.color_index;
                current_lanes.push(Some(lane_id));
                let pos = current_lanes.len();
                lines.push(GraphLine {
                    upper: true,
                    from: i,
                    to: pos,
                    color_index: color,
                    is_uncommitted_link: false,
                });
                lines.push(GraphLine {
                    upper: false,
                    from: pos,
                    to: pos,
                    color_index: color,
                    is_uncommitted_link: false,
                });
            }
        }

        // num_columns is measured before additional-parent lanes are added,
        // only incoming/pass-through lanes count toward the span.
        let num_columns = current_lanes.len();

        if !did_first {
            if let Some(first_parent) = commit.parent_hashes.first() {
                let color = self.allocate_color();
                let lane_id = self.arena.alloc(Lane {
                    parent_hash: first_parent.clone(),
                    color_index: color,
                    from_uncommitted: commit.is_uncommitted,
                });
                current_lanes.push(Some(lane_id));
                let pos = current_lanes.len();
                new_pos = Some(pos);
                dot_color = color;
                lines.push(GraphLine {
                    upper: false,
                    from: pos,
                    to: pos,
                    color_index: color,
                    is_uncommitted_link: commit.is_uncommitted,
                });
            }
        }

        // A commit untouched by any prior lane and with no parents (an
        // isolated root) still occupies a column so it has a dot to draw.
        let pos = new_pos.unwrap_or_else(|| {
            current_lanes.push(None);
            current_lanes.len()
        });

        for parent_hash in commit.parent_hashes.iter().skip(1) {
            let existing = current_lanes.iter().enumerate().find_map(|(idx, slot)| {
                slot.and_then(|id| {
                    if self.arena.get(id).parent_hash == *parent_hash {
                        Some((idx + 1, self.arena.get(id).color_index))
                    } else {
                        None
                    }
                })
            });
            if let Some((target_pos, color)) = existing {
                lines.push(GraphLine {
                    upper: false,
                    from: pos,
                    to: target_pos,
                    color_index: color,
                    is_uncommitted_link: false,
                });
            } else {
                let color = self.allocate_color();
                let lane_id = self.arena.alloc(Lane {
                    parent_hash: parent_hash.clone(),
                    color_index: color,
                    from_uncommitted: false,
                });
                current_lanes.push(Some(lane_id));
                let target_pos = current_lanes.len();
                lines.push(GraphLine {
                    upper: false,
                    from: pos,
                    to: target_pos,
                    color_index: color,
                    is_uncommitted_link: false,
                });
            }
        }

        if let Some(slot) = current_lanes.get_mut(pos - 1) {
            match (commit.parent_hashes.first(), *slot) {
                (Some(first_parent), Some(lane_id)) => {
                    self.arena.get_mut(lane_id).parent_hash = first_parent.clone();
                }
                (None, Some(lane_id)) => {
                    self.arena.free(lane_id);
                    *slot = None;
                }
                _ => {}
            }
        }

        self.previous_lanes = current_lanes;

        CommitGraphEntry {
            position: pos,
            dot_color_index: dot_color % self.palette_size,
            lines,
            num_columns,
            is_uncommitted: commit.is_uncommitted,
        }
    }
}

/// Wraps the engine with a growable commit list and a cache so callers can
/// ask for row `N` without re-deriving rows `0..N`.
#[derive(Default)]
pub struct LazyGraphProcessor {
    engine: Option<GraphLayoutEngine>,
    palette_size: usize,
    commits: Vec<CommitInfo>,
    entries: Vec<CommitGraphEntry>,
    by_hash: HashMap<String, usize>,
}

impl LazyGraphProcessor {
    pub fn new(palette_size: usize) -> Self {
        Self {
            engine: Some(GraphLayoutEngine::new(palette_size)),
            palette_size,
            commits: Vec::new(),
            entries: Vec::new(),
            by_hash: HashMap::new(),
        }
    }

    /// Appends freshly-walked commits without processing them yet.
    pub fn extend_commits(&mut self, more: impl IntoIterator<Item = CommitInfo>) {
        self.commits.extend(more);
    }

    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    /// Processes exactly as many additional rows as needed to cover `row`.
    pub fn ensure_processed_through(&mut self, row: usize) -> Result<()> {
        if row < self.entries.len() {
            return Ok(());
        }
        let target = row + 1;
        let engine = self
            .engine
            .as_mut()
            .expect("engine is only taken by reset(), which also clears entries");
        while self.entries.len() < target {
            let idx = self.entries.len();
            let commit = self
                .commits
                .get(idx)
                .ok_or_else(|| CoreError::not_found(format!("graph row {idx}")))?;
            let entry = engine.process_next(commit);
            self.by_hash.insert(commit.hash.clone(), idx);
            self.entries.push(entry);
        }
        Ok(())
    }

    pub fn entry(&self, row: usize) -> Option<&CommitGraphEntry> {
        self.entries.get(row)
    }

    pub fn entry_for_hash(&self, hash: &str) -> Option<&CommitGraphEntry> {
        self.by_hash.get(hash).and_then(|&row| self.entries.get(row))
    }

    pub fn processed_count(&self) -> usize {
        self.entries.len()
    }

    /// Drops all layout state, e.g. after a reload invalidates the commit
    /// ordering (new commits arrived, a rebase rewrote history).
    pub fn reset(&mut self) {
        self.engine = Some(GraphLayoutEngine::new(self.palette_size));
        self.commits.clear();
        self.entries.clear();
        self.by_hash.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(hash: &str, parents: &[&str]) -> CommitInfo {
        CommitInfo {
            hash: hash.to_string(),
            parent_hashes: parents.iter().map(|s| s.to_string()).collect(),
            author_name: String::new(),
            author_email: String::new(),
            timestamp: 0,
            tz_offset_minutes: 0,
            message: String::new(),
            refs: vec![],
            is_uncommitted: false,
        }
    }

    /// S2: main = A->B->M, feature = A->C, M = merge(B, C). Walker order
    /// [M, B, C, A].
    #[test]
    fn two_parent_merge_positions_and_colors() {
        let mut engine = GraphLayoutEngine::new(16);

        let m = engine.process_next(&commit("M", &["B", "C"]));
        assert_eq!(m.position, 1);
        assert_eq!(m.num_columns, 0); // no incoming lanes yet, both parents are new

        let b = engine.process_next(&commit("B", &["A"]));
        assert_eq!(b.position, 1);
        assert!(b
            .lines
            .iter()
            .any(|l| l.upper && l.from == 1 && l.to == 1));

        let c = engine.process_next(&commit("C", &["A"]));
        assert_eq!(c.position, 2);
        assert!(c
            .lines
            .iter()
            .any(|l| l.upper && l.from == 2 && l.to == 2));

        let a = engine.process_next(&commit("A", &[]));
        assert_eq!(a.position, 1);
        // Both lane 1 (from B) and lane 2 (from C) converge on A.
        let upper_lines: Vec<_> = a.lines.iter().filter(|l| l.upper).collect();
        assert!(upper_lines.len() >= 1);
        assert_eq!(a.dot_color_index, m.dot_color_index);
    }

    #[test]
    fn linear_history_keeps_single_lane() {
        let mut engine = GraphLayoutEngine::new(16);
        let c1 = engine.process_next(&commit("c1", &["c2"]));
        let c2 = engine.process_next(&commit("c2", &["c3"]));
        let c3 = engine.process_next(&commit("c3", &[]));
        assert_eq!(c1.position, 1);
        assert_eq!(c2.position, 1);
        assert_eq!(c3.position, 1);
        assert_eq!(c1.dot_color_index, c2.dot_color_index);
        assert_eq!(c2.dot_color_index, c3.dot_color_index);
    }

    #[test]
    fn lazy_processor_caches_and_extends_incrementally() {
        let mut proc = LazyGraphProcessor::new(16);
        proc.extend_commits(vec![
            commit("c1", &["c2"]),
            commit("c2", &["c3"]),
            commit("c3", &[]),
        ]);
        proc.ensure_processed_through(1).unwrap();
        assert_eq!(proc.processed_count(), 2);
        let snapshot_row0 = proc.entry(0).cloned().unwrap();

        proc.ensure_processed_through(2).unwrap();
        assert_eq!(proc.processed_count(), 3);
        // Invariant 1: row 0's entry does not change once more commits are
        // processed beyond it.
        assert_eq!(proc.entry(0).unwrap(), &snapshot_row0);
        assert_eq!(proc.entry_for_hash("c3").unwrap().position, 1);
    }

    #[test]
    fn uncommitted_link_resets_once_consumed() {
        let mut engine = GraphLayoutEngine::new(16);
        let mut uncommitted = commit("uncommitted", &["head"]);
        uncommitted.is_uncommitted = true;
        let row0 = engine.process_next(&uncommitted);
        assert!(row0.lines.iter().any(|l| l.is_uncommitted_link));

        let row1 = engine.process_next(&commit("head", &["parent"]));
        assert!(!row1.lines.iter().any(|l| l.is_uncommitted_link));
    }
}
