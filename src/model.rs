//! Pure value types shared across the core. None of these hold a reference
//! to a libgit2 handle, so they may outlive the repository that produced
//! them.

use chrono::{FixedOffset, TimeZone};

/// Sentinel hash used for the synthetic "uncommitted changes" row.
pub const UNCOMMITTED_HASH: &str = "0000000000000000000000000000000000000000";

/// An immutable commit record, decorated with the refs pointing at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub hash: String,
    pub parent_hashes: Vec<String>,
    pub author_name: String,
    pub author_email: String,
    /// Seconds since epoch plus the UTC offset in minutes the commit was
    /// authored with, so `formatted_date` can reproduce `±HHMM`.
    pub timestamp: i64,
    pub tz_offset_minutes: i32,
    /// Subject line only (first line of the commit message).
    pub message: String,
    pub refs: Vec<RefLabel>,
    pub is_uncommitted: bool,
}

impl CommitInfo {
    pub fn short_hash(&self) -> &str {
        &self.hash[..7.min(self.hash.len())]
    }

    pub fn is_merge(&self) -> bool {
        self.parent_hashes.len() >= 2
    }

    /// `YYYY-MM-DD HH:MM:SS ±HHMM`.
    pub fn formatted_date(&self) -> String {
        let offset = FixedOffset::east_opt(self.tz_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        match offset.timestamp_opt(self.timestamp, 0) {
            chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S %z").to_string(),
            _ => String::new(),
        }
    }

    /// Builds the synthetic uncommitted-changes row shown atop the log.
    pub fn uncommitted(head_hash: &str, staged: usize, unstaged: usize) -> Self {
        Self {
            hash: UNCOMMITTED_HASH.to_string(),
            parent_hashes: vec![head_hash.to_string()],
            author_name: String::new(),
            author_email: String::new(),
            timestamp: 0,
            tz_offset_minutes: 0,
            message: format!("{} staged, {} unstaged", staged, unstaged),
            refs: Vec::new(),
            is_uncommitted: true,
        }
    }
}

/// Classifies a ref label so the graph can order HEAD → local → remote → tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RefClass {
    Head,
    Local,
    Remote,
    Tag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefLabel {
    pub class: RefClass,
    pub name: String,
}

/// Sorts refs by class priority, then lexicographically within a class.
pub fn sort_ref_labels(labels: &mut [RefLabel]) {
    labels.sort_by(|a, b| a.class.cmp(&b.class).then_with(|| a.name.cmp(&b.name)));
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub name: String,
    pub short_hash: String,
    pub upstream: Option<String>,
    pub is_current: bool,
    pub is_remote: bool,
    pub ahead: Option<usize>,
    pub behind: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashInfo {
    pub index: usize,
    pub message: String,
}

impl StashInfo {
    /// `stash@{N}` display form.
    pub fn label(&self) -> String {
        format!("stash@{{{}}}", self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmoduleInfo {
    pub name: String,
    pub head_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
}

/// Two-character index/worktree status code, `??` for untracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub path: String,
    pub status_code: [char; 2],
}

impl FileStatus {
    pub fn new(path: impl Into<String>, index_state: char, worktree_state: char) -> Self {
        Self {
            path: path.into(),
            status_code: [index_state, worktree_state],
        }
    }

    pub fn index_state(&self) -> char {
        self.status_code[0]
    }

    pub fn worktree_state(&self) -> char {
        self.status_code[1]
    }

    pub fn is_untracked(&self) -> bool {
        self.status_code == ['?', '?']
    }

    pub fn has_staged(&self) -> bool {
        matches!(self.index_state(), 'A' | 'M' | 'D' | 'R')
    }

    pub fn has_unstaged(&self) -> bool {
        matches!(self.worktree_state(), 'M' | 'D' | 'R' | '?')
    }

    pub fn code_str(&self) -> String {
        self.status_code.iter().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffFile {
    pub path: String,
    pub additions: usize,
    pub deletions: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HunkLineKind {
    Context,
    Addition,
    Deletion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    pub id: u32,
    pub kind: HunkLineKind,
    pub content: String,
    pub old_line_num: Option<u32>,
    pub new_line_num: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub raw_header: String,
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub lines: Vec<HunkLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedDiff {
    pub is_new_file: bool,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

/// Per-row drawing instructions produced by the graph layout engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitGraphEntry {
    pub position: usize,
    pub dot_color_index: usize,
    pub lines: Vec<GraphLine>,
    pub num_columns: usize,
    pub is_uncommitted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphLine {
    pub upper: bool,
    pub from: usize,
    pub to: usize,
    pub color_index: usize,
    pub is_uncommitted_link: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseState {
    pub source_branch: String,
    pub target_branch: String,
    pub current_step: u32,
    pub total_steps: u32,
    pub conflicted_files: Vec<String>,
    pub resolved_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictFile {
    pub path: String,
    pub conflict_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRegion {
    pub id: u32,
    pub ours_range: LineRange,
    pub theirs_range: LineRange,
    pub base_range: LineRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSides {
    pub ours_label: String,
    pub theirs_label: String,
    pub ours_content: Vec<String>,
    pub theirs_content: Vec<String>,
    pub markers: Vec<ConflictRegion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
    Rebase,
    Merge { source_branch: String },
    StashApply,
}

impl ConflictKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConflictKind::Rebase => "rebase",
            ConflictKind::Merge { .. } => "merge",
            ConflictKind::StashApply => "stash-apply",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    Soft,
    Mixed,
    Hard,
}

impl ResetMode {
    pub fn to_git2(self) -> git2::ResetType {
        match self {
            ResetMode::Soft => git2::ResetType::Soft,
            ResetMode::Mixed => git2::ResetType::Mixed,
            ResetMode::Hard => git2::ResetType::Hard,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_is_seven_chars() {
        let c = CommitInfo {
            hash: "abcdef0123456789abcdef0123456789abcdef01".into(),
            parent_hashes: vec![],
            author_name: "a".into(),
            author_email: "a@b.c".into(),
            timestamp: 0,
            tz_offset_minutes: 0,
            message: "m".into(),
            refs: vec![],
            is_uncommitted: false,
        };
        assert_eq!(c.short_hash(), "abcdef0");
        assert!(!c.is_merge());
    }

    #[test]
    fn merge_detection_requires_two_parents() {
        let mut c = CommitInfo {
            hash: "a".repeat(40),
            parent_hashes: vec!["b".repeat(40)],
            author_name: String::new(),
            author_email: String::new(),
            timestamp: 0,
            tz_offset_minutes: 0,
            message: String::new(),
            refs: vec![],
            is_uncommitted: false,
        };
        assert!(!c.is_merge());
        c.parent_hashes.push("c".repeat(40));
        assert!(c.is_merge());
    }

    #[test]
    fn ref_label_priority_orders_head_before_local_before_remote_before_tag() {
        let mut labels = vec![
            RefLabel {
                class: RefClass::Tag,
                name: "v1".into(),
            },
            RefLabel {
                class: RefClass::Remote,
                name: "origin/main".into(),
            },
            RefLabel {
                class: RefClass::Head,
                name: "HEAD".into(),
            },
            RefLabel {
                class: RefClass::Local,
                name: "main".into(),
            },
        ];
        sort_ref_labels(&mut labels);
        let classes: Vec<_> = labels.iter().map(|l| &l.class).collect();
        assert_eq!(
            classes,
            vec![
                &RefClass::Head,
                &RefClass::Local,
                &RefClass::Remote,
                &RefClass::Tag
            ]
        );
    }

    #[test]
    fn file_status_untracked_and_derived_booleans() {
        let f = FileStatus::new("a.txt", '?', '?');
        assert!(f.is_untracked());
        assert!(!f.has_staged());
        assert!(f.has_unstaged());

        let f2 = FileStatus::new("b.txt", 'M', ' ');
        assert!(f2.has_staged());
        assert!(!f2.has_unstaged());
    }

    #[test]
    fn uncommitted_entry_is_flagged_and_parents_head() {
        let entry = CommitInfo::uncommitted(&"a".repeat(40), 1, 2);
        assert!(entry.is_uncommitted);
        assert_eq!(entry.parent_hashes, vec!["a".repeat(40)]);
        assert_eq!(entry.message, "1 staged, 2 unstaged");
    }
}
