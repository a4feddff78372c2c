//! C8 ConflictEngine — the hardest subsystem: detecting which operation
//! (rebase/merge/stash-apply) left the repository mid-conflict, enumerating
//! and toggling individual files between conflicted and resolved, and
//! driving continue/skip/abort.
//!
//! Built around index-conflict iteration (`index.conflicts()`, the
//! `(ancestor, our, their)` triple) and marker-scanning over conflicted
//! file contents, generalized from a one-shot "list conflicts" view into a
//! full resolve/un-resolve state machine plus operation control.
//!
//! One deliberate deviation from a byte-for-byte reading of conflict
//! metadata: libgit2's REUC (resolved-unmerged-conflicts) section is not
//! exposed by git2-rs's safe API. `mark_resolved`/`mark_conflicted` persist
//! the same (mode, oid) triples REUC would hold in a small sidecar file
//! under the git directory instead, giving identical round-trip behavior.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use git2::{Index, IndexEntry, IndexTime, Repository};

use crate::error::{CoreError, Result};
use crate::model::{ConflictFile, ConflictKind, ConflictRegion, ConflictSides, LineRange, RebaseState};

const SIDECAR_DIR: &str = "repocore-resolved";

fn sidecar_dir(repo: &Repository) -> PathBuf {
    repo.path().join(SIDECAR_DIR)
}

fn sidecar_path(repo: &Repository, path: &str) -> PathBuf {
    sidecar_dir(repo).join(path.replace('/', "__"))
}

/// Inspects rebase/merge sentinel files and index conflict state to
/// determine which operation, if any, is in progress.
pub fn detect_conflict_kind(repo: &Repository) -> Result<Option<ConflictKind>> {
    let git_dir = repo.path();
    if git_dir.join("rebase-merge").is_dir() || git_dir.join("rebase-apply").is_dir() {
        return Ok(Some(ConflictKind::Rebase));
    }
    if git_dir.join("MERGE_HEAD").is_file() {
        let source_branch = merge_source_branch(repo).unwrap_or_else(|| "MERGE_HEAD".to_string());
        return Ok(Some(ConflictKind::Merge { source_branch }));
    }
    let index = repo.index()?;
    if index.has_conflicts() {
        return Ok(Some(ConflictKind::StashApply));
    }
    Ok(None)
}

fn merge_source_branch(repo: &Repository) -> Option<String> {
    let oid_text = std::fs::read_to_string(repo.path().join("MERGE_HEAD")).ok()?;
    let oid = git2::Oid::from_str(oid_text.trim()).ok()?;
    for branch in repo.branches(None).ok()?.flatten() {
        let (branch, _) = branch;
        if branch.get().target() == Some(oid) {
            return branch.name().ok().flatten().map(String::from);
        }
    }
    Some(oid.to_string()[..7].to_string())
}

/// Files with index entries at stages 1/2/3. `conflict_count` is the number
/// of `<<<<<<<` markers found in the working-tree copy (1 if unreadable).
pub fn conflicted_files(repo: &Repository) -> Result<Vec<ConflictFile>> {
    let index = repo.index()?;
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for entry in index.conflicts()? {
        let entry = entry?;
        let path = conflict_path(&entry).ok_or_else(|| CoreError::invalid("conflict entry has no path"))?;
        if !seen.insert(path.clone()) {
            continue;
        }
        let conflict_count = marker_count(repo, &path);
        out.push(ConflictFile { path, conflict_count });
    }
    Ok(out)
}

fn conflict_path(entry: &git2::IndexConflict) -> Option<String> {
    [&entry.our, &entry.their, &entry.ancestor]
        .into_iter()
        .flatten()
        .next()
        .and_then(|e| std::str::from_utf8(&e.path).ok())
        .map(String::from)
}

fn marker_count(repo: &Repository, path: &str) -> usize {
    let Some(workdir) = repo.workdir() else { return 1 };
    match std::fs::read_to_string(workdir.join(path)) {
        Ok(content) => {
            let n = content.lines().filter(|l| l.starts_with("<<<<<<<")).count();
            n.max(1)
        }
        Err(_) => 1,
    }
}

/// Overwrites the working-tree copy of a conflicted file with caller-supplied
/// content, e.g. after the user edits the merged result in an external view.
pub fn save_conflict_resolution(repo: &Repository, path: &str, content: &str) -> Result<()> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| CoreError::invalid("bare repository has no workdir"))?;
    std::fs::write(workdir.join(path), content)?;
    Ok(())
}

/// Resolves every currently conflicted file by staging its working-tree copy.
pub fn mark_all_resolved(repo: &Repository) -> Result<()> {
    for file in conflicted_files(repo)? {
        mark_resolved(repo, &file.path)?;
    }
    Ok(())
}

/// Paths that currently have a remembered resolution (sidecar present).
pub fn resolved_files(repo: &Repository) -> Result<Vec<String>> {
    let dir = sidecar_dir(repo);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            out.push(name.replace("__", "/"));
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy)]
struct StageEntry {
    mode: u32,
    oid: git2::Oid,
}

/// Stages the working-tree version at stage 0, which moves stages 1/2/3
/// into the index's conflict bucket automatically, after first recording
/// those stages to the sidecar so `mark_conflicted` can restore them later.
pub fn mark_resolved(repo: &Repository, path: &str) -> Result<()> {
    let mut index = repo.index()?;
    let stages = read_stage_entries(&index, path);
    write_sidecar(repo, path, &stages)?;

    index.add_path(Path::new(path))?;
    index.write()?;
    Ok(())
}

/// Restores the three-way conflict at `path` from the recorded sidecar.
/// Any failure rolls back the index write and surfaces
/// `ConflictRestoreFailed`.
pub fn mark_conflicted(repo: &Repository, path: &str) -> Result<()> {
    let stages = read_sidecar(repo, path)?;
    let mut index = repo.index()?;

    let snapshot = index.write_tree().ok();
    fn restore_on_failure(
        index: &mut Index,
        repo: &Repository,
        snapshot: Option<git2::Oid>,
        stage: u8,
    ) -> CoreError {
        if let Some(tree_oid) = snapshot {
            if let Ok(tree) = repo.find_tree(tree_oid) {
                let _ = index.read_tree(&tree);
            }
        }
        CoreError::ConflictRestoreFailed { stage }
    }

    index
        .remove_path(Path::new(path))
        .map_err(|_| restore_on_failure(&mut index, repo, snapshot, 0))?;

    for (stage, entry) in [(1u16, stages.get(&1)), (2, stages.get(&2)), (3, stages.get(&3))] {
        if let Some(e) = entry {
            let index_entry = build_index_entry(path, stage, e);
            index
                .add(&index_entry)
                .map_err(|_| restore_on_failure(&mut index, repo, snapshot, stage as u8))?;
        }
    }

    regenerate_markers(repo, path, &stages)
        .map_err(|_| restore_on_failure(&mut index, repo, snapshot, 4))?;

    remove_sidecar(repo, path);
    index
        .write()
        .map_err(|_| restore_on_failure(&mut index, repo, snapshot, 5))?;
    Ok(())
}

fn read_stage_entries(index: &Index, path: &str) -> HashMap<u16, StageEntry> {
    let mut out = HashMap::new();
    for stage in [1u32, 2, 3] {
        if let Some(entry) = index.get_path(Path::new(path), stage as i32) {
            out.insert(stage as u16, StageEntry { mode: entry.mode, oid: entry.id });
        }
    }
    out
}

fn write_sidecar(repo: &Repository, path: &str, stages: &HashMap<u16, StageEntry>) -> Result<()> {
    std::fs::create_dir_all(sidecar_dir(repo))?;
    let mut body = String::new();
    for stage in [1u16, 2, 3] {
        if let Some(e) = stages.get(&stage) {
            body.push_str(&format!("{stage} {:o} {}\n", e.mode, e.oid));
        }
    }
    std::fs::write(sidecar_path(repo, path), body)?;
    Ok(())
}

fn read_sidecar(repo: &Repository, path: &str) -> Result<HashMap<u16, StageEntry>> {
    let text = std::fs::read_to_string(sidecar_path(repo, path))
        .map_err(|_| CoreError::not_found(format!("no remembered resolution for {path}")))?;
    let mut out = HashMap::new();
    for line in text.lines() {
        let mut parts = line.split_whitespace();
        let stage: u16 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let mode = parts.next().and_then(|s| u32::from_str_radix(s, 8).ok()).unwrap_or(0o100644);
        let oid = parts.next().and_then(|s| git2::Oid::from_str(s).ok());
        if let Some(oid) = oid {
            out.insert(stage, StageEntry { mode, oid });
        }
    }
    Ok(out)
}

fn remove_sidecar(repo: &Repository, path: &str) {
    let _ = std::fs::remove_file(sidecar_path(repo, path));
}

fn build_index_entry(path: &str, stage: u16, entry: &StageEntry) -> IndexEntry {
    IndexEntry {
        ctime: IndexTime::new(0, 0),
        mtime: IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode: entry.mode,
        uid: 0,
        gid: 0,
        file_size: 0,
        id: entry.oid,
        flags: (stage & 0x3) << 12,
        flags_extended: 0,
        path: path.as_bytes().to_vec(),
    }
}

/// Rebuilds conflict markers from the recovered ours/theirs blobs. Common
/// leading/trailing lines are treated as shared context and left bare; the
/// differing middle span becomes the single conflict region — this covers
/// the common "one contiguous edit per side" shape without needing a full
/// three-way diff.
fn regenerate_markers(repo: &Repository, path: &str, stages: &HashMap<u16, StageEntry>) -> Result<()> {
    let ours_blob = stages.get(&2).map(|e| repo.find_blob(e.oid)).transpose()?;
    let theirs_blob = stages.get(&3).map(|e| repo.find_blob(e.oid)).transpose()?;

    let ours_text = ours_blob
        .as_ref()
        .map(|b| String::from_utf8_lossy(b.content()).into_owned())
        .unwrap_or_default();
    let theirs_text = theirs_blob
        .as_ref()
        .map(|b| String::from_utf8_lossy(b.content()).into_owned())
        .unwrap_or_default();
    let ours_lines: Vec<&str> = ours_text.lines().collect();
    let theirs_lines: Vec<&str> = theirs_text.lines().collect();

    let (ours_label, theirs_label) = labels_for_current_operation(repo)?;
    let content = render_conflict_markers(&ours_lines, &theirs_lines, &ours_label, &theirs_label);

    let workdir = repo
        .workdir()
        .ok_or_else(|| CoreError::invalid("bare repository has no workdir"))?;
    std::fs::write(workdir.join(path), content)?;
    Ok(())
}

fn render_conflict_markers(ours: &[&str], theirs: &[&str], ours_label: &str, theirs_label: &str) -> String {
    let mut prefix = 0;
    while prefix < ours.len() && prefix < theirs.len() && ours[prefix] == theirs[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < ours.len() - prefix
        && suffix < theirs.len() - prefix
        && ours[ours.len() - 1 - suffix] == theirs[theirs.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let mut out = String::new();
    for line in &ours[..prefix] {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!("<<<<<<< {ours_label}\n"));
    for line in &ours[prefix..ours.len() - suffix] {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("=======\n");
    for line in &theirs[prefix..theirs.len() - suffix] {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&format!(">>>>>>> {theirs_label}\n"));
    for line in &ours[ours.len() - suffix..] {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn labels_for_current_operation(repo: &Repository) -> Result<(String, String)> {
    match detect_conflict_kind(repo)? {
        Some(ConflictKind::Rebase) => {
            let onto = read_rebase_sentinel(repo, "onto")
                .and_then(|s| repo.revparse_single(&s).ok())
                .map(|o| o.id().to_string()[..7.min(o.id().to_string().len())].to_string());
            let head_name = read_rebase_sentinel(repo, "head-name")
                .map(|s| s.trim_start_matches("refs/heads/").to_string());
            Ok((
                format!("Commit {} on {}", onto.unwrap_or_default(), head_name.clone().unwrap_or_default()),
                format!("Commit on {}", head_name.unwrap_or_else(|| "theirs".to_string())),
            ))
        }
        Some(ConflictKind::Merge { source_branch }) => {
            let head_short = repo
                .head()
                .ok()
                .and_then(|h| h.target())
                .map(|o| o.to_string()[..7].to_string())
                .unwrap_or_default();
            let branch_name = repo
                .head()
                .ok()
                .and_then(|h| h.shorthand().map(String::from))
                .unwrap_or_default();
            Ok((
                format!("Commit {head_short} on {branch_name}"),
                format!("Commit on {source_branch}"),
            ))
        }
        Some(ConflictKind::StashApply) | None => {
            Ok(("Working tree".to_string(), "Stash".to_string()))
        }
    }
}

fn read_rebase_sentinel(repo: &Repository, name: &str) -> Option<String> {
    for dir in ["rebase-merge", "rebase-apply"] {
        if let Ok(content) = std::fs::read_to_string(repo.path().join(dir).join(name)) {
            return Some(content.trim().to_string());
        }
    }
    None
}

/// Scans the working-tree file for conflict markers and splits it into
/// line-aligned `ours`/`theirs` sequences plus the regions between markers.
pub fn read_conflict_sides(repo: &Repository, path: &str) -> Result<ConflictSides> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| CoreError::invalid("bare repository has no workdir"))?;
    let content = std::fs::read_to_string(workdir.join(path))
        .map_err(|_| CoreError::not_found(format!("conflicted file {path}")))?;

    let (ours_label, theirs_label) = labels_for_current_operation(repo)?;

    let mut ours_lines = Vec::new();
    let mut theirs_lines = Vec::new();
    let mut markers = Vec::new();

    #[derive(PartialEq)]
    enum Mode {
        Shared,
        Ours,
        Theirs,
    }
    let mut mode = Mode::Shared;
    let mut region_start_ours = 0usize;
    let mut region_start_theirs = 0usize;
    let mut next_id = 0u32;

    for line in content.lines() {
        if line.starts_with("<<<<<<<") {
            mode = Mode::Ours;
            region_start_ours = ours_lines.len();
            region_start_theirs = theirs_lines.len();
            continue;
        }
        if line == "=======" && mode == Mode::Ours {
            mode = Mode::Theirs;
            continue;
        }
        if line.starts_with(">>>>>>>") {
            let ours_end = ours_lines.len();
            let theirs_end = theirs_lines.len();
            let pad = ours_end.abs_diff(theirs_end);
            if ours_end < theirs_end {
                ours_lines.extend(std::iter::repeat(String::new()).take(pad));
            } else if theirs_end < ours_end {
                theirs_lines.extend(std::iter::repeat(String::new()).take(pad));
            }
            markers.push(ConflictRegion {
                id: next_id,
                ours_range: LineRange { start: region_start_ours, end: ours_end },
                theirs_range: LineRange { start: region_start_theirs, end: theirs_end },
                base_range: LineRange { start: region_start_ours, end: region_start_ours },
            });
            next_id += 1;
            mode = Mode::Shared;
            continue;
        }
        match mode {
            Mode::Shared => {
                ours_lines.push(line.to_string());
                theirs_lines.push(line.to_string());
            }
            Mode::Ours => ours_lines.push(line.to_string()),
            Mode::Theirs => theirs_lines.push(line.to_string()),
        }
    }

    Ok(ConflictSides {
        ours_label,
        theirs_label,
        ours_content: ours_lines,
        theirs_content: theirs_lines,
        markers,
    })
}

/// Parses `rebase-merge/{msgnum,end,onto,head-name}` into a `RebaseState`.
pub fn rebase_state(repo: &Repository) -> Result<Option<RebaseState>> {
    if detect_conflict_kind(repo)? != Some(ConflictKind::Rebase) {
        return Ok(None);
    }
    let current_step: u32 = read_rebase_sentinel(repo, "msgnum").and_then(|s| s.parse().ok()).unwrap_or(0);
    let total_steps: u32 = read_rebase_sentinel(repo, "end").and_then(|s| s.parse().ok()).unwrap_or(0);
    let source_branch = read_rebase_sentinel(repo, "head-name").unwrap_or_default();
    let target_branch = read_rebase_sentinel(repo, "onto").unwrap_or_default();
    let conflicted = conflicted_files(repo)?.into_iter().map(|f| f.path).collect();
    let resolved = resolved_files(repo)?;
    Ok(Some(RebaseState {
        source_branch,
        target_branch,
        current_step,
        total_steps,
        conflicted_files: conflicted,
        resolved_files: resolved,
    }))
}

/// Dispatches `continue` according to the current operation kind.
pub fn continue_operation(repo: &Repository, kind: &ConflictKind, message: Option<&str>) -> Result<()> {
    let dir = repo
        .workdir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| repo.path().to_path_buf());
    match kind {
        ConflictKind::Rebase => {
            if let Some(msg) = message {
                std::fs::write(repo.path().join("rebase-merge").join("message"), msg)?;
            }
            let mut env = HashMap::new();
            env.insert("GIT_EDITOR", "true".to_string());
            crate::subprocess::run_git(&dir, &["rebase", "--continue"], &env)?;
            Ok(())
        }
        ConflictKind::Merge { .. } => {
            let msg = message
                .map(str::to_string)
                .or_else(|| std::fs::read_to_string(repo.path().join("MERGE_MSG")).ok())
                .unwrap_or_else(|| "Merge".to_string());
            let sig = repo.signature()?;
            let mut index = repo.index()?;
            let tree_oid = index.write_tree()?;
            let tree = repo.find_tree(tree_oid)?;
            let head = repo.head()?.peel_to_commit()?;
            let merge_head_oid = git2::Oid::from_str(
                std::fs::read_to_string(repo.path().join("MERGE_HEAD"))?.trim(),
            )?;
            let merge_head = repo.find_commit(merge_head_oid)?;
            repo.commit(Some("HEAD"), &sig, &sig, &msg, &tree, &[&head, &merge_head])?;
            repo.cleanup_state()?;
            Ok(())
        }
        ConflictKind::StashApply => {
            let _ = repo.cleanup_state();
            Ok(())
        }
    }
}

pub fn skip_operation(repo: &Repository, kind: &ConflictKind) -> Result<()> {
    match kind {
        ConflictKind::Rebase => {
            let dir = repo
                .workdir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| repo.path().to_path_buf());
            crate::subprocess::run_git(&dir, &["rebase", "--skip"], &HashMap::new())?;
            Ok(())
        }
        _ => Err(CoreError::invalid("skip is only valid during a rebase")),
    }
}

pub fn abort_operation(repo: &Repository, kind: &ConflictKind) -> Result<()> {
    let dir = repo
        .workdir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| repo.path().to_path_buf());
    match kind {
        ConflictKind::Rebase => {
            crate::subprocess::run_git(&dir, &["rebase", "--abort"], &HashMap::new())?;
        }
        ConflictKind::Merge { .. } => {
            crate::subprocess::run_git(&dir, &["merge", "--abort"], &HashMap::new())?;
        }
        ConflictKind::StashApply => {
            let head = repo.head()?.peel_to_commit()?;
            let mut checkout = git2::build::CheckoutBuilder::new();
            checkout.force();
            repo.reset(head.as_object(), git2::ResetType::Hard, Some(&mut checkout))?;
            let _ = repo.cleanup_state();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    fn make_conflict(repo: &Repository) -> String {
        let mut index = repo.index().unwrap();
        let base = repo.blob(b"base\n").unwrap();
        let ours = repo.blob(b"ours\n").unwrap();
        let theirs = repo.blob(b"theirs\n").unwrap();
        for (stage, oid) in [(1u16, base), (2, ours), (3, theirs)] {
            index
                .add(&build_index_entry("x.txt", stage, &StageEntry { mode: 0o100644, oid }))
                .unwrap();
        }
        index.write().unwrap();
        let workdir = repo.workdir().unwrap();
        std::fs::write(
            workdir.join("x.txt"),
            "<<<<<<< HEAD\nours\n=======\ntheirs\n>>>>>>> branch\n",
        )
        .unwrap();
        "x.txt".to_string()
    }

    #[test]
    fn stash_apply_detected_when_only_index_conflicts_present() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "1\n", "initial");
        make_conflict(&repo);
        let kind = detect_conflict_kind(&repo).unwrap();
        assert_eq!(kind, Some(ConflictKind::StashApply));
    }

    #[test]
    fn conflicted_files_lists_path_with_marker_count() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "1\n", "initial");
        let path = make_conflict(&repo);
        let files = conflicted_files(&repo).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, path);
        assert_eq!(files[0].conflict_count, 1);
    }

    #[test]
    fn read_conflict_sides_splits_and_pads_lines() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "1\n", "initial");
        let path = make_conflict(&repo);
        let sides = read_conflict_sides(&repo, &path).unwrap();
        assert_eq!(sides.ours_content, vec!["ours".to_string()]);
        assert_eq!(sides.theirs_content, vec!["theirs".to_string()]);
        assert_eq!(sides.markers.len(), 1);
    }

    #[test]
    fn read_conflict_sides_records_pre_padding_range_on_unequal_sides() {
        let (dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "1\n", "initial");
        std::fs::write(
            dir.path().join("a.txt"),
            "<<<<<<< ours\na\n=======\nb\nc\nd\n>>>>>>> theirs\n",
        )
        .unwrap();

        let sides = read_conflict_sides(&repo, "a.txt").unwrap();
        assert_eq!(sides.markers.len(), 1);
        let region = &sides.markers[0];
        assert_eq!(region.ours_range, LineRange { start: 0, end: 1 });
        assert_eq!(region.theirs_range, LineRange { start: 0, end: 3 });
    }

    #[test]
    fn mark_resolved_then_mark_conflicted_restores_index_stages() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "1\n", "initial");
        let path = make_conflict(&repo);

        mark_resolved(&repo, &path).unwrap();
        assert!(conflicted_files(&repo).unwrap().is_empty());
        assert_eq!(resolved_files(&repo).unwrap(), vec![path.clone()]);

        mark_conflicted(&repo, &path).unwrap();
        let files = conflicted_files(&repo).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, path);
        assert!(resolved_files(&repo).unwrap().is_empty());
    }
}
