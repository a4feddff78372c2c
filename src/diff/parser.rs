//! C5 DiffParser — turns unified-diff text into a `ParsedDiff`, and
//! reconstructs patch text for an arbitrary hunk or line subset. A small
//! hand-rolled unified-diff reader plus the inverse operation,
//! reconstruction, since no diff rendered by `DiffEngine` ever needs to be
//! fed back in without this round-trip.

use crate::model::{Hunk, HunkLine, HunkLineKind, ParsedDiff};

/// Parses unified-diff text produced by `DiffEngine`. Unknown/garbled input
/// degrades to an empty `ParsedDiff` rather than erroring — the core never
/// crashes on a malformed diff, it just shows nothing.
pub fn parse(text: &str) -> ParsedDiff {
    let mut diff = ParsedDiff::default();
    let mut old_line = 0u32;
    let mut new_line = 0u32;
    let mut current_hunk: Option<Hunk> = None;
    let mut next_line_id = 0u32;

    for raw in text.lines() {
        if let Some(rest) = raw.strip_prefix("--- ") {
            diff.old_path = strip_ab_prefix(rest);
            continue;
        }
        if let Some(rest) = raw.strip_prefix("+++ ") {
            diff.new_path = strip_ab_prefix(rest);
            continue;
        }
        if raw.starts_with("new file mode") {
            diff.is_new_file = true;
            continue;
        }
        if let Some(header) = raw.strip_prefix("@@ ") {
            flush_hunk(&mut current_hunk, &mut diff);
            if let Some(parsed_header) = parse_hunk_header(header) {
                old_line = parsed_header.old_start;
                new_line = parsed_header.new_start;
                next_line_id = 0;
                current_hunk = Some(parsed_header);
            }
            continue;
        }
        let Some(hunk) = current_hunk.as_mut() else {
            continue;
        };
        if raw.is_empty() {
            continue;
        }
        let (kind, content) = match raw.as_bytes()[0] {
            b'+' => (HunkLineKind::Addition, &raw[1..]),
            b'-' => (HunkLineKind::Deletion, &raw[1..]),
            b' ' => (HunkLineKind::Context, &raw[1..]),
            _ => continue,
        };
        let (old_num, new_num) = match kind {
            HunkLineKind::Context => {
                let pair = (Some(old_line), Some(new_line));
                old_line += 1;
                new_line += 1;
                pair
            }
            HunkLineKind::Deletion => {
                let pair = (Some(old_line), None);
                old_line += 1;
                pair
            }
            HunkLineKind::Addition => {
                let pair = (None, Some(new_line));
                new_line += 1;
                pair
            }
        };
        hunk.lines.push(HunkLine {
            id: next_line_id,
            kind,
            content: content.to_string(),
            old_line_num: old_num,
            new_line_num: new_num,
        });
        next_line_id += 1;
    }
    flush_hunk(&mut current_hunk, &mut diff);

    diff
}

fn flush_hunk(current: &mut Option<Hunk>, diff: &mut ParsedDiff) -> Option<()> {
    let hunk = current.take()?;
    diff.hunks.push(hunk);
    Some(())
}

fn strip_ab_prefix(path: &str) -> Option<String> {
    let path = path.split('\t').next().unwrap_or(path);
    if path == "/dev/null" {
        return None;
    }
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .map(str::to_string)
        .or_else(|| Some(path.to_string()))
}

/// Parses `-a,b +c,d @@...`, defaulting omitted counts to 1.
fn parse_hunk_header(rest: &str) -> Option<Hunk> {
    let end = rest.find(" @@")?;
    let body = &rest[..end];
    let mut parts = body.split_whitespace();
    let old_part = parts.next()?.strip_prefix('-')?;
    let new_part = parts.next()?.strip_prefix('+')?;

    let (old_start, old_count) = parse_range(old_part)?;
    let (new_start, new_count) = parse_range(new_part)?;

    Some(Hunk {
        raw_header: format!("@@ {rest}"),
        old_start,
        old_count,
        new_start,
        new_count,
        lines: Vec::new(),
    })
}

fn parse_range(s: &str) -> Option<(u32, u32)> {
    match s.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((s.parse().ok()?, 1)),
    }
}

/// Emits a standalone unified diff containing exactly `hunk_index`.
pub fn patch_for_hunk(diff: &ParsedDiff, hunk_index: usize) -> String {
    let Some(hunk) = diff.hunks.get(hunk_index) else {
        return String::new();
    };
    let body: Vec<(char, &str)> = hunk
        .lines
        .iter()
        .map(|l| (prefix_char(l.kind), l.content.as_str()))
        .collect();
    if body.iter().all(|(c, _)| *c == ' ') {
        return String::new();
    }
    render_patch(
        diff,
        hunk.old_start,
        hunk.old_count,
        hunk.new_start,
        hunk.new_count,
        &body,
    )
}

/// Emits a patch acting only on `selected_line_ids` within `hunk_index`:
/// unselected additions are dropped, unselected deletions demoted to
/// context. Counts are recomputed from the emitted body.
pub fn patch_for_lines(
    diff: &ParsedDiff,
    hunk_index: usize,
    selected_line_ids: &std::collections::HashSet<u32>,
) -> String {
    let Some(hunk) = diff.hunks.get(hunk_index) else {
        return String::new();
    };

    let mut body: Vec<(char, &str)> = Vec::new();
    for line in &hunk.lines {
        match line.kind {
            HunkLineKind::Context => body.push((' ', &line.content)),
            HunkLineKind::Addition => {
                if selected_line_ids.contains(&line.id) {
                    body.push(('+', &line.content));
                }
                // unselected addition: drop entirely
            }
            HunkLineKind::Deletion => {
                if selected_line_ids.contains(&line.id) {
                    body.push(('-', &line.content));
                } else {
                    // unselected deletion: demote to context
                    body.push((' ', &line.content));
                }
            }
        }
    }

    if body.iter().all(|(c, _)| *c == ' ') {
        return String::new();
    }

    let old_count = body.iter().filter(|(c, _)| *c != '+').count() as u32;
    let new_count = body.iter().filter(|(c, _)| *c != '-').count() as u32;

    render_patch(
        diff,
        hunk.old_start,
        old_count,
        hunk.new_start,
        new_count,
        &body,
    )
}

fn prefix_char(kind: HunkLineKind) -> char {
    match kind {
        HunkLineKind::Context => ' ',
        HunkLineKind::Addition => '+',
        HunkLineKind::Deletion => '-',
    }
}

fn render_patch(
    diff: &ParsedDiff,
    old_start: u32,
    old_count: u32,
    new_start: u32,
    new_count: u32,
    body: &[(char, &str)],
) -> String {
    let path = diff
        .new_path
        .as_deref()
        .or(diff.old_path.as_deref())
        .unwrap_or("file");

    let mut out = String::new();
    out.push_str(&format!("diff --git a/{path} b/{path}\n"));
    if diff.is_new_file {
        out.push_str("new file mode 100644\n");
        out.push_str("--- /dev/null\n");
    } else {
        out.push_str(&format!("--- a/{path}\n"));
    }
    out.push_str(&format!("+++ b/{path}\n"));
    out.push_str(&format!(
        "@@ -{old_start},{old_count} +{new_start},{new_count} @@\n"
    ));
    for (prefix, content) in body {
        out.push(*prefix);
        out.push_str(content);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -1,2 +1,2 @@\n foo\n-bar\n+baz\n";

    #[test]
    fn parses_single_hunk_with_context_and_change() {
        let parsed = parse(SAMPLE);
        assert_eq!(parsed.hunks.len(), 1);
        let hunk = &parsed.hunks[0];
        assert_eq!(hunk.old_start, 1);
        assert_eq!(hunk.old_count, 2);
        assert_eq!(hunk.lines.len(), 3);
        assert_eq!(hunk.lines[0].kind, HunkLineKind::Context);
        assert_eq!(hunk.lines[1].kind, HunkLineKind::Deletion);
        assert_eq!(hunk.lines[2].kind, HunkLineKind::Addition);
        assert_eq!(hunk.lines[1].old_line_num, Some(2));
        assert_eq!(hunk.lines[2].new_line_num, Some(2));
    }

    #[test]
    fn detects_new_file_mode() {
        let text = "diff --git a/n.txt b/n.txt\nnew file mode 100644\n--- /dev/null\n+++ b/n.txt\n@@ -0,0 +1,1 @@\n+hello\n";
        let parsed = parse(text);
        assert!(parsed.is_new_file);
        assert_eq!(parsed.old_path, None);
    }

    #[test]
    fn patch_for_hunk_reproduces_counts_exactly() {
        let parsed = parse(SAMPLE);
        let patch = patch_for_hunk(&parsed, 0);
        assert!(patch.contains("@@ -1,2 +1,2 @@"));
        assert!(patch.contains("-bar"));
        assert!(patch.contains("+baz"));
    }

    #[test]
    fn patch_for_lines_selecting_all_change_lines_matches_patch_for_hunk() {
        let parsed = parse(SAMPLE);
        let all_ids: std::collections::HashSet<u32> = parsed.hunks[0]
            .lines
            .iter()
            .filter(|l| l.kind != HunkLineKind::Context)
            .map(|l| l.id)
            .collect();
        let full = patch_for_hunk(&parsed, 0);
        let selected = patch_for_lines(&parsed, 0, &all_ids);
        assert_eq!(full, selected);
    }

    #[test]
    fn patch_for_lines_drops_unselected_addition_and_demotes_unselected_deletion() {
        let text = "diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -1,1 +1,2 @@\n-old\n+new1\n+new2\n";
        let parsed = parse(text);
        let new2_id = parsed.hunks[0]
            .lines
            .iter()
            .find(|l| l.content == "new2")
            .unwrap()
            .id;
        let mut selected = std::collections::HashSet::new();
        selected.insert(new2_id);
        let patch = patch_for_lines(&parsed, 0, &selected);
        assert!(patch.contains("+new2"));
        assert!(!patch.contains("+new1"));
        assert!(patch.contains(" old")); // demoted to context
        assert!(patch.contains("@@ -1,1 +1,2 @@"));
    }

    #[test]
    fn empty_selection_yields_empty_patch() {
        let parsed = parse(SAMPLE);
        let empty = std::collections::HashSet::new();
        assert_eq!(patch_for_lines(&parsed, 0, &empty), "");
    }
}
