//! C6 PatchApplier — applies a reconstructed patch to the index (staging a
//! hunk/selection) or the working tree (discarding it), forward or in
//! reverse.

use git2::{ApplyLocation, Repository};

use crate::error::{CoreError, Result};

/// `cached` targets the index, else the working tree. `reverse` inverts the
/// patch's direction before handing it to libgit2, so the same reconstructed
/// text serves both staging and discarding.
pub fn apply(repo: &Repository, patch_text: &str, cached: bool, reverse: bool) -> Result<()> {
    if patch_text.is_empty() {
        return Ok(());
    }
    let text = if reverse {
        reverse_patch_text(patch_text)
    } else {
        patch_text.to_string()
    };

    let diff = git2::Diff::from_buffer(text.as_bytes())?;
    let location = if cached {
        ApplyLocation::Index
    } else {
        ApplyLocation::WorkDir
    };
    repo.apply(&diff, location, None)
        .map_err(|e| CoreError::PatchRejected {
            detail: e.to_string(),
        })
}

/// Swaps each hunk's old/new range and every `+`/`-` line prefix, so a
/// patch built from `DiffParser` reconstruction can be re-used to discard
/// the same change instead of staging it.
fn reverse_patch_text(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        if let Some(reversed) = reverse_hunk_header(line) {
            out.push_str(&reversed);
        } else if line.starts_with("+++") || line.starts_with("---") {
            out.push_str(line);
        } else if let Some(rest) = line.strip_prefix('+') {
            out.push('-');
            out.push_str(rest);
        } else if let Some(rest) = line.strip_prefix('-') {
            out.push('+');
            out.push_str(rest);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

fn reverse_hunk_header(line: &str) -> Option<String> {
    let rest = line.strip_prefix("@@ -")?;
    let (old_range, rest) = rest.split_once(" +")?;
    let (new_range, trailing) = rest.split_once(" @@")?;
    Some(format!("@@ -{new_range} +{old_range} @@{trailing}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{engine, parser};
    use crate::test_support::*;

    #[test]
    fn apply_to_index_stages_a_reconstructed_hunk() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "foo\nbar\n", "initial");
        write_file(&repo, "a.txt", "foo\nbaz\n");

        let diff_text = engine::diff_unstaged(&repo).unwrap();
        let parsed = parser::parse(&diff_text);
        let patch = parser::patch_for_hunk(&parsed, 0);

        apply(&repo, &patch, true, false).unwrap();

        let staged = engine::diff_staged(&repo).unwrap();
        assert!(staged.contains("-bar"));
        assert!(staged.contains("+baz"));
    }

    #[test]
    fn reverse_hunk_header_swaps_old_and_new() {
        let reversed = reverse_hunk_header("@@ -1,2 +1,3 @@ trailer").unwrap();
        assert_eq!(reversed, "@@ -1,3 +1,2 @@ trailer");
    }

    #[test]
    fn empty_patch_is_a_no_op() {
        let (_dir, repo) = init_repo();
        assert!(apply(&repo, "", true, false).is_ok());
    }
}
