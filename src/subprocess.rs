//! Thin wrapper around invoking the `git` binary directly, for the handful
//! of operations libgit2 doesn't model well: interactive rebase (reword,
//! squash), rebase/merge continue-skip-abort, and `git log --follow`. A
//! single captured-output helper runs with a deterministic, controlled
//! environment.

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{CoreError, Result};

/// Runs `git <args>` in `repo_dir`, with `env` applied on top of (not
/// replacing) the inherited environment. Non-zero exit surfaces as
/// `OperationFailed` with the captured stderr.
pub fn run_git(repo_dir: &Path, args: &[&str], env: &HashMap<&str, String>) -> Result<String> {
    debug!(?args, dir = %repo_dir.display(), "running git subprocess");
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(repo_dir);
    for (key, value) in env {
        cmd.env(key, value);
    }
    let output = cmd.output()?;

    if !output.status.success() {
        return Err(CoreError::OperationFailed {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Detects the "Host key verification failed" shape of stderr and pulls out
/// the offending host, if present.
pub fn host_key_error(stderr: &str) -> Option<String> {
    if !stderr.contains("Host key verification failed") {
        return None;
    }
    stderr
        .lines()
        .find_map(|line| line.trim().strip_prefix("Host key verification failed for "))
        .map(|rest| rest.trim_end_matches('.').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_error_extracts_hostname() {
        let stderr = "Host key verification failed for github.com.\n";
        assert_eq!(host_key_error(stderr), Some("github.com".to_string()));
    }

    #[test]
    fn host_key_error_absent_returns_none() {
        assert_eq!(host_key_error("fatal: repository not found"), None);
    }
}
