//! C11 RemoteOps — fetch/pull/push and remote CRUD, plus the SSH host-key
//! acceptance helper. Network transport runs through the `git` binary rather
//! than libgit2's own transport, so credential prompts, SSH agent
//! negotiation, and host-key checks behave exactly as they would on the
//! user's own command line.

use std::collections::HashMap;
use std::path::Path;

use git2::Repository;

use crate::error::{CoreError, Result};
use crate::model::RemoteInfo;
use crate::subprocess::{host_key_error, run_git};

fn repo_dir(repo: &Repository) -> Result<&Path> {
    repo.workdir()
        .ok_or_else(|| CoreError::invalid("bare repository has no workdir"))
}

fn run_and_translate(dir: &Path, args: &[&str]) -> Result<String> {
    match run_git(dir, args, &HashMap::new()) {
        Err(CoreError::OperationFailed { stderr }) => {
            if let Some(host) = host_key_error(&stderr) {
                return Err(CoreError::HostKeyRequired { host });
            }
            if stderr.contains("Authentication failed") || stderr.contains("could not read Username") {
                return Err(CoreError::AuthRequired);
            }
            Err(CoreError::OperationFailed { stderr })
        }
        other => other,
    }
}

pub fn fetch(repo: &Repository, remote: &str) -> Result<String> {
    run_and_translate(repo_dir(repo)?, &["fetch", remote])
}

pub fn pull(repo: &Repository, remote: &str, branch: &str) -> Result<String> {
    run_and_translate(repo_dir(repo)?, &["pull", remote, branch])
}

/// Pushes `branch` to `remote`, creating the upstream tracking ref with
/// `--set-upstream` when `set_upstream` is requested.
pub fn push(repo: &Repository, remote: &str, branch: &str, set_upstream: bool) -> Result<String> {
    let dir = repo_dir(repo)?;
    if set_upstream {
        run_and_translate(dir, &["push", "--set-upstream", remote, branch])
    } else {
        run_and_translate(dir, &["push", remote, branch])
    }
}

pub fn list_remotes(repo: &Repository) -> Result<Vec<RemoteInfo>> {
    let names = repo.remotes()?;
    let mut out = Vec::with_capacity(names.len());
    for name in names.iter().flatten() {
        let remote = repo.find_remote(name)?;
        out.push(RemoteInfo {
            name: name.to_string(),
            url: remote.url().unwrap_or("").to_string(),
        });
    }
    Ok(out)
}

pub fn add_remote(repo: &Repository, name: &str, url: &str) -> Result<()> {
    repo.remote(name, url)?;
    Ok(())
}

pub fn remove_remote(repo: &Repository, name: &str) -> Result<()> {
    repo.remote_delete(name)?;
    Ok(())
}

pub fn rename_remote(repo: &Repository, old_name: &str, new_name: &str) -> Result<()> {
    repo.remote_rename(old_name, new_name)?;
    Ok(())
}

pub fn set_remote_url(repo: &Repository, name: &str, url: &str) -> Result<()> {
    repo.remote_set_url(name, url)?;
    Ok(())
}

/// Runs `ssh-keyscan -H <host>` and appends the result to `~/.ssh/known_hosts`,
/// the command-line equivalent of accepting the host key interactively.
pub fn accept_host_key(host: &str) -> Result<()> {
    let output = std::process::Command::new("ssh-keyscan")
        .args(["-H", host])
        .output()?;
    if !output.status.success() || output.stdout.is_empty() {
        return Err(CoreError::other(format!("ssh-keyscan found no key for {host}")));
    }
    let home = dirs::home_dir().ok_or_else(|| CoreError::other("could not locate home directory"))?;
    let ssh_dir = home.join(".ssh");
    std::fs::create_dir_all(&ssh_dir)?;
    let known_hosts = ssh_dir.join("known_hosts");
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(known_hosts)?;
    file.write_all(&output.stdout)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn add_rename_and_remove_remote_round_trip() {
        let (_dir, repo) = init_repo();
        commit_file(&repo, "a.txt", "1", "initial");
        add_remote(&repo, "origin", "https://example.com/repo.git").unwrap();
        let remotes = list_remotes(&repo).unwrap();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].name, "origin");

        rename_remote(&repo, "origin", "upstream").unwrap();
        assert!(repo.find_remote("origin").is_err());
        assert!(repo.find_remote("upstream").is_ok());

        set_remote_url(&repo, "upstream", "https://example.com/other.git").unwrap();
        let remotes = list_remotes(&repo).unwrap();
        assert_eq!(remotes[0].url, "https://example.com/other.git");

        remove_remote(&repo, "upstream").unwrap();
        assert!(list_remotes(&repo).unwrap().is_empty());
    }

    #[test]
    fn host_key_error_maps_to_host_key_required() {
        let err = CoreError::OperationFailed {
            stderr: "Host key verification failed for example.com.\n".to_string(),
        };
        if let CoreError::OperationFailed { stderr } = err {
            assert_eq!(host_key_error(&stderr), Some("example.com".to_string()));
        }
    }
}
