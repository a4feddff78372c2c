use std::path::PathBuf;
use thiserror::Error;

/// Error taxonomy for the repository core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The repository handle could not be acquired.
    #[error("repository could not be opened at {path}")]
    RepoNotOpen { path: PathBuf },

    /// A malformed hash, empty branch name, or a path escaping the repo.
    #[error("invalid argument: {what}")]
    InvalidArgument { what: String },

    /// A branch, commit, remote, or conflict file could not be found.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// An operation requires a clean repository but one is mid-operation.
    #[error("a {kind} is already in progress")]
    Conflict { kind: &'static str },

    /// Branch deletion without force would drop unmerged commits.
    #[error("branch '{name}' is not fully merged")]
    BranchNotFullyMerged { name: String },

    /// Parsed from the git subprocess's "Host key verification failed" stderr.
    #[error("host key verification required for {host}")]
    HostKeyRequired { host: String },

    /// Credential failure from a remote operation.
    #[error("authentication required")]
    AuthRequired,

    /// `git apply` (or the in-process equivalent) refused the patch.
    #[error("patch rejected: {detail}")]
    PatchRejected { detail: String },

    /// Mark-conflicted could not restore stages 1/2/3 from REUC.
    #[error("failed to restore conflict at stage {stage}")]
    ConflictRestoreFailed { stage: u8 },

    /// Generic subprocess failure; `stderr` is the captured output.
    #[error("operation failed: {stderr}")]
    OperationFailed { stderr: String },

    /// Error surfaced directly from libgit2.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O error with the operation that triggered it.
    #[error("I/O error ({context}): {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io {
            source: err,
            context: "I/O operation".to_string(),
        }
    }
}

/// Extension trait to attach context to a raw I/O error.
pub trait IoErrorContext<T> {
    fn with_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> IoErrorContext<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|source| CoreError::Io {
            source,
            context: context.into(),
        })
    }
}

impl CoreError {
    pub fn invalid(what: impl Into<String>) -> Self {
        CoreError::InvalidArgument { what: what.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound { what: what.into() }
    }

    pub fn other(detail: impl Into<String>) -> Self {
        CoreError::OperationFailed {
            stderr: detail.into(),
        }
    }
}
