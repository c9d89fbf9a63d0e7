use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagerError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Commit not found: {0}")]
    CommitNotFound(String),

    #[error("No template root commit is known for {}", .path.display())]
    MissingTemplateRoot { path: PathBuf },

    #[error("No commit at or before {cutoff} in {}", .path.display())]
    NoCommitBeforeCutoff {
        path: PathBuf,
        cutoff: DateTime<Utc>,
    },

    #[error("Cherry-pick of {commit} produced conflicts")]
    CherryPickConflict { commit: String },

    #[error("Repository {} is bare and has no working tree", .path.display())]
    BareRepository { path: PathBuf },

    #[error("Cannot anonymize the repository {}: {source}", .path.display())]
    Anonymization {
        path: PathBuf,
        #[source]
        source: Box<StagerError>,
    },
}

pub type StagerResult<T> = Result<T, StagerError>;
