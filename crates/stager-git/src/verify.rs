//! Checks that an anonymized repository leaks nothing about its students

use crate::handle::{remote_tracking_refs, RepositoryHandle};
use crate::identity::Identity;
use git2::Commit;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerificationFailure {
    #[error("Remotes are still configured: {}", .0.join(", "))]
    RemotesPresent(Vec<String>),

    #[error("Remote-tracking references remain: {}", .0.join(", "))]
    RemoteTrackingRefsPresent(Vec<String>),

    #[error("The reflog directory still exists")]
    ReflogPresent,

    #[error("FETCH_HEAD still exists")]
    FetchHeadPresent,

    #[error("Commit {commit} is not anonymized (author {author}, committer {committer})")]
    NotAnonymized {
        commit: String,
        author: String,
        committer: String,
    },

    #[error("Template root commit {0} is not reachable from HEAD")]
    TemplateCommitUnreachable(String),

    #[error("Expected one combined student commit but found {0}")]
    TooManyStudentCommits(usize),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

pub type AnonymizationResult = Result<(), VerificationFailure>;

/// Check a rewritten repository, stopping at the first broken invariant.
///
/// Every commit on the first-parent chain from HEAD down to the template root
/// must carry the anonymized identity as author and committer, and the root
/// must be on that chain. With `combined_expected` at most one such commit may
/// exist.
pub fn verify(
    handle: &RepositoryHandle,
    combined_expected: bool,
    template_root_commit_hash: &str,
) -> AnonymizationResult {
    let repo = handle.repo();

    let remotes: Vec<String> = repo.remotes()?.iter().flatten().map(String::from).collect();
    if !remotes.is_empty() {
        return Err(VerificationFailure::RemotesPresent(remotes));
    }

    let tracking = remote_tracking_refs(repo)?;
    if !tracking.is_empty() {
        return Err(VerificationFailure::RemoteTrackingRefsPresent(tracking));
    }

    if handle.git_dir().join("logs").exists() {
        return Err(VerificationFailure::ReflogPresent);
    }
    if handle.git_dir().join("FETCH_HEAD").exists() {
        return Err(VerificationFailure::FetchHeadPresent);
    }

    let unreachable =
        || VerificationFailure::TemplateCommitUnreachable(template_root_commit_hash.to_string());
    let root = repo
        .revparse_single(template_root_commit_hash)
        .and_then(|object| object.peel_to_commit())
        .map_err(|_| unreachable())?
        .id();

    let anonymized = Identity::anonymized();
    let mut commit = repo.head()?.peel_to_commit()?;
    let mut student_commits = 0usize;

    while commit.id() != root {
        if let Some((author, committer)) = foreign_identities(&commit, &anonymized) {
            return Err(VerificationFailure::NotAnonymized {
                commit: commit.id().to_string(),
                author,
                committer,
            });
        }
        student_commits += 1;

        commit = commit.parent(0).map_err(|_| unreachable())?;
    }

    if combined_expected && student_commits > 1 {
        return Err(VerificationFailure::TooManyStudentCommits(student_commits));
    }
    Ok(())
}

/// Author and committer of `commit` unless both are `anonymized`.
fn foreign_identities(commit: &Commit<'_>, anonymized: &Identity) -> Option<(String, String)> {
    let author = commit.author();
    let committer = commit.committer();
    if anonymized.matches(&author) && anonymized.matches(&committer) {
        None
    } else {
        Some((author.to_string(), committer.to_string()))
    }
}
