//! History rewrites applied to student repositories before grading or review
//!
//! Callers compose the steps as filter, then squash or anonymize. Each step
//! consumes its [`RepositoryHandle`] so the store is closed on every exit path.

use crate::error::{StagerError, StagerResult};
use crate::handle::RepositoryHandle;
use crate::identity::{advance_head, write_commit, Identity, Stamp};
use chrono::{DateTime, Utc};
use git2::{BranchType, Commit, IndexAddOption, Oid, Repository, ResetType, Sort, Time};
use std::fs;
use std::io::ErrorKind;
use tracing::{debug, info, warn};

/// Side branch that receives the squashed commit when the default branch is kept.
pub const SQUASH_BRANCH: &str = "diff";

/// Temporary branch holding the original history during anonymization.
pub const COPY_BRANCH: &str = "copy";

pub const COMBINED_COMMIT_MESSAGE: &str = "All student changes in one commit";

/// Hard-reset to the submission that was in time.
///
/// The target is `relevant_commit_hash` when given, otherwise the newest commit
/// whose commit time is not after `cutoff`. Without a cutoff nothing happens.
pub fn filter_late_submissions(
    handle: RepositoryHandle,
    relevant_commit_hash: Option<&str>,
    cutoff: Option<DateTime<Utc>>,
) -> StagerResult<()> {
    let Some(cutoff) = cutoff else {
        debug!(path = %handle.path().display(), "No due date, keeping all submissions");
        handle.close();
        return Ok(());
    };

    let result = reset_to_last_valid_commit(&handle, relevant_commit_hash, cutoff);
    if let Err(e) = &result {
        warn!(path = %handle.path().display(), error = %e, "Cannot filter late submissions");
    }
    handle.close();
    result
}

fn reset_to_last_valid_commit(
    handle: &RepositoryHandle,
    relevant_commit_hash: Option<&str>,
    cutoff: DateTime<Utc>,
) -> StagerResult<()> {
    let target = match relevant_commit_hash {
        Some(hash) => handle.find_commit(hash)?,
        None => last_commit_before(handle.repo(), cutoff)?.ok_or_else(|| {
            StagerError::NoCommitBeforeCutoff {
                path: handle.path().to_path_buf(),
                cutoff,
            }
        })?,
    };

    info!(
        path = %handle.path().display(),
        commit = %target.id(),
        "Resetting to last valid submission"
    );
    handle
        .repo()
        .reset(target.as_object(), ResetType::Hard, None)?;
    Ok(())
}

fn last_commit_before(repo: &Repository, cutoff: DateTime<Utc>) -> StagerResult<Option<Commit<'_>>> {
    let mut walk = repo.revwalk()?;
    walk.push_head()?;
    walk.set_sorting(Sort::TIME)?;

    for oid in walk {
        let commit = repo.find_commit(oid?)?;
        if commit.time().seconds() <= cutoff.timestamp() {
            return Ok(Some(commit));
        }
    }
    Ok(None)
}

/// Collapse everything after the template root into a single commit.
///
/// The commit is authored by the first of `students`, or by `fallback` when
/// no student is known. With `overwrite_default_branch` unset the squash
/// happens on [`SQUASH_BRANCH`] and the default branch keeps its history.
/// Without a template root this logs a warning and does nothing.
pub fn combine_all_student_commits(
    handle: RepositoryHandle,
    overwrite_default_branch: bool,
    template_root_commit_hash: Option<&str>,
    students: &[Identity],
    fallback: &Identity,
) -> StagerResult<()> {
    let Some(root) = template_root_commit_hash else {
        warn!(
            path = %handle.path().display(),
            "Cannot combine student commits without a template root commit"
        );
        handle.close();
        return Ok(());
    };

    let author = students.first().unwrap_or(fallback);
    let result = squash_onto(&handle, overwrite_default_branch, root, author);
    if let Err(e) = &result {
        warn!(path = %handle.path().display(), error = %e, "Cannot combine student commits");
    }
    handle.close();
    result
}

fn squash_onto(
    handle: &RepositoryHandle,
    overwrite_default_branch: bool,
    root_hash: &str,
    author: &Identity,
) -> StagerResult<()> {
    handle.require_working_tree()?;
    let repo = handle.repo();
    let root = handle.find_commit(root_hash)?;

    if !overwrite_default_branch {
        let head = repo.head()?.peel_to_commit()?;
        repo.branch(SQUASH_BRANCH, &head, false)?;
        repo.set_head(&format!("refs/heads/{}", SQUASH_BRANCH))?;
    }

    repo.reset(root.as_object(), ResetType::Soft, None)?;

    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.update_all(["*"].iter(), None)?;
    index.write()?;
    let tree = index.write_tree()?;

    let stamp = Stamp {
        identity: author,
        when: Time::new(Utc::now().timestamp(), 0),
    };
    let message = format!("{}\n", COMBINED_COMMIT_MESSAGE);
    let oid = write_commit(repo, tree, &[root.id()], stamp, stamp, message.as_bytes())?;
    advance_head(repo, oid, "squash student commits")?;

    info!(path = %handle.path().display(), commit = %oid, "Combined student commits");
    Ok(())
}

/// Replay every commit after the template root with an anonymized identity,
/// then strip remotes, reflogs and `FETCH_HEAD`.
///
/// Timestamps, timezones and messages are kept; commits that change nothing
/// are dropped. Every failure is reported as [`StagerError::Anonymization`]
/// and leaves the repository in an undefined state, so it should be cloned
/// again.
pub fn anonymize_student_commits(
    handle: RepositoryHandle,
    template_root_commit_hash: Option<&str>,
) -> StagerResult<()> {
    let path = handle.path().to_path_buf();
    let result = match template_root_commit_hash {
        Some(root) => rewrite_with_anonymized_identity(&handle, root),
        None => Err(StagerError::MissingTemplateRoot { path: path.clone() }),
    };
    handle.close();

    result.map_err(|source| {
        warn!(path = %path.display(), error = %source, "Cannot anonymize the repository");
        StagerError::Anonymization {
            path,
            source: Box::new(source),
        }
    })
}

fn rewrite_with_anonymized_identity(handle: &RepositoryHandle, root_hash: &str) -> StagerResult<()> {
    handle.require_working_tree()?;
    let repo = handle.repo();
    let root = handle.find_commit(root_hash)?;
    let tip = repo.head()?.peel_to_commit()?;

    // A stale copy branch can only come from an aborted run
    repo.branch(COPY_BRANCH, &tip, true)?;
    repo.reset(root.as_object(), ResetType::Hard, None)?;

    let student_commits = commits_after(repo, tip.id(), root.id())?;
    let anonymized = Identity::anonymized();
    let mut rewritten = 0usize;

    for commit in &student_commits {
        let parent = repo.head()?.peel_to_commit()?;
        let mainline = if commit.parent_count() > 1 { 1 } else { 0 };

        let mut index = repo.cherrypick_commit(commit, &parent, mainline, None)?;
        if index.has_conflicts() {
            return Err(StagerError::CherryPickConflict {
                commit: commit.id().to_string(),
            });
        }
        let tree = index.write_tree_to(repo)?;
        if tree == parent.tree_id() {
            debug!(commit = %commit.id(), "Dropping commit without changes");
            continue;
        }

        // Committer time can reveal when a tutor rebased or amended the work
        let stamp = Stamp {
            identity: &anonymized,
            when: commit.author().when(),
        };
        let oid = write_commit(
            repo,
            tree,
            &[parent.id()],
            stamp,
            stamp,
            commit.message_raw_bytes(),
        )?;
        advance_head(repo, oid, "anonymize student commit")?;
        rewritten += 1;
    }

    // Index and working tree still reflect the template root
    let rewritten_tip = repo.head()?.peel_to_commit()?;
    repo.reset(rewritten_tip.as_object(), ResetType::Hard, None)?;

    repo.find_branch(COPY_BRANCH, BranchType::Local)?.delete()?;
    handle.remove_remotes()?;
    remove_history_traces(handle)?;

    info!(
        path = %handle.path().display(),
        rewritten,
        dropped = student_commits.len() - rewritten,
        "Anonymized student commits"
    );
    Ok(())
}

/// Commits reachable from `tip` up to but excluding `root`, oldest first.
fn commits_after(repo: &Repository, tip: Oid, root: Oid) -> StagerResult<Vec<Commit<'_>>> {
    let mut walk = repo.revwalk()?;
    walk.push(tip)?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

    let mut commits = Vec::new();
    for oid in walk {
        let oid = oid?;
        if oid == root {
            break;
        }
        commits.push(repo.find_commit(oid)?);
    }
    commits.reverse();
    Ok(commits)
}

/// Reflogs and `FETCH_HEAD` can reveal the remote URL and pre-rewrite commits.
fn remove_history_traces(handle: &RepositoryHandle) -> StagerResult<()> {
    let logs = handle.git_dir().join("logs");
    if logs.exists() {
        fs::remove_dir_all(&logs)?;
    }
    match fs::remove_file(handle.git_dir().join("FETCH_HEAD")) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => Ok(other?),
    }
}
