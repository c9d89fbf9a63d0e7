//! Scoped access to one on-disk git store

use crate::error::{StagerError, StagerResult};
use chrono::{DateTime, FixedOffset, TimeZone};
use git2::build::CheckoutBuilder;
use git2::{Commit, ConfigLevel, ErrorCode, Repository, Signature, Sort, StatusOptions};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_REMOTE: &str = "origin";
const REMOTE_REFS_PREFIX: &str = "refs/remotes/";

/// How a repository should be opened.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub path: PathBuf,
    pub remote_uri: Option<String>,
    pub default_branch: String,
    pub remote_name: String,
    pub bare: bool,
    /// Write the safe-default settings and relink HEAD on open
    pub write_access: bool,
}

impl OpenOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            remote_uri: None,
            default_branch: DEFAULT_BRANCH.to_string(),
            remote_name: DEFAULT_REMOTE.to_string(),
            bare: false,
            write_access: false,
        }
    }

    pub fn remote_uri(mut self, uri: impl Into<String>) -> Self {
        self.remote_uri = Some(uri.into());
        self
    }

    pub fn default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    pub fn remote_name(mut self, name: impl Into<String>) -> Self {
        self.remote_name = name.into();
        self
    }

    pub fn bare(mut self, bare: bool) -> Self {
        self.bare = bare;
        self
    }

    pub fn write_access(mut self, write_access: bool) -> Self {
        self.write_access = write_access;
        self
    }
}

/// Exclusive owner of an opened git store.
///
/// The store is released when the handle is dropped or [`close`](Self::close)d.
/// Pipeline operations consume the handle, so the store is always released
/// before they return.
pub struct RepositoryHandle {
    repo: Repository,
    path: PathBuf,
    remote_uri: Option<String>,
    default_branch: String,
}

impl fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryHandle")
            .field("path", &self.path)
            .field("remote_uri", &self.remote_uri)
            .field("default_branch", &self.default_branch)
            .field("bare", &self.repo.is_bare())
            .finish_non_exhaustive()
    }
}

/// Name, email and time of a commit author or committer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Person {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch
    pub timestamp: i64,
    pub offset_minutes: i32,
}

impl Person {
    fn from_signature(signature: &Signature<'_>) -> Self {
        let when = signature.when();
        Self {
            name: String::from_utf8_lossy(signature.name_bytes()).into_owned(),
            email: String::from_utf8_lossy(signature.email_bytes()).into_owned(),
            timestamp: when.seconds(),
            offset_minutes: when.offset_minutes(),
        }
    }

    /// The timestamp in the signer's own timezone.
    pub fn when(&self) -> Option<DateTime<FixedOffset>> {
        FixedOffset::east_opt(self.offset_minutes * 60)?
            .timestamp_opt(self.timestamp, 0)
            .single()
    }
}

/// Read-only snapshot of one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRef {
    pub id: String,
    pub author: Person,
    pub committer: Person,
    pub message: String,
    pub parents: Vec<String>,
}

impl CommitRef {
    pub fn from_commit(commit: &Commit<'_>) -> Self {
        Self {
            id: commit.id().to_string(),
            author: Person::from_signature(&commit.author()),
            committer: Person::from_signature(&commit.committer()),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            parents: commit.parent_ids().map(|id| id.to_string()).collect(),
        }
    }
}

impl RepositoryHandle {
    pub fn open(options: &OpenOptions) -> StagerResult<Self> {
        let repo = if options.bare {
            Repository::open_bare(&options.path)?
        } else {
            Repository::open(&options.path)?
        };

        let handle = Self {
            repo,
            path: options.path.clone(),
            remote_uri: options.remote_uri.clone(),
            default_branch: options.default_branch.clone(),
        };

        if options.write_access {
            handle.apply_safe_defaults(&options.remote_name)?;
        }

        debug!(
            path = %handle.path.display(),
            bare = handle.is_bare(),
            write_access = options.write_access,
            "Opened repository"
        );
        Ok(handle)
    }

    /// Release the store. Equivalent to dropping the handle.
    pub fn close(self) {
        debug!(path = %self.path.display(), "Closing repository");
    }

    fn apply_safe_defaults(&self, remote_name: &str) -> StagerResult<()> {
        let mut config = self.repo.config()?.open_level(ConfigLevel::Local)?;
        config.set_i32("gc.auto", 0)?;
        config.set_bool("gc.autoDetach", false)?;
        config.set_i32("gc.autoPackLimit", 0)?;
        config.set_bool("receive.autogc", false)?;
        // Symlinks in student repositories could point outside the checkout
        config.set_bool("core.symlinks", false)?;
        config.set_bool("commit.gpgSign", false)?;

        let branch = &self.default_branch;
        config.set_str(&format!("branch.{}.remote", branch), remote_name)?;
        config.set_str(
            &format!("branch.{}.merge", branch),
            &format!("refs/heads/{}", branch),
        )?;

        if let Some(uri) = &self.remote_uri {
            if let Ok(remote) = self.repo.find_remote(remote_name) {
                if remote.url() != Some(uri.as_str()) {
                    self.repo.remote_set_url(remote_name, uri)?;
                }
            }
        }

        self.repo.set_head(&self.default_branch_ref())?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The metadata directory (`.git` for working copies, the store itself when bare).
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    pub fn remote_uri(&self) -> Option<&str> {
        self.remote_uri.as_deref()
    }

    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    pub fn is_bare(&self) -> bool {
        self.repo.is_bare()
    }

    pub(crate) fn repo(&self) -> &Repository {
        &self.repo
    }

    pub(crate) fn default_branch_ref(&self) -> String {
        format!("refs/heads/{}", self.default_branch)
    }

    pub(crate) fn require_working_tree(&self) -> StagerResult<&Path> {
        self.repo.workdir().ok_or_else(|| StagerError::BareRepository {
            path: self.path.clone(),
        })
    }

    /// Id of the commit HEAD points at, or `None` for an unborn branch.
    pub fn head_commit_id(&self) -> StagerResult<Option<String>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?.id().to_string())),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn resolve_commit(&self, hash: &str) -> StagerResult<CommitRef> {
        Ok(CommitRef::from_commit(&self.find_commit(hash)?))
    }

    pub(crate) fn find_commit(&self, hash: &str) -> StagerResult<Commit<'_>> {
        let not_found = |e: git2::Error| match e.code() {
            ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::Ambiguous => {
                StagerError::CommitNotFound(hash.to_string())
            }
            _ => StagerError::Git(e),
        };
        let object = self.repo.revparse_single(hash).map_err(not_found)?;
        object
            .peel_to_commit()
            .map_err(|_| StagerError::CommitNotFound(hash.to_string()))
    }

    /// Commits reachable from HEAD, newest first.
    pub fn commit_log(&self) -> StagerResult<Vec<CommitRef>> {
        if self.head_commit_id()?.is_none() {
            return Ok(Vec::new());
        }

        let mut walk = self.repo.revwalk()?;
        walk.push_head()?;
        walk.set_sorting(Sort::TIME)?;

        walk.map(|oid| -> StagerResult<CommitRef> {
            let commit = self.repo.find_commit(oid?)?;
            Ok(CommitRef::from_commit(&commit))
        })
        .collect()
    }

    /// Working-tree files relative to the repository root, sorted.
    pub fn list_files(&self) -> StagerResult<Vec<String>> {
        let root = self.require_working_tree()?;

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git");

        for entry in walker {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.path_is_symlink() {
                warn!(path = %entry.path().display(), "Skipping symbolic link");
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(root) {
                files.push(forward_slashes(relative));
            }
        }

        files.sort();
        Ok(files)
    }

    pub fn is_working_copy_clean(&self) -> StagerResult<bool> {
        self.require_working_tree()?;
        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        Ok(self.repo.statuses(Some(&mut options))?.is_empty())
    }

    /// Check out `hash` with a detached HEAD, discarding local changes.
    pub fn checkout_commit(&self, hash: &str) -> StagerResult<()> {
        self.require_working_tree()?;
        let commit = self.find_commit(hash)?;
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        self.repo.set_head_detached(commit.id())?;
        Ok(())
    }

    pub fn switch_to_default_branch(&self) -> StagerResult<()> {
        self.require_working_tree()?;
        let reference = self.default_branch_ref();
        let target = self.repo.revparse_single(&reference)?;
        self.repo
            .checkout_tree(&target, Some(CheckoutBuilder::new().force()))?;
        self.repo.set_head(&reference)?;
        Ok(())
    }

    /// Delete every configured remote and all remote-tracking references.
    pub fn remove_remotes(&self) -> StagerResult<()> {
        let remotes = self.repo.remotes()?;
        for name in remotes.iter().flatten() {
            debug!(path = %self.path.display(), remote = name, "Removing remote");
            self.repo.remote_delete(name)?;
        }

        // Refs of remotes that were deleted earlier survive remote_delete
        let leftovers = remote_tracking_refs(&self.repo)?;
        for name in leftovers {
            self.repo.find_reference(&name)?.delete()?;
        }
        Ok(())
    }
}

pub(crate) fn remote_tracking_refs(repo: &Repository) -> Result<Vec<String>, git2::Error> {
    let mut names = Vec::new();
    for reference in repo.references()? {
        let reference = reference?;
        if let Some(name) = reference.name() {
            if name.starts_with(REMOTE_REFS_PREFIX) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

pub(crate) fn forward_slashes(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;
    use std::fs;

    #[test]
    fn test_open_with_write_access_applies_safe_defaults() {
        let repo = TestRepo::new();
        repo.commit("README.md", "hello\n", "Ada", 1_000);

        let handle = RepositoryHandle::open(
            &OpenOptions::new(repo.path()).write_access(true),
        )
        .unwrap();
        handle.close();

        let config = repo.open().config().unwrap().snapshot().unwrap();
        assert_eq!(config.get_i32("gc.auto").unwrap(), 0);
        assert!(!config.get_bool("gc.autoDetach").unwrap());
        assert_eq!(config.get_i32("gc.autoPackLimit").unwrap(), 0);
        assert!(!config.get_bool("receive.autogc").unwrap());
        assert!(!config.get_bool("core.symlinks").unwrap());
        assert!(!config.get_bool("commit.gpgSign").unwrap());
        assert_eq!(config.get_str("branch.main.remote").unwrap(), "origin");
        assert_eq!(config.get_str("branch.main.merge").unwrap(), "refs/heads/main");
    }

    #[test]
    fn test_write_access_relinks_head_to_default_branch() {
        let repo = TestRepo::new();
        let first = repo.commit("a.txt", "a\n", "Ada", 1_000);
        {
            let git = repo.open();
            let commit = git.find_commit(first).unwrap();
            git.branch("feature", &commit, false).unwrap();
            git.set_head("refs/heads/feature").unwrap();
        }

        RepositoryHandle::open(&OpenOptions::new(repo.path()).write_access(true)).unwrap();

        let git = repo.open();
        let head = git.find_reference("HEAD").unwrap();
        assert_eq!(head.symbolic_target(), Some("refs/heads/main"));
    }

    #[test]
    fn test_read_only_open_leaves_config_alone() {
        let repo = TestRepo::new();
        repo.commit("a.txt", "a\n", "Ada", 1_000);

        RepositoryHandle::open(&OpenOptions::new(repo.path())).unwrap();

        let config = repo.open().config().unwrap().snapshot().unwrap();
        assert!(config.get_i32("gc.auto").is_err());
    }

    #[test]
    fn test_open_missing_path_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = RepositoryHandle::open(&OpenOptions::new(dir.path().join("nothing")));
        assert!(matches!(result, Err(StagerError::Git(_))));
    }

    #[test]
    fn test_open_bare_store() {
        let dir = tempfile::TempDir::new().unwrap();
        Repository::init_bare(dir.path()).unwrap();

        let handle = RepositoryHandle::open(&OpenOptions::new(dir.path()).bare(true)).unwrap();
        assert!(handle.is_bare());
        assert_eq!(handle.head_commit_id().unwrap(), None);
        assert!(matches!(
            handle.list_files(),
            Err(StagerError::BareRepository { .. })
        ));
    }

    #[test]
    fn test_bare_store_detected_without_flag() {
        let dir = tempfile::TempDir::new().unwrap();
        Repository::init_bare(dir.path()).unwrap();

        let handle = RepositoryHandle::open(&OpenOptions::new(dir.path())).unwrap();
        assert!(handle.is_bare());
        assert!(matches!(
            handle.require_working_tree(),
            Err(StagerError::BareRepository { .. })
        ));
    }

    #[test]
    fn test_commit_log_newest_first() {
        let repo = TestRepo::new();
        let first = repo.commit("a.txt", "one\n", "Ada", 1_000);
        let second = repo.commit("a.txt", "two\n", "Grace", 2_000);

        let handle = repo.handle();
        let log = handle.commit_log().unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, second.to_string());
        assert_eq!(log[0].parents, vec![first.to_string()]);
        assert_eq!(log[0].author.name, "Grace");
        assert_eq!(log[0].author.timestamp, 2_000);
        assert_eq!(log[1].id, first.to_string());
        assert!(log[1].parents.is_empty());
        assert_eq!(handle.head_commit_id().unwrap(), Some(second.to_string()));
    }

    #[test]
    fn test_commit_log_of_empty_repository() {
        let repo = TestRepo::new();
        assert!(repo.handle().commit_log().unwrap().is_empty());
    }

    #[test]
    fn test_person_when_uses_signer_offset() {
        let repo = TestRepo::new();
        let oid = repo.commit("a.txt", "a\n", "Ada", 1_000);

        let commit = repo.handle().resolve_commit(&oid.to_string()).unwrap();
        let when = commit.author.when().unwrap();
        assert_eq!(when.timestamp(), 1_000);
        assert_eq!(when.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_resolve_unknown_commit() {
        let repo = TestRepo::new();
        repo.commit("a.txt", "a\n", "Ada", 1_000);
        let handle = repo.handle();

        let missing = handle.resolve_commit("0123456789abcdef0123456789abcdef01234567");
        assert!(matches!(missing, Err(StagerError::CommitNotFound(_))));
        let garbage = handle.resolve_commit("no-such-branch");
        assert!(matches!(garbage, Err(StagerError::CommitNotFound(_))));
    }

    #[test]
    fn test_list_files_skips_git_dir_and_symlinks() {
        let repo = TestRepo::new();
        repo.commit("src/lib.rs", "fn main() {}\n", "Ada", 1_000);
        repo.commit("README.md", "hi\n", "Ada", 2_000);
        fs::write(repo.path().join("untracked.txt"), "new\n").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("/etc/passwd", repo.path().join("link")).unwrap();

        let files = repo.handle().list_files().unwrap();
        assert_eq!(files, vec!["README.md", "src/lib.rs", "untracked.txt"]);
    }

    #[test]
    fn test_working_copy_cleanliness() {
        let repo = TestRepo::new();
        repo.commit("a.txt", "a\n", "Ada", 1_000);
        let handle = repo.handle();
        assert!(handle.is_working_copy_clean().unwrap());

        fs::write(repo.path().join("a.txt"), "changed\n").unwrap();
        assert!(!handle.is_working_copy_clean().unwrap());
    }

    #[test]
    fn test_checkout_commit_and_back() {
        let repo = TestRepo::new();
        let first = repo.commit("a.txt", "one\n", "Ada", 1_000);
        repo.commit("a.txt", "two\n", "Ada", 2_000);
        let handle = repo.handle();

        handle.checkout_commit(&first.to_string()).unwrap();
        assert_eq!(fs::read_to_string(repo.path().join("a.txt")).unwrap(), "one\n");
        assert_eq!(handle.head_commit_id().unwrap(), Some(first.to_string()));

        handle.switch_to_default_branch().unwrap();
        assert_eq!(fs::read_to_string(repo.path().join("a.txt")).unwrap(), "two\n");
        assert!(!handle.repo().head_detached().unwrap());
    }

    #[test]
    fn test_remove_remotes_clears_tracking_refs() {
        let repo = TestRepo::new();
        repo.commit("a.txt", "a\n", "Ada", 1_000);
        repo.add_origin();
        let handle = repo.handle();

        handle.remove_remotes().unwrap();

        assert!(handle.repo().remotes().unwrap().is_empty());
        assert!(remote_tracking_refs(handle.repo()).unwrap().is_empty());
    }

    #[test]
    fn test_forward_slashes() {
        let path = Path::new("src").join("nested").join("file.rs");
        assert_eq!(forward_slashes(&path), "src/nested/file.rs");
    }
}
