//! Throwaway repositories for unit tests

use crate::handle::{OpenOptions, RepositoryHandle};
use git2::build::CheckoutBuilder;
use git2::{Commit, Oid, Repository, RepositoryInitOptions, Signature, Time};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub const ORIGIN_URL: &str = "https://vcs.example.com/course/exercise-ada.git";

pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Empty non-bare repository whose HEAD points at `main`.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut options = RepositoryInitOptions::new();
        options.initial_head("main");
        Repository::init_opts(dir.path(), &options).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A fresh git2 handle, so tests never hold the store across pipeline calls.
    pub fn open(&self) -> Repository {
        Repository::open(self.path()).unwrap()
    }

    pub fn handle(&self) -> RepositoryHandle {
        RepositoryHandle::open(&OpenOptions::new(self.path())).unwrap()
    }

    /// Write `content` to `file`, stage it and commit on HEAD at `seconds`
    /// (UTC+01:00) as `author`.
    pub fn commit(&self, file: &str, content: &str, author: &str, seconds: i64) -> Oid {
        let repo = self.open();
        let target = self.path().join(file);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&target, content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(file)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

        let email = format!("{}@example.com", author.to_lowercase());
        let signature = Signature::new(author, &email, &Time::new(seconds, 60)).unwrap();
        let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();

        let oid = repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                &format!("Update {}", file),
                &tree,
                &parents,
            )
            .unwrap();
        oid
    }

    /// Commit on HEAD whose tree equals its parent's.
    pub fn empty_commit(&self, author: &str, seconds: i64) -> Oid {
        let repo = self.open();
        let parent = repo.head().unwrap().peel_to_commit().unwrap();
        let email = format!("{}@example.com", author.to_lowercase());
        let signature = Signature::new(author, &email, &Time::new(seconds, 60)).unwrap();
        let tree = parent.tree().unwrap();
        let oid = repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                "Nothing changed",
                &tree,
                &[&parent],
            )
            .unwrap();
        oid
    }

    /// Commit `files` on top of the first parent's tree without touching the
    /// working tree. With `update_head` the checked-out branch moves to the
    /// new commit, which then needs HEAD as its first parent.
    pub fn commit_tree(
        &self,
        parents: &[Oid],
        files: &[(&str, &str)],
        author: &str,
        seconds: i64,
        update_head: bool,
    ) -> Oid {
        let repo = self.open();
        let parents: Vec<Commit<'_>> = parents
            .iter()
            .map(|id| repo.find_commit(*id).unwrap())
            .collect();
        let base = parents[0].tree().unwrap();
        let mut builder = repo.treebuilder(Some(&base)).unwrap();
        for (file, content) in files {
            let blob = repo.blob(content.as_bytes()).unwrap();
            builder.insert(file, blob, 0o100644).unwrap();
        }
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();

        let email = format!("{}@example.com", author.to_lowercase());
        let signature = Signature::new(author, &email, &Time::new(seconds, 60)).unwrap();
        let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();
        let oid = repo
            .commit(
                update_head.then_some("HEAD"),
                &signature,
                &signature,
                "Combine work",
                &tree,
                &parent_refs,
            )
            .unwrap();
        if update_head {
            repo.checkout_head(Some(CheckoutBuilder::new().force())).unwrap();
        }
        oid
    }

    /// Configure an `origin` remote with a tracking ref and a FETCH_HEAD file,
    /// the leftovers of a clone.
    pub fn add_origin(&self) {
        let repo = self.open();
        repo.remote("origin", ORIGIN_URL).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap().id();
        repo.reference("refs/remotes/origin/main", head, true, "clone")
            .unwrap();
        fs::write(
            repo.path().join("FETCH_HEAD"),
            format!("{}\t\tbranch 'main' of {}\n", head, ORIGIN_URL),
        )
        .unwrap();
    }

    pub fn read(&self, file: &str) -> String {
        fs::read_to_string(self.path().join(file)).unwrap()
    }
}
