//! Unified diffs between two commits and their change totals

use crate::error::StagerResult;
use crate::handle::RepositoryHandle;
use git2::{DiffFindOptions, DiffFormat, DiffOptions};
use stager_diff::{extract_diff_entries, total_changed_lines, DiffEntry, ParseOptions};

/// Patch text from `old` to `new` in `git diff` format, with renames detected.
pub fn diff_commits(handle: &RepositoryHandle, old: &str, new: &str) -> StagerResult<String> {
    let repo = handle.repo();
    let old_tree = handle.find_commit(old)?.tree()?;
    let new_tree = handle.find_commit(new)?.tree()?;

    let mut options = DiffOptions::new();
    options.context_lines(3);
    let mut diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut options))?;
    diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;

    let mut patch = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        if matches!(line.origin(), '+' | '-' | ' ') {
            patch.push(line.origin());
        }
        patch.push_str(&String::from_utf8_lossy(line.content()));
        true
    })?;
    Ok(patch)
}

/// Parsed change entries between two commits.
pub fn diff_entries(
    handle: &RepositoryHandle,
    old: &str,
    new: &str,
    options: ParseOptions,
) -> StagerResult<Vec<DiffEntry>> {
    let patch = diff_commits(handle, old, new)?;
    Ok(extract_diff_entries(
        &patch,
        options.use_absolute_line_count,
        options.ignore_whitespace,
    ))
}

/// Added plus removed lines between two commits.
pub fn count_changed_lines(handle: &RepositoryHandle, old: &str, new: &str) -> StagerResult<usize> {
    let options = ParseOptions {
        use_absolute_line_count: true,
        ignore_whitespace: false,
    };
    Ok(total_changed_lines(&diff_entries(handle, old, new, options)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;
    use std::fs;

    #[test]
    fn test_diff_commits_renders_git_patch() {
        let repo = TestRepo::new();
        let old = repo.commit("foo.txt", "old line\nunchanged\n", "Ada", 1_000);
        let new = repo.commit("foo.txt", "new line\nunchanged\n", "Ada", 2_000);
        let handle = repo.handle();

        let patch = diff_commits(&handle, &old.to_string(), &new.to_string()).unwrap();
        assert!(patch.contains("--- a/foo.txt\n+++ b/foo.txt\n"));
        assert!(patch.contains("@@ -1,2 +1,2 @@"));
        assert!(patch.contains("-old line\n+new line\n unchanged\n"));

        let entries = diff_entries(
            &handle,
            &old.to_string(),
            &new.to_string(),
            ParseOptions::default(),
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_path.as_deref(), Some("foo.txt"));
        assert_eq!(entries[0].start_line, Some(1));
        assert_eq!(entries[0].previous_line_count, Some(1));
    }

    #[test]
    fn test_count_changed_lines() {
        let repo = TestRepo::new();
        let old = repo.commit("a.txt", "one\ntwo\n", "Ada", 1_000);
        repo.commit("a.txt", "one\nTWO\nthree\n", "Ada", 2_000);
        let new = repo.commit("b.txt", "x\ny\n", "Ada", 3_000);

        let count = count_changed_lines(&repo.handle(), &old.to_string(), &new.to_string()).unwrap();
        // a.txt: one removed, two added; b.txt: two added
        assert_eq!(count, 5);
    }

    #[test]
    fn test_rename_is_reported_as_path_pair() {
        let repo = TestRepo::new();
        let content = "line\n".repeat(20);
        let old = repo.commit("before.txt", &content, "Ada", 1_000);
        {
            let git = repo.open();
            fs::rename(repo.path().join("before.txt"), repo.path().join("after.txt")).unwrap();
            let mut index = git.index().unwrap();
            index.remove_path(std::path::Path::new("before.txt")).unwrap();
            index.write().unwrap();
        }
        let new = repo.commit("after.txt", &content, "Ada", 2_000);

        let entries = diff_entries(
            &repo.handle(),
            &old.to_string(),
            &new.to_string(),
            ParseOptions::default(),
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].previous_file_path.as_deref(), Some("before.txt"));
        assert_eq!(entries[0].file_path.as_deref(), Some("after.txt"));
        assert!(entries[0].is_rename_marker());
    }
}
