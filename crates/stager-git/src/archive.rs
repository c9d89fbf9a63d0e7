//! Zip export of a repository's HEAD snapshot, optionally with its object store

use crate::error::StagerResult;
use crate::handle::{forward_slashes, RepositoryHandle};
use git2::{FileMode, ObjectType, Oid, TreeWalkMode, TreeWalkResult};
use std::fs::File;
use std::io::{self, Cursor, Seek, Write};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ARCHIVE_SUFFIX: &str = ".zip";

/// Prefix of object-store entries in a full-history archive.
pub const GIT_DIR_ENTRY: &str = ".git";

/// Archive file name for a repository or participant name.
pub fn archive_file_name(name: &str) -> String {
    let mut file_name: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    if !file_name.ends_with(ARCHIVE_SUFFIX) {
        file_name.push_str(ARCHIVE_SUFFIX);
    }
    file_name
}

/// Zip the files of the HEAD tree. An unborn or unresolvable HEAD gives an
/// empty archive.
pub fn export_snapshot(handle: &RepositoryHandle) -> StagerResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    write_head_tree(handle, &mut writer)?;
    Ok(writer.finish()?.into_inner())
}

/// Like [`export_snapshot`], plus the whole metadata directory under `.git/`
/// so the recipient can restore the complete history.
pub fn export_with_full_history(handle: &RepositoryHandle) -> StagerResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    write_head_tree(handle, &mut writer)?;
    write_git_dir(handle, &mut writer)?;
    Ok(writer.finish()?.into_inner())
}

fn file_options(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(mode)
}

enum TreeItem {
    Directory(String),
    File { path: String, blob: Oid, mode: u32 },
}

fn write_head_tree<W: Write + Seek>(
    handle: &RepositoryHandle,
    writer: &mut ZipWriter<W>,
) -> StagerResult<()> {
    let repo = handle.repo();
    let tree = match repo.head().and_then(|head| head.peel_to_tree()) {
        Ok(tree) => tree,
        Err(e) => {
            debug!(path = %handle.path().display(), error = %e, "HEAD has no tree, exporting nothing");
            return Ok(());
        }
    };

    let mut items = Vec::new();
    tree.walk(TreeWalkMode::PreOrder, |parent, entry| {
        let Some(name) = entry.name() else {
            return TreeWalkResult::Skip;
        };
        let path = format!("{}{}", parent, name);
        match (entry.kind(), entry.filemode()) {
            (Some(ObjectType::Tree), _) => items.push(TreeItem::Directory(path)),
            (Some(ObjectType::Blob), mode) if mode == i32::from(FileMode::Link) => {
                warn!(path = %path, "Skipping symbolic link");
            }
            (Some(ObjectType::Blob), mode) => {
                let mode = if mode == i32::from(FileMode::BlobExecutable) {
                    0o755
                } else {
                    0o644
                };
                items.push(TreeItem::File {
                    path,
                    blob: entry.id(),
                    mode,
                });
            }
            // Submodule commits have no content here
            _ => {}
        }
        TreeWalkResult::Ok
    })?;

    for item in items {
        match item {
            TreeItem::Directory(path) => {
                writer.add_directory(format!("{}/", path), file_options(0o755))?;
            }
            TreeItem::File { path, blob, mode } => {
                let blob = repo.find_blob(blob)?;
                writer.start_file(path, file_options(mode))?;
                writer.write_all(blob.content())?;
            }
        }
    }
    Ok(())
}

fn write_git_dir<W: Write + Seek>(
    handle: &RepositoryHandle,
    writer: &mut ZipWriter<W>,
) -> StagerResult<()> {
    let git_dir = handle.git_dir();

    for entry in WalkDir::new(git_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let Ok(relative) = entry.path().strip_prefix(git_dir) else {
            continue;
        };
        let name = format!("{}/{}", GIT_DIR_ENTRY, forward_slashes(relative));

        if entry.file_type().is_dir() {
            writer.add_directory(format!("{}/", name), file_options(0o755))?;
        } else if entry.file_type().is_file() {
            writer.start_file(name, file_options(0o644))?;
            io::copy(&mut File::open(entry.path())?, writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::OpenOptions;
    use crate::test_support::TestRepo;
    use std::fs;
    use std::io::Read;
    use zip::ZipArchive;

    fn names(bytes: Vec<u8>) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names = archive.file_names().map(str::to_string).collect();
        names
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut content = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_archive_file_name() {
        assert_eq!(archive_file_name("Exercise 1 - ada"), "Exercise1-ada.zip");
        assert_eq!(archive_file_name("already.zip"), "already.zip");
    }

    #[test]
    fn test_snapshot_contains_head_tree_only() {
        let repo = TestRepo::new();
        repo.commit("README.md", "readme\n", "Ada", 1_000);
        repo.commit("src/main/App.java", "class App {}\n", "Ada", 2_000);
        fs::write(repo.path().join("README.md"), "uncommitted\n").unwrap();
        fs::write(repo.path().join("scratch.txt"), "untracked\n").unwrap();

        let bytes = export_snapshot(&repo.handle()).unwrap();
        let entries = names(bytes.clone());

        assert!(entries.contains(&"README.md".to_string()));
        assert!(entries.contains(&"src/".to_string()));
        assert!(entries.contains(&"src/main/".to_string()));
        assert!(entries.contains(&"src/main/App.java".to_string()));
        assert!(!entries.contains(&"scratch.txt".to_string()));
        assert!(entries.iter().all(|name| !name.starts_with(".git")));
        assert_eq!(read_entry(&bytes, "README.md"), "readme\n");
        assert_eq!(read_entry(&bytes, "src/main/App.java"), "class App {}\n");
    }

    #[test]
    fn test_snapshot_of_empty_repository() {
        let repo = TestRepo::new();
        let bytes = export_snapshot(&repo.handle()).unwrap();
        assert!(names(bytes).is_empty());
    }

    #[test]
    fn test_snapshot_of_bare_store() {
        let source = TestRepo::new();
        source.commit("a.txt", "a\n", "Ada", 1_000);
        let target = tempfile::TempDir::new().unwrap();
        let store = target.path().join("store.git");
        git2::build::RepoBuilder::new()
            .bare(true)
            .clone(source.path().to_str().unwrap(), &store)
            .unwrap();

        let handle = RepositoryHandle::open(&OpenOptions::new(&store).bare(true)).unwrap();
        let bytes = export_snapshot(&handle).unwrap();
        assert_eq!(read_entry(&bytes, "a.txt"), "a\n");
    }

    #[test]
    fn test_full_history_includes_object_store() {
        let repo = TestRepo::new();
        repo.commit("src/lib.rs", "pub fn f() {}\n", "Ada", 1_000);

        let bytes = export_with_full_history(&repo.handle()).unwrap();
        let entries = names(bytes.clone());

        assert!(entries.contains(&"src/lib.rs".to_string()));
        assert!(entries.contains(&".git/HEAD".to_string()));
        assert!(entries.contains(&".git/objects/".to_string()));
        assert!(entries.iter().any(|name| name.starts_with(".git/objects/") && !name.ends_with('/')));
        assert!(entries.iter().all(|name| !name.contains('\\')));
        assert_eq!(read_entry(&bytes, ".git/HEAD"), "ref: refs/heads/main\n");
    }
}
