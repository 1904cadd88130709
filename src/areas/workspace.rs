//! Working directory provider and applier
//!
//! Enumerates the live file hierarchy for the walker, answers stat and
//! content-hash questions for the modified check, and executes the planned
//! updates and removals:
//!
//! - new content is written to a sibling temporary file and renamed over
//!   the target, with one delete-and-retry if the rename fails
//! - removed files have their now-empty parent directories pruned up to
//!   the workspace root

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IGNORED_PATHS: [&str; 3] = [".twig", ".", ".."];

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Enumerate every live entry (files, directories, symlinks) in
    /// traversal order: each directory before its contents, siblings by
    /// name
    pub fn list_entries(&self) -> anyhow::Result<Vec<(PathBuf, EntryMetadata)>> {
        let mut entries = Vec::new();

        for entry in WalkDir::new(&self.path)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !Self::is_ignored(e.path()))
        {
            let entry = entry?;
            let rel = entry
                .path()
                .strip_prefix(self.path.as_ref())
                .map(Path::to_path_buf)
                .context("Workspace entry outside the workspace root")?;
            let metadata = self.stat_abs(entry.path())?;
            entries.push((rel, metadata));
        }

        Ok(entries)
    }

    /// Relative paths of every file beneath `dir_path`, recursively
    ///
    /// Used to enumerate the contents of a directory that is in the way of
    /// a planned file.
    pub fn files_under(&self, dir_path: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let root = self.path.join(dir_path);
        let mut files = Vec::new();

        for entry in WalkDir::new(&root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !Self::is_ignored(e.path()))
        {
            let entry = entry?;
            if !entry.file_type().is_dir() {
                files.push(
                    entry
                        .path()
                        .strip_prefix(self.path.as_ref())
                        .map(Path::to_path_buf)
                        .context("Workspace entry outside the workspace root")?,
                );
            }
        }

        Ok(files)
    }

    fn is_ignored(path: &Path) -> bool {
        path.components().any(|component| {
            if let std::path::Component::Normal(name) = component {
                let name_str = name.to_string_lossy();
                IGNORED_PATHS.contains(&name_str.as_ref())
            } else {
                false
            }
        })
    }

    /// Stat a path relative to the workspace root, without following
    /// symlinks; `None` if nothing exists there
    pub fn stat(&self, file_path: &Path) -> anyhow::Result<Option<EntryMetadata>> {
        let abs = self.path.join(file_path);
        match std::fs::symlink_metadata(&abs) {
            Ok(_) => Ok(Some(self.stat_abs(&abs)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to stat {}", abs.display())),
        }
    }

    fn stat_abs(&self, abs: &Path) -> anyhow::Result<EntryMetadata> {
        let metadata = std::fs::symlink_metadata(abs)
            .with_context(|| format!("Failed to stat {}", abs.display()))?;

        (abs, metadata).try_into()
    }

    /// Content bytes of a working entry: file contents, or the link target
    /// for a symlink
    pub fn read_entry(&self, file_path: &Path) -> anyhow::Result<Bytes> {
        let abs = self.path.join(file_path);
        let metadata = std::fs::symlink_metadata(&abs)?;

        if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&abs)?;
            Ok(Bytes::from(target.to_string_lossy().into_owned().into_bytes()))
        } else {
            let content = std::fs::read(&abs)
                .with_context(|| format!("Failed to read {}", abs.display()))?;
            Ok(Bytes::from(content))
        }
    }

    /// Content id a working entry would hash to
    pub fn hash_entry(&self, file_path: &Path) -> anyhow::Result<ObjectId> {
        Blob::new(self.read_entry(file_path)?).object_id()
    }

    /// Whether the filesystem can represent the executable bit
    pub fn supports_file_mode(&self) -> bool {
        cfg!(unix)
    }

    /// Nearest existing ancestor of `file_path` that is not a directory,
    /// if any; such an ancestor blocks creating the path
    pub fn blocking_ancestor(&self, file_path: &Path) -> anyhow::Result<Option<PathBuf>> {
        let Some(parent) = file_path.parent() else {
            return Ok(None);
        };

        for ancestor in parent.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }

            match std::fs::symlink_metadata(self.path.join(ancestor)) {
                Ok(metadata) if metadata.is_dir() => break,
                Ok(_) => return Ok(Some(ancestor.to_path_buf())),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(None)
    }

    /// Materialize an entry: write content via a sibling temporary file and
    /// rename it over the target, retrying once after deleting whatever is
    /// in the way. Returns the fresh stat of the written entry so the index
    /// can record it.
    pub fn write_entry(
        &self,
        file_path: &Path,
        content: &[u8],
        mode: &EntryMode,
        respect_file_mode: bool,
    ) -> anyhow::Result<EntryMetadata> {
        let target = self.path.join(file_path);
        let parent = target
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Entry path has no parent: {}", target.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directories for {}", target.display()))?;

        match mode {
            EntryMode::Symlink => self.write_symlink(&target, content)?,
            EntryMode::Gitlink => {
                // submodule roots get a placeholder directory, never content
                std::fs::create_dir_all(&target)
                    .with_context(|| format!("Failed to create {}", target.display()))?;
            }
            _ => self.write_file(&target, parent, content, mode, respect_file_mode)?,
        }

        self.stat_abs(&target)
    }

    fn write_file(
        &self,
        target: &Path,
        parent: &Path,
        content: &[u8],
        mode: &EntryMode,
        respect_file_mode: bool,
    ) -> anyhow::Result<()> {
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
        temp.write_all(content)
            .with_context(|| format!("Failed to write content for {}", target.display()))?;

        #[cfg(unix)]
        if respect_file_mode && self.supports_file_mode() {
            use std::os::unix::fs::PermissionsExt;
            let bits = if mode.is_executable() { 0o755 } else { 0o644 };
            temp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(bits))
                .with_context(|| format!("Failed to set permissions for {}", target.display()))?;
        }
        #[cfg(not(unix))]
        let _ = (mode, respect_file_mode);

        if let Err(persist_error) = temp.persist(target) {
            tracing::warn!(target_path = %target.display(), "rename failed, removing target and retrying");
            Self::remove_in_the_way(target)?;
            let _ = persist_error
                .file
                .persist(target)
                .with_context(|| format!("Failed to write {}", target.display()))?;
        }

        Ok(())
    }

    #[cfg(unix)]
    fn write_symlink(&self, target: &Path, content: &[u8]) -> anyhow::Result<()> {
        use std::os::unix::ffi::OsStrExt;

        Self::remove_in_the_way(target)?;
        let link_target = Path::new(std::ffi::OsStr::from_bytes(content));
        std::os::unix::fs::symlink(link_target, target)
            .with_context(|| format!("Failed to create symlink {}", target.display()))?;

        Ok(())
    }

    #[cfg(not(unix))]
    fn write_symlink(&self, target: &Path, content: &[u8]) -> anyhow::Result<()> {
        // no symlink support: materialize the link target as file content
        std::fs::write(target, content)
            .with_context(|| format!("Failed to write {}", target.display()))?;

        Ok(())
    }

    fn remove_in_the_way(target: &Path) -> anyhow::Result<()> {
        match std::fs::symlink_metadata(target) {
            Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(target)
                .with_context(|| format!("Failed to remove directory {}", target.display())),
            Ok(_) => std::fs::remove_file(target)
                .with_context(|| format!("Failed to remove {}", target.display())),
            // nothing there, or an ancestor is a file: nothing to remove
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an entry and prune every now-empty parent directory up to
    /// the workspace root
    pub fn remove_entry(&self, file_path: &Path) -> anyhow::Result<()> {
        Self::remove_in_the_way(&self.path.join(file_path))?;
        self.prune_empty_parents(file_path)
    }

    fn prune_empty_parents(&self, file_path: &Path) -> anyhow::Result<()> {
        for ancestor in file_path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }

            let abs = self.path.join(ancestor);
            match std::fs::read_dir(&abs) {
                Ok(mut dir_entries) => {
                    if dir_entries.next().is_none() {
                        std::fs::remove_dir(&abs)
                            .with_context(|| format!("Failed to prune {}", abs.display()))?;
                    } else {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                // an ancestor that exists as a file is not ours to prune
                Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use assert_fs::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let workspace = Workspace::new(dir.path().into());
        (dir, workspace)
    }

    #[test]
    fn list_entries_orders_directories_before_their_contents() {
        let (dir, workspace) = workspace();
        std::fs::create_dir(dir.path().join("d")).unwrap();
        std::fs::write(dir.path().join("d/x"), "x").unwrap();
        std::fs::write(dir.path().join("db"), "db").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();

        let paths: Vec<_> = workspace
            .list_entries()
            .unwrap()
            .into_iter()
            .map(|(path, _)| path)
            .collect();

        pretty_assertions::assert_eq!(
            paths,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("d"),
                PathBuf::from("d/x"),
                PathBuf::from("db"),
            ]
        );
    }

    #[test]
    fn list_entries_skips_the_metadata_directory() {
        let (dir, workspace) = workspace();
        std::fs::create_dir(dir.path().join(".twig")).unwrap();
        std::fs::write(dir.path().join(".twig/index"), "").unwrap();
        std::fs::write(dir.path().join("tracked"), "t").unwrap();

        let paths: Vec<_> = workspace
            .list_entries()
            .unwrap()
            .into_iter()
            .map(|(path, _)| path)
            .collect();

        pretty_assertions::assert_eq!(paths, vec![PathBuf::from("tracked")]);
    }

    #[test]
    fn write_entry_replaces_a_directory_in_the_way() {
        let (dir, workspace) = workspace();
        std::fs::create_dir_all(dir.path().join("spot/nested")).unwrap();
        std::fs::write(dir.path().join("spot/nested/file"), "old").unwrap();

        let metadata = workspace
            .write_entry(
                Path::new("spot"),
                b"new content",
                &FileMode::Regular.into(),
                true,
            )
            .unwrap();

        pretty_assertions::assert_eq!(metadata.mode, EntryMode::File(FileMode::Regular));
        pretty_assertions::assert_eq!(
            std::fs::read_to_string(dir.path().join("spot")).unwrap(),
            "new content"
        );
    }

    #[cfg(unix)]
    #[test]
    fn write_entry_sets_and_clears_the_executable_bit() {
        use std::os::unix::fs::PermissionsExt;
        let (dir, workspace) = workspace();

        workspace
            .write_entry(Path::new("tool"), b"#!/bin/sh\n", &FileMode::Executable.into(), true)
            .unwrap();
        let mode = std::fs::metadata(dir.path().join("tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);

        workspace
            .write_entry(Path::new("tool"), b"plain\n", &FileMode::Regular.into(), true)
            .unwrap();
        let mode = std::fs::metadata(dir.path().join("tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0);
    }

    #[test]
    fn remove_entry_prunes_empty_parents_but_not_the_root() {
        let (dir, workspace) = workspace();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::write(dir.path().join("a/b/c/file"), "f").unwrap();
        std::fs::write(dir.path().join("a/keep"), "k").unwrap();

        workspace.remove_entry(Path::new("a/b/c/file")).unwrap();

        assert!(!dir.path().join("a/b").exists());
        assert!(dir.path().join("a/keep").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn blocking_ancestor_finds_a_file_in_the_path() {
        let (dir, workspace) = workspace();
        std::fs::write(dir.path().join("blocker"), "file").unwrap();

        let found = workspace
            .blocking_ancestor(Path::new("blocker/nested/entry"))
            .unwrap();
        pretty_assertions::assert_eq!(found, Some(PathBuf::from("blocker")));

        let clear = workspace.blocking_ancestor(Path::new("open/nested/entry")).unwrap();
        pretty_assertions::assert_eq!(clear, None);
    }
}
