//! Index store (staging area)
//!
//! The index tracks the staged snapshot of paths, each entry carrying a
//! conflict stage and stat metadata. This module owns loading the persisted
//! file and the lock/commit protocol used to replace it:
//!
//! ```text
//! Unlocked --lock()--> Locked --commit()--> Committed (atomic rename)
//!                        \------unlock()/drop--> Aborted (lockfile removed)
//! ```
//!
//! The lockfile (`<index>.lock`) doubles as the write buffer: its exclusive
//! creation is the lock acquisition, the new snapshot is written into it,
//! and the rename over the index both publishes the snapshot and releases
//! the lock in one step. A concurrent writer fails fast instead of
//! blocking.

use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{
    ENTRY_BLOCK, ENTRY_MIN_SIZE, EntryKey, IndexEntry, Stage,
};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::reconcile::error::ReconcileError;
use anyhow::{Context, anyhow};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::ops::DerefMut;
use std::path::{Path, PathBuf};

/// Staged snapshot of paths
///
/// Entries are kept sorted by (path, stage). At most one stage-0 entry
/// exists per path, and stage 1-3 entries exclude a stage-0 entry at the
/// same path.
#[derive(Debug, Clone)]
pub struct Index {
    /// Path to the index file
    path: Box<Path>,
    /// Tracked entries keyed by (path, stage)
    entries: BTreeMap<EntryKey, IndexEntry>,
}

impl Index {
    pub fn new(path: Box<Path>) -> Self {
        Index {
            path,
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the index from disk
    ///
    /// Parses the header and entries and verifies the trailing checksum.
    /// A missing or empty file loads as an empty index.
    ///
    /// # Locking
    ///
    /// Holds a shared lock on the index file while reading.
    pub fn load(path: Box<Path>) -> anyhow::Result<Self> {
        let mut index = Index::new(path);
        index.rehydrate()?;

        Ok(index)
    }

    fn rehydrate(&mut self) -> anyhow::Result<()> {
        self.entries.clear();

        if !self.path.exists() {
            return Ok(());
        }

        let mut index_file = std::fs::OpenOptions::new().read(true).open(&self.path)?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;

        if lock.deref_mut().metadata()?.len() == 0 {
            return Ok(());
        }

        let mut reader = Checksum::new(lock.deref_mut());
        let entries_count = self.parse_header(&mut reader)?;
        self.parse_entries(entries_count, &mut reader)?;

        reader.verify()
    }

    fn parse_header<T: std::io::Read>(&self, reader: &mut Checksum<T>) -> anyhow::Result<u32> {
        let header_bytes = reader.read(HEADER_SIZE)?;
        let header = IndexHeader::deserialize(std::io::Cursor::new(header_bytes))?;

        if header.marker != SIGNATURE {
            return Err(anyhow!("Invalid index file signature"));
        }

        if header.version != VERSION {
            return Err(anyhow!("Unsupported index file version: {}", header.version));
        }

        Ok(header.entries_count)
    }

    fn parse_entries<T: std::io::Read>(
        &mut self,
        entries_count: u32,
        reader: &mut Checksum<T>,
    ) -> anyhow::Result<()> {
        for _ in 0..entries_count {
            let entry_bytes = reader.read(ENTRY_MIN_SIZE)?;
            let mut entry_bytes = entry_bytes.to_vec();

            while entry_bytes[entry_bytes.len() - 1] != 0 {
                entry_bytes = [entry_bytes, reader.read(ENTRY_BLOCK)?.to_vec()].concat();
            }

            let entry_bytes = Bytes::from(entry_bytes);
            let entry = IndexEntry::deserialize(std::io::Cursor::new(entry_bytes))?;

            self.entries.insert(entry.key(), entry);
        }

        Ok(())
    }

    /// All entries in (path, stage) order
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The resolved (stage-0) entry at a path, if any
    pub fn entry_by_path(&self, path: &Path) -> Option<&IndexEntry> {
        self.entries
            .get(&EntryKey::new(path.to_path_buf(), Stage::Merged))
    }

    /// Every entry at a path, across stages
    pub fn entries_at_path<'i>(&'i self, path: &Path) -> Vec<&'i IndexEntry> {
        self.entries
            .range(
                EntryKey::new(path.to_path_buf(), Stage::Merged)
                    ..=EntryKey::new(path.to_path_buf(), Stage::Theirs),
            )
            .map(|(_, entry)| entry)
            .collect()
    }

    /// Whether a path carries unresolved conflict stages
    pub fn has_conflict(&self, path: &Path) -> bool {
        self.entries_at_path(path)
            .iter()
            .any(|entry| entry.stage.is_conflict())
    }

    /// Acquire the exclusive index lock
    ///
    /// Creates `<index>.lock` exclusively and reads the current snapshot
    /// under it. Fails fast with [`ReconcileError::LockContention`] if the
    /// lockfile already exists.
    pub fn lock(path: Box<Path>) -> Result<LockedIndex, ReconcileError> {
        let lock_path = lock_path_for(&path);

        let lock_file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ReconcileError::LockContention { path: lock_path });
            }
            Err(e) => return Err(e.into()),
        };

        let index = match Index::load(path) {
            Ok(index) => index,
            Err(e) => {
                drop(lock_file);
                let _ = std::fs::remove_file(&lock_path);
                return Err(ReconcileError::Store(e));
            }
        };

        tracing::debug!(index_path = %index.path().display(), entries = index.len(), "index locked");

        Ok(LockedIndex {
            index,
            lock_path,
            lock_file: Some(lock_file),
            committed: false,
        })
    }
}

fn lock_path_for(index_path: &Path) -> PathBuf {
    let mut lock_path = index_path.as_os_str().to_owned();
    lock_path.push(".lock");
    PathBuf::from(lock_path)
}

/// An exclusively locked index
///
/// Holds the snapshot read under the lock. Dropping without committing
/// aborts: the lockfile is removed and the on-disk index is untouched.
#[derive(Debug)]
pub struct LockedIndex {
    index: Index,
    lock_path: PathBuf,
    lock_file: Option<std::fs::File>,
    committed: bool,
}

impl LockedIndex {
    /// The snapshot read when the lock was acquired
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Atomically replace the index with a new snapshot
    ///
    /// Writes the entries into the lockfile with a trailing checksum, then
    /// renames it over the index. The rename both publishes the snapshot
    /// and releases the lock; on failure the prior index is left intact.
    pub fn commit(mut self, entries: Vec<IndexEntry>) -> anyhow::Result<()> {
        let mut lock_file = self
            .lock_file
            .take()
            .ok_or_else(|| anyhow!("Index lockfile handle already consumed"))?;

        let mut writer = Checksum::new(&mut lock_file);

        let header = IndexHeader::new(String::from(SIGNATURE), VERSION, entries.len() as u32);
        writer.write(&header.serialize()?)?;

        for entry in &entries {
            writer.write(&entry.serialize()?)?;
        }

        writer.write_checksum()?;
        lock_file
            .sync_all()
            .context("Failed to flush index lockfile")?;
        drop(lock_file);

        std::fs::rename(&self.lock_path, self.index.path()).with_context(|| {
            format!(
                "Failed to publish new index over {}",
                self.index.path().display()
            )
        })?;
        self.committed = true;

        tracing::debug!(entries = entries.len(), "index committed");

        Ok(())
    }

    /// Release the lock without touching the index
    pub fn unlock(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.committed {
            self.lock_file.take();
            let _ = std::fs::remove_file(&self.lock_path);
            self.committed = true;
        }
    }
}

impl Drop for LockedIndex {
    fn drop(&mut self) {
        self.release();
    }
}
