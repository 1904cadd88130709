//! Index entry representation
//!
//! Each entry tracks one path at one conflict stage:
//!
//! - Stage 0 is a resolved entry; stages 1/2/3 hold the base, ours, and
//!   theirs sides of an unresolved conflict.
//! - Metadata (mode, size, timestamps) enables fast change detection
//!   without reading file content.
//!
//! ## Entry Format
//!
//! Entries are stored in a binary format with 8-byte alignment. The flags
//! word packs the stage into its high bits and the path length into the
//! rest.

use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::object_id::ObjectId;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use is_executable::IsExecutable;
use std::cmp::min;
use std::fs::Metadata;
use std::io::{BufRead, Write};
use std::os::unix::prelude::MetadataExt;
use std::path::{Path, PathBuf};

/// Maximum path length representable in the flags word
const MAX_PATH_SIZE: usize = 4095;

/// Block size for entry alignment (8 bytes)
pub const ENTRY_BLOCK: usize = 8;

/// Minimum size of an index entry in bytes
pub const ENTRY_MIN_SIZE: usize = 64;

/// Conflict slot an index entry occupies
///
/// At most one stage-0 entry may exist per path, and stage-0 excludes any
/// stage 1-3 entry at the same path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Resolved entry
    #[default]
    Merged,
    /// Common base (the HEAD side of a conflict)
    Base,
    /// The index's prior content
    Ours,
    /// The merge tree's content
    Theirs,
}

impl Stage {
    pub fn as_u8(&self) -> u8 {
        match self {
            Stage::Merged => 0,
            Stage::Base => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn is_conflict(&self) -> bool {
        !matches!(self, Stage::Merged)
    }
}

impl TryFrom<u8> for Stage {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> anyhow::Result<Self> {
        match value {
            0 => Ok(Stage::Merged),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            _ => Err(anyhow::anyhow!("Invalid stage: {}", value)),
        }
    }
}

/// Sort key for index entries: path first, stage second
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, new)]
pub struct EntryKey {
    pub path: PathBuf,
    pub stage: Stage,
}

/// Index entry tracking one path at one stage
#[derive(Debug, Clone, new)]
pub struct IndexEntry {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// Content id of the staged blob
    pub oid: ObjectId,
    /// Conflict slot
    pub stage: Stage,
    /// File metadata (mode, size, timestamps)
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.path.clone(), self.stage)
    }

    /// Timestamp comparison down to nanoseconds
    pub fn times_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.ctime == other.ctime
            && self.metadata.ctime_nsec == other.ctime_nsec
            && self.metadata.mtime == other.mtime
            && self.metadata.mtime_nsec == other.mtime_nsec
    }

    pub fn serialize(&self) -> anyhow::Result<Bytes> {
        let entry_path = self
            .path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid entry path"))?;
        let flags = ((self.stage.as_u8() as u16) << 12)
            | (min(entry_path.len(), MAX_PATH_SIZE) as u16);

        let mut entry_bytes = Vec::new();
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ctime_nsec as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mtime_nsec as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.dev as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.ino as u32)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.mode.as_u32())?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.uid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.gid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.metadata.size as u32)?;
        self.oid.write_raw_to(&mut entry_bytes)?;
        entry_bytes.write_u16::<byteorder::NetworkEndian>(flags)?;
        entry_bytes.write_all(entry_path.as_bytes())?;

        // There must be at least one null byte after the path, then pad to
        // the block size
        entry_bytes.push(0);
        while entry_bytes.len() % ENTRY_BLOCK != 0 {
            entry_bytes.push(0);
        }

        Ok(Bytes::from(entry_bytes))
    }

    pub fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let bytes = reader
            .bytes()
            .collect::<Result<Vec<u8>, std::io::Error>>()?;

        if bytes.len() < ENTRY_MIN_SIZE {
            return Err(anyhow::anyhow!("Invalid index entry size"));
        }

        let ctime = byteorder::NetworkEndian::read_u32(&bytes[0..4]) as i64;
        let ctime_nsec = byteorder::NetworkEndian::read_u32(&bytes[4..8]) as i64;
        let mtime = byteorder::NetworkEndian::read_u32(&bytes[8..12]) as i64;
        let mtime_nsec = byteorder::NetworkEndian::read_u32(&bytes[12..16]) as i64;
        let dev = byteorder::NetworkEndian::read_u32(&bytes[16..20]) as u64;
        let ino = byteorder::NetworkEndian::read_u32(&bytes[20..24]) as u64;
        let mode = EntryMode::try_from(byteorder::NetworkEndian::read_u32(&bytes[24..28]))?;
        let uid = byteorder::NetworkEndian::read_u32(&bytes[28..32]);
        let gid = byteorder::NetworkEndian::read_u32(&bytes[32..36]);
        let size = byteorder::NetworkEndian::read_u32(&bytes[36..40]) as u64;
        let mut oid_bytes = std::io::Cursor::new(&bytes[40..60]);
        let oid = ObjectId::read_raw_from(&mut oid_bytes)?;
        let flags = byteorder::NetworkEndian::read_u16(&bytes[60..62]);
        let stage = Stage::try_from((flags >> 12) as u8 & 0x3)?;

        // The path is null-terminated, padding follows
        let path_end = bytes[62..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| anyhow::anyhow!("Missing null terminator in entry path"))?;
        let path_bytes = &bytes[62..62 + path_end];
        let path = PathBuf::from(
            std::str::from_utf8(path_bytes)
                .map_err(|_| anyhow::anyhow!("Invalid UTF-8 in entry path"))?,
        );

        Ok(IndexEntry {
            path,
            oid,
            stage,
            metadata: EntryMetadata {
                ctime,
                ctime_nsec,
                mtime,
                mtime_nsec,
                dev,
                ino,
                mode,
                uid,
                gid,
                size,
            },
        })
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.stage == other.stage
    }
}

impl Eq for IndexEntry {}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.path, self.stage).cmp(&(&other.path, other.stage))
    }
}

/// File metadata stored in index entries
///
/// Comparing this block against a fresh stat answers "has the working file
/// changed?" without reading content in the common case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryMetadata {
    /// Change time (seconds since Unix epoch)
    pub ctime: i64,
    /// Change time nanoseconds
    pub ctime_nsec: i64,
    /// Modification time (seconds since Unix epoch)
    pub mtime: i64,
    /// Modification time nanoseconds
    pub mtime_nsec: i64,
    /// Device ID
    pub dev: u64,
    /// Inode number
    pub ino: u64,
    /// File mode (kind and permissions)
    pub mode: EntryMode,
    /// User ID of owner
    pub uid: u32,
    /// Group ID of owner
    pub gid: u32,
    /// File size in bytes
    pub size: u64,
}

impl EntryMetadata {
    /// Metadata for an entry that came out of a tree rather than a stat;
    /// only the mode is meaningful until the applier records the real stat
    pub fn for_mode(mode: EntryMode) -> Self {
        EntryMetadata {
            mode,
            ..Default::default()
        }
    }
}

impl TryFrom<(&Path, Metadata)> for EntryMetadata {
    type Error = anyhow::Error;

    fn try_from((file_path, metadata): (&Path, Metadata)) -> Result<Self, Self::Error> {
        let mode = if metadata.file_type().is_symlink() {
            EntryMode::Symlink
        } else if metadata.is_dir() {
            EntryMode::Directory
        } else {
            match file_path.is_executable() {
                true => EntryMode::File(FileMode::Executable),
                false => EntryMode::File(FileMode::Regular),
            }
        };

        Ok(Self {
            ctime: metadata.ctime(),
            ctime_nsec: metadata.ctime_nsec(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn oid() -> ObjectId {
        ObjectId::try_parse("f".repeat(40)).unwrap()
    }

    fn metadata(mode: EntryMode, size: u64) -> EntryMetadata {
        EntryMetadata {
            mtime: 1_700_000_000,
            mtime_nsec: 123,
            ctime: 1_700_000_000,
            ctime_nsec: 456,
            size,
            mode,
            ..Default::default()
        }
    }

    #[rstest]
    #[case(Stage::Merged)]
    #[case(Stage::Base)]
    #[case(Stage::Ours)]
    #[case(Stage::Theirs)]
    fn entry_round_trip_preserves_stage(oid: ObjectId, #[case] stage: Stage) {
        let entry = IndexEntry::new(
            PathBuf::from("dir/nested/name.txt"),
            oid,
            stage,
            metadata(FileMode::Executable.into(), 512),
        );

        let bytes = entry.serialize().unwrap();
        assert_eq!(bytes.len() % ENTRY_BLOCK, 0);

        let parsed = IndexEntry::deserialize(std::io::Cursor::new(bytes)).unwrap();
        pretty_assertions::assert_eq!(parsed.path, entry.path);
        pretty_assertions::assert_eq!(parsed.oid, entry.oid);
        pretty_assertions::assert_eq!(parsed.stage, stage);
        pretty_assertions::assert_eq!(parsed.metadata, entry.metadata);
    }

    #[rstest]
    fn entries_order_by_path_then_stage(oid: ObjectId) {
        let meta = metadata(FileMode::Regular.into(), 1);
        let a0 = IndexEntry::new(PathBuf::from("a"), oid.clone(), Stage::Merged, meta.clone());
        let a2 = IndexEntry::new(PathBuf::from("a"), oid.clone(), Stage::Ours, meta.clone());
        let b1 = IndexEntry::new(PathBuf::from("b"), oid, Stage::Base, meta);

        let mut entries = vec![b1.clone(), a2.clone(), a0.clone()];
        entries.sort();
        pretty_assertions::assert_eq!(entries, vec![a0, a2, b1]);
    }

    #[rstest]
    fn times_match_requires_both_timestamps(oid: ObjectId) {
        let entry = IndexEntry::new(
            PathBuf::from("a"),
            oid,
            Stage::Merged,
            metadata(FileMode::Regular.into(), 10),
        );

        let mut other = metadata(FileMode::Regular.into(), 10);
        assert!(entry.times_match(&other));

        other.mtime = 1;
        assert!(!entry.times_match(&other));
    }
}
