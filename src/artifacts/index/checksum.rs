//! Checksummed index I/O
//!
//! Wraps a reader or writer and accumulates a SHA-1 over everything that
//! passes through, so the trailing index checksum can be verified on load
//! and emitted on save.

use crate::artifacts::index::CHECKSUM_SIZE;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

pub struct Checksum<T> {
    inner: T,
    hasher: Sha1,
}

impl<T> Checksum<T> {
    pub fn new(inner: T) -> Self {
        Checksum {
            inner,
            hasher: Sha1::new(),
        }
    }
}

impl<T: Read> Checksum<T> {
    /// Read exactly `size` bytes, folding them into the running hash
    pub fn read(&mut self, size: usize) -> anyhow::Result<Bytes> {
        let mut buffer = vec![0u8; size];
        self.inner.read_exact(&mut buffer)?;
        self.hasher.update(&buffer);

        Ok(Bytes::from(buffer))
    }

    /// Read the stored trailing checksum and compare it to the running hash
    pub fn verify(mut self) -> anyhow::Result<()> {
        let mut stored = [0u8; CHECKSUM_SIZE];
        self.inner.read_exact(&mut stored)?;

        let computed = self.hasher.finalize();
        if computed.as_slice() != stored {
            return Err(anyhow::anyhow!("Index checksum mismatch"));
        }

        Ok(())
    }
}

impl<T: Write> Checksum<T> {
    /// Write bytes, folding them into the running hash
    pub fn write(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.inner.write_all(data)?;
        self.hasher.update(data);

        Ok(())
    }

    /// Append the accumulated checksum and flush
    pub fn write_checksum(mut self) -> anyhow::Result<()> {
        let computed = self.hasher.finalize();
        self.inner.write_all(&computed)?;
        self.inner.flush()?;

        Ok(())
    }
}
