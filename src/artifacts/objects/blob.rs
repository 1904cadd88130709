//! Blob content hashing
//!
//! Blobs carry raw file bytes. The content id is the SHA-1 of
//! `blob <size>\0<content>`, which is what the modified check compares a
//! working file against when timestamps are inconclusive.

use crate::artifacts::objects::object_id::ObjectId;
use bytes::Bytes;
use derive_new::new;
use sha1::{Digest, Sha1};

/// File content addressed by its hash
#[derive(Debug, Clone, new)]
pub struct Blob {
    content: Bytes,
}

impl Blob {
    /// Compute the content id of this blob
    pub fn object_id(&self) -> anyhow::Result<ObjectId> {
        let mut hasher = Sha1::new();
        hasher.update(format!("blob {}\0", self.content.len()).as_bytes());
        hasher.update(&self.content);

        let oid = hasher.finalize();
        ObjectId::try_parse(format!("{oid:x}"))
    }
}
