//! Content-addressed object types
//!
//! - `object_id`: 40-character hexadecimal content identifiers
//! - `blob`: file content and its content id
//! - `tree`: ordered directory listings

pub mod blob;
pub mod object_id;
pub mod tree;

/// Length of an object ID in hexadecimal characters
pub const OBJECT_ID_LENGTH: usize = 40;

/// Length of an object ID in raw bytes
pub const OBJECT_ID_RAW_LENGTH: usize = 20;
