//! Crypto Module - content integrity
//!
//! BLAKE3 hashes for whole files and for the subfragment sets peers hold.

mod hashing;

pub use hashing::{BlobHasher, ContentHash};
