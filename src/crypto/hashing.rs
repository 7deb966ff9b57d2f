//! Content hashing using BLAKE3
//!
//! File records carry the hash of the original bytes; peers carry a hash of
//! each fragment's subfragment list so corrupted fragments are never served.

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content hash using BLAKE3 (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash data and return content hash
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash an ordered list of blobs; blob boundaries are part of the hash
    pub fn of_blobs<B: AsRef<[u8]>>(blobs: &[B]) -> Self {
        let mut hasher = BlobHasher::new();
        for blob in blobs {
            hasher.update(blob.as_ref());
        }
        hasher.finalize()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Base58 form stored in records
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    /// Parse from base58 string
    pub fn from_base58(s: &str) -> Result<Self, bs58::decode::Error> {
        let bytes = bs58::decode(s).into_vec()?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| bs58::decode::Error::BufferTooSmall)?;
        Ok(Self(arr))
    }

    /// Whether `data` hashes to the base58 hash `expected`
    pub fn matches(expected: &str, data: &[u8]) -> bool {
        Self::from_base58(expected)
            .map(|h| h == Self::hash(data))
            .unwrap_or(false)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_base58())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// Incremental hasher over length-framed blobs
pub struct BlobHasher {
    hasher: Hasher,
    blobs: u64,
}

impl BlobHasher {
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
            blobs: 0,
        }
    }

    /// Add one blob
    pub fn update(&mut self, blob: &[u8]) {
        self.hasher.update(&(blob.len() as u64).to_le_bytes());
        self.hasher.update(blob);
        self.blobs += 1;
    }

    pub fn finalize(self) -> ContentHash {
        ContentHash(*self.hasher.finalize().as_bytes())
    }

    /// Blobs added so far
    pub fn blob_count(&self) -> u64 {
        self.blobs
    }
}

impl Default for BlobHasher {
    fn default() -> Self {
        Self::new()
    }
}
