//! Placement planning
//!
//! Maps (file size, max erasures, subfragments per node) onto a fixed peer
//! set. The result is recorded once per file and every later operation reads
//! it back instead of recomputing it.

use super::StorageError;
use serde::{Deserialize, Serialize};

/// Coding layout of one stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDetails {
    /// Whole peers the file must survive losing
    pub max_erasures: usize,

    /// Coded symbols stored on each peer
    pub subfragments_per_node: usize,

    /// Source symbols (= coefficient vector length)
    pub symbol_count: usize,

    /// Bytes per symbol payload
    pub symbol_size: usize,

    /// One fragment name per peer, in placement order
    #[serde(rename = "coded_fragments")]
    pub coded_fragment_names: Vec<String>,
}

/// Fail fast on parameters the scheme cannot realize
pub fn check_parameters(
    peer_count: usize,
    max_erasures: usize,
    subfragments_per_node: usize,
) -> Result<(), StorageError> {
    if peer_count == 0 {
        return Err(StorageError::InvalidParameters("peer set is empty".into()));
    }
    if max_erasures >= peer_count {
        return Err(StorageError::InvalidParameters(format!(
            "max_erasures ({}) must be below the peer count ({})",
            max_erasures, peer_count
        )));
    }
    if subfragments_per_node == 0 {
        return Err(StorageError::InvalidParameters(
            "subfragments_per_node must be at least 1".into(),
        ));
    }
    Ok(())
}

impl StorageDetails {
    /// Plan a new file, generating a fresh fragment name per peer
    pub fn plan(
        original_size: usize,
        peer_count: usize,
        max_erasures: usize,
        subfragments_per_node: usize,
    ) -> Result<Self, StorageError> {
        check_parameters(peer_count, max_erasures, subfragments_per_node)?;

        let symbol_count = (peer_count - max_erasures) * subfragments_per_node;
        let symbol_size = original_size.div_ceil(symbol_count);

        let coded_fragment_names = (0..peer_count)
            .map(|_| uuid::Uuid::new_v4().simple().to_string())
            .collect();

        Ok(Self {
            max_erasures,
            subfragments_per_node,
            symbol_count,
            symbol_size,
            coded_fragment_names,
        })
    }

    /// Peers the file was placed on
    pub fn peer_count(&self) -> usize {
        self.coded_fragment_names.len()
    }

    /// Fragments a retrieve needs
    pub fn fragments_needed(&self) -> usize {
        self.peer_count() - self.max_erasures
    }

    /// Most subfragments that may be lost while the file stays repairable
    pub fn repair_budget(&self) -> usize {
        self.max_erasures * self.subfragments_per_node
    }

    /// Length of one `coefficients ‖ payload` blob
    pub fn blob_len(&self) -> usize {
        self.symbol_count + self.symbol_size
    }

    /// Check the recorded layout is self-consistent
    pub fn validate(&self, original_size: u64) -> Result<(), StorageError> {
        check_parameters(
            self.peer_count(),
            self.max_erasures,
            self.subfragments_per_node,
        )?;

        let expected_count = self.fragments_needed() * self.subfragments_per_node;
        if self.symbol_count != expected_count {
            return Err(StorageError::InvalidParameters(format!(
                "symbol_count {} does not match layout (expected {})",
                self.symbol_count, expected_count
            )));
        }
        if (self.symbol_count * self.symbol_size) < original_size as usize {
            return Err(StorageError::InvalidParameters(format!(
                "{} symbols of {} bytes cannot hold {} bytes",
                self.symbol_count, self.symbol_size, original_size
            )));
        }
        Ok(())
    }

    /// Serialize for a catalog column
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Parse from a catalog column
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        serde_json::from_str(json).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}
