//! Storage Module - placing, retrieving and repairing network-coded files
//!
//! Drives the coding engine against the peer channel: the store path
//! produces one fragment per peer, the retrieve path decodes from a minimal
//! fragment subset, and the repair orchestrator heals lost subfragments from
//! recoded survivors.

mod catalog;
mod file_manager;
mod placement;
mod repair;
mod retrieve;
mod store;

pub use catalog::{FileCatalog, FileRecord};
pub use file_manager::FileManager;
pub use placement::{check_parameters, StorageDetails};
pub use repair::{
    FileRepairReport, FragmentHealth, FragmentSurvey, RepairOrchestrator, RepairOutcome,
    RepairReport, SurveyReport,
};
pub use retrieve::{retrieve_file, FragmentSelection};
pub use store::store_file;

use crate::coding::CodingError;
use crate::p2p::{NodeId, P2PError, StoreAck};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid storage parameters: {0}")]
    InvalidParameters(String),

    #[error("Reconstruction failed: decoder reached rank {rank} of {needed}")]
    ReconstructionFailed { rank: usize, needed: usize },

    #[error("Recoded symbol pool has rank {rank} of {needed}")]
    InsufficientRank { rank: usize, needed: usize },

    #[error("File integrity check failed")]
    IntegrityCheckFailed,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Network(#[from] P2PError),

    #[error("Coding error: {0}")]
    Coding(#[from] CodingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// Whether running the same operation again later may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_unresponsive(),
            Self::InsufficientRank { .. } | Self::Cancelled => true,
            _ => false,
        }
    }
}

/// Check that a peer acknowledged exactly the write it was sent
pub(crate) fn verify_ack(
    ack: &StoreAck,
    node: &NodeId,
    fragment_name: &str,
    expected_count: usize,
) -> Result<(), StorageError> {
    if &ack.node_id != node || ack.fragment_name != fragment_name {
        return Err(StorageError::ProtocolViolation(format!(
            "Write of {} to {} acknowledged as {} on {}",
            fragment_name, node, ack.fragment_name, ack.node_id
        )));
    }
    if ack.stored_count != expected_count {
        return Err(StorageError::ProtocolViolation(format!(
            "{} acknowledged {} subfragments of {}, expected {}",
            node, ack.stored_count, fragment_name, expected_count
        )));
    }
    Ok(())
}

/// Fan-in failures; a second answer from the same peer is a protocol breach
pub(crate) fn fan_in_error(error: P2PError) -> StorageError {
    match error {
        P2PError::DuplicateResponse(key) => {
            StorageError::ProtocolViolation(format!("Duplicate response from {}", key))
        }
        other => StorageError::Network(other),
    }
}
