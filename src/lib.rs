//! RLNC Core - Network-Coded Peer Storage
//!
//! This crate stores files across a fixed set of peers using random linear
//! network coding over GF(2^8). A file survives the loss of `max_erasures`
//! whole peers, and lost subfragments are regenerated from what survivors
//! recode locally, without ever decoding the file during repair.

pub mod coding;
pub mod crypto;
pub mod logging;
pub mod p2p;
pub mod storage;

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main error type for RLNC storage operations
#[derive(Error, Debug)]
pub enum RlncError {
    #[error("Coding error: {0}")]
    Coding(#[from] coding::CodingError),

    #[error("P2P network error: {0}")]
    P2P(#[from] p2p::P2PError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RlncError>;

/// Storage configuration shared by the store, retrieve and repair paths
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RlncConfig {
    /// Whole peers a file must survive losing
    pub max_erasures: usize,

    /// Coded symbols stored per peer
    pub subfragments_per_node: usize,

    /// Deadline for any single fan-in (acks, survey, fetch, recode)
    pub response_timeout_ms: u64,

    /// Recode rounds a repair may spend reaching a full-rank pool
    pub max_recode_rounds: usize,

    /// Check the content hash of retrieved files
    pub verify_integrity: bool,

    /// Local metadata path
    pub data_path: String,
}

impl Default for RlncConfig {
    fn default() -> Self {
        Self {
            max_erasures: 1,
            subfragments_per_node: 2,
            response_timeout_ms: 5_000,
            max_recode_rounds: 2,
            verify_integrity: true,
            data_path: "./rlnc_data".to_string(),
        }
    }
}

impl RlncConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Check the coding parameters against a peer set of `peer_count`
    pub fn validate(&self, peer_count: usize) -> std::result::Result<(), storage::StorageError> {
        storage::check_parameters(peer_count, self.max_erasures, self.subfragments_per_node)
    }

    /// Where the file catalog lives
    pub fn catalog_path(&self) -> PathBuf {
        Path::new(&self.data_path).join("catalog.json")
    }

    /// Load a JSON config file; absent fields take their defaults
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        let config: Self =
            serde_json::from_str(&json).map_err(|e| RlncError::Serialization(e.to_string()))?;

        if config.subfragments_per_node == 0 {
            return Err(RlncError::Config(
                "subfragments_per_node must be at least 1".into(),
            ));
        }
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}
