//! Storage Protocol - Request/Response messages exchanged with storage peers
//!
//! Symbols travel as opaque `coefficients ‖ payload` blobs; only the side
//! that knows a file's storage details can split them again.

use serde::{Deserialize, Serialize};

/// Opaque peer identifier
pub type NodeId = String;

/// Store (or append to) a coded fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    /// Fragment name from the file's storage details
    pub fragment_name: String,

    /// Coded subfragments, one blob each
    pub blobs: Vec<Vec<u8>>,
}

/// Acknowledgment for a store or repair store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreAck {
    pub node_id: NodeId,
    pub fragment_name: String,

    /// Subfragments the peer holds for this fragment after the write
    pub stored_count: usize,
}

/// One peer's answer to a fragment status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentStatus {
    pub node_id: NodeId,
    pub fragment_name: String,
    pub is_present: bool,

    /// Subfragments held (0 when absent)
    pub count: usize,
}

/// A fragment served for retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentReply {
    pub node_id: NodeId,
    pub fragment_name: String,
    pub blobs: Vec<Vec<u8>>,
}

/// Ask holders of the named fragments to recode them locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecodeRequest {
    /// Surviving fragments of one file
    pub fragment_names: Vec<String>,

    /// Coefficient vector length
    pub symbol_count: usize,

    /// Payload length
    pub symbol_size: usize,

    /// Recoded symbols to return per held fragment
    pub outputs_per_fragment: usize,
}

/// Recoded symbols from one peer, covering every requested fragment it holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecodeResponse {
    pub node_id: NodeId,
    pub blobs: Vec<Vec<u8>>,
}

/// Requests understood by a storage peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerRequest {
    /// Store a fragment, replacing anything under that name
    Store(StoreRequest),

    /// Append regenerated subfragments (creates the fragment if absent)
    RepairStore(StoreRequest),

    /// Report presence and subfragment count
    Status { fragment_name: String },

    /// Serve every named fragment held locally
    Fetch { fragment_names: Vec<String> },

    /// Recode held fragments
    Recode(RecodeRequest),

    /// Delete a fragment
    Delete { fragment_name: String },

    /// Request peer's storage info
    GetStorageInfo,
}

/// Responses produced by a storage peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PeerResponse {
    Stored(StoreAck),

    Status(FragmentStatus),

    Fragments(Vec<FragmentReply>),

    Recoded(RecodeResponse),

    Deleted {
        fragment_name: String,
    },

    StorageInfo {
        node_id: NodeId,
        used_bytes: u64,
        fragment_count: u64,
        subfragment_count: u64,
    },

    /// The peer holds nothing relevant and stays silent on broadcasts
    NotHeld,

    Error {
        code: ErrorCode,
        message: String,
    },
}

/// Error codes for storage operations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    /// Fragment not found
    NotFound,

    /// Stored bytes no longer match their hash
    IntegrityCheckFailed,

    /// Invalid request
    InvalidRequest,

    /// Internal error
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_json_shape() {
        let request = PeerRequest::Status {
            fragment_name: "frag-001".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"Status":{"fragment_name":"frag-001"}}"#);

        let back: PeerRequest = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, PeerRequest::Status { fragment_name } if fragment_name == "frag-001"));
    }
}
