//! P2P Module - talking to storage peers
//!
//! The peer channel abstraction, its message types, the bounded response
//! collector, the peer-side fragment store, and an in-process cluster.

mod channel;
mod collect;
mod local;
mod protocol;
mod storage_protocol;

pub use channel::PeerChannel;
pub use collect::{collect_available, collect_responses, Collected};
pub use local::{LocalCluster, LocalPeer};
pub use protocol::{
    ErrorCode, FragmentReply, FragmentStatus, NodeId, PeerRequest, PeerResponse, RecodeRequest,
    RecodeResponse, StoreAck, StoreRequest,
};
pub use storage_protocol::{FragmentStore, StorageStats, StoredFragment};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum P2PError {
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timeout: received {received} of {expected} responses")]
    Timeout { expected: usize, received: usize },

    #[error("Response channel closed after {received} of {expected} responses")]
    ChannelClosed { expected: usize, received: usize },

    #[error("Duplicate response for {0}")]
    DuplicateResponse(String),
}

impl P2PError {
    /// A peer failed to answer in time; a later attempt may succeed
    pub fn is_unresponsive(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ChannelClosed { .. })
    }
}
