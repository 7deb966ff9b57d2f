//! Peer communication channel
//!
//! The core never talks to a transport directly. Anything that can route a
//! point-to-point request to one peer and fan a broadcast out to every peer
//! (sockets, RPC, pub/sub, the in-process [`LocalCluster`]) implements
//! [`PeerChannel`].
//!
//! Broadcast methods hand back a receiver; the caller decides how many
//! responses it is owed and how long it waits for them (see
//! [`collect_responses`]).
//!
//! [`LocalCluster`]: super::LocalCluster
//! [`collect_responses`]: super::collect_responses

use super::{
    FragmentReply, FragmentStatus, NodeId, P2PError, RecodeRequest, RecodeResponse, StoreAck,
    StoreRequest,
};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait PeerChannel: Send + Sync {
    /// The fixed peer set, in placement order
    fn peers(&self) -> Vec<NodeId>;

    /// Number of peers
    fn peer_count(&self) -> usize {
        self.peers().len()
    }

    /// Store a fresh fragment on one peer
    async fn send_store(&self, node: &NodeId, request: StoreRequest) -> Result<StoreAck, P2PError>;

    /// Ask every peer about one fragment; every peer answers
    async fn broadcast_status_query(
        &self,
        fragment_name: &str,
    ) -> Result<mpsc::Receiver<FragmentStatus>, P2PError>;

    /// Ask for fragments by name; each holder answers once per fragment it has
    async fn request_fragments(
        &self,
        fragment_names: &[String],
    ) -> Result<mpsc::Receiver<FragmentReply>, P2PError>;

    /// Ask holders of the named fragments to recode locally; each holder answers once
    async fn broadcast_recode_request(
        &self,
        request: RecodeRequest,
    ) -> Result<mpsc::Receiver<RecodeResponse>, P2PError>;

    /// Append regenerated subfragments on one peer
    async fn send_repair_store(
        &self,
        node: &NodeId,
        request: StoreRequest,
    ) -> Result<StoreAck, P2PError>;
}
