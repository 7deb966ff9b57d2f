//! In-process peer cluster
//!
//! A [`PeerChannel`] whose peers are [`FragmentStore`]s living in the same
//! process. Broadcast answers are produced on spawned tasks, so they arrive
//! in whatever order the runtime schedules them. Used by the test suite and
//! by embedders that want a single-process deployment.

use super::{
    FragmentReply, FragmentStatus, FragmentStore, NodeId, P2PError, PeerChannel, PeerRequest,
    PeerResponse, RecodeRequest, RecodeResponse, StoreAck, StoreRequest,
};
use crate::coding::Gf256;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One simulated storage peer
pub struct LocalPeer {
    store: FragmentStore,
    online: AtomicBool,
    writes: AtomicUsize,
}

impl LocalPeer {
    fn new(node_id: NodeId, field: Arc<Gf256>) -> Self {
        Self {
            store: FragmentStore::new(node_id, field),
            online: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        self.store.node_id()
    }

    /// The peer's fragment storage
    pub fn store(&self) -> &FragmentStore {
        &self.store
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Store and repair-store requests handled so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Handle a request; offline peers never answer
    fn dispatch(&self, request: PeerRequest) -> Option<PeerResponse> {
        if !self.is_online() {
            return None;
        }
        if matches!(request, PeerRequest::Store(_) | PeerRequest::RepairStore(_)) {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        self.store.handle(request)
    }
}

/// A fixed set of in-process peers
pub struct LocalCluster {
    peers: Vec<Arc<LocalPeer>>,
}

impl LocalCluster {
    /// Create `peer_count` empty peers named `node-0`, `node-1`, ...
    pub fn new(peer_count: usize, field: Arc<Gf256>) -> Self {
        let peers = (0..peer_count)
            .map(|i| Arc::new(LocalPeer::new(format!("node-{}", i), field.clone())))
            .collect();
        Self { peers }
    }

    /// Peer by placement index
    pub fn peer(&self, index: usize) -> Option<&Arc<LocalPeer>> {
        self.peers.get(index)
    }

    fn find(&self, node: &NodeId) -> Result<&Arc<LocalPeer>, P2PError> {
        self.peers
            .iter()
            .find(|p| p.node_id() == node)
            .ok_or_else(|| P2PError::PeerNotFound(node.clone()))
    }

    /// Lose every fragment on a peer; it stays online and keeps answering
    pub fn wipe(&self, index: usize) {
        if let Some(peer) = self.peers.get(index) {
            tracing::info!("Wiping all fragments on {}", peer.node_id());
            peer.store.clear();
        }
    }

    /// Lose `n` subfragments of one fragment on a peer
    pub fn drop_subfragments(&self, index: usize, fragment_name: &str, n: usize) -> usize {
        self.peers
            .get(index)
            .map(|p| p.store.drop_subfragments(fragment_name, n))
            .unwrap_or(0)
    }

    /// Take a peer offline (it silently ignores everything) or bring it back
    pub fn set_online(&self, index: usize, online: bool) {
        if let Some(peer) = self.peers.get(index) {
            peer.online.store(online, Ordering::SeqCst);
        }
    }

    /// Total writes across all peers
    pub fn write_count(&self) -> usize {
        self.peers.iter().map(|p| p.write_count()).sum()
    }

    /// Index of the peer currently holding `fragment_name`
    pub fn holder_of(&self, fragment_name: &str) -> Option<usize> {
        self.peers
            .iter()
            .position(|p| p.store.status(fragment_name).is_present)
    }

    async fn unicast(&self, node: &NodeId, request: PeerRequest) -> Result<StoreAck, P2PError> {
        let peer = self.find(node)?.clone();

        match peer.dispatch(request) {
            Some(PeerResponse::Stored(ack)) => Ok(ack),
            Some(PeerResponse::Error { code, message }) => {
                Err(P2PError::Protocol(format!("{:?}: {}", code, message)))
            }
            Some(other) => Err(P2PError::Protocol(format!(
                "Unexpected response to store: {:?}",
                other
            ))),
            // An offline peer never acknowledges
            None => std::future::pending().await,
        }
    }

    /// Send `request` to every peer on its own task and forward whatever
    /// `extract` pulls out of each answer
    fn broadcast<T, F>(&self, request: PeerRequest, extract: F) -> mpsc::Receiver<T>
    where
        T: Send + 'static,
        F: Fn(PeerResponse) -> Vec<T> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(self.peers.len().max(1) * 4);
        let extract = Arc::new(extract);

        for peer in &self.peers {
            let peer = peer.clone();
            let tx = tx.clone();
            let request = request.clone();
            let extract = extract.clone();

            tokio::spawn(async move {
                // An offline peer holds its sender so the caller waits out its deadline
                if !peer.is_online() {
                    tx.closed().await;
                    return;
                }
                let Some(response) = peer.dispatch(request) else {
                    return;
                };
                for item in (*extract)(response) {
                    if tx.send(item).await.is_err() {
                        break;
                    }
                }
            });
        }

        rx
    }
}

#[async_trait]
impl PeerChannel for LocalCluster {
    fn peers(&self) -> Vec<NodeId> {
        self.peers.iter().map(|p| p.node_id().clone()).collect()
    }

    async fn send_store(&self, node: &NodeId, request: StoreRequest) -> Result<StoreAck, P2PError> {
        self.unicast(node, PeerRequest::Store(request)).await
    }

    async fn broadcast_status_query(
        &self,
        fragment_name: &str,
    ) -> Result<mpsc::Receiver<FragmentStatus>, P2PError> {
        let request = PeerRequest::Status {
            fragment_name: fragment_name.to_string(),
        };
        Ok(self.broadcast(request, |response| match response {
            PeerResponse::Status(status) => vec![status],
            _ => Vec::new(),
        }))
    }

    async fn request_fragments(
        &self,
        fragment_names: &[String],
    ) -> Result<mpsc::Receiver<FragmentReply>, P2PError> {
        let request = PeerRequest::Fetch {
            fragment_names: fragment_names.to_vec(),
        };
        Ok(self.broadcast(request, |response| match response {
            PeerResponse::Fragments(replies) => replies,
            other => {
                tracing::warn!("Fetch answered with {:?}", other);
                Vec::new()
            }
        }))
    }

    async fn broadcast_recode_request(
        &self,
        request: RecodeRequest,
    ) -> Result<mpsc::Receiver<RecodeResponse>, P2PError> {
        Ok(self.broadcast(PeerRequest::Recode(request), |response| match response {
            PeerResponse::Recoded(recoded) => vec![recoded],
            other => {
                tracing::warn!("Recode answered with {:?}", other);
                Vec::new()
            }
        }))
    }

    async fn send_repair_store(
        &self,
        node: &NodeId,
        request: StoreRequest,
    ) -> Result<StoreAck, P2PError> {
        self.unicast(node, PeerRequest::RepairStore(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p2p::collect_responses;
    use std::time::Duration;

    fn cluster(n: usize) -> LocalCluster {
        LocalCluster::new(n, Arc::new(Gf256::new()))
    }

    fn store_request(name: &str, count: usize) -> StoreRequest {
        StoreRequest {
            fragment_name: name.to_string(),
            blobs: vec![vec![0u8; 4]; count],
        }
    }

    #[tokio::test]
    async fn test_status_broadcast_reaches_every_peer() {
        let cluster = cluster(4);
        let nodes = cluster.peers();
        cluster.send_store(&nodes[2], store_request("frag-a", 2)).await.unwrap();

        let mut rx = cluster.broadcast_status_query("frag-a").await.unwrap();
        let statuses = collect_responses(&mut rx, 4, Duration::from_secs(1), |s| s.node_id.clone())
            .await
            .unwrap();

        let present: Vec<_> = statuses.iter().filter(|s| s.is_present).collect();
        assert_eq!(present.len(), 1);
        assert_eq!(present[0].node_id, "node-2");
        assert_eq!(present[0].count, 2);
        assert_eq!(cluster.write_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_only_holders_answer() {
        let cluster = cluster(3);
        let nodes = cluster.peers();
        cluster.send_store(&nodes[0], store_request("frag-a", 1)).await.unwrap();
        cluster.send_store(&nodes[1], store_request("frag-b", 1)).await.unwrap();

        let names = vec!["frag-a".to_string(), "frag-b".to_string()];
        let mut rx = cluster.request_fragments(&names).await.unwrap();
        let replies = collect_responses(&mut rx, 2, Duration::from_secs(1), |r| {
            r.fragment_name.clone()
        })
        .await
        .unwrap();
        assert_eq!(replies.len(), 2);

        // Every sender task has finished, so the channel closes
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_offline_peer_is_silent() {
        let cluster = cluster(3);
        cluster.set_online(1, false);

        let mut rx = cluster.broadcast_status_query("frag-a").await.unwrap();
        let result =
            collect_responses(&mut rx, 3, Duration::from_millis(50), |s| s.node_id.clone()).await;
        assert!(matches!(
            result,
            Err(P2PError::Timeout {
                expected: 3,
                received: 2
            })
        ));

        let nodes = cluster.peers();
        let ack = tokio::time::timeout(
            Duration::from_millis(50),
            cluster.send_store(&nodes[1], store_request("frag-a", 1)),
        )
        .await;
        assert!(ack.is_err());
    }

    #[tokio::test]
    async fn test_wipe_and_holder() {
        let cluster = cluster(2);
        let nodes = cluster.peers();
        cluster.send_store(&nodes[1], store_request("frag-a", 2)).await.unwrap();
        assert_eq!(cluster.holder_of("frag-a"), Some(1));

        assert_eq!(cluster.drop_subfragments(1, "frag-a", 1), 1);
        assert_eq!(cluster.peer(1).unwrap().store().status("frag-a").count, 1);

        cluster.wipe(1);
        assert_eq!(cluster.holder_of("frag-a"), None);
    }

    #[tokio::test]
    async fn test_unknown_peer() {
        let cluster = cluster(1);
        let result = cluster
            .send_store(&"node-9".to_string(), store_request("frag-a", 1))
            .await;
        assert!(matches!(result, Err(P2PError::PeerNotFound(_))));
    }
}
