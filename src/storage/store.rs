//! Store path
//!
//! Encodes a file into one fragment per peer and pushes every fragment out
//! concurrently. A store only succeeds once every peer has acknowledged the
//! exact write it was sent.

use super::{verify_ack, StorageDetails, StorageError};
use crate::coding::{Encoder, Gf256};
use crate::p2p::{P2PError, PeerChannel, StoreRequest};
use crate::RlncConfig;

use futures::future::join_all;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;

/// Encode `data` and place it on every peer of `channel`.
///
/// Peer `i` (in the channel's peer order) receives fragment `i`. Returns the
/// layout the caller must record for later retrieves and repairs.
pub async fn store_file<C>(
    channel: &C,
    field: Arc<Gf256>,
    config: &RlncConfig,
    data: &[u8],
) -> Result<StorageDetails, StorageError>
where
    C: PeerChannel + ?Sized,
{
    let peers = channel.peers();
    config.validate(peers.len())?;

    let details = StorageDetails::plan(
        data.len(),
        peers.len(),
        config.max_erasures,
        config.subfragments_per_node,
    )?;

    let encoder = Encoder::new(field, details.symbol_count, details.symbol_size, data)?;
    let mut rng = ChaCha20Rng::from_entropy();

    let requests: Vec<StoreRequest> = details
        .coded_fragment_names
        .iter()
        .map(|name| StoreRequest {
            fragment_name: name.clone(),
            blobs: (0..details.subfragments_per_node)
                .map(|_| encoder.produce_random_symbol(&mut rng).to_blob())
                .collect(),
        })
        .collect();

    tracing::info!(
        "Storing {} bytes as {} fragments ({} symbols of {} bytes)",
        data.len(),
        details.peer_count(),
        details.symbol_count,
        details.symbol_size
    );

    let timeout = config.response_timeout();
    let spn = details.subfragments_per_node;

    let sends = peers.iter().zip(requests).map(|(node, request)| async move {
        let fragment_name = request.fragment_name.clone();
        let ack = tokio::time::timeout(timeout, channel.send_store(node, request))
            .await
            .map_err(|_| P2PError::Timeout {
                expected: 1,
                received: 0,
            })??;
        verify_ack(&ack, node, &fragment_name, spn)?;
        tracing::debug!("{} stored fragment {}", node, fragment_name);
        Ok::<_, StorageError>(())
    });

    for (node, result) in peers.iter().zip(join_all(sends).await) {
        if let Err(e) = result {
            tracing::error!("Store to {} failed: {}", node, e);
            return Err(e);
        }
    }

    Ok(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p2p::LocalCluster;

    fn config() -> RlncConfig {
        RlncConfig {
            response_timeout_ms: 200,
            ..RlncConfig::default()
        }
    }

    #[tokio::test]
    async fn test_store_places_one_fragment_per_peer() {
        let field = Arc::new(Gf256::new());
        let cluster = LocalCluster::new(4, field.clone());
        let data: Vec<u8> = (0..6000).map(|i| (i % 251) as u8).collect();

        let details = store_file(&cluster, field, &config(), &data).await.unwrap();

        assert_eq!(details.symbol_count, 6);
        assert_eq!(details.symbol_size, 1000);
        for (i, name) in details.coded_fragment_names.iter().enumerate() {
            assert_eq!(cluster.holder_of(name), Some(i));
            let blobs = cluster.peer(i).unwrap().store().blobs(name).unwrap();
            assert_eq!(blobs.len(), 2);
            assert!(blobs.iter().all(|b| b.len() == details.blob_len()));
        }
        assert_eq!(cluster.write_count(), 4);
    }

    #[tokio::test]
    async fn test_store_rejects_bad_parameters_before_sending() {
        let field = Arc::new(Gf256::new());
        let cluster = LocalCluster::new(1, field.clone());

        let result = store_file(&cluster, field, &config(), b"hello").await;
        assert!(matches!(result, Err(StorageError::InvalidParameters(_))));
        assert_eq!(cluster.write_count(), 0);
    }

    #[tokio::test]
    async fn test_store_times_out_on_silent_peer() {
        let field = Arc::new(Gf256::new());
        let cluster = LocalCluster::new(3, field.clone());
        cluster.set_online(2, false);

        let err = store_file(&cluster, field, &config(), b"hello world")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Network(P2PError::Timeout { .. })));
        assert!(err.is_retryable());
    }
}
