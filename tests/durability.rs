//! End-to-end durability: store, lose peers, repair, retrieve.

use std::sync::Arc;

use rlnc_core::coding::{coefficient_rank, Gf256};
use rlnc_core::p2p::LocalCluster;
use rlnc_core::storage::{FileManager, FileRecord, FragmentSelection, RepairOutcome};
use rlnc_core::RlncConfig;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

fn setup(peers: usize, config: RlncConfig) -> (FileManager<LocalCluster>, Arc<LocalCluster>, Arc<Gf256>) {
    let field = Arc::new(Gf256::new());
    let cluster = Arc::new(LocalCluster::new(peers, field.clone()));
    let manager = FileManager::new(cluster.clone(), config).with_field(field.clone());
    (manager, cluster, field)
}

fn config() -> RlncConfig {
    RlncConfig {
        response_timeout_ms: 250,
        ..RlncConfig::default()
    }
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 17 % 253) as u8).collect()
}

/// Store `data` until any `symbol_count` of its stored symbols are
/// independent; a singular draw is retried rather than tested against
async fn store_independent(
    manager: &mut FileManager<LocalCluster>,
    cluster: &LocalCluster,
    field: &Arc<Gf256>,
    data: &[u8],
) -> FileRecord {
    loop {
        let record = assert_ok!(manager.store_file("data.bin", data).await);
        let d = &record.storage_details;

        let coefficients: Vec<Vec<u8>> = d
            .coded_fragment_names
            .iter()
            .enumerate()
            .flat_map(|(i, name)| cluster.peer(i).unwrap().store().blobs(name).unwrap())
            .map(|blob| blob[..d.symbol_count].to_vec())
            .collect();

        let total = coefficients.len();
        let independent = (0u32..(1 << total))
            .filter(|mask| mask.count_ones() as usize == d.symbol_count)
            .all(|mask| {
                let vectors = (0..total)
                    .filter(|i| mask & (1 << i) != 0)
                    .map(|i| coefficients[i].as_slice());
                coefficient_rank(field.clone(), d.symbol_count, vectors) == d.symbol_count
            });

        if independent {
            return record;
        }
        manager.remove_from_catalog(&record.file_id);
        for (i, name) in d.coded_fragment_names.iter().enumerate() {
            cluster.peer(i).unwrap().store().delete_fragment(name);
        }
    }
}

#[tokio::test]
async fn round_trip_across_layouts() {
    for peers in 2..=6 {
        for max_erasures in 1..peers {
            for spn in 1..=3 {
                let (mut manager, _cluster, _field) = setup(
                    peers,
                    RlncConfig {
                        max_erasures,
                        subfragments_per_node: spn,
                        ..config()
                    },
                );
                let data = payload(97 * peers + spn);

                let record = assert_ok!(manager.store_file("layout.bin", &data).await);
                assert_eq!(
                    record.storage_details.symbol_count,
                    (peers - max_erasures) * spn
                );

                let got = assert_ok!(manager.get_file(&record.file_id).await);
                assert_eq!(got, data, "peers={} e={} spn={}", peers, max_erasures, spn);
            }
        }
    }
}

#[tokio::test]
async fn lost_peer_plus_partial_loss_is_left_alone() {
    let (mut manager, cluster, field) = setup(4, config());
    let record = store_independent(&mut manager, &cluster, &field, &payload(6000)).await;
    let names = record.storage_details.coded_fragment_names.clone();

    cluster.wipe(2);
    cluster.drop_subfragments(3, &names[3], 1);
    let writes = cluster.write_count();

    let report = manager.repair_all(&CancellationToken::new()).await;

    assert_eq!(
        report.outcome(&record.file_id),
        Some(&RepairOutcome::Unrepairable {
            missing: 3,
            budget: 2
        })
    );
    assert_eq!(report.missing_subfragments, 3);
    assert_eq!(report.repaired_subfragments, 0);
    assert_eq!(cluster.write_count(), writes);
}

#[tokio::test]
async fn lost_peer_is_rebuilt_and_file_survives() {
    let (mut manager, cluster, field) = setup(4, config());
    let data = payload(6000);
    let record = store_independent(&mut manager, &cluster, &field, &data).await;
    let names = record.storage_details.coded_fragment_names.clone();

    cluster.wipe(2);

    let report = manager.repair_all(&CancellationToken::new()).await;
    assert_eq!(report.missing_subfragments, 2);
    assert_eq!(report.repaired_subfragments, 2);
    assert_eq!(cluster.holder_of(&names[2]), Some(2));

    let excluding_repaired = FragmentSelection::Explicit(vec![
        names[0].clone(),
        names[1].clone(),
        names[3].clone(),
    ]);
    let got = assert_ok!(manager.get_file_with(&record.file_id, excluding_repaired).await);
    assert_eq!(got, data);

    // A second pass finds nothing to do
    let writes = cluster.write_count();
    let again = manager.repair_all(&CancellationToken::new()).await;
    assert_eq!(again.outcome(&record.file_id), Some(&RepairOutcome::Healthy));
    assert_eq!(cluster.write_count(), writes);
}

#[tokio::test]
async fn silent_peer_marks_files_retryable() {
    let (mut manager, cluster, field) = setup(4, config());
    let record = store_independent(&mut manager, &cluster, &field, &payload(300)).await;

    cluster.set_online(1, false);
    let report = manager.repair_all(&CancellationToken::new()).await;
    assert_eq!(report.retryable(), vec![record.file_id.as_str()]);

    cluster.set_online(1, true);
    let report = manager.repair_all(&CancellationToken::new()).await;
    assert_eq!(report.outcome(&record.file_id), Some(&RepairOutcome::Healthy));
}

#[tokio::test]
async fn too_few_peers_is_rejected_up_front() {
    let (mut manager, cluster, _field) = setup(
        2,
        RlncConfig {
            max_erasures: 2,
            ..config()
        },
    );

    assert_err!(manager.store_file("x", b"data").await);
    assert_eq!(cluster.write_count(), 0);
    assert!(manager.catalog().is_empty());
}
