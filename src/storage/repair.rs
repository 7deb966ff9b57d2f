//! Repair orchestrator
//!
//! Walks stored files one at a time: survey every fragment, decide whether
//! the file is healthy, repairable or beyond its erasure budget, and for
//! repairable files regenerate the lost subfragments from symbols the
//! surviving peers recode locally. No file is ever decoded during repair.

use super::{fan_in_error, verify_ack, FileRecord, StorageDetails, StorageError};
use crate::coding::{coefficient_rank, Gf256, Recoder, Symbol};
use crate::p2p::{
    collect_responses, FragmentStatus, NodeId, P2PError, PeerChannel, RecodeRequest, StoreRequest,
};
use crate::RlncConfig;

use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Survey verdict for one fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentHealth {
    /// All subfragments present on `owner`
    Healthy { owner: NodeId },

    /// `owner` still holds the fragment but lost `lost` subfragments
    PartiallyMissing { owner: NodeId, lost: usize },

    /// No node holds the fragment; `owner` is the node inferred to have lost it
    FullyMissing { owner: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentSurvey {
    pub fragment_name: String,
    pub health: FragmentHealth,
}

/// Classified survey of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyReport {
    /// One entry per fragment, in catalog order
    pub fragments: Vec<FragmentSurvey>,

    /// Every node that answered the survey
    pub surveyed_nodes: BTreeSet<NodeId>,

    /// Nodes that reported holding some fragment of this file
    pub nodes_with_fragment: BTreeSet<NodeId>,

    /// Total subfragments to regenerate
    pub missing_subfragments: usize,
}

impl SurveyReport {
    /// Classify the status rounds of a file's survey.
    ///
    /// `rounds[i]` holds every node's answer for fragment `i` of `details`.
    pub fn classify(
        details: &StorageDetails,
        rounds: &[Vec<FragmentStatus>],
    ) -> Result<Self, StorageError> {
        let names = &details.coded_fragment_names;
        let spn = details.subfragments_per_node;

        if rounds.len() != names.len() {
            return Err(StorageError::ProtocolViolation(format!(
                "{} survey rounds for {} fragments",
                rounds.len(),
                names.len()
            )));
        }

        let mut surveyed: Option<BTreeSet<NodeId>> = None;
        let mut nodes_with_fragment = BTreeSet::new();
        let mut observed: Vec<Option<(NodeId, usize)>> = Vec::with_capacity(names.len());

        for (name, statuses) in names.iter().zip(rounds) {
            let nodes: BTreeSet<NodeId> = statuses.iter().map(|s| s.node_id.clone()).collect();
            if nodes.len() != statuses.len() {
                return Err(StorageError::ProtocolViolation(format!(
                    "Duplicate node in survey of {}",
                    name
                )));
            }
            match &surveyed {
                None => surveyed = Some(nodes),
                Some(previous) if *previous != nodes => {
                    return Err(StorageError::ProtocolViolation(format!(
                        "Node set changed while surveying {}",
                        name
                    )));
                }
                Some(_) => {}
            }

            if let Some(stray) = statuses.iter().find(|s| &s.fragment_name != name) {
                return Err(StorageError::ProtocolViolation(format!(
                    "{} answered for {} when asked about {}",
                    stray.node_id, stray.fragment_name, name
                )));
            }

            let present: Vec<&FragmentStatus> = statuses.iter().filter(|s| s.is_present).collect();
            let entry = match present.as_slice() {
                [] => None,
                [status] => {
                    if status.count > spn {
                        return Err(StorageError::ProtocolViolation(format!(
                            "{} holds {} subfragments of {}, at most {} were placed",
                            status.node_id, status.count, name, spn
                        )));
                    }
                    nodes_with_fragment.insert(status.node_id.clone());
                    Some((status.node_id.clone(), status.count))
                }
                many => {
                    return Err(StorageError::ProtocolViolation(format!(
                        "{} reported by {} nodes",
                        name,
                        many.len()
                    )));
                }
            };
            observed.push(entry);
        }

        let surveyed_nodes = surveyed.unwrap_or_default();
        let fully_missing = observed.iter().filter(|o| o.is_none()).count();

        // Nodes that answered but hold nothing lost what nobody holds
        let mut candidates = surveyed_nodes.difference(&nodes_with_fragment);
        if fully_missing > 0 && surveyed_nodes.len() - nodes_with_fragment.len() != fully_missing
        {
            return Err(StorageError::ProtocolViolation(format!(
                "{} fragments lost but {} nodes hold nothing",
                fully_missing,
                surveyed_nodes.len() - nodes_with_fragment.len()
            )));
        }

        let mut fragments = Vec::with_capacity(names.len());
        let mut missing_subfragments = 0;

        for (name, entry) in names.iter().zip(observed) {
            let health = match entry {
                Some((owner, count)) if count == spn => FragmentHealth::Healthy { owner },
                Some((owner, count)) => {
                    missing_subfragments += spn - count;
                    FragmentHealth::PartiallyMissing {
                        owner,
                        lost: spn - count,
                    }
                }
                None => {
                    let owner = candidates.next().cloned().ok_or_else(|| {
                        StorageError::ProtocolViolation(format!("No owner left for {}", name))
                    })?;
                    missing_subfragments += spn;
                    FragmentHealth::FullyMissing { owner }
                }
            };
            fragments.push(FragmentSurvey {
                fragment_name: name.clone(),
                health,
            });
        }

        Ok(Self {
            fragments,
            surveyed_nodes,
            nodes_with_fragment,
            missing_subfragments,
        })
    }

    /// Fragments at least one node still holds
    pub fn surviving_fragments(&self) -> Vec<String> {
        self.fragments
            .iter()
            .filter(|f| !matches!(f.health, FragmentHealth::FullyMissing { .. }))
            .map(|f| f.fragment_name.clone())
            .collect()
    }

    /// Split regenerated symbols into per-owner bundles: fully missing
    /// fragments first, then partially missing ones, both in catalog order.
    pub fn partition(
        &self,
        subfragments_per_node: usize,
        symbols: Vec<Symbol>,
    ) -> Result<Vec<(NodeId, StoreRequest)>, StorageError> {
        if symbols.len() != self.missing_subfragments {
            return Err(StorageError::InvalidParameters(format!(
                "{} regenerated symbols for {} missing subfragments",
                symbols.len(),
                self.missing_subfragments
            )));
        }

        let fully = self.fragments.iter().filter_map(|f| match &f.health {
            FragmentHealth::FullyMissing { owner } => Some((f, owner, subfragments_per_node)),
            _ => None,
        });
        let partially = self.fragments.iter().filter_map(|f| match &f.health {
            FragmentHealth::PartiallyMissing { owner, lost } => Some((f, owner, *lost)),
            _ => None,
        });

        let mut symbols = symbols.into_iter();
        let bundles = fully
            .chain(partially)
            .map(|(fragment, owner, n)| {
                let blobs = symbols.by_ref().take(n).map(|s| s.to_blob()).collect();
                (
                    owner.clone(),
                    StoreRequest {
                        fragment_name: fragment.fragment_name.clone(),
                        blobs,
                    },
                )
            })
            .collect();

        Ok(bundles)
    }
}

/// Result of repairing one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Nothing missing; no recode round, no writes
    Healthy,

    /// `repaired` subfragments regenerated and stored
    Repaired { missing: usize, repaired: usize },

    /// More lost than the erasure budget allows; left untouched
    Unrepairable { missing: usize, budget: usize },

    /// The attempt was aborted. `missing` is known if the survey completed.
    Failed {
        missing: Option<usize>,
        error: String,
        retryable: bool,
    },
}

#[derive(Debug, Clone)]
pub struct FileRepairReport {
    pub file_id: String,
    pub outcome: RepairOutcome,
}

/// Totals of one repair run
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    /// Subfragments found missing across all surveyed files
    pub missing_subfragments: usize,

    /// Subfragments regenerated and acknowledged
    pub repaired_subfragments: usize,

    /// Per-file outcomes, in processing order
    pub files: Vec<FileRepairReport>,

    /// The run stopped early on cancellation
    pub cancelled: bool,
}

impl RepairReport {
    fn record(&mut self, file_id: &str, outcome: RepairOutcome) {
        match &outcome {
            RepairOutcome::Healthy => {}
            RepairOutcome::Repaired { missing, repaired } => {
                self.missing_subfragments += missing;
                self.repaired_subfragments += repaired;
            }
            RepairOutcome::Unrepairable { missing, .. } => self.missing_subfragments += missing,
            RepairOutcome::Failed { missing, .. } => {
                self.missing_subfragments += missing.unwrap_or(0)
            }
        }
        self.files.push(FileRepairReport {
            file_id: file_id.to_string(),
            outcome,
        });
    }

    /// Outcome for one file, if it was processed
    pub fn outcome(&self, file_id: &str) -> Option<&RepairOutcome> {
        self.files
            .iter()
            .find(|f| f.file_id == file_id)
            .map(|f| &f.outcome)
    }

    /// Files whose repair failed and may succeed on a later run
    pub fn retryable(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, RepairOutcome::Failed { retryable: true, .. }))
            .map(|f| f.file_id.as_str())
            .collect()
    }
}

/// Drives repair of stored files over a peer channel
pub struct RepairOrchestrator<'a, C: ?Sized> {
    channel: &'a C,
    field: Arc<Gf256>,
    config: &'a RlncConfig,
}

impl<'a, C> RepairOrchestrator<'a, C>
where
    C: PeerChannel + ?Sized,
{
    pub fn new(channel: &'a C, field: Arc<Gf256>, config: &'a RlncConfig) -> Self {
        Self {
            channel,
            field,
            config,
        }
    }

    /// Repair `files` sequentially. A failing file never stops the batch;
    /// cancellation stops it between files.
    pub async fn run<'r, I>(&self, files: I, cancel: &CancellationToken) -> RepairReport
    where
        I: IntoIterator<Item = &'r FileRecord>,
    {
        let mut report = RepairReport::default();

        for record in files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let outcome = self.repair_file(record, cancel).await;
            report.record(&record.file_id, outcome);

            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
        }

        if report.cancelled {
            tracing::warn!("Repair run cancelled after {} files", report.files.len());
        }
        tracing::info!(
            "Repair run done: {} files, {} subfragments missing, {} repaired",
            report.files.len(),
            report.missing_subfragments,
            report.repaired_subfragments
        );

        report
    }

    /// Survey one file and repair it if it is within budget
    pub async fn repair_file(&self, record: &FileRecord, cancel: &CancellationToken) -> RepairOutcome {
        let details = &record.storage_details;

        let survey = match self.prepare(record, cancel).await {
            Ok(survey) => survey,
            Err(e) => return failed(record, None, e),
        };

        let missing = survey.missing_subfragments;
        if missing == 0 {
            tracing::debug!("{} is healthy", record.file_id);
            return RepairOutcome::Healthy;
        }

        let budget = details.repair_budget();
        if missing > budget {
            tracing::warn!(
                "{} is unrepairable: {} subfragments missing, budget {}",
                record.file_id,
                missing,
                budget
            );
            return RepairOutcome::Unrepairable { missing, budget };
        }

        tracing::info!(
            "Repairing {}: {} subfragments missing",
            record.file_id,
            missing
        );

        match self.heal(details, &survey, cancel).await {
            Ok(repaired) => RepairOutcome::Repaired { missing, repaired },
            Err(e) => failed(record, Some(missing), e),
        }
    }

    async fn prepare(
        &self,
        record: &FileRecord,
        cancel: &CancellationToken,
    ) -> Result<SurveyReport, StorageError> {
        let details = &record.storage_details;
        details.validate(record.original_size)?;

        let peer_count = self.channel.peer_count();
        if peer_count != details.peer_count() {
            return Err(StorageError::ProtocolViolation(format!(
                "Peer set has {} nodes, file was placed on {}",
                peer_count,
                details.peer_count()
            )));
        }

        self.survey(details, peer_count, cancel).await
    }

    /// Ask every node about every fragment of the file
    pub async fn survey(
        &self,
        details: &StorageDetails,
        peer_count: usize,
        cancel: &CancellationToken,
    ) -> Result<SurveyReport, StorageError> {
        let timeout = self.config.response_timeout();
        let mut rounds = Vec::with_capacity(details.peer_count());

        for name in &details.coded_fragment_names {
            let mut rx = self.channel.broadcast_status_query(name).await?;

            let statuses = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StorageError::Cancelled),
                result = collect_responses(&mut rx, peer_count, timeout, |s: &FragmentStatus| {
                    s.node_id.clone()
                }) => result.map_err(fan_in_error)?,
            };
            rounds.push(statuses);
        }

        SurveyReport::classify(details, &rounds)
    }

    /// Regenerate and redistribute every missing subfragment
    async fn heal(
        &self,
        details: &StorageDetails,
        survey: &SurveyReport,
        cancel: &CancellationToken,
    ) -> Result<usize, StorageError> {
        let request = RecodeRequest {
            fragment_names: survey.surviving_fragments(),
            symbol_count: details.symbol_count,
            symbol_size: details.symbol_size,
            outputs_per_fragment: details.subfragments_per_node,
        };

        let rounds = self.config.max_recode_rounds.max(1);
        let mut attempt = 0;
        let pool = loop {
            attempt += 1;
            let pool = self.collect_recoded(details, survey, &request, cancel).await?;

            let rank = coefficient_rank(
                self.field.clone(),
                details.symbol_count,
                pool.iter().map(|s| s.coefficients.as_slice()),
            );
            if rank == details.symbol_count {
                break pool;
            }
            if attempt >= rounds {
                return Err(StorageError::InsufficientRank {
                    rank,
                    needed: details.symbol_count,
                });
            }
            tracing::warn!(
                "Recoded pool has rank {}/{}, retrying ({}/{})",
                rank,
                details.symbol_count,
                attempt,
                rounds
            );
        };

        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let mut recoder = Recoder::new(
            self.field.clone(),
            details.symbol_count,
            details.symbol_size,
            pool.len(),
        );
        for symbol in &pool {
            recoder.consume_symbol(&symbol.coefficients, &symbol.payload)?;
        }
        let regenerated = recoder.produce_symbols(survey.missing_subfragments)?;

        let bundles = survey.partition(details.subfragments_per_node, regenerated)?;
        self.redistribute(details.subfragments_per_node, bundles).await
    }

    /// One recode round: every holder recodes its own fragments
    async fn collect_recoded(
        &self,
        details: &StorageDetails,
        survey: &SurveyReport,
        request: &RecodeRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<Symbol>, StorageError> {
        let expected = survey.nodes_with_fragment.len();
        let mut rx = self.channel.broadcast_recode_request(request.clone()).await?;

        let responses = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StorageError::Cancelled),
            result = collect_responses(&mut rx, expected, self.config.response_timeout(), |r| {
                r.node_id.clone()
            }) => result.map_err(fan_in_error)?,
        };

        let mut pool = Vec::new();
        for response in responses {
            if !survey.nodes_with_fragment.contains(&response.node_id) {
                return Err(StorageError::ProtocolViolation(format!(
                    "Recode response from {}, which holds no fragment",
                    response.node_id
                )));
            }
            for blob in &response.blobs {
                let symbol = Symbol::from_blob(blob, details.symbol_count, details.symbol_size)
                    .map_err(|e| {
                        StorageError::ProtocolViolation(format!(
                            "{} sent a malformed recoded symbol: {}",
                            response.node_id, e
                        ))
                    })?;
                pool.push(symbol);
            }
        }

        tracing::debug!("Collected {} recoded symbols from {} nodes", pool.len(), expected);
        Ok(pool)
    }

    /// Send every bundle to its owner and validate each acknowledgment
    async fn redistribute(
        &self,
        subfragments_per_node: usize,
        bundles: Vec<(NodeId, StoreRequest)>,
    ) -> Result<usize, StorageError> {
        let timeout = self.config.response_timeout();

        let sends = bundles.into_iter().map(|(node, request)| async move {
            let fragment_name = request.fragment_name.clone();
            let count = request.blobs.len();

            let ack = tokio::time::timeout(timeout, self.channel.send_repair_store(&node, request))
                .await
                .map_err(|_| P2PError::Timeout {
                    expected: 1,
                    received: 0,
                })??;
            verify_ack(&ack, &node, &fragment_name, subfragments_per_node)?;

            tracing::info!(
                "Restored {} subfragments of {} on {}",
                count,
                fragment_name,
                node
            );
            Ok::<_, StorageError>(count)
        });

        let mut repaired = 0;
        let mut first_error = None;
        for result in join_all(sends).await {
            match result {
                Ok(count) => repaired += count,
                Err(e) => {
                    tracing::error!("Repair store failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(repaired),
        }
    }
}

fn failed(record: &FileRecord, missing: Option<usize>, error: StorageError) -> RepairOutcome {
    match &error {
        StorageError::ProtocolViolation(_) => {
            tracing::error!("Repair of {} aborted: {}", record.file_id, error)
        }
        _ => tracing::warn!("Repair of {} failed: {}", record.file_id, error),
    }
    RepairOutcome::Failed {
        missing,
        retryable: error.is_retryable(),
        error: error.to_string(),
    }
}
