//! Storage protocol handler - the peer side of fragment storage
//!
//! A [`FragmentStore`] is what one storage peer runs: it keeps coded
//! fragments by name, answers status queries, serves fragments, and recodes
//! its own subfragments on request so that repair traffic never needs the
//! original data.

use super::{
    ErrorCode, FragmentReply, FragmentStatus, NodeId, PeerRequest, PeerResponse, RecodeRequest,
    RecodeResponse, StoreAck, StoreRequest,
};
use crate::coding::{Gf256, Recoder, Symbol};
use crate::crypto::ContentHash;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Fragment data held by a peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFragment {
    /// Fragment name
    pub fragment_name: String,

    /// Coded subfragments (`coefficients ‖ payload`)
    pub blobs: Vec<Vec<u8>>,

    /// Size in bytes
    pub size_bytes: u64,

    /// Hash over all blobs, checked before serving
    pub content_hash: String,

    /// Creation timestamp
    pub created_at: i64,

    /// Access count
    pub access_count: u64,

    /// Last access timestamp
    pub last_accessed: i64,
}

impl StoredFragment {
    fn new(fragment_name: &str, blobs: Vec<Vec<u8>>) -> Self {
        let now = chrono::Utc::now().timestamp();
        let mut fragment = Self {
            fragment_name: fragment_name.to_string(),
            blobs,
            size_bytes: 0,
            content_hash: String::new(),
            created_at: now,
            access_count: 0,
            last_accessed: now,
        };
        fragment.rehash();
        fragment
    }

    fn rehash(&mut self) {
        self.size_bytes = self.blobs.iter().map(|b| b.len() as u64).sum();
        self.content_hash = ContentHash::of_blobs(&self.blobs).to_base58();
    }

    fn verify(&self) -> bool {
        ContentHash::of_blobs(&self.blobs).to_base58() == self.content_hash
    }
}

/// Storage statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageStats {
    pub used_bytes: u64,
    pub fragment_count: u64,
    pub subfragment_count: u64,
}

/// Manages the fragments stored on one peer
pub struct FragmentStore {
    node_id: NodeId,
    field: Arc<Gf256>,
    fragments: RwLock<HashMap<String, StoredFragment>>,
}

impl FragmentStore {
    /// Create an empty store
    pub fn new(node_id: impl Into<NodeId>, field: Arc<Gf256>) -> Self {
        Self {
            node_id: node_id.into(),
            field,
            fragments: RwLock::new(HashMap::new()),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Dispatch a request. `None` means the peer stays silent (broadcast
    /// about something it does not hold).
    pub fn handle(&self, request: PeerRequest) -> Option<PeerResponse> {
        let response = match request {
            PeerRequest::Store(req) => PeerResponse::Stored(self.store_fragment(req)),
            PeerRequest::RepairStore(req) => PeerResponse::Stored(self.append_subfragments(req)),
            PeerRequest::Status { fragment_name } => {
                PeerResponse::Status(self.status(&fragment_name))
            }
            PeerRequest::Fetch { fragment_names } => match self.fetch(&fragment_names) {
                Ok(replies) if replies.is_empty() => PeerResponse::NotHeld,
                Ok(replies) => PeerResponse::Fragments(replies),
                Err(e) => e,
            },
            PeerRequest::Recode(req) => match self.recode(&req) {
                Ok(Some(resp)) => PeerResponse::Recoded(resp),
                Ok(None) => PeerResponse::NotHeld,
                Err(e) => e,
            },
            PeerRequest::Delete { fragment_name } => {
                if self.delete_fragment(&fragment_name) {
                    PeerResponse::Deleted { fragment_name }
                } else {
                    PeerResponse::Error {
                        code: ErrorCode::NotFound,
                        message: format!("Fragment {} not found", fragment_name),
                    }
                }
            }
            PeerRequest::GetStorageInfo => {
                let stats = self.stats();
                PeerResponse::StorageInfo {
                    node_id: self.node_id.clone(),
                    used_bytes: stats.used_bytes,
                    fragment_count: stats.fragment_count,
                    subfragment_count: stats.subfragment_count,
                }
            }
        };

        match response {
            PeerResponse::NotHeld => None,
            other => Some(other),
        }
    }

    /// Store a fragment, replacing any previous content under that name
    pub fn store_fragment(&self, request: StoreRequest) -> StoreAck {
        let stored_count = request.blobs.len();
        let fragment = StoredFragment::new(&request.fragment_name, request.blobs);

        tracing::debug!(
            "Peer {} stored fragment {} ({} subfragments, {} bytes)",
            self.node_id,
            fragment.fragment_name,
            stored_count,
            fragment.size_bytes
        );

        self.fragments
            .write()
            .insert(request.fragment_name.clone(), fragment);

        StoreAck {
            node_id: self.node_id.clone(),
            fragment_name: request.fragment_name,
            stored_count,
        }
    }

    /// Append regenerated subfragments
    pub fn append_subfragments(&self, request: StoreRequest) -> StoreAck {
        let mut fragments = self.fragments.write();
        let fragment = fragments
            .entry(request.fragment_name.clone())
            .or_insert_with(|| StoredFragment::new(&request.fragment_name, Vec::new()));

        fragment.blobs.extend(request.blobs);
        fragment.rehash();
        let stored_count = fragment.blobs.len();

        tracing::debug!(
            "Peer {} repaired fragment {} (now {} subfragments)",
            self.node_id,
            request.fragment_name,
            stored_count
        );

        StoreAck {
            node_id: self.node_id.clone(),
            fragment_name: request.fragment_name,
            stored_count,
        }
    }

    /// Presence and subfragment count
    pub fn status(&self, fragment_name: &str) -> FragmentStatus {
        let count = self
            .fragments
            .read()
            .get(fragment_name)
            .map(|f| f.blobs.len());

        FragmentStatus {
            node_id: self.node_id.clone(),
            fragment_name: fragment_name.to_string(),
            is_present: count.is_some(),
            count: count.unwrap_or(0),
        }
    }

    /// Serve the named fragments held here
    pub fn fetch(&self, fragment_names: &[String]) -> Result<Vec<FragmentReply>, PeerResponse> {
        let now = chrono::Utc::now().timestamp();
        let mut fragments = self.fragments.write();
        let mut replies = Vec::new();

        for name in fragment_names {
            let Some(fragment) = fragments.get_mut(name) else {
                continue;
            };

            if !fragment.verify() {
                tracing::warn!("Peer {}: fragment {} failed integrity check", self.node_id, name);
                return Err(PeerResponse::Error {
                    code: ErrorCode::IntegrityCheckFailed,
                    message: format!("Fragment {} integrity check failed", name),
                });
            }

            fragment.access_count += 1;
            fragment.last_accessed = now;

            replies.push(FragmentReply {
                node_id: self.node_id.clone(),
                fragment_name: name.clone(),
                blobs: fragment.blobs.clone(),
            });
        }

        Ok(replies)
    }

    /// Recode every requested fragment held here.
    ///
    /// Returns `Ok(None)` when none of them is held.
    pub fn recode(&self, request: &RecodeRequest) -> Result<Option<RecodeResponse>, PeerResponse> {
        let fragments = self.fragments.read();
        let mut blobs = Vec::new();
        let mut held_any = false;

        for name in &request.fragment_names {
            let Some(fragment) = fragments.get(name) else {
                continue;
            };
            held_any = true;
            if !fragment.verify() {
                tracing::warn!(
                    "Peer {}: fragment {} failed integrity check, refusing to recode",
                    self.node_id,
                    name
                );
                return Err(PeerResponse::Error {
                    code: ErrorCode::IntegrityCheckFailed,
                    message: format!("Fragment {} integrity check failed", name),
                });
            }
            if fragment.blobs.is_empty() {
                continue;
            }

            let mut recoder = Recoder::new(
                self.field.clone(),
                request.symbol_count,
                request.symbol_size,
                fragment.blobs.len(),
            );

            for blob in &fragment.blobs {
                let symbol = Symbol::from_blob(blob, request.symbol_count, request.symbol_size)
                    .map_err(|e| PeerResponse::Error {
                        code: ErrorCode::InvalidRequest,
                        message: format!("Fragment {}: {}", name, e),
                    })?;
                recoder
                    .consume_symbol(&symbol.coefficients, &symbol.payload)
                    .map_err(|e| PeerResponse::Error {
                        code: ErrorCode::InternalError,
                        message: e.to_string(),
                    })?;
            }

            let recoded = recoder
                .produce_symbols(request.outputs_per_fragment)
                .map_err(|e| PeerResponse::Error {
                    code: ErrorCode::InternalError,
                    message: e.to_string(),
                })?;

            blobs.extend(recoded.iter().map(Symbol::to_blob));
        }

        if !held_any {
            return Ok(None);
        }

        tracing::debug!(
            "Peer {} recoded {} symbols for {} requested fragments",
            self.node_id,
            blobs.len(),
            request.fragment_names.len()
        );

        Ok(Some(RecodeResponse {
            node_id: self.node_id.clone(),
            blobs,
        }))
    }

    /// Delete a fragment
    pub fn delete_fragment(&self, fragment_name: &str) -> bool {
        self.fragments.write().remove(fragment_name).is_some()
    }

    /// Discard up to `n` subfragments of a fragment, returning how many went.
    /// Models partial disk loss.
    pub fn drop_subfragments(&self, fragment_name: &str, n: usize) -> usize {
        let mut fragments = self.fragments.write();
        let Some(fragment) = fragments.get_mut(fragment_name) else {
            return 0;
        };

        let dropped = n.min(fragment.blobs.len());
        let keep = fragment.blobs.len() - dropped;
        fragment.blobs.truncate(keep);
        fragment.rehash();
        dropped
    }

    /// Remove everything (disk replaced)
    pub fn clear(&self) {
        self.fragments.write().clear();
    }

    /// Names of all held fragments
    pub fn fragment_names(&self) -> Vec<String> {
        self.fragments.read().keys().cloned().collect()
    }

    /// Raw blobs of one fragment
    pub fn blobs(&self, fragment_name: &str) -> Option<Vec<Vec<u8>>> {
        self.fragments
            .read()
            .get(fragment_name)
            .map(|f| f.blobs.clone())
    }

    /// Get storage statistics
    pub fn stats(&self) -> StorageStats {
        let fragments = self.fragments.read();
        StorageStats {
            used_bytes: fragments.values().map(|f| f.size_bytes).sum(),
            fragment_count: fragments.len() as u64,
            subfragment_count: fragments.values().map(|f| f.blobs.len() as u64).sum(),
        }
    }
}
