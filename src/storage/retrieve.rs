//! Retrieve path
//!
//! Fetches `peer_count - max_erasures` fragments and decodes them. A random
//! selection that comes up short (silent holder, lost subfragments, or an
//! unlucky rank-deficient draw) widens to the remaining fragments once.

use super::{fan_in_error, FileRecord, StorageDetails, StorageError};
use crate::coding::{Decoder, Gf256, Symbol};
use crate::crypto::ContentHash;
use crate::p2p::{collect_available, FragmentReply, P2PError, PeerChannel};
use crate::RlncConfig;

use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;

/// Which fragments a retrieve fetches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FragmentSelection {
    /// A uniformly random subset of the required size
    #[default]
    Random,

    /// Exactly these fragments, with no fallback
    Explicit(Vec<String>),
}

/// Fetch and decode the file described by `record`
pub async fn retrieve_file<C>(
    channel: &C,
    field: Arc<Gf256>,
    config: &RlncConfig,
    record: &FileRecord,
    selection: FragmentSelection,
) -> Result<Vec<u8>, StorageError>
where
    C: PeerChannel + ?Sized,
{
    let details = &record.storage_details;
    details.validate(record.original_size)?;

    let (chosen, fallback) = match selection {
        FragmentSelection::Random => {
            let mut names = details.coded_fragment_names.clone();
            names.shuffle(&mut rand::thread_rng());
            let rest = names.split_off(details.fragments_needed());
            (names, Some(rest))
        }
        FragmentSelection::Explicit(names) => {
            check_explicit(details, &names)?;
            (names, None)
        }
    };

    let mut decoder = Decoder::new(field, details.symbol_count, details.symbol_size);

    let mut shortfall = fetch_into(channel, config, details, &chosen, &mut decoder).await?;

    if !decoder.is_complete() {
        if let Some(rest) = fallback.filter(|rest| !rest.is_empty()) {
            tracing::warn!(
                "Decoder at rank {}/{} after {} fragments, widening to {} more",
                decoder.rank(),
                details.symbol_count,
                chosen.len(),
                rest.len()
            );
            let widened = fetch_into(channel, config, details, &rest, &mut decoder).await?;
            shortfall = shortfall.or(widened);
        }
    }

    // Silent peers are the reason for an incomplete decode whenever any fetch fell short
    if !decoder.is_complete() {
        if let Some(e) = shortfall {
            return Err(e.into());
        }
    }

    if !decoder.is_complete() {
        return Err(StorageError::ReconstructionFailed {
            rank: decoder.rank(),
            needed: details.symbol_count,
        });
    }

    let mut data = decoder.data()?;
    data.truncate(record.original_size as usize);

    if config.verify_integrity {
        if let Some(expected) = &record.content_hash {
            if !ContentHash::matches(expected, &data) {
                tracing::error!("Integrity check failed for {}", record.file_id);
                return Err(StorageError::IntegrityCheckFailed);
            }
        }
    }

    tracing::info!(
        "Retrieved {} ({} bytes) from {} fragments",
        record.file_id,
        data.len(),
        chosen.len()
    );

    Ok(data)
}

fn check_explicit(details: &StorageDetails, names: &[String]) -> Result<(), StorageError> {
    let known: HashSet<&String> = details.coded_fragment_names.iter().collect();
    let mut seen = HashSet::new();

    for name in names {
        if !known.contains(name) {
            return Err(StorageError::InvalidParameters(format!(
                "{} is not a fragment of this file",
                name
            )));
        }
        if !seen.insert(name) {
            return Err(StorageError::InvalidParameters(format!(
                "{} selected twice",
                name
            )));
        }
    }

    if names.len() < details.fragments_needed() {
        return Err(StorageError::InvalidParameters(format!(
            "{} fragments selected, {} needed",
            names.len(),
            details.fragments_needed()
        )));
    }
    Ok(())
}

/// Fetch `names` and feed every returned symbol to `decoder`.
///
/// Returns the collection shortfall, if any peer stayed silent.
async fn fetch_into<C>(
    channel: &C,
    config: &RlncConfig,
    details: &StorageDetails,
    names: &[String],
    decoder: &mut Decoder,
) -> Result<Option<P2PError>, StorageError>
where
    C: PeerChannel + ?Sized,
{
    let mut rx = channel.request_fragments(names).await?;
    let collected = collect_available(&mut rx, names.len(), config.response_timeout(), |r| {
        r.fragment_name.clone()
    })
    .await
    .map_err(fan_in_error)?;

    if let Some(shortfall) = &collected.shortfall {
        tracing::warn!("Fragment fetch incomplete: {}", shortfall);
    }

    for reply in &collected.responses {
        consume_reply(details, names, reply, decoder)?;
    }

    Ok(collected.shortfall)
}

fn consume_reply(
    details: &StorageDetails,
    requested: &[String],
    reply: &FragmentReply,
    decoder: &mut Decoder,
) -> Result<(), StorageError> {
    if !requested.contains(&reply.fragment_name) {
        return Err(StorageError::ProtocolViolation(format!(
            "{} returned unrequested fragment {}",
            reply.node_id, reply.fragment_name
        )));
    }
    if reply.blobs.len() > details.subfragments_per_node {
        return Err(StorageError::ProtocolViolation(format!(
            "{} returned {} subfragments of {}, at most {} exist",
            reply.node_id,
            reply.blobs.len(),
            reply.fragment_name,
            details.subfragments_per_node
        )));
    }

    for blob in &reply.blobs {
        let symbol = Symbol::from_blob(blob, details.symbol_count, details.symbol_size)
            .map_err(|e| {
                StorageError::ProtocolViolation(format!(
                    "{} sent a malformed symbol for {}: {}",
                    reply.node_id, reply.fragment_name, e
                ))
            })?;
        decoder.consume_symbol(&symbol.coefficients, &symbol.payload)?;
    }

    tracing::debug!(
        "Consumed {} symbols of {} from {}, rank {}",
        reply.blobs.len(),
        reply.fragment_name,
        reply.node_id,
        decoder.rank()
    );
    Ok(())
}
