//! Bounded fan-in
//!
//! Every broadcast has a known number of answers owed. This module waits for
//! exactly that many, up to a deadline, and rejects a second answer under the
//! same key.

use super::P2PError;
use std::collections::HashSet;
use std::fmt::Display;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Responses gathered by [`collect_available`]
#[derive(Debug)]
pub struct Collected<T> {
    pub responses: Vec<T>,

    /// Why collection stopped before `expected`, if it did
    pub shortfall: Option<P2PError>,
}

/// Collect up to `expected` responses from `rx`, keeping whatever arrived if
/// the deadline passes or every sender goes away first.
///
/// `key` extracts the identity a response is keyed on (node id, fragment
/// name); two responses with the same key are a protocol error. The whole
/// collection shares one deadline.
pub async fn collect_available<T, K, F>(
    rx: &mut mpsc::Receiver<T>,
    expected: usize,
    timeout: Duration,
    key: F,
) -> Result<Collected<T>, P2PError>
where
    K: Eq + Hash + Display,
    F: Fn(&T) -> K,
{
    let deadline = Instant::now() + timeout;
    let mut seen = HashSet::with_capacity(expected);
    let mut responses = Vec::with_capacity(expected);

    while responses.len() < expected {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(response)) => {
                let k = key(&response);
                if !seen.insert(k) {
                    return Err(P2PError::DuplicateResponse(key(&response).to_string()));
                }
                responses.push(response);
            }
            Ok(None) => {
                let received = responses.len();
                return Ok(Collected {
                    responses,
                    shortfall: Some(P2PError::ChannelClosed { expected, received }),
                });
            }
            Err(_) => {
                let received = responses.len();
                return Ok(Collected {
                    responses,
                    shortfall: Some(P2PError::Timeout { expected, received }),
                });
            }
        }
    }

    Ok(Collected {
        responses,
        shortfall: None,
    })
}

/// Collect exactly `expected` responses from `rx`, failing on a shortfall
pub async fn collect_responses<T, K, F>(
    rx: &mut mpsc::Receiver<T>,
    expected: usize,
    timeout: Duration,
    key: F,
) -> Result<Vec<T>, P2PError>
where
    K: Eq + Hash + Display,
    F: Fn(&T) -> K,
{
    let collected = collect_available(rx, expected, timeout, key).await?;
    match collected.shortfall {
        Some(e) => Err(e),
        None => Ok(collected.responses),
    }
}
