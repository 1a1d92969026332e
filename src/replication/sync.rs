//! Sync engine: initial catch-up, remote apply, live broadcast, and the
//! periodic reconciler.

use std::collections::HashMap;
use std::sync::Arc;

use crate::document::Document;
use crate::driver::DriverInner;
use crate::error::DbResult;
use crate::locks::lock_key;
use crate::observability::Logger;
use crate::state::{split_state_key, StateEntry};
use crate::validate::{validate_collection_name, validate_document_id};

use super::{PeerStatus, RECONCILE_INTERVAL_SECS};

/// Apply a mutation committed on a peer.
///
/// Loop prevention: nothing applied here is re-broadcast. Subscriptions
/// still fire. Stale versions (older `updated_at`, or an equal timestamp
/// with a hash that does not win the tie-break) are dropped silently.
pub(crate) fn apply_remote(driver: &Arc<DriverInner>, mut doc: Document) -> DbResult<()> {
    validate_collection_name(&doc.collection)?;
    validate_document_id(&doc.id)?;
    doc.from_cache = false;

    if doc.is_tombstone() {
        return apply_tombstone(driver, &doc);
    }

    let notified = {
        let lock = driver.locks.acquire(&lock_key(&doc.collection, &doc.id));
        let _guard = lock.lock().expect("document lock poisoned");

        if let Some(local) = driver.state.get(&doc.collection, &doc.id) {
            let loses_tie = doc.updated_at == local.updated_at && doc.hash <= local.hash;
            if doc.updated_at < local.updated_at || loses_tie {
                return Ok(());
            }
        }
        driver.publish(&doc)?;
        true
    };

    if notified {
        driver.hub.notify(&doc.collection, &doc);
    }
    Ok(())
}

/// Apply a remote deletion, unless a local write is newer than it
fn apply_tombstone(driver: &Arc<DriverInner>, tombstone: &Document) -> DbResult<()> {
    let pre_image = {
        let lock = driver
            .locks
            .acquire(&lock_key(&tombstone.collection, &tombstone.id));
        let _guard = lock.lock().expect("document lock poisoned");

        if let Some(local) = driver.state.get(&tombstone.collection, &tombstone.id) {
            if local.updated_at > tombstone.updated_at {
                return Ok(());
            }
        }

        let (exists, is_dir) = driver.storage.stat(&tombstone.collection, &tombstone.id);
        if !exists || is_dir {
            return Ok(());
        }

        let pre_image = driver.read_document(&tombstone.collection, &tombstone.id)?;
        driver.storage.remove(&tombstone.collection, &tombstone.id)?;
        driver.cache.delete(&tombstone.collection, &tombstone.id);
        driver.state.remove(&tombstone.collection, &tombstone.id);
        pre_image
    };

    driver.hub.notify(&tombstone.collection, &pre_image);
    Ok(())
}

/// Bring this node from `SYNCING` to `ONLINE`: pull everything newer from
/// each peer, then announce `ONLINE` and pull the deltas that accumulated
/// while syncing.
pub(crate) async fn initial_sync(driver: Arc<DriverInner>) {
    let peers = driver.peers.addressed();
    if peers.is_empty() {
        driver.set_self_status(PeerStatus::Online);
        return;
    }

    Logger::info("SYNC_STARTED", &[("peers", &peers.len().to_string())]);

    for announce_state in ["SYNC", "ONLINE"] {
        for (peer_id, address) in &peers {
            match driver
                .replication
                .client
                .announce(address, announce_state)
                .await
            {
                Ok(state_map) => {
                    driver.peers.record_success(peer_id);
                    apply_state_map(&driver, address, state_map).await;
                }
                Err(e) => {
                    Logger::warn(
                        "PEER_UNREACHABLE",
                        &[("peer", peer_id.as_str()), ("reason", &e.to_string())],
                    );
                    driver.peers.record_failure(peer_id);
                }
            }
        }
    }

    driver.set_self_status(PeerStatus::Online);
    Logger::info("SYNC_COMPLETED", &[]);
}

/// Pull every document a peer's state map records as newer than ours
async fn apply_state_map(
    driver: &Arc<DriverInner>,
    address: &str,
    state_map: HashMap<String, StateEntry>,
) {
    for (key, remote) in state_map {
        let Some((collection, document_id)) = split_state_key(&key) else {
            continue;
        };

        let local = driver.state.get(collection, document_id);
        let newer = match &local {
            Some(local) => remote.updated_at > local.updated_at,
            None => true,
        };
        if !newer {
            continue;
        }

        let local_hash = local.map(|entry| entry.hash).unwrap_or_default();
        match driver
            .replication
            .client
            .fetch_doc(address, collection, document_id, &local_hash)
            .await
        {
            Ok(Some(doc)) => {
                if let Err(e) = apply_remote(driver, doc) {
                    Logger::error(
                        "SYNC_APPLY_FAILED",
                        &[("document", key.as_str()), ("reason", &e.to_string())],
                    );
                }
            }
            Ok(None) => {}
            Err(e) => {
                Logger::warn(
                    "SYNC_FETCH_FAILED",
                    &[("document", key.as_str()), ("reason", &e.to_string())],
                );
            }
        }
    }
}

/// Push a committed local mutation to every peer currently online.
///
/// Failures are logged and counted against the peer; the local write has
/// already succeeded and is never rolled back.
pub(crate) async fn broadcast(driver: Arc<DriverInner>, doc: Document) {
    for (peer_id, address) in driver.peers.online() {
        if let Err(e) = driver.replication.client.push_doc(&address, &doc).await {
            Logger::error(
                "PEER_PUSH_FAILED",
                &[
                    ("document", &format!("{}/{}", doc.collection, doc.id)),
                    ("peer", peer_id.as_str()),
                    ("reason", &e.to_string()),
                ],
            );
            driver.peers.record_failure(&peer_id);
        }
    }
}

/// Every five minutes re-announce `ONLINE` to each peer and apply its
/// delta; repeated failures take the peer offline until it answers again.
pub(crate) async fn reconcile_loop(driver: Arc<DriverInner>) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(RECONCILE_INTERVAL_SECS));
    // The first tick fires immediately; initial sync already covered it.
    interval.tick().await;

    loop {
        interval.tick().await;
        for (peer_id, address) in driver.peers.addressed() {
            match driver.replication.client.announce(&address, "ONLINE").await {
                Ok(state_map) => {
                    driver.peers.record_success(&peer_id);
                    apply_state_map(&driver, &address, state_map).await;
                }
                Err(e) => {
                    let status = driver.peers.record_failure(&peer_id);
                    Logger::warn(
                        "PEER_UNREACHABLE",
                        &[
                            ("peer", peer_id.as_str()),
                            ("reason", &e.to_string()),
                            ("status", &status.to_string()),
                        ],
                    );
                }
            }
        }
    }
}
