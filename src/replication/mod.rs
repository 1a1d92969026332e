//! Multi-peer replication.
//!
//! Peers keep their document sets eventually consistent over three HTTP
//! endpoints guarded by a shared secret: a state announcement that
//! returns the full state map (`SYNC`) or a delta since last contact
//! (`ONLINE`), a conditional single-document fetch, and a document push.
//!
//! A node starts `SYNCING`, pulls everything newer from its peers, then
//! goes `ONLINE`. From then on every committed local mutation is pushed
//! to peers currently believed online, and a background reconciler
//! re-announces `ONLINE` every five minutes to pick up anything missed.
//! Conflicts resolve last-writer-wins on `updated_at`, ties broken by the
//! lexicographically greater hash.

mod client;
mod server;
mod sync;

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

pub(crate) use client::ReplicationClient;
pub(crate) use server::serve;
pub(crate) use sync::{apply_remote, broadcast, initial_sync, reconcile_loop};

/// Consecutive contact failures before a peer is considered offline
pub(crate) const MAX_PEER_FAILURES: u32 = 3;

/// Seconds between reconciliation rounds
pub(crate) const RECONCILE_INTERVAL_SECS: u64 = 300;

/// Peer HTTP timeout in seconds
pub(crate) const PEER_TIMEOUT_SECS: u64 = 5;

/// A peer's replication state as seen from this node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// Not reachable, or not heard from yet
    Offline,
    /// Fully synced and receiving live broadcasts
    Online,
    /// Performing its initial catch-up
    Syncing,
}

impl fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Offline => "OFFLINE",
            Self::Online => "ONLINE",
            Self::Syncing => "SYNCING",
        };
        write!(f, "{s}")
    }
}

/// Everything this node tracks about one peer
#[derive(Debug, Clone)]
pub struct Peer {
    /// Base URL, e.g. `http://10.0.0.2:4520`; empty for peers that
    /// announced themselves but are not configured locally
    pub address: String,
    /// Current state as seen from this node
    pub status: PeerStatus,
    /// Last successful contact initiated by this node
    pub last_ping: Option<DateTime<Utc>>,
    /// Timestamp handed out with the peer's last announcement; deltas are
    /// computed against it
    pub last_synced: Option<DateTime<Utc>>,
    /// Consecutive contact failures
    failures: u32,
}

impl Peer {
    fn with_address(address: String) -> Self {
        Self {
            address,
            status: PeerStatus::Offline,
            last_ping: None,
            last_synced: None,
            failures: 0,
        }
    }
}

/// Registry of peers keyed by peer id
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: Mutex<HashMap<String, Peer>>,
}

impl PeerTable {
    /// Build the table from the configured `peer id -> base URL` map
    pub fn from_nodes(nodes: &HashMap<String, String>) -> Self {
        let peers = nodes
            .iter()
            .map(|(id, address)| (id.clone(), Peer::with_address(address.clone())))
            .collect();
        Self {
            peers: Mutex::new(peers),
        }
    }

    /// Peers this node can dial: configured address present
    pub(crate) fn addressed(&self) -> Vec<(String, String)> {
        let peers = self.peers.lock().expect("peer table poisoned");
        peers
            .iter()
            .filter(|(_, peer)| !peer.address.is_empty())
            .map(|(id, peer)| (id.clone(), peer.address.clone()))
            .collect()
    }

    /// Peers that receive live broadcasts: addressed and currently online
    pub(crate) fn online(&self) -> Vec<(String, String)> {
        let peers = self.peers.lock().expect("peer table poisoned");
        peers
            .iter()
            .filter(|(_, peer)| peer.status == PeerStatus::Online && !peer.address.is_empty())
            .map(|(id, peer)| (id.clone(), peer.address.clone()))
            .collect()
    }

    /// Record an incoming announcement and return the previous
    /// `last_synced`, the base of the delta handed back to the peer.
    ///
    /// Unknown peer ids are tracked (without an address) so their
    /// `last_synced` is remembered across announcements.
    pub(crate) fn record_announce(&self, id: &str, status: PeerStatus) -> Option<DateTime<Utc>> {
        let mut peers = self.peers.lock().expect("peer table poisoned");
        let peer = peers
            .entry(id.to_string())
            .or_insert_with(|| Peer::with_address(String::new()));
        let previous = peer.last_synced;
        peer.status = status;
        peer.last_synced = Some(Utc::now());
        previous
    }

    /// Record a successful outbound contact
    pub(crate) fn record_success(&self, id: &str) {
        let mut peers = self.peers.lock().expect("peer table poisoned");
        if let Some(peer) = peers.get_mut(id) {
            peer.failures = 0;
            peer.status = PeerStatus::Online;
            peer.last_ping = Some(Utc::now());
        }
    }

    /// Record a failed outbound contact; after enough consecutive
    /// failures the peer is marked offline. Returns the new status.
    pub(crate) fn record_failure(&self, id: &str) -> PeerStatus {
        let mut peers = self.peers.lock().expect("peer table poisoned");
        match peers.get_mut(id) {
            Some(peer) => {
                peer.failures += 1;
                if peer.failures >= MAX_PEER_FAILURES {
                    peer.status = PeerStatus::Offline;
                }
                peer.status
            }
            None => PeerStatus::Offline,
        }
    }

    /// Look up one peer
    pub fn get(&self, id: &str) -> Option<Peer> {
        let peers = self.peers.lock().expect("peer table poisoned");
        peers.get(id).cloned()
    }

    /// Number of tracked peers
    pub fn len(&self) -> usize {
        self.peers.lock().expect("peer table poisoned").len()
    }

    /// Whether no peer is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Replication wiring carried by the driver
pub(crate) struct ReplicationSettings {
    /// HTTP client for outbound calls
    pub(crate) client: ReplicationClient,
    /// Shared secret expected in the `Authorization` header
    pub(crate) pass: String,
}
