//! The driver: owns every subsystem and the background tasks.
//!
//! `Driver::open` bootstraps the root directory, rebuilds the document
//! state index from disk, and starts the long-running tasks (cache purge,
//! replication server, initial sync, reconciler) on a runtime the driver
//! owns. `shutdown` stops them deterministically; dropping the driver
//! falls back to a background shutdown.
//!
//! Disk is the single ground truth: cache, state index, and peer views
//! are all rebuilt or re-learned on startup.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::cache::{Cache, CacheConfig};
use crate::codec::Codec;
use crate::collection::Collection;
use crate::config::Config;
use crate::document::Document;
use crate::error::{DbError, DbResult};
use crate::filter::Filter;
use crate::locks::LockRegistry;
use crate::observability::Logger;
use crate::replication::{self, PeerStatus, PeerTable, ReplicationClient, ReplicationSettings};
use crate::state::StateIndex;
use crate::storage::Storage;
use crate::subscription::SubscriptionHub;

/// Handle to an open database
pub struct Driver {
    inner: Arc<DriverInner>,
    runtime: Option<Runtime>,
    tasks: Vec<JoinHandle<()>>,
}

/// Shared core of the driver: subsystems plus the runtime handle used to
/// schedule fan-out work
pub(crate) struct DriverInner {
    pub(crate) storage: Storage,
    pub(crate) codec: Codec,
    pub(crate) cache: Cache,
    pub(crate) locks: LockRegistry,
    pub(crate) state: StateIndex,
    pub(crate) hub: SubscriptionHub,
    pub(crate) peers: PeerTable,
    pub(crate) replication: ReplicationSettings,
    pub(crate) rt: tokio::runtime::Handle,
    self_status: Mutex<PeerStatus>,
    closed: AtomicBool,
}

impl Driver {
    /// Open (or create) the database described by `config`
    pub fn open(config: Config) -> DbResult<Self> {
        config.validate()?;

        let codec = Codec::new(&config.encryption_key, &config.salt)?;
        let storage = Storage::open(PathBuf::from(&config.path))?;
        let cache = Cache::new(CacheConfig {
            timeout: Duration::from_secs(config.cache_timeout),
            limit: config.cache_limit,
        });
        let client = ReplicationClient::new(
            config.replication_pass.clone(),
            config.replication_id.clone(),
        )?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::io("building driver runtime", e))?;

        let inner = Arc::new(DriverInner {
            storage,
            codec,
            cache,
            locks: LockRegistry::new(),
            state: StateIndex::new(),
            hub: SubscriptionHub::new(),
            peers: PeerTable::from_nodes(&config.replication_nodes),
            replication: ReplicationSettings {
                client,
                pass: config.replication_pass.clone(),
            },
            rt: runtime.handle().clone(),
            self_status: Mutex::new(PeerStatus::Syncing),
            closed: AtomicBool::new(false),
        });

        inner.load_doc_state();
        Logger::info(
            "DB_OPENED",
            &[
                ("path", config.path.as_str()),
                ("documents", &inner.state.len().to_string()),
            ],
        );

        let mut tasks = Vec::new();

        let purge = Arc::clone(&inner);
        tasks.push(runtime.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                purge.cache.purge_expired();
            }
        }));

        if config.replication_port > 0 {
            tasks.push(runtime.spawn(replication::serve(
                Arc::clone(&inner),
                config.replication_port,
            )));
        }

        if config.replication_nodes.is_empty() {
            // No peers to catch up with.
            inner.set_self_status(PeerStatus::Online);
        } else {
            tasks.push(runtime.spawn(replication::initial_sync(Arc::clone(&inner))));
            tasks.push(runtime.spawn(replication::reconcile_loop(Arc::clone(&inner))));
        }

        Ok(Self {
            inner,
            runtime: Some(runtime),
            tasks,
        })
    }

    /// Handle to a named collection
    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection::new(Arc::clone(&self.inner), name)
    }

    /// This node's replication state (`SYNCING` until initial sync
    /// completes, then `ONLINE`)
    pub fn replication_state(&self) -> PeerStatus {
        self.inner.self_status()
    }

    /// View of the peer table
    pub fn peers(&self) -> &PeerTable {
        &self.inner.peers
    }

    /// Recorded state (hash, update time) of a document, if indexed
    pub fn document_state(&self, collection: &str, id: &str) -> Option<crate::state::StateEntry> {
        self.inner.state.get(collection, id)
    }

    /// Stop background tasks and join the runtime deterministically
    pub fn shutdown(mut self) {
        self.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(5));
        }
    }

    fn close(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl DriverInner {
    /// Commit a document to disk, cache, and state index.
    ///
    /// The caller holds the per-document lock.
    pub(crate) fn publish(&self, doc: &Document) -> DbResult<()> {
        let bytes = crate::document::marshal_tab_indent(doc)?;
        let bytes = self.codec.encrypt(&bytes);
        self.storage.write(&doc.collection, &doc.id, &bytes)?;
        self.cache.put(&doc.collection, doc);
        self.state.set(&doc.collection, doc);
        Ok(())
    }

    /// Read a document through the cache
    pub(crate) fn read_document(&self, collection: &str, id: &str) -> DbResult<Document> {
        if let Some(doc) = self.cache.get(collection, id) {
            return Ok(doc);
        }

        let bytes = self.storage.read(collection, id)?;
        let bytes = self.codec.decrypt(&bytes);
        let mut doc: Document = serde_json::from_slice(&bytes).map_err(|e| {
            if self.codec.is_enabled() {
                DbError::Codec(format!("unable to decrypt '{collection}/{id}': {e}"))
            } else {
                DbError::CorruptDocument {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        // Files written before the collection field existed carry none.
        doc.collection = collection.to_string();
        doc.from_cache = false;
        self.cache.put(collection, &doc);
        Ok(doc)
    }

    /// Read every document of a collection, optionally filtered.
    ///
    /// A missing collection directory reads as an empty set; a filter
    /// evaluation error aborts the scan.
    pub(crate) fn collect_documents(
        &self,
        collection: &str,
        filter: Option<&Filter>,
    ) -> DbResult<Vec<Document>> {
        let ids = self.storage.list(collection)?;
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            let doc = self.read_document(collection, &id)?;
            match filter {
                None => docs.push(doc),
                Some(filter) => {
                    if filter.included(&doc)? {
                        docs.push(doc);
                    }
                }
            }
        }
        Ok(docs)
    }

    /// Schedule subscriber notification and peer broadcast for a write
    pub(crate) fn fan_out_write(self: &Arc<Self>, doc: Document) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(self);
        self.rt.spawn(async move {
            inner.hub.notify(&doc.collection, &doc);
            replication::broadcast(Arc::clone(&inner), doc).await;
        });
    }

    /// Schedule subscriber notification and tombstone broadcast for a
    /// delete. Subscribers match against the pre-image so filtered
    /// subscriptions of the deleted document observe the shrunken set.
    pub(crate) fn fan_out_delete(self: &Arc<Self>, collection: &str, id: &str, pre_image: Document) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let tombstone = Document::tombstone(collection, id);
        let collection = collection.to_string();
        let inner = Arc::clone(self);
        self.rt.spawn(async move {
            inner.hub.notify(&collection, &pre_image);
            replication::broadcast(Arc::clone(&inner), tombstone).await;
        });
    }

    pub(crate) fn set_self_status(&self, status: PeerStatus) {
        let mut current = self.self_status.lock().expect("status poisoned");
        if *current != status {
            Logger::info("REPLICATION_STATE", &[("state", &status.to_string())]);
            *current = status;
        }
    }

    pub(crate) fn self_status(&self) -> PeerStatus {
        *self.self_status.lock().expect("status poisoned")
    }

    /// Rebuild the state index by scanning every collection on disk.
    ///
    /// Unreadable files are logged and skipped so one bad document does
    /// not keep the database from opening.
    fn load_doc_state(&self) {
        let collections = match self.storage.list_collections() {
            Ok(collections) => collections,
            Err(e) => {
                Logger::warn("STATE_REBUILD_FAILED", &[("reason", &e.to_string())]);
                return;
            }
        };

        for collection in collections {
            let ids = match self.storage.list(&collection) {
                Ok(ids) => ids,
                Err(e) => {
                    Logger::warn(
                        "STATE_REBUILD_FAILED",
                        &[("collection", collection.as_str()), ("reason", &e.to_string())],
                    );
                    continue;
                }
            };
            for id in ids {
                match self.read_document(&collection, &id) {
                    Ok(doc) => self.state.set(&collection, &doc),
                    Err(e) => Logger::warn(
                        "STATE_REBUILD_SKIPPED",
                        &[
                            ("collection", collection.as_str()),
                            ("document", id.as_str()),
                            ("reason", &e.to_string()),
                        ],
                    ),
                }
            }
        }
    }
}
