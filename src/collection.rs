//! The collection façade.
//!
//! A [`Collection`] binds a collection name (and optionally a filter) to
//! a driver and carries the whole document API: `add`, `write`,
//! `document`, `documents`, `delete`, `where_field`, `subscribe`.
//!
//! Write path: validate ids, marshal the payload, hash it, then commit
//! under the per-document lock (marshal envelope, encrypt, tmp+rename
//! publish, cache and state index update). Subscribers and replication
//! peers are notified after the lock is released.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::document::{marshal_tab_indent, Document};
use crate::driver::DriverInner;
use crate::error::{DbError, DbResult};
use crate::filter::{Filter, FilterValue};
use crate::locks::lock_key;
use crate::subscription::{Snapshot, Subscriber, Subscription, SNAPSHOT_CHANNEL_CAPACITY};
use crate::validate::{validate_collection_name, validate_document_id};

/// Handle to a named collection, optionally filtered
#[derive(Clone)]
pub struct Collection {
    name: String,
    driver: Arc<DriverInner>,
    filter: Option<Filter>,
}

impl Collection {
    pub(crate) fn new(driver: Arc<DriverInner>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver,
            filter: None,
        }
    }

    /// The collection name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write a payload under a fresh UUID document id
    pub fn add<T: Serialize>(&self, payload: &T) -> DbResult<Document> {
        self.write(&Uuid::new_v4().to_string(), payload)
    }

    /// Write a payload under the given document id, creating or replacing
    /// the document
    pub fn write<T: Serialize>(&self, id: &str, payload: &T) -> DbResult<Document> {
        validate_collection_name(&self.name)?;
        validate_document_id(id)?;

        let data_bytes = marshal_tab_indent(payload)?;
        let data = serde_json::from_slice(&data_bytes)?;
        let doc = Document::new(&self.name, id, data);

        {
            let lock = self.driver.locks.acquire(&lock_key(&self.name, id));
            let _guard = lock.lock().expect("document lock poisoned");
            self.driver.publish(&doc)?;
        }

        self.driver.fan_out_write(doc.clone());
        Ok(doc)
    }

    /// Read a single document, from cache when possible
    pub fn document(&self, id: &str) -> DbResult<Document> {
        validate_collection_name(&self.name)?;
        validate_document_id(id)?;

        self.driver.read_document(&self.name, id)
    }

    /// All documents of the collection, or the filtered subset when this
    /// handle carries a filter. A missing collection reads as empty.
    pub fn documents(&self) -> DbResult<Vec<Document>> {
        validate_collection_name(&self.name)?;

        self.driver.collect_documents(&self.name, self.filter.as_ref())
    }

    /// Delete a single document.
    ///
    /// Deleting a missing document is a no-op; deleting a directory
    /// (a whole collection) is refused.
    pub fn delete(&self, id: &str) -> DbResult<()> {
        validate_collection_name(&self.name)?;
        validate_document_id(id)?;

        let pre_image = {
            let lock = self.driver.locks.acquire(&lock_key(&self.name, id));
            let _guard = lock.lock().expect("document lock poisoned");

            let (exists, is_dir) = self.driver.storage.stat(&self.name, id);
            if !exists {
                return Ok(());
            }
            if is_dir {
                return Err(DbError::Lifecycle(
                    "deletion of entire collection is not allowed".to_string(),
                ));
            }

            let pre_image = self.driver.read_document(&self.name, id)?;
            self.driver.storage.remove(&self.name, id)?;
            self.driver.cache.delete(&self.name, id);
            self.driver.state.remove(&self.name, id);
            pre_image
        };

        self.driver.fan_out_delete(&self.name, id, pre_image);
        Ok(())
    }

    /// Clone this handle with a single-field predicate bound to it
    pub fn where_field(
        &self,
        field: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<FilterValue>,
    ) -> Self {
        Self {
            name: self.name.clone(),
            driver: Arc::clone(&self.driver),
            filter: Some(Filter::new(field, operator, value)),
        }
    }

    /// Subscribe to this collection (honoring any bound filter).
    ///
    /// The first snapshot, the current matching set, is delivered
    /// immediately; every committed write or delete that matches delivers
    /// another.
    pub fn subscribe(&self) -> DbResult<Subscription> {
        validate_collection_name(&self.name)?;

        let id = Uuid::new_v4().to_string();
        let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel::<()>();
        let (snapshot_tx, snapshot_rx) = mpsc::channel::<Snapshot>(SNAPSHOT_CHANNEL_CAPACITY);

        self.driver.hub.register(
            id.clone(),
            Subscriber {
                collection: self.name.clone(),
                filter: self.filter.clone(),
                trigger: trigger_tx,
            },
        );

        let driver = Arc::clone(&self.driver);
        let name = self.name.clone();
        let filter = self.filter.clone();
        self.driver.rt.spawn(async move {
            loop {
                let snapshot = match driver.collect_documents(&name, filter.as_ref()) {
                    Ok(data) => Snapshot { data, error: None },
                    Err(e) => Snapshot {
                        data: Vec::new(),
                        error: Some(e.to_string()),
                    },
                };
                if snapshot_tx.send(snapshot).await.is_err() {
                    // Subscriber dropped the receiving half.
                    break;
                }
                match trigger_rx.recv().await {
                    Some(()) => {
                        // Coalesce a burst of triggers into one snapshot.
                        while trigger_rx.try_recv().is_ok() {}
                    }
                    None => break,
                }
            }
        });

        Ok(Subscription::new(id, Arc::clone(&self.driver), snapshot_rx))
    }
}
