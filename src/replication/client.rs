//! HTTP client side of the replication protocol.

use std::collections::HashMap;

use reqwest::StatusCode;

use super::PEER_TIMEOUT_SECS;
use crate::document::Document;
use crate::error::{DbError, DbResult};
use crate::state::StateEntry;

/// Outbound replication calls to a single peer address
pub(crate) struct ReplicationClient {
    http: reqwest::Client,
    pass: String,
    self_id: String,
}

impl ReplicationClient {
    /// Build a client announcing as `self_id` with the shared secret
    pub(crate) fn new(pass: String, self_id: String) -> DbResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(PEER_TIMEOUT_SECS))
            .build()
            .map_err(|e| DbError::replication(format!("unable to build http client: {e}")))?;
        Ok(Self {
            http,
            pass,
            self_id,
        })
    }

    /// Announce a new state (`SYNC` or `ONLINE`) to a peer.
    ///
    /// The reply is the peer's state map: full for `SYNC`, delta since
    /// last contact for `ONLINE`.
    pub(crate) async fn announce(
        &self,
        address: &str,
        state: &str,
    ) -> DbResult<HashMap<String, StateEntry>> {
        let url = format!("{address}/api/sync?state={state}&id={}", self.self_id);
        let response = self
            .http
            .get(&url)
            .header("Authorization", &self.pass)
            .send()
            .await
            .map_err(|e| DbError::replication(format!("announce to '{address}' failed: {e}")))?;

        if response.status() != StatusCode::OK {
            return Err(DbError::replication(format!(
                "announce to '{address}' rejected with status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| DbError::replication(format!("bad state map from '{address}': {e}")))
    }

    /// Fetch one document, passing the locally recorded hash.
    ///
    /// `None` means the peer's copy hashes the same as ours (empty reply
    /// body).
    pub(crate) async fn fetch_doc(
        &self,
        address: &str,
        collection: &str,
        document_id: &str,
        hash: &str,
    ) -> DbResult<Option<Document>> {
        let url = format!(
            "{address}/api/sync/doc?collection={collection}&document_id={document_id}&hash={hash}"
        );
        let response = self
            .http
            .get(&url)
            .header("Authorization", &self.pass)
            .send()
            .await
            .map_err(|e| {
                DbError::replication(format!(
                    "fetching '{collection}/{document_id}' from '{address}' failed: {e}"
                ))
            })?;

        if response.status() != StatusCode::OK {
            return Err(DbError::replication(format!(
                "fetching '{collection}/{document_id}' from '{address}' rejected with status {}",
                response.status()
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            DbError::replication(format!("reading document body from '{address}': {e}"))
        })?;
        if body.is_empty() {
            return Ok(None);
        }

        let doc: Document = serde_json::from_slice(&body).map_err(|e| {
            DbError::replication(format!("bad document body from '{address}': {e}"))
        })?;
        Ok(Some(doc))
    }

    /// Push a committed document (or tombstone) to a peer
    pub(crate) async fn push_doc(&self, address: &str, doc: &Document) -> DbResult<()> {
        let url = format!("{address}/api/sync/doc");
        let response = self
            .http
            .post(&url)
            .header("Authorization", &self.pass)
            .json(doc)
            .send()
            .await
            .map_err(|e| {
                DbError::replication(format!(
                    "pushing '{}/{}' to '{address}' failed: {e}",
                    doc.collection, doc.id
                ))
            })?;

        if response.status() != StatusCode::OK {
            return Err(DbError::replication(format!(
                "pushing '{}/{}' to '{address}' rejected with status {}",
                doc.collection,
                doc.id,
                response.status()
            )));
        }
        Ok(())
    }
}
