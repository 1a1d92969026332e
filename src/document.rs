//! The document data model.
//!
//! A [`Document`] is the envelope persisted on disk and exchanged with
//! replication peers: a stable id, the owning collection, an update
//! timestamp, a content hash of the payload bytes, and the payload itself
//! as raw JSON. The payload is kept as raw bytes (`Box<RawValue>`) so the
//! hash stays valid across marshal/unmarshal round trips.
//!
//! On-disk and wire field names (`ID`, `Collection`, ...) follow the
//! legacy envelope so existing databases stay readable.

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::DbResult;

/// A single persisted record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document id, unique within its collection
    #[serde(rename = "ID")]
    pub id: String,

    /// Name of the owning collection
    #[serde(rename = "Collection", default)]
    pub collection: String,

    /// Time of the last committed write, UTC with nanosecond resolution
    #[serde(rename = "Updated_at")]
    pub updated_at: DateTime<Utc>,

    /// Lowercase hex MD5 of the payload bytes
    #[serde(rename = "Hash")]
    pub hash: String,

    /// Payload as raw JSON bytes; JSON `null` marks a deletion tombstone
    #[serde(rename = "Data")]
    pub data: Box<RawValue>,

    /// Whether this copy was served from the in-memory cache.
    /// Response-only: always persisted as `false`.
    #[serde(rename = "From_cache", default)]
    pub from_cache: bool,
}

impl Document {
    /// Build a document around already-marshaled payload bytes
    pub fn new(collection: &str, id: &str, data: Box<RawValue>) -> Self {
        let hash = md5_hex(data.get().as_bytes());
        Self {
            id: id.to_string(),
            collection: collection.to_string(),
            updated_at: Utc::now(),
            hash,
            data,
            from_cache: false,
        }
    }

    /// Build a deletion tombstone for `collection/id`
    pub fn tombstone(collection: &str, id: &str) -> Self {
        let data = RawValue::from_string("null".to_string())
            .expect("'null' is valid JSON");
        Self {
            id: id.to_string(),
            collection: collection.to_string(),
            updated_at: Utc::now(),
            hash: String::new(),
            data,
            from_cache: false,
        }
    }

    /// Whether this document is a deletion tombstone
    pub fn is_tombstone(&self) -> bool {
        self.data.get() == "null"
    }

    /// Deserialize the payload into a caller type
    pub fn data_to<T: DeserializeOwned>(&self) -> DbResult<T> {
        Ok(serde_json::from_str(self.data.get())?)
    }
}

/// Marshal a value to JSON with tab indentation, the store's canonical
/// payload and envelope encoding
pub fn marshal_tab_indent<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// Lowercase hex MD5 digest of a byte buffer
pub fn md5_hex(bytes: &[u8]) -> String {
    let digest = Md5::digest(bytes);
    let mut out = String::with_capacity(32);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
