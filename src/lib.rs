//! opendiv-db - an embeddable, file-backed, replicated document store
//!
//! Documents are JSON records grouped under named collections, one file
//! per document under the database root. The driver adds a bounded read
//! cache, optional at-rest encryption, single-predicate queries, live
//! change subscriptions, and HTTP peer replication with eventual
//! consistency.
//!
//! ```no_run
//! use opendiv_db::{Config, Driver};
//!
//! let driver = Driver::open(Config::new("/var/lib/opendiv")).unwrap();
//! let posts = driver.collection("Posts");
//! let doc = posts.add(&serde_json::json!({ "Title": "hello" })).unwrap();
//! let read_back = posts.document(&doc.id).unwrap();
//! assert_eq!(doc.hash, read_back.hash);
//! ```

pub mod cache;
pub mod cli;
pub mod codec;
pub mod collection;
pub mod config;
pub mod document;
pub mod driver;
pub mod error;
pub mod filter;
pub mod locks;
pub mod observability;
pub mod replication;
pub mod state;
pub mod storage;
pub mod subscription;
pub mod validate;

pub use collection::Collection;
pub use config::Config;
pub use document::Document;
pub use driver::Driver;
pub use error::{DbError, DbResult};
pub use filter::{Filter, FilterValue, Operator};
pub use replication::{Peer, PeerStatus, PeerTable};
pub use state::StateEntry;
pub use subscription::{Snapshot, Subscription, SubscriptionHub};
