//! Durable single-document storage.
//!
//! Layout: `<root>/<collection>/<document_id>`, one file per document.
//! Publication writes `<document_id>.tmp` and renames it into place, so a
//! concurrent reader sees either the previous version or the new one,
//! never a truncated file. A crash can orphan a `.tmp` file; listings
//! filter those out and the next successful write replaces them.
//!
//! Storage moves raw bytes only; encryption happens a layer above.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DbError, DbResult};

const TMP_SUFFIX: &str = ".tmp";

/// Filesystem backend for document files
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Create a backend rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> DbResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| DbError::io(format!("creating database root {}", root.display()), e))?;
        Ok(Self { root })
    }

    /// The database root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Durably publish document bytes via tmp-file + rename
    pub fn write(&self, collection: &str, id: &str, bytes: &[u8]) -> DbResult<()> {
        let dir = self.root.join(collection);
        fs::create_dir_all(&dir)
            .map_err(|e| DbError::io(format!("creating collection directory '{collection}'"), e))?;

        let final_path = dir.join(id);
        let tmp_path = dir.join(format!("{id}{TMP_SUFFIX}"));

        fs::write(&tmp_path, bytes)
            .map_err(|e| DbError::io(format!("writing '{collection}/{id}'"), e))?;
        fs::rename(&tmp_path, &final_path)
            .map_err(|e| DbError::io(format!("publishing '{collection}/{id}'"), e))?;
        Ok(())
    }

    /// Read a document's bytes as stored (possibly encrypted)
    pub fn read(&self, collection: &str, id: &str) -> DbResult<Vec<u8>> {
        let dir = self.root.join(collection);
        if !dir.is_dir() {
            return Err(DbError::CollectionNotFound(collection.to_string()));
        }

        let path = dir.join(id);
        if !path.is_file() {
            return Err(DbError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }

        fs::read(&path).map_err(|e| DbError::io(format!("reading '{collection}/{id}'"), e))
    }

    /// Whether the target exists, and whether it is a directory
    pub fn stat(&self, collection: &str, id: &str) -> (bool, bool) {
        let path = self.root.join(collection).join(id);
        match fs::metadata(&path) {
            Ok(meta) => (true, meta.is_dir()),
            Err(_) => (false, false),
        }
    }

    /// Remove a single document file
    pub fn remove(&self, collection: &str, id: &str) -> DbResult<()> {
        let path = self.root.join(collection).join(id);
        fs::remove_file(&path)
            .map_err(|e| DbError::io(format!("deleting '{collection}/{id}'"), e))
    }

    /// Sorted document ids in a collection; stale `.tmp` files are
    /// ignored and a missing directory reads as an empty collection
    pub fn list(&self, collection: &str) -> DbResult<Vec<String>> {
        let dir = self.root.join(collection);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DbError::io(format!("listing collection '{collection}'"), e));
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| DbError::io(format!("listing collection '{collection}'"), e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(TMP_SUFFIX) {
                continue;
            }
            if entry.path().is_file() {
                ids.push(name);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Names of every collection (direct subdirectories of the root)
    pub fn list_collections(&self) -> DbResult<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| DbError::io("listing database root".to_string(), e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DbError::io("listing database root".to_string(), e))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}
