//! Identifier validation.
//!
//! Collection names and document ids become path components under the
//! database root, so anything that could escape the collection directory
//! or collide with a reserved name is rejected before the filesystem is
//! touched.

use crate::error::{DbError, DbResult};

/// Name reserved for internal use; never a valid collection or document id
pub const RESERVED_LOGS: &str = "_logs";

fn check(id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err("must not be empty".to_string());
    }
    if id == RESERVED_LOGS {
        return Err(format!("'{RESERVED_LOGS}' is a reserved name"));
    }
    if id.contains('/') || id.contains('\\') {
        return Err(format!(
            "'{id}' contains an unsupported character; ids can't contain '/' or '\\'"
        ));
    }
    Ok(())
}

/// Validate a collection name
pub fn validate_collection_name(name: &str) -> DbResult<()> {
    check(name).map_err(|reason| DbError::validation(format!("collection name {reason}")))
}

/// Validate a document id
pub fn validate_document_id(id: &str) -> DbResult<()> {
    check(id).map_err(|reason| DbError::validation(format!("document id {reason}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        for id in ["Test", "d1", "a-b_c.d", "0b29b66f-3c01-4b2a-92e5-6b1e676cc9f4"] {
            assert!(validate_document_id(id).is_ok(), "{id} should be accepted");
            assert!(validate_collection_name(id).is_ok());
        }
    }

    #[test]
    fn test_empty_rejected() {
        assert!(validate_document_id("").is_err());
        assert!(validate_collection_name("").is_err());
    }

    #[test]
    fn test_reserved_name_rejected() {
        assert!(validate_document_id("_logs").is_err());
        assert!(validate_collection_name("_logs").is_err());
        // Only the exact name is reserved.
        assert!(validate_document_id("_logs2").is_ok());
    }

    #[test]
    fn test_path_separators_rejected() {
        assert!(validate_document_id("a/b").is_err());
        assert!(validate_document_id("a\\b").is_err());
        assert!(validate_document_id("../escape").is_err());
        assert!(validate_collection_name("a/b").is_err());
    }

    #[test]
    fn test_messages_name_the_subject() {
        let err = validate_collection_name("").unwrap_err();
        assert!(err.to_string().contains("collection name"));
        let err = validate_document_id("a/b").unwrap_err();
        assert!(err.to_string().contains("document id"));
    }
}
