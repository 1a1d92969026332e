//! Single-predicate query scenarios over a real collection.

use chrono::{DateTime, Duration, Utc};
use opendiv_db::{Config, Driver};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TestObject {
    #[serde(rename = "String")]
    string: String,
    #[serde(rename = "Number")]
    number: f64,
    #[serde(rename = "Bool")]
    bool: bool,
    #[serde(rename = "Time")]
    time: DateTime<Utc>,
}

fn open_driver(dir: &TempDir) -> Driver {
    Driver::open(Config::new(dir.path().to_str().unwrap())).unwrap()
}

/// Four documents with Number 1..=4, Bool true except the last, and the
/// time offsets the time-filter scenario expects
fn seed(driver: &Driver, t0: DateTime<Utc>) {
    let rows = [
        ("test1", 1.0, true, t0),
        ("test2", 2.0, true, t0 + Duration::seconds(10)),
        ("test3", 3.0, true, t0 + Duration::seconds(10)),
        ("test4", 4.0, false, t0 + Duration::seconds(1)),
    ];
    for (string, number, bool_value, time) in rows {
        driver
            .collection("Test")
            .add(&TestObject {
                string: string.to_string(),
                number,
                bool: bool_value,
                time,
            })
            .unwrap();
    }
}

#[test]
fn test_filter_by_number() {
    let dir = TempDir::new().unwrap();
    let driver = open_driver(&dir);
    seed(&driver, Utc::now());

    let docs = driver
        .collection("Test")
        .where_field("Number", ">", 2.0)
        .documents()
        .unwrap();
    assert_eq!(docs.len(), 2);
    for doc in docs {
        let object: TestObject = doc.data_to().unwrap();
        assert!(object.number > 2.0);
    }

    let docs = driver
        .collection("Test")
        .where_field("Number", "<=", 2.0)
        .documents()
        .unwrap();
    assert_eq!(docs.len(), 2);
}

#[test]
fn test_filter_by_string() {
    let dir = TempDir::new().unwrap();
    let driver = open_driver(&dir);
    seed(&driver, Utc::now());

    let docs = driver
        .collection("Test")
        .where_field("String", "==", "test1")
        .documents()
        .unwrap();
    assert_eq!(docs.len(), 1);
    let object: TestObject = docs[0].data_to().unwrap();
    assert_eq!(object.string, "test1");

    let docs = driver
        .collection("Test")
        .where_field("String", "!=", "test1")
        .documents()
        .unwrap();
    assert_eq!(docs.len(), 3);
}

#[test]
fn test_filter_by_bool() {
    let dir = TempDir::new().unwrap();
    let driver = open_driver(&dir);
    seed(&driver, Utc::now());

    let truthy = driver
        .collection("Test")
        .where_field("Bool", "==", true)
        .documents()
        .unwrap();
    assert_eq!(truthy.len(), 3);

    let falsy = driver
        .collection("Test")
        .where_field("Bool", "==", false)
        .documents()
        .unwrap();
    assert_eq!(falsy.len(), 1);
    let object: TestObject = falsy[0].data_to().unwrap();
    assert_eq!(object.string, "test4");
}

#[test]
fn test_filter_by_time() {
    let dir = TempDir::new().unwrap();
    let driver = open_driver(&dir);
    let t0 = Utc::now();
    seed(&driver, t0);

    // Only the t0 document is earlier than t0 + 500ms.
    let cutoff = t0 + Duration::milliseconds(500);
    let docs = driver
        .collection("Test")
        .where_field("Time", "<", cutoff)
        .documents()
        .unwrap();
    assert_eq!(docs.len(), 1);
    let object: TestObject = docs[0].data_to().unwrap();
    assert_eq!(object.string, "test1");

    let docs = driver
        .collection("Test")
        .where_field("Time", ">", cutoff)
        .documents()
        .unwrap();
    assert_eq!(docs.len(), 3);
}

#[test]
fn test_unsupported_operator_aborts_scan() {
    let dir = TempDir::new().unwrap();
    let driver = open_driver(&dir);
    seed(&driver, Utc::now());

    let err = driver
        .collection("Test")
        .where_field("Number", "~=", 2.0)
        .documents()
        .unwrap_err();
    assert_eq!(err.code(), "QUERY_ERROR");
}

#[test]
fn test_type_mismatch_aborts_scan() {
    let dir = TempDir::new().unwrap();
    let driver = open_driver(&dir);
    seed(&driver, Utc::now());

    let err = driver
        .collection("Test")
        .where_field("Number", "==", "two")
        .documents()
        .unwrap_err();
    assert_eq!(err.code(), "QUERY_ERROR");
}

#[test]
fn test_missing_field_excludes_documents() {
    let dir = TempDir::new().unwrap();
    let driver = open_driver(&dir);
    seed(&driver, Utc::now());

    let docs = driver
        .collection("Test")
        .where_field("NoSuchField", "==", "x")
        .documents()
        .unwrap();
    assert!(docs.is_empty());
}

#[test]
fn test_filter_on_missing_collection_is_empty() {
    let dir = TempDir::new().unwrap();
    let driver = open_driver(&dir);

    let docs = driver
        .collection("Nothing")
        .where_field("Number", ">", 1.0)
        .documents()
        .unwrap();
    assert!(docs.is_empty());
}
