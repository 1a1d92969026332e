//! Two-node replication: initial sync, live broadcast, delete
//! tombstones, and endpoint authentication.
//!
//! Each test uses its own port pair so the tests can run in parallel.

use std::thread::sleep;
use std::time::{Duration, Instant};

use opendiv_db::{Config, DbError, Driver, PeerStatus};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

const SECRET: &str = "replication-secret";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TestObject {
    #[serde(rename = "Number")]
    number: f64,
}

fn object(n: f64) -> TestObject {
    TestObject { number: n }
}

fn node_config(dir: &TempDir, self_id: &str, port: u16, peers: &[(&str, u16)]) -> Config {
    let mut config = Config::new(dir.path().to_str().unwrap());
    config.replication_id = self_id.to_string();
    config.replication_pass = SECRET.to_string();
    config.replication_port = port;
    config.replication_nodes = peers
        .iter()
        .map(|(id, peer_port)| (id.to_string(), format!("http://127.0.0.1:{peer_port}")))
        .collect();
    config
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

#[test]
fn test_no_peers_goes_online_immediately() {
    let dir = TempDir::new().unwrap();
    let driver = Driver::open(Config::new(dir.path().to_str().unwrap())).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        driver.replication_state() == PeerStatus::Online
    }));
}

#[test]
fn test_initial_sync_pulls_existing_documents() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let node_a = Driver::open(node_config(&dir_a, "a", 46711, &[("b", 46712)])).unwrap();
    node_a.collection("Test").write("d1", &object(1.0)).unwrap();
    node_a.collection("Test").write("d2", &object(2.0)).unwrap();
    // Give A's listener time to bind before B announces to it.
    sleep(Duration::from_secs(1));

    // B comes up later and catches up from A's state map.
    let node_b = Driver::open(node_config(&dir_b, "b", 46712, &[("a", 46711)])).unwrap();

    assert!(wait_until(Duration::from_secs(15), || {
        node_b.collection("Test").document("d1").is_ok()
            && node_b.collection("Test").document("d2").is_ok()
    }));

    let on_a = node_a.collection("Test").document("d1").unwrap();
    let on_b = node_b.collection("Test").document("d1").unwrap();
    assert_eq!(on_a.hash, on_b.hash);
    assert_eq!(on_a.updated_at, on_b.updated_at);
    assert_eq!(
        node_a.document_state("Test", "d1"),
        node_b.document_state("Test", "d1")
    );

    node_b.shutdown();
    node_a.shutdown();
}

#[test]
fn test_live_broadcast_both_directions() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let node_a = Driver::open(node_config(&dir_a, "a", 46721, &[("b", 46722)])).unwrap();
    // Give A's listener time to bind before B announces to it.
    sleep(Duration::from_secs(1));
    let node_b = Driver::open(node_config(&dir_b, "b", 46722, &[("a", 46721)])).unwrap();

    // Both sides must consider each other online before broadcasting.
    assert!(wait_until(Duration::from_secs(15), || {
        node_a.replication_state() == PeerStatus::Online
            && node_b.replication_state() == PeerStatus::Online
            && node_a.peers().get("b").map(|p| p.status) == Some(PeerStatus::Online)
            && node_b.peers().get("a").map(|p| p.status) == Some(PeerStatus::Online)
    }));

    node_a.collection("Test").write("from-a", &object(1.0)).unwrap();
    assert!(wait_until(Duration::from_secs(15), || {
        node_b.collection("Test").document("from-a").is_ok()
    }));

    node_b.collection("Test").write("from-b", &object(2.0)).unwrap();
    assert!(wait_until(Duration::from_secs(15), || {
        node_a.collection("Test").document("from-b").is_ok()
    }));

    // Replicated copies carry the origin's hash and timestamp.
    let origin = node_a.collection("Test").document("from-a").unwrap();
    let replica = node_b.collection("Test").document("from-a").unwrap();
    assert_eq!(origin.hash, replica.hash);
    assert_eq!(origin.updated_at, replica.updated_at);

    node_b.shutdown();
    node_a.shutdown();
}

#[test]
fn test_delete_broadcasts_tombstone() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let node_a = Driver::open(node_config(&dir_a, "a", 46731, &[("b", 46732)])).unwrap();
    // Give A's listener time to bind before B announces to it.
    sleep(Duration::from_secs(1));
    let node_b = Driver::open(node_config(&dir_b, "b", 46732, &[("a", 46731)])).unwrap();

    assert!(wait_until(Duration::from_secs(15), || {
        node_a.peers().get("b").map(|p| p.status) == Some(PeerStatus::Online)
    }));

    node_a.collection("Test").write("doomed", &object(1.0)).unwrap();
    assert!(wait_until(Duration::from_secs(15), || {
        node_b.collection("Test").document("doomed").is_ok()
    }));

    node_a.collection("Test").delete("doomed").unwrap();
    assert!(wait_until(Duration::from_secs(15), || {
        matches!(
            node_b.collection("Test").document("doomed"),
            Err(DbError::DocumentNotFound { .. })
        )
    }));
    assert!(node_b.document_state("Test", "doomed").is_none());

    node_b.shutdown();
    node_a.shutdown();
}

#[test]
fn test_endpoints_require_shared_secret() {
    let dir = TempDir::new().unwrap();
    let mut config = node_config(&dir, "a", 46741, &[]);
    config.replication_pass = SECRET.to_string();
    let driver = Driver::open(config).unwrap();

    let rt = tokio::runtime::Runtime::new().unwrap();
    let client = reqwest::Client::new();
    let base = "http://127.0.0.1:46741";

    // Wait for the listener to come up.
    assert!(wait_until(Duration::from_secs(10), || {
        rt.block_on(async {
            client
                .get(format!("{base}/api/sync?state=SYNC&id=probe"))
                .header("Authorization", SECRET)
                .send()
                .await
                .is_ok()
        })
    }));

    let status = |auth: Option<&str>, url: String| {
        rt.block_on(async {
            let mut request = client.get(url);
            if let Some(auth) = auth {
                request = request.header("Authorization", auth);
            }
            request.send().await.unwrap().status().as_u16()
        })
    };

    // Wrong or missing secret is rejected on every endpoint.
    assert_eq!(
        status(Some("wrong"), format!("{base}/api/sync?state=SYNC&id=x")),
        401
    );
    assert_eq!(status(None, format!("{base}/api/sync?state=SYNC&id=x")), 401);
    assert_eq!(
        status(Some("wrong"), format!("{base}/api/sync/doc?collection=c&document_id=d")),
        401
    );

    // Correct secret: bad announce states are 400, good ones 200.
    assert_eq!(
        status(Some(SECRET), format!("{base}/api/sync?state=NONSENSE&id=x")),
        400
    );
    assert_eq!(status(Some(SECRET), format!("{base}/api/sync?state=SYNC")), 400);
    assert_eq!(
        status(Some(SECRET), format!("{base}/api/sync?state=ONLINE&id=x")),
        200
    );

    driver.shutdown();
}
