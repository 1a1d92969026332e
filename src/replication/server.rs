//! HTTP server side of the replication protocol.
//!
//! Three endpoints under `/api/sync`, all requiring the shared secret in
//! the `Authorization` header. Peers announce state transitions, fetch
//! single documents conditionally by hash, and push committed mutations.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::{apply_remote, PeerStatus};
use crate::driver::DriverInner;
use crate::observability::Logger;

#[derive(Debug, Deserialize)]
struct SyncQuery {
    state: Option<String>,
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DocQuery {
    collection: Option<String>,
    document_id: Option<String>,
    #[serde(default)]
    hash: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Build the replication router for this driver
pub(crate) fn router(driver: Arc<DriverInner>) -> Router {
    Router::new()
        .route("/api/sync", get(get_sync))
        .route("/api/sync/doc", get(get_doc).post(post_doc))
        .with_state(driver)
}

/// Bind and run the replication server until the driver shuts down
pub(crate) async fn serve(driver: Arc<DriverInner>, port: u16) {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(Arc::clone(&driver));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            Logger::error(
                "REPLICATION_BIND_FAILED",
                &[("port", &port.to_string()), ("reason", &e.to_string())],
            );
            return;
        }
    };

    Logger::info("REPLICATION_LISTENING", &[("port", &port.to_string())]);
    if let Err(e) = axum::serve(listener, app).await {
        Logger::error("REPLICATION_SERVER_FAILED", &[("reason", &e.to_string())]);
    }
}

fn authorized(driver: &DriverInner, headers: &HeaderMap) -> bool {
    headers
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .map(|value| value == driver.replication.pass)
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error: "unauthorized".to_string(),
        }),
    )
        .into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// `GET /api/sync?state={SYNC|ONLINE}&id=<peer-id>`: a peer announces
/// its new state; the reply is the full state map for `SYNC` and the
/// delta since the peer's previous contact for `ONLINE`.
async fn get_sync(
    State(driver): State<Arc<DriverInner>>,
    Query(query): Query<SyncQuery>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&driver, &headers) {
        return unauthorized();
    }
    let Some(state) = query.state else {
        return bad_request("'state' was not provided");
    };
    let Some(peer_id) = query.id else {
        return bad_request("'id' was not provided");
    };

    match state.as_str() {
        "SYNC" => {
            driver.peers.record_announce(&peer_id, PeerStatus::Syncing);
            Json(driver.state.snapshot()).into_response()
        }
        "ONLINE" => {
            let previous = driver.peers.record_announce(&peer_id, PeerStatus::Online);
            let delta = match previous {
                Some(since) => driver.state.since(since),
                // First contact: the whole map is the delta.
                None => driver.state.snapshot(),
            };
            Json(delta).into_response()
        }
        other => bad_request(format!("state '{other}' not supported")),
    }
}

/// `GET /api/sync/doc?collection=...&document_id=...&hash=...`: returns the
/// document only when the recorded hash differs from the supplied one;
/// an empty 200 means "already up to date".
async fn get_doc(
    State(driver): State<Arc<DriverInner>>,
    Query(query): Query<DocQuery>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&driver, &headers) {
        return unauthorized();
    }
    let Some(collection) = query.collection else {
        return bad_request("'collection' was not provided");
    };
    let Some(document_id) = query.document_id else {
        return bad_request("'document_id' was not provided");
    };

    let recorded = driver
        .state
        .get(&collection, &document_id)
        .map(|entry| entry.hash)
        .unwrap_or_default();
    if recorded == query.hash {
        return StatusCode::OK.into_response();
    }

    match driver.read_document(&collection, &document_id) {
        Ok(mut doc) => {
            doc.from_cache = false;
            Json(doc).into_response()
        }
        Err(e) => (
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(ErrorBody {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

/// `POST /api/sync/doc`: apply a remotely committed mutation locally,
/// without re-broadcasting it.
async fn post_doc(
    State(driver): State<Arc<DriverInner>>,
    headers: HeaderMap,
    body: Json<crate::document::Document>,
) -> Response {
    if !authorized(&driver, &headers) {
        return unauthorized();
    }

    match apply_remote(&driver, body.0) {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => (
            StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(ErrorBody {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}
