// crates/reputation-gate-harness/src/store_stub.rs
// ============================================================================
// Module: In-Memory Reputation Store
// Description: Hermetic stand-in for the real reputation store API.
// Purpose: Let scenarios seed and read reputation without external services.
// Dependencies: axum, serde_json, tokio
// ============================================================================

//! ## Overview
//! [`InMemoryReputationStore`] serves `GET`, `PUT`, and `DELETE` on
//! `/type/{type}/{object}`, authenticated by a static `APIKey` header.
//! Invariants:
//! - Requests with a missing or wrong key get 401 and never touch state.
//! - Stored scores are clamped to `[0, 100]`.
//! - A `PUT` body whose object or type disagrees with the path gets 400.
//! - Missing records read as 404; deleting a missing record succeeds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;

use crate::error::HarnessError;
use crate::server::ServerThread;
use crate::server::spawn_server;
use crate::state_client::IdentityType;
use crate::state_client::ReputationRecord;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Highest stored reputation.
const MAX_REPUTATION: i64 = 100;

// ============================================================================
// SECTION: State
// ============================================================================

/// Records keyed by identity type and object.
type RecordMap = BTreeMap<(IdentityType, String), ReputationRecord>;

/// Request handler state.
#[derive(Clone)]
struct StoreState {
    /// Expected `Authorization` header value.
    authorization: Arc<str>,
    /// Stored records.
    records: Arc<Mutex<RecordMap>>,
}

/// In-memory reputation store served over loopback HTTP.
pub struct InMemoryReputationStore {
    /// Shared record table.
    records: Arc<Mutex<RecordMap>>,
    /// Running server.
    server: ServerThread,
}

impl InMemoryReputationStore {
    /// Binds `bind` and starts serving with the given API key.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Bind`] when the socket cannot be bound.
    pub fn start(bind: SocketAddr, api_key: &str) -> Result<Self, HarnessError> {
        let records = Arc::new(Mutex::new(RecordMap::new()));
        let state = StoreState {
            authorization: Arc::from(format!("APIKey {api_key}")),
            records: Arc::clone(&records),
        };
        let server = spawn_server("in-memory-reputation-store", bind, move |_shutdown| {
            Router::new()
                .route(
                    "/type/{kind}/{object}",
                    get(read_record).put(write_record).delete(delete_record),
                )
                .with_state(state)
        })?;
        tracing::info!(addr = %server.local_addr(), "in-memory reputation store started");
        Ok(Self {
            records,
            server,
        })
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.server.local_addr())
    }

    /// Returns the stored record for an identity, bypassing HTTP.
    #[must_use]
    pub fn record(&self, kind: IdentityType, object: &str) -> Option<ReputationRecord> {
        self.records.lock().ok().and_then(|records| records.get(&(kind, object.to_string())).cloned())
    }

    /// Stops serving and joins the server thread.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ServerThread`] when the serving thread panicked.
    pub fn stop(mut self) -> Result<(), HarnessError> {
        self.server.stop()
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Returns the record or 404.
async fn read_record(
    State(state): State<StoreState>,
    Path((kind, object)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let kind = match authorize(&state, &headers, &kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    let Ok(records) = state.records.lock() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    records.get(&(kind, object)).map_or_else(
        || StatusCode::NOT_FOUND.into_response(),
        |record| (StatusCode::OK, Json(record.clone())).into_response(),
    )
}

/// Stores a record after validation and clamping.
async fn write_record(
    State(state): State<StoreState>,
    Path((kind, object)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let kind = match authorize(&state, &headers, &kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    let Ok(mut record) = serde_json::from_slice::<ReputationRecord>(&body) else {
        return (StatusCode::BAD_REQUEST, "invalid reputation record").into_response();
    };
    if record.kind != kind || record.object != object {
        return (StatusCode::BAD_REQUEST, "record does not match path").into_response();
    }
    record.reputation = record.reputation.clamp(0, MAX_REPUTATION);
    let Ok(mut records) = state.records.lock() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    records.insert((kind, object), record);
    StatusCode::OK.into_response()
}

/// Removes a record; absent records are not an error.
async fn delete_record(
    State(state): State<StoreState>,
    Path((kind, object)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let kind = match authorize(&state, &headers, &kind) {
        Ok(kind) => kind,
        Err(response) => return response,
    };
    let Ok(mut records) = state.records.lock() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    records.remove(&(kind, object));
    StatusCode::OK.into_response()
}

/// Checks the API key and parses the identity type segment.
fn authorize(state: &StoreState, headers: &HeaderMap, kind: &str) -> Result<IdentityType, Response> {
    let presented = headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    if presented != Some(state.authorization.as_ref()) {
        return Err((StatusCode::UNAUTHORIZED, "invalid api key").into_response());
    }
    IdentityType::parse(kind)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "unknown identity type").into_response())
}
