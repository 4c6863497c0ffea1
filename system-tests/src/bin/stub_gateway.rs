// system-tests/src/bin/stub_gateway.rs
// ============================================================================
// Module: Stub Gateway
// Description: Reference reputation-gated gateway for hermetic system tests.
// Purpose: Provide the observable gateway contract without an external proxy.
// Dependencies: axum, reputation-gate-harness, reqwest, tokio, tracing
// ============================================================================

//! ## Overview
//! A minimal reputation-gated HTTP gateway configured entirely from the
//! environment the harness hands it:
//! - `GET /health` always answers 200 and is never gated.
//! - `GET /iprepd_ping` answers `pong\n`; every other path answers the
//!   backend body. Both are gated on the caller's IP reputation.
//! - Reputation is looked up at `{IPREPD_URL}/type/ip/{ip}` with an
//!   `APIKey` authorization header and cached for the TTL.
//! - Store errors and timeouts fail open; with error caching on, the
//!   fail-open verdict is cached as well.
//! - Scores below the threshold are logged and, in blocking mode, answered
//!   with 429.
//!
//! Logs go to stderr at `WARN` and above so a quiet run leaves stderr empty.
//! `SIGTERM` drains in-flight requests and exits.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use reputation_gate_harness::ReputationRecord;
use reputation_gate_harness::ScenarioConfig;
use reputation_gate_harness::probe::BACKEND_BODY;
use reputation_gate_harness::probe::HEALTH_PATH;
use reputation_gate_harness::probe::PING_BODY;
use reputation_gate_harness::probe::PING_PATH;
use system_tests::config::read_env_strict;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Listen address override.
const BIND_ENV: &str = "GATEWAY_BIND";

/// Listen address when [`BIND_ENV`] is unset.
const DEFAULT_BIND: &str = "127.0.0.1:80";

/// Reputation assumed for identities the store has no record of.
const UNKNOWN_REPUTATION: i64 = 100;

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Cached lookup result; `None` is a cached fail-open error.
#[derive(Debug, Clone, Copy)]
struct CachedVerdict {
    /// Reputation, when the lookup succeeded.
    reputation: Option<i64>,
    /// Expiry instant.
    expires: Instant,
}

/// Result of one store lookup.
enum Lookup {
    /// Store answered with a reputation.
    Score(i64),
    /// Store failed; the request fails open.
    Failed,
}

/// Shared gateway state.
struct Gate {
    /// Parsed gateway configuration.
    config: ScenarioConfig,
    /// Store client with the upstream timeout.
    client: reqwest::Client,
    /// Per-IP verdict cache.
    cache: Mutex<HashMap<IpAddr, CachedVerdict>>,
}

impl Gate {
    /// Returns the reputation to enforce for `ip`, or `None` to fail open.
    async fn reputation(&self, ip: IpAddr) -> Option<i64> {
        if let Some(cached) = self.cached(ip) {
            return cached;
        }
        let (reputation, cacheable) = match self.lookup(ip).await {
            Lookup::Score(score) => (Some(score), true),
            Lookup::Failed => (None, self.config.cache_errors),
        };
        if cacheable && let Ok(mut cache) = self.cache.lock() {
            cache.insert(ip, CachedVerdict {
                reputation,
                expires: Instant::now() + self.config.effective_cache_ttl(),
            });
        }
        reputation
    }

    /// Returns an unexpired cache entry.
    fn cached(&self, ip: IpAddr) -> Option<Option<i64>> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(&ip) {
            Some(entry) if entry.expires > Instant::now() => Some(entry.reputation),
            Some(_) => {
                cache.remove(&ip);
                None
            }
            None => None,
        }
    }

    /// Queries the store for `ip`.
    async fn lookup(&self, ip: IpAddr) -> Lookup {
        let url = format!("{}/type/ip/{ip}", self.config.store_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("APIKey {}", self.config.api_key))
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(error) if error.is_timeout() => {
                tracing::error!("iprepd lookup for {ip} failed: tcp socket read timed out");
                return Lookup::Failed;
            }
            Err(error) => {
                tracing::error!("iprepd lookup for {ip} failed: {error}");
                return Lookup::Failed;
            }
        };
        match response.status() {
            StatusCode::OK => match response.json::<ReputationRecord>().await {
                Ok(record) => Lookup::Score(record.reputation),
                Err(error) if error.is_timeout() => {
                    tracing::error!("iprepd lookup for {ip} failed: tcp socket read timed out");
                    Lookup::Failed
                }
                Err(error) => {
                    tracing::error!("iprepd returned an unreadable record for {ip}: {error}");
                    Lookup::Failed
                }
            },
            StatusCode::NOT_FOUND => Lookup::Score(UNKNOWN_REPUTATION),
            status => {
                tracing::error!("iprepd responded with a {} http status code", status.as_u16());
                Lookup::Failed
            }
        }
    }

    /// Gates one request and answers `body` when it is allowed.
    async fn admit(&self, ip: IpAddr, body: &'static str) -> Response {
        if let Some(score) = self.reputation(ip).await
            && score < self.config.effective_threshold()
        {
            tracing::warn!("{ip} rejected with a reputation of {score}");
            if self.config.blocking_mode {
                return StatusCode::TOO_MANY_REQUESTS.into_response();
            }
        }
        (StatusCode::OK, body).into_response()
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Liveness endpoint.
async fn health() -> StatusCode {
    StatusCode::OK
}

/// Gated ping endpoint.
async fn ping(
    State(gate): State<Arc<Gate>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    gate.admit(peer.ip().to_canonical(), PING_BODY).await
}

/// Gated backend for every other path.
async fn backend(
    State(gate): State<Arc<Gate>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    gate.admit(peer.ip().to_canonical(), BACKEND_BODY).await
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(LevelFilter::WARN)
        .with_ansi(false)
        .init();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!("stub-gateway: {message}");
            ExitCode::FAILURE
        }
    }
}

/// Loads configuration, binds, and serves until terminated.
async fn run() -> Result<(), String> {
    let config = ScenarioConfig::from_lookup(|key| read_env_strict(key).ok().flatten())
        .map_err(|err| format!("config load failed: {err}"))?;
    let bind = read_env_strict(BIND_ENV)?.unwrap_or_else(|| DEFAULT_BIND.to_string());
    let client = reqwest::Client::builder()
        .timeout(config.effective_timeout())
        .build()
        .map_err(|err| format!("store client init failed: {err}"))?;
    let gate = Arc::new(Gate {
        config,
        client,
        cache: Mutex::new(HashMap::new()),
    });
    let app = Router::new()
        .route(HEALTH_PATH, get(health))
        .route(PING_PATH, get(ping))
        .fallback(backend)
        .with_state(gate);
    let listener =
        TcpListener::bind(&bind).await.map_err(|err| format!("bind {bind} failed: {err}"))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(terminated())
        .await
        .map_err(|err| format!("server failed: {err}"))
}

/// Resolves on `SIGTERM` or Ctrl-C.
async fn terminated() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;

        if let Ok(mut term) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = term.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
            return;
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}
