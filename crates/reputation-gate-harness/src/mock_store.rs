// crates/reputation-gate-harness/src/mock_store.rs
// ============================================================================
// Module: Mock Reputation Service
// Description: Fault-injecting stand-in for the upstream reputation store.
// Purpose: Let scenarios flip the store between healthy, error, and stalled.
// Dependencies: axum, serde, tokio
// ============================================================================

//! ## Overview
//! [`MockReputationService`] answers every GET according to the current
//! [`FaultMode`]. The mode lives in an atomic owned by the service and is read
//! once per request when the handler starts.
//! Invariants:
//! - A mode change applies to requests whose handler starts after the change.
//!   A request already sleeping in [`FaultMode::Delay`] finishes with the
//!   delay behavior even if the mode changes meanwhile.
//! - Stopping the service cancels in-flight delays and joins the accept loop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;

use crate::error::HarnessError;
use crate::server::ServerThread;
use crate::server::ShutdownSignal;
use crate::server::spawn_server;
use crate::state_client::IdentityType;
use crate::state_client::ReputationRecord;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Well-known port the gateway expects the mock store on.
pub const DEFAULT_MOCK_PORT: u16 = 8081;

/// Stall applied in [`FaultMode::Delay`]; exceeds every gateway timeout used.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Reputation reported for the canned identity in [`FaultMode::Ok`].
pub const CANNED_REPUTATION: i64 = 25;

// ============================================================================
// SECTION: Fault Mode
// ============================================================================

/// Response behavior of the mock store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultMode {
    /// 200 with the canned reputation payload.
    Ok,
    /// 500 with an empty body.
    Error,
    /// Stall past the gateway timeout, then 404.
    Delay,
}

impl FaultMode {
    /// Returns the atomic encoding of the mode.
    const fn to_repr(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Error => 1,
            Self::Delay => 2,
        }
    }

    /// Decodes the atomic encoding; total over `u8`.
    const fn from_repr(value: u8) -> Self {
        match value {
            0 => Self::Ok,
            1 => Self::Error,
            _ => Self::Delay,
        }
    }
}

// ============================================================================
// SECTION: Fault Switch
// ============================================================================

/// Shared handle for changing the mock's fault mode from any task or thread.
#[derive(Debug, Clone)]
pub struct FaultSwitch {
    /// Encoded [`FaultMode`].
    mode: Arc<AtomicU8>,
}

impl FaultSwitch {
    /// Creates a switch starting in `mode`.
    fn new(mode: FaultMode) -> Self {
        Self {
            mode: Arc::new(AtomicU8::new(mode.to_repr())),
        }
    }

    /// Sets the mode observed by subsequently accepted requests.
    pub fn set(&self, mode: FaultMode) {
        let previous = FaultMode::from_repr(self.mode.swap(mode.to_repr(), Ordering::AcqRel));
        if previous != mode {
            tracing::info!(from = ?previous, to = ?mode, "mock store fault mode changed");
        }
    }

    /// Returns the current mode.
    #[must_use]
    pub fn get(&self) -> FaultMode {
        FaultMode::from_repr(self.mode.load(Ordering::Acquire))
    }
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for [`MockReputationService`].
#[derive(Debug, Clone)]
pub struct MockStoreConfig {
    /// Listening address.
    pub bind: SocketAddr,
    /// Stall duration in [`FaultMode::Delay`].
    pub delay: Duration,
    /// Mode in effect when the service starts.
    pub initial_mode: FaultMode,
    /// Payload returned in [`FaultMode::Ok`].
    pub canned: ReputationRecord,
}

impl Default for MockStoreConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_MOCK_PORT)),
            delay: DEFAULT_DELAY,
            initial_mode: FaultMode::Error,
            canned: ReputationRecord {
                object: Ipv4Addr::LOCALHOST.to_string(),
                kind: IdentityType::Ip,
                reputation: CANNED_REPUTATION,
            },
        }
    }
}

impl MockStoreConfig {
    /// Returns the default config bound to an ephemeral loopback port.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ..Self::default()
        }
    }
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Request handler state.
#[derive(Clone)]
struct MockState {
    /// Fault mode read per request.
    switch: FaultSwitch,
    /// Served request counter.
    hits: Arc<AtomicU64>,
    /// Delay-mode stall.
    delay: Duration,
    /// Canned OK payload.
    canned: Arc<ReputationRecord>,
    /// Cancels delay stalls on shutdown.
    shutdown: ShutdownSignal,
}

/// Fault-injecting mock of the upstream reputation store.
pub struct MockReputationService {
    /// Service configuration.
    config: MockStoreConfig,
    /// Shared fault mode.
    switch: FaultSwitch,
    /// Served request counter.
    hits: Arc<AtomicU64>,
    /// Running server, when started.
    server: Option<ServerThread>,
}

impl MockReputationService {
    /// Creates an unstarted service.
    #[must_use]
    pub fn new(config: MockStoreConfig) -> Self {
        let switch = FaultSwitch::new(config.initial_mode);
        Self {
            config,
            switch,
            hits: Arc::new(AtomicU64::new(0)),
            server: None,
        }
    }

    /// Binds the listener and starts serving on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::AlreadyStarted`] on a second call and
    /// [`HarnessError::Bind`] when the port is taken; the bind is not retried.
    pub fn start(&mut self) -> Result<SocketAddr, HarnessError> {
        if self.server.is_some() {
            return Err(HarnessError::AlreadyStarted);
        }
        let switch = self.switch.clone();
        let hits = Arc::clone(&self.hits);
        let delay = self.config.delay;
        let canned = Arc::new(self.config.canned.clone());
        let server = spawn_server("mock-reputation-store", self.config.bind, move |shutdown| {
            let state = MockState {
                switch,
                hits,
                delay,
                canned,
                shutdown,
            };
            Router::new()
                .route("/", get(handle_lookup))
                .route("/{*path}", get(handle_lookup))
                .with_state(state)
        })?;
        let addr = server.local_addr();
        tracing::info!(%addr, mode = ?self.switch.get(), "mock reputation store started");
        self.server = Some(server);
        Ok(addr)
    }

    /// Sets the fault mode for subsequently accepted requests.
    pub fn set_mode(&self, mode: FaultMode) {
        self.switch.set(mode);
    }

    /// Returns the current fault mode.
    #[must_use]
    pub fn mode(&self) -> FaultMode {
        self.switch.get()
    }

    /// Returns a clonable handle to the fault mode.
    #[must_use]
    pub fn fault_switch(&self) -> FaultSwitch {
        self.switch.clone()
    }

    /// Returns the number of GET requests received so far.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.hits.load(Ordering::Acquire)
    }

    /// Returns the bound address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(ServerThread::local_addr)
    }

    /// Returns the base URL while running.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.local_addr().map(|addr| format!("http://{addr}"))
    }

    /// Stops serving and joins the accept loop. Stopping twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ServerThread`] when the serving thread panicked.
    pub fn stop(&mut self) -> Result<(), HarnessError> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
            tracing::info!(requests = self.request_count(), "mock reputation store stopped");
        }
        Ok(())
    }
}

impl Drop for MockReputationService {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Answers a lookup according to the mode read at handler start.
async fn handle_lookup(State(state): State<MockState>) -> Response {
    state.hits.fetch_add(1, Ordering::AcqRel);
    match state.switch.get() {
        FaultMode::Ok => (StatusCode::OK, Json(state.canned.as_ref().clone())).into_response(),
        FaultMode::Error => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        FaultMode::Delay => {
            tokio::select! {
                () = tokio::time::sleep(state.delay) => {}
                () = state.shutdown.requested() => {}
            }
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
