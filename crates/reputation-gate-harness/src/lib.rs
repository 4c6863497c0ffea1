// crates/reputation-gate-harness/src/lib.rs
// ============================================================================
// Module: Reputation Gate Harness
// Description: Fault-injection harness for reputation-gated HTTP gateways.
// Purpose: Emulate the reputation store, supervise the gateway, run scenarios.
// Dependencies: axum, reqwest, serde, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! This crate drives a reputation-gated gateway as a black box. It provides a
//! mock reputation store with switchable fault modes, an in-memory store for
//! hermetic seeding, a REST client for seeding reputation state, a supervisor
//! for the gateway process, and a scenario runner composing all of them.
//! Invariants:
//! - Every gateway process started by a [`ScenarioRunner`] is stopped and its
//!   output drained before the scenario result is returned.
//! - Gateway configuration is passed to the child process only; the harness
//!   never mutates its own process environment.
//! - [`FaultMode`] changes apply to requests accepted after the change.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod logging;
pub mod mock_store;
pub mod probe;
pub mod process;
pub mod scenario;
mod server;
pub mod state_client;
pub mod store_stub;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::GatewayEnv;
pub use config::REFERENCE_THRESHOLD;
pub use config::ScenarioConfig;
pub use error::HarnessError;
pub use mock_store::FaultMode;
pub use mock_store::FaultSwitch;
pub use mock_store::MockReputationService;
pub use mock_store::MockStoreConfig;
pub use probe::GatewayEndpoint;
pub use probe::GatewayProbe;
pub use probe::ProbeRecord;
pub use process::GatewayCommand;
pub use process::ProcessHarness;
pub use process::ProcessHarnessConfig;
pub use process::ProcessOutput;
pub use scenario::Scenario;
pub use scenario::ScenarioOutcome;
pub use scenario::ScenarioPhase;
pub use scenario::ScenarioRunner;
pub use scenario::ScenarioStep;
pub use scenario::Seed;
pub use state_client::IdentityType;
pub use state_client::ReputationRecord;
pub use state_client::ReputationStateClient;
pub use store_stub::InMemoryReputationStore;

