// crates/reputation-gate-harness/src/error.rs
// ============================================================================
// Module: Harness Errors
// Description: Error taxonomy for the fault-injection harness.
// Purpose: Separate setup failures from gateway and scenario failures.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! All harness operations return [`HarnessError`]. Setup errors (bind
//! failures, seeding rejections) are fatal and never retried. Errors raised
//! after a gateway process was spawned carry the captured [`ProcessOutput`]
//! so failures are diagnosable without rerunning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;

use thiserror::Error;

use crate::process::ProcessOutput;
use crate::scenario::ScenarioPhase;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fault-injection harness errors.
///
/// # Invariants
/// - Variants raised after a gateway spawn carry its captured output.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A stub server could not bind its listening socket.
    #[error("bind failed on {addr}: {source}")]
    Bind {
        /// Requested bind address.
        addr: SocketAddr,
        /// Underlying socket error.
        source: std::io::Error,
    },
    /// The mock reputation service was started twice.
    #[error("mock reputation service already started")]
    AlreadyStarted,
    /// A stub server thread failed to start or join.
    #[error("server thread failure: {0}")]
    ServerThread(String),
    /// The reputation store could not be reached or decoded.
    #[error("reputation store request failed: {0}")]
    Store(String),
    /// The reputation store answered with a non-2xx status.
    #[error("reputation store rejected {method} {path} with status {status}")]
    StoreStatus {
        /// HTTP method of the rejected request.
        method: &'static str,
        /// Request path.
        path: String,
        /// Returned HTTP status code.
        status: u16,
    },
    /// The gateway process could not be spawned.
    #[error("gateway spawn failed: {0}")]
    Spawn(String),
    /// The gateway exited before its health endpoint answered.
    #[error("gateway exited before becoming healthy ({status})\n{output}")]
    EarlyExit {
        /// Exit status description.
        status: String,
        /// Output captured before the exit.
        output: ProcessOutput,
    },
    /// The gateway never answered its health endpoint within the bound.
    #[error("gateway not healthy after {attempts} attempts\n{output}")]
    NotReady {
        /// Number of health polls issued.
        attempts: u32,
        /// Output captured while polling.
        output: ProcessOutput,
    },
    /// Stop was requested without a running gateway.
    #[error("gateway process is not running")]
    NotRunning,
    /// Start was requested while a gateway is still running.
    #[error("gateway process is already running")]
    AlreadyRunning,
    /// A probe request against the gateway failed at the transport level.
    #[error("probe request failed: {0}")]
    Probe(String),
    /// Invalid harness or gateway configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A scenario attempted an illegal phase transition.
    #[error("scenario phase transition {from} -> {to} is not allowed")]
    PhaseTransition {
        /// Current phase.
        from: ScenarioPhase,
        /// Requested phase.
        to: ScenarioPhase,
    },
    /// A scenario step needs a fault switch that was not configured.
    #[error("scenario step requires a mock reputation service fault switch")]
    MissingFaultSwitch,
    /// A scenario failed after cleanup completed.
    #[error("scenario {name} failed during {phase}: {source}\n{output}")]
    Scenario {
        /// Scenario name.
        name: String,
        /// Phase in which the failure happened.
        phase: ScenarioPhase,
        /// Underlying failure.
        source: Box<HarnessError>,
        /// Gateway output captured during cleanup.
        output: ProcessOutput,
    },
    /// Local I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
