// system-tests/src/lib.rs
// ============================================================================
// Module: Reputation Gate System Tests Library
// Description: Shared configuration for gateway system test scenarios.
// Purpose: Provide run settings shared by the suites and the stub gateway.
// Dependencies: std
// ============================================================================

//! ## Overview
//! This crate hosts the env-backed run configuration used by the gateway
//! system tests in `system-tests/tests` and the reference `stub_gateway`
//! binary that stands in for a real gateway in hermetic runs.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
