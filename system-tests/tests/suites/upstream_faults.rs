// system-tests/tests/suites/upstream_faults.rs
// ============================================================================
// Module: Upstream Fault Tests
// Description: Gateway behavior while the reputation store errors or stalls.
// Purpose: Validate fail-open verdicts, timeout logging, and error caching.
// Dependencies: system-tests helpers
// ============================================================================

//! ## Overview
//! Points the gateway at the fault-injecting mock store and switches its mode
//! mid-scenario. The mock starts in error mode and answers `OK` lookups with a
//! canned reputation of 25, below the threshold.

use std::time::Duration;

use reputation_gate_harness::FaultMode;
use reputation_gate_harness::ScenarioStep;

use crate::helpers::artifacts::TestReporter;
use crate::helpers::session::GatewaySession;
use crate::helpers::session::require;

#[tokio::test(flavor = "multi_thread")]
async fn stalled_store_fails_open_with_timeout_log() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("stalled_store_fails_open_with_timeout_log")?;
    let mut session = GatewaySession::start().await?;
    let config = session.mock_config().with_blocking_mode(true);
    let scenario = session
        .scenario("request-timeout", config)
        .step(ScenarioStep::SetFaultMode(FaultMode::Delay))
        .step(ScenarioStep::probe());
    let outcome = session.run(&scenario, &mut reporter).await?;

    require(outcome.statuses() == vec![200], "expected fail-open 200", &outcome)?;
    require(
        outcome.first().is_some_and(|probe| probe.elapsed < Duration::from_secs(5)),
        "gateway must give up before the stall ends",
        &outcome,
    )?;
    require(
        outcome.output.stderr_contains("tcp socket read timed out"),
        "expected the timeout marker",
        &outcome,
    )?;

    session.shutdown()?;
    reporter.finish("pass", vec!["stalled lookup fails open after the upstream timeout".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn store_errors_are_retried_when_not_cached() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("store_errors_are_retried_when_not_cached")?;
    let mut session = GatewaySession::start().await?;
    let config = session.mock_config().with_blocking_mode(true);
    let scenario = session
        .scenario("cache-errors-disabled", config)
        .step(ScenarioStep::SetFaultMode(FaultMode::Error))
        .step(ScenarioStep::probe())
        .step(ScenarioStep::SetFaultMode(FaultMode::Ok))
        .step(ScenarioStep::probe());
    let outcome = session.run(&scenario, &mut reporter).await?;

    require(outcome.statuses() == vec![200, 429], "expected 200 then 429", &outcome)?;
    require(
        session.mock().request_count() == 2,
        "second probe must reach the store again",
        &outcome,
    )?;

    session.shutdown()?;
    reporter.finish("pass", vec!["uncached error re-queries the store".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn store_errors_are_cached_when_enabled() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("store_errors_are_cached_when_enabled")?;
    let mut session = GatewaySession::start().await?;
    let config = session.mock_config().with_blocking_mode(true).with_cache_errors(true);
    let scenario = session
        .scenario("cache-errors-enabled", config)
        .step(ScenarioStep::SetFaultMode(FaultMode::Error))
        .step(ScenarioStep::probe())
        .step(ScenarioStep::SetFaultMode(FaultMode::Ok))
        .step(ScenarioStep::probe());
    let outcome = session.run(&scenario, &mut reporter).await?;

    require(outcome.statuses() == vec![200, 200], "expected cached fail-open", &outcome)?;
    require(session.mock().request_count() == 1, "store must be queried once", &outcome)?;

    session.shutdown()?;
    reporter.finish("pass", vec!["fail-open verdict cached for the TTL".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn canned_reputation_is_enforced() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("canned_reputation_is_enforced")?;
    let mut session = GatewaySession::start().await?;
    let config = session.mock_config().with_blocking_mode(true);
    let scenario = session
        .scenario("mock-ok", config)
        .step(ScenarioStep::SetFaultMode(FaultMode::Ok))
        .step(ScenarioStep::probe());
    let outcome = session.run(&scenario, &mut reporter).await?;

    require(outcome.statuses() == vec![429], "expected 429", &outcome)?;
    require(
        outcome.output.stderr_contains("127.0.0.1 rejected with a reputation of 25"),
        "expected the rejection marker",
        &outcome,
    )?;

    session.shutdown()?;
    reporter.finish("pass", vec!["mock OK mode drives a rejection".to_string()])?;
    Ok(())
}
