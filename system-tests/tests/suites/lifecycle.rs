// system-tests/tests/suites/lifecycle.rs
// ============================================================================
// Module: Gateway Lifecycle Tests
// Description: Startup failure, clean shutdown, and per-scenario isolation.
// Purpose: Validate the harness contract around the gateway process itself.
// Dependencies: system-tests helpers
// ============================================================================

//! ## Overview
//! Lifecycle checks that only hold for the bundled stub gateway are skipped
//! when a gateway executable override is configured.

use reputation_gate_harness::HarnessError;
use reputation_gate_harness::ScenarioPhase;
use reputation_gate_harness::ScenarioStep;
use system_tests::config::SystemTestConfig;

use crate::helpers::artifacts::TestReporter;
use crate::helpers::session::CLIENT_IP;
use crate::helpers::session::GatewaySession;
use crate::helpers::session::require;

fn uses_stub_gateway() -> Result<bool, String> {
    Ok(SystemTestConfig::load()?.gateway_bin.is_none())
}

#[tokio::test(flavor = "multi_thread")]
async fn misconfigured_gateway_fails_fast() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("misconfigured_gateway_fails_fast")?;
    if !uses_stub_gateway()? {
        reporter.finish("skip", vec!["gateway override configured".to_string()])?;
        return Ok(());
    }
    let mut session = GatewaySession::start().await?;
    let config = session.store_config().with_store_url("");
    let scenario = session.scenario("misconfigured", config).step(ScenarioStep::probe());
    let err = session.run_expecting_failure(&scenario, &mut reporter).await?;

    let HarnessError::Scenario {
        phase,
        source,
        output,
        ..
    } = err
    else {
        return Err(format!("expected a scenario error, got {err}").into());
    };
    if phase != ScenarioPhase::Seeded || !matches!(*source, HarnessError::EarlyExit { .. }) {
        return Err(format!("expected early exit after seeding, got {source} in {phase}").into());
    }
    if !output.stderr_contains("config load failed") {
        return Err(format!("expected the config error in stderr\n{output}").into());
    }

    session.shutdown()?;
    reporter.finish("pass", vec!["blank store URL exits before readiness".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn gateway_exits_cleanly_on_stop() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("gateway_exits_cleanly_on_stop")?;
    if !uses_stub_gateway()? {
        reporter.finish("skip", vec!["gateway override configured".to_string()])?;
        return Ok(());
    }
    let mut session = GatewaySession::start().await?;
    let scenario = session.scenario("clean-stop", session.store_config()).step(ScenarioStep::probe());
    let outcome = session.run(&scenario, &mut reporter).await?;

    require(
        outcome.output.exit_status.as_deref().is_some_and(|status| status.ends_with(": 0")),
        "gateway must exit zero after termination",
        &outcome,
    )?;

    session.shutdown()?;
    reporter.finish("pass", vec!["SIGTERM drains and exits zero".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn configuration_does_not_leak_between_scenarios() -> Result<(), Box<dyn std::error::Error>>
{
    let mut reporter = TestReporter::new("configuration_does_not_leak_between_scenarios")?;
    let mut session = GatewaySession::start().await?;

    let enforcing = session
        .scenario("enforcing", session.store_config().with_blocking_mode(true))
        .seed_reputation(CLIENT_IP, 0)
        .step(ScenarioStep::probe());
    let outcome = session.run(&enforcing, &mut reporter).await?;
    require(outcome.statuses() == vec![429], "enforcing run must reject", &outcome)?;

    let observing = session
        .scenario("observing", session.store_config())
        .seed_reputation(CLIENT_IP, 0)
        .step(ScenarioStep::probe());
    let outcome = session.run(&observing, &mut reporter).await?;
    require(outcome.statuses() == vec![200], "observe run must not inherit blocking", &outcome)?;

    session.shutdown()?;
    reporter.finish("pass", vec!["second scenario sees only its own settings".to_string()])?;
    Ok(())
}
