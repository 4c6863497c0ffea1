// system-tests/tests/helpers/session.rs
// ============================================================================
// Module: Gateway Session
// Description: Per-test fixture wiring store, mock, gateway, and runner.
// Purpose: Give every suite the same hermetic or overridden gateway setup.
// Dependencies: system-tests, reputation-gate-harness, tokio
// ============================================================================

//! ## Overview
//! A [`GatewaySession`] owns one reputation store (in-memory unless an
//! external one is configured), one fault-injecting mock store, and a
//! [`ScenarioRunner`] driving one gateway executable. Scenarios built through
//! [`GatewaySession::scenario`] start from the baseline seed of
//! `127.0.0.1 = 100`.

use std::net::SocketAddr;
use std::net::TcpListener;
use std::path::PathBuf;

use reputation_gate_harness::GatewayCommand;
use reputation_gate_harness::GatewayEndpoint;
use reputation_gate_harness::GatewayProbe;
use reputation_gate_harness::HarnessError;
use reputation_gate_harness::InMemoryReputationStore;
use reputation_gate_harness::MockReputationService;
use reputation_gate_harness::MockStoreConfig;
use reputation_gate_harness::ProcessHarness;
use reputation_gate_harness::ProcessHarnessConfig;
use reputation_gate_harness::ReputationStateClient;
use reputation_gate_harness::Scenario;
use reputation_gate_harness::ScenarioConfig;
use reputation_gate_harness::ScenarioOutcome;
use reputation_gate_harness::ScenarioRunner;
use system_tests::config::SystemTestConfig;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;

use super::artifacts::TestReporter;
use super::timeouts::PROBE_TIMEOUT;
use super::timeouts::SEED_TIMEOUT;
use super::timeouts::resolve_timeout;

/// Identity every probe originates from.
pub const CLIENT_IP: &str = "127.0.0.1";

/// Reputation seeded for [`CLIENT_IP`] before every scenario.
pub const BASELINE_REPUTATION: i64 = 100;

/// API key of the in-memory store.
const HERMETIC_API_KEY: &str = "system-test-api-key";

/// Listen address variable understood by the stub gateway.
const GATEWAY_BIND_ENV: &str = "GATEWAY_BIND";

/// Serializes sessions that share an external store.
static EXTERNAL_STORE_LOCK: Mutex<()> = Mutex::const_new(());

/// Where seeds are written.
enum StoreBackend {
    /// Hermetic store owned by the session.
    InMemory(InMemoryReputationStore),
    /// Store shared with other runs; sessions hold the lock while alive.
    External(MutexGuard<'static, ()>),
}

/// One test's gateway environment.
pub struct GatewaySession {
    store: StoreBackend,
    store_url: String,
    api_key: String,
    mock: MockReputationService,
    mock_url: String,
    runner: ScenarioRunner,
}

impl GatewaySession {
    /// Starts the stores and prepares a runner for the configured gateway.
    pub async fn start() -> Result<Self, String> {
        let config = SystemTestConfig::load()?;
        let (store, store_url, api_key) = match (&config.store_url, &config.api_key) {
            (Some(url), Some(key)) => {
                let guard = EXTERNAL_STORE_LOCK.lock().await;
                (StoreBackend::External(guard), url.clone(), key.clone())
            }
            _ => {
                let store = InMemoryReputationStore::start(loopback_any(), HERMETIC_API_KEY)
                    .map_err(|err| err.to_string())?;
                let url = store.base_url();
                (StoreBackend::InMemory(store), url, HERMETIC_API_KEY.to_string())
            }
        };

        let mut mock = MockReputationService::new(MockStoreConfig::ephemeral());
        let mock_addr = mock.start().map_err(|err| err.to_string())?;
        let mock_url = format!("http://{mock_addr}");

        let (command, gateway) = gateway_command(&config)?;
        let mut harness_config = ProcessHarnessConfig {
            health_url: gateway.health_url(),
            ..ProcessHarnessConfig::default()
        };
        if let Some(attempts) = config.ready_attempts {
            harness_config.max_attempts = attempts;
        }
        let harness = ProcessHarness::new(command, harness_config).map_err(|err| err.to_string())?;
        let state =
            ReputationStateClient::new(&store_url, &api_key, resolve_timeout(SEED_TIMEOUT, &config))
                .map_err(|err| err.to_string())?;
        let probe = GatewayProbe::new(gateway, resolve_timeout(PROBE_TIMEOUT, &config))
            .map_err(|err| err.to_string())?;
        let runner = ScenarioRunner::new(harness, state, probe).with_fault_switch(mock.fault_switch());
        Ok(Self {
            store,
            store_url,
            api_key,
            mock,
            mock_url,
            runner,
        })
    }

    /// Gateway config pointing at the reputation store.
    pub fn store_config(&self) -> ScenarioConfig {
        ScenarioConfig::new(&self.store_url, &self.api_key)
    }

    /// Gateway config pointing at the fault-injecting mock.
    pub fn mock_config(&self) -> ScenarioConfig {
        ScenarioConfig::new(&self.mock_url, &self.api_key)
    }

    /// Starts a scenario from the baseline seed.
    pub fn scenario(&self, name: &str, config: ScenarioConfig) -> Scenario {
        Scenario::new(name, config).seed_reputation(CLIENT_IP, BASELINE_REPUTATION)
    }

    /// Returns the mock store.
    pub const fn mock(&self) -> &MockReputationService {
        &self.mock
    }

    /// Runs a scenario and records its artifacts, pass or fail.
    pub async fn run(
        &mut self,
        scenario: &Scenario,
        reporter: &mut TestReporter,
    ) -> Result<ScenarioOutcome, Box<dyn std::error::Error>> {
        match self.runner.run(scenario).await {
            Ok(outcome) => {
                reporter.record_outcome(&outcome)?;
                Ok(outcome)
            }
            Err(err) => {
                reporter.record_failure(&err)?;
                Err(Box::new(err))
            }
        }
    }

    /// Runs a scenario that is expected to fail and returns its error.
    pub async fn run_expecting_failure(
        &mut self,
        scenario: &Scenario,
        reporter: &mut TestReporter,
    ) -> Result<HarnessError, Box<dyn std::error::Error>> {
        match self.runner.run(scenario).await {
            Ok(outcome) => {
                reporter.record_outcome(&outcome)?;
                Err(format!("scenario unexpectedly passed\n{}", outcome.diagnostics()).into())
            }
            Err(err) => {
                reporter.record_failure(&err)?;
                Ok(err)
            }
        }
    }

    /// Stops the stores.
    pub fn shutdown(mut self) -> Result<(), String> {
        self.mock.stop().map_err(|err| err.to_string())?;
        if let StoreBackend::InMemory(store) = self.store {
            store.stop().map_err(|err| err.to_string())?;
        }
        Ok(())
    }
}

/// Fails with the outcome's diagnostics unless `condition` holds.
pub fn require(
    condition: bool,
    message: &str,
    outcome: &ScenarioOutcome,
) -> Result<(), Box<dyn std::error::Error>> {
    if condition {
        Ok(())
    } else {
        Err(format!("{message}\n{}", outcome.diagnostics()).into())
    }
}

/// Returns a loopback address with an OS-assigned port.
fn loopback_any() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

/// Returns a free loopback address for the gateway.
fn allocate_bind_addr() -> Result<SocketAddr, String> {
    let listener = TcpListener::bind(loopback_any())
        .map_err(|err| format!("failed to bind loopback: {err}"))?;
    let addr =
        listener.local_addr().map_err(|err| format!("failed to read listener address: {err}"))?;
    drop(listener);
    Ok(addr)
}

/// Resolves the gateway executable and the endpoint it will listen on.
fn gateway_command(config: &SystemTestConfig) -> Result<(GatewayCommand, GatewayEndpoint), String> {
    let program = config
        .gateway_bin
        .clone()
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_BIN_EXE_stub_gateway")));
    if let Some(url) = &config.gateway_url {
        return Ok((GatewayCommand::new(program), GatewayEndpoint::new(url.clone())));
    }
    let bind = allocate_bind_addr()?;
    let command = GatewayCommand::new(program).env(GATEWAY_BIND_ENV, bind.to_string());
    Ok((command, GatewayEndpoint::new(format!("http://{bind}"))))
}
