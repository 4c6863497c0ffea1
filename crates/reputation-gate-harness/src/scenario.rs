// crates/reputation-gate-harness/src/scenario.rs
// ============================================================================
// Module: Scenario Runner
// Description: Configure, seed, run, probe, and stop one gateway scenario.
// Purpose: Compose the harness components with guaranteed cleanup.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! A [`Scenario`] is data: a gateway config, the reputation seeds applied
//! before start, and the steps executed while the gateway runs. The
//! [`ScenarioRunner`] walks `Configured -> Seeded -> Running -> Stopped` and
//! returns every probe result with the captured gateway output; assertions
//! happen in the caller after cleanup has completed.
//! Invariants:
//! - Phases advance strictly in order; `Running` is unreachable without
//!   `Seeded`.
//! - `Stopped` is always reached: the gateway is stopped and drained before
//!   [`ScenarioRunner::run`] returns, on success and on every failure path.
//! - A fault-mode step completes before the next step starts, so the next
//!   probe observes the new mode.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio::time::sleep;

use crate::config::ScenarioConfig;
use crate::error::HarnessError;
use crate::mock_store::FaultMode;
use crate::mock_store::FaultSwitch;
use crate::probe::GatewayProbe;
use crate::probe::PING_PATH;
use crate::probe::ProbeRecord;
use crate::process::ProcessHarness;
use crate::process::ProcessOutput;
use crate::state_client::ReputationStateClient;

// ============================================================================
// SECTION: Phases
// ============================================================================

/// Lifecycle phase of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioPhase {
    /// Configuration built; nothing external touched yet.
    Configured,
    /// Reputation state seeded.
    Seeded,
    /// Gateway running and healthy.
    Running,
    /// Gateway stopped and output drained.
    Stopped,
}

impl ScenarioPhase {
    /// Returns `next` when the transition is legal.
    ///
    /// Forward moves are one step at a time; any phase may jump to
    /// [`ScenarioPhase::Stopped`] on failure.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::PhaseTransition`] for any other move.
    pub fn advance(self, next: Self) -> Result<Self, HarnessError> {
        let legal = matches!(
            (self, next),
            (Self::Configured, Self::Seeded)
                | (Self::Seeded, Self::Running)
                | (Self::Configured | Self::Seeded | Self::Running, Self::Stopped)
        );
        if legal {
            Ok(next)
        } else {
            Err(HarnessError::PhaseTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Returns a stable label for the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Seeded => "seeded",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ScenarioPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Scenario Definition
// ============================================================================

/// Reputation precondition applied before the gateway starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed {
    /// Set an IP identity's reputation.
    Set {
        /// Identity.
        identity: String,
        /// Score, clamped by the store.
        score: i64,
    },
    /// Remove any record for an IP identity.
    Delete {
        /// Identity.
        identity: String,
    },
}

/// Action executed while the gateway runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioStep {
    /// Issue `repeat` sequential GETs against `path`.
    Probe {
        /// Gateway path.
        path: String,
        /// Number of sequential requests.
        repeat: u32,
    },
    /// Switch the mock store's fault mode.
    SetFaultMode(FaultMode),
    /// Change an identity's reputation out of band.
    SetReputation {
        /// Identity.
        identity: String,
        /// Score.
        score: i64,
    },
    /// Remove an identity's record out of band.
    DeleteReputation {
        /// Identity.
        identity: String,
    },
    /// Pause, for example to let a cache entry expire.
    Sleep(Duration),
}

impl ScenarioStep {
    /// One probe of the ping path.
    #[must_use]
    pub fn probe() -> Self {
        Self::probe_repeated(1)
    }

    /// `repeat` sequential probes of the ping path.
    #[must_use]
    pub fn probe_repeated(repeat: u32) -> Self {
        Self::Probe {
            path: PING_PATH.to_string(),
            repeat,
        }
    }

    /// One probe of `path`.
    #[must_use]
    pub fn probe_path(path: impl Into<String>) -> Self {
        Self::Probe {
            path: path.into(),
            repeat: 1,
        }
    }
}

/// One gateway run from configuration through stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Scenario name used in logs and errors.
    pub name: String,
    /// Gateway configuration for this run.
    pub config: ScenarioConfig,
    /// Preconditions applied before start.
    pub seeds: Vec<Seed>,
    /// Steps executed while running.
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    /// Creates a scenario with no seeds or steps.
    #[must_use]
    pub fn new(name: impl Into<String>, config: ScenarioConfig) -> Self {
        Self {
            name: name.into(),
            config,
            seeds: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Adds a reputation seed.
    #[must_use]
    pub fn seed_reputation(mut self, identity: impl Into<String>, score: i64) -> Self {
        self.seeds.push(Seed::Set {
            identity: identity.into(),
            score,
        });
        self
    }

    /// Adds a record deletion seed.
    #[must_use]
    pub fn seed_deleted(mut self, identity: impl Into<String>) -> Self {
        self.seeds.push(Seed::Delete {
            identity: identity.into(),
        });
        self
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: ScenarioStep) -> Self {
        self.steps.push(step);
        self
    }
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Everything observed during a completed scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioOutcome {
    /// Scenario name.
    pub name: String,
    /// Probe results in issue order.
    pub probes: Vec<ProbeRecord>,
    /// Gateway output captured at stop.
    pub output: ProcessOutput,
}

impl ScenarioOutcome {
    /// Returns probe status codes in issue order.
    #[must_use]
    pub fn statuses(&self) -> Vec<u16> {
        self.probes.iter().map(|probe| probe.status).collect()
    }

    /// Returns the first probe, when any was issued.
    #[must_use]
    pub fn first(&self) -> Option<&ProbeRecord> {
        self.probes.first()
    }

    /// Returns true when every probe returned `status`.
    #[must_use]
    pub fn all_status(&self, status: u16) -> bool {
        !self.probes.is_empty() && self.probes.iter().all(|probe| probe.status == status)
    }

    /// Returns a multi-line summary for assertion messages.
    #[must_use]
    pub fn diagnostics(&self) -> String {
        format!("scenario {} statuses {:?}\n{}", self.name, self.statuses(), self.output)
    }
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Executes scenarios against one gateway harness, one at a time.
pub struct ScenarioRunner {
    /// Gateway supervisor.
    harness: ProcessHarness,
    /// Seeding client.
    state: ReputationStateClient,
    /// Probe client.
    probe: GatewayProbe,
    /// Mock store fault switch, when a mock is part of the session.
    faults: Option<FaultSwitch>,
    /// Phase of the current or last scenario.
    phase: ScenarioPhase,
}

impl ScenarioRunner {
    /// Creates a runner.
    #[must_use]
    pub const fn new(
        harness: ProcessHarness,
        state: ReputationStateClient,
        probe: GatewayProbe,
    ) -> Self {
        Self {
            harness,
            state,
            probe,
            faults: None,
            phase: ScenarioPhase::Stopped,
        }
    }

    /// Attaches the mock store's fault switch.
    #[must_use]
    pub fn with_fault_switch(mut self, switch: FaultSwitch) -> Self {
        self.faults = Some(switch);
        self
    }

    /// Returns the phase of the current or last scenario.
    #[must_use]
    pub const fn phase(&self) -> ScenarioPhase {
        self.phase
    }

    /// Returns the seeding client.
    #[must_use]
    pub const fn state_client(&self) -> &ReputationStateClient {
        &self.state
    }

    /// Runs one scenario to completion.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Scenario`] wrapping the first failure, with the
    /// gateway output captured during cleanup. Cleanup has always run.
    pub async fn run(&mut self, scenario: &Scenario) -> Result<ScenarioOutcome, HarnessError> {
        self.phase = ScenarioPhase::Configured;
        tracing::info!(scenario = %scenario.name, "scenario configured");
        let mut probes = Vec::new();
        let result = self.drive(scenario, &mut probes).await;
        let failed_in = self.phase;
        let output = self.harness.stop_if_running().await.unwrap_or_default();
        self.phase = self.phase.advance(ScenarioPhase::Stopped)?;
        match result {
            Ok(()) => {
                tracing::info!(scenario = %scenario.name, probes = probes.len(), "scenario stopped");
                Ok(ScenarioOutcome {
                    name: scenario.name.clone(),
                    probes,
                    output,
                })
            }
            Err(source) => {
                tracing::warn!(scenario = %scenario.name, phase = %failed_in, error = %source, "scenario failed");
                let output = match &source {
                    HarnessError::EarlyExit {
                        output: captured,
                        ..
                    }
                    | HarnessError::NotReady {
                        output: captured,
                        ..
                    } => captured.clone(),
                    _ => output,
                };
                Err(HarnessError::Scenario {
                    name: scenario.name.clone(),
                    phase: failed_in,
                    source: Box::new(source),
                    output,
                })
            }
        }
    }

    /// Seeds, starts, and executes steps; cleanup is the caller's job.
    async fn drive(
        &mut self,
        scenario: &Scenario,
        probes: &mut Vec<ProbeRecord>,
    ) -> Result<(), HarnessError> {
        for seed in &scenario.seeds {
            match seed {
                Seed::Set {
                    identity,
                    score,
                } => self.state.set_reputation(identity, *score).await?,
                Seed::Delete {
                    identity,
                } => self.state.delete_reputation(identity).await?,
            }
        }
        self.phase = self.phase.advance(ScenarioPhase::Seeded)?;

        self.harness.start(&scenario.config).await?;
        self.phase = self.phase.advance(ScenarioPhase::Running)?;

        for step in &scenario.steps {
            self.execute(step, probes).await?;
        }
        Ok(())
    }

    /// Executes one running-phase step.
    async fn execute(
        &self,
        step: &ScenarioStep,
        probes: &mut Vec<ProbeRecord>,
    ) -> Result<(), HarnessError> {
        match step {
            ScenarioStep::Probe {
                path,
                repeat,
            } => {
                for _ in 0..*repeat {
                    probes.push(self.probe.get(path).await?);
                }
            }
            ScenarioStep::SetFaultMode(mode) => {
                self.faults.as_ref().ok_or(HarnessError::MissingFaultSwitch)?.set(*mode);
            }
            ScenarioStep::SetReputation {
                identity,
                score,
            } => self.state.set_reputation(identity, *score).await?,
            ScenarioStep::DeleteReputation {
                identity,
            } => self.state.delete_reputation(identity).await?,
            ScenarioStep::Sleep(duration) => sleep(*duration).await,
        }
        Ok(())
    }
}
