// crates/reputation-gate-harness/src/process.rs
// ============================================================================
// Module: Gateway Process Harness
// Description: Lifecycle supervision for the gateway-under-test process.
// Purpose: Spawn, wait for readiness, stop gracefully, and capture output.
// Dependencies: libc, reqwest, tokio, tracing
// ============================================================================

//! ## Overview
//! [`ProcessHarness`] spawns the gateway with piped stdout/stderr, drains both
//! pipes into unbounded in-memory buffers from the moment of spawn, and polls
//! the health URL until it answers with a success status.
//! Invariants:
//! - Readiness polling is bounded by [`ProcessHarnessConfig::max_attempts`].
//! - A child that exits before becoming healthy fails `start` immediately with
//!   its captured output.
//! - At most one [`ProcessHandle`] is alive per harness; the child is killed
//!   if the harness is dropped while it still runs.
//! - The child's environment carries only the scenario's gateway variables;
//!   gateway variables inherited from the harness process are removed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::Client;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;

use crate::config::GatewayEnv;
use crate::config::ScenarioConfig;
use crate::error::HarnessError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Health URL of a gateway on its well-known port.
pub const DEFAULT_HEALTH_URL: &str = "http://127.0.0.1/health";

/// Read chunk size for output drains.
const DRAIN_CHUNK_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Executable and fixed environment used to launch the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCommand {
    /// Gateway executable.
    pub program: PathBuf,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Environment applied to every launch, before scenario variables.
    pub env: BTreeMap<String, String>,
}

impl GatewayCommand {
    /// Creates a command for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds a fixed environment variable.
    #[must_use]
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }
}

/// Readiness and shutdown tuning for [`ProcessHarness`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHarnessConfig {
    /// Gateway health URL.
    pub health_url: String,
    /// Pause between health polls.
    pub poll_interval: Duration,
    /// Maximum number of health polls before giving up.
    pub max_attempts: u32,
    /// Per-poll request timeout.
    pub poll_timeout: Duration,
    /// Time allowed for graceful exit before the child is killed.
    pub stop_grace: Duration,
}

impl Default for ProcessHarnessConfig {
    fn default() -> Self {
        Self {
            health_url: DEFAULT_HEALTH_URL.to_string(),
            poll_interval: Duration::from_millis(100),
            max_attempts: 100,
            poll_timeout: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Output captured over a gateway process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stderr, lossily decoded.
    pub stderr: String,
    /// Exit status description, when the process was reaped.
    pub exit_status: Option<String>,
}

impl ProcessOutput {
    /// Returns true when stderr contains `needle`.
    #[must_use]
    pub fn stderr_contains(&self, needle: &str) -> bool {
        self.stderr.contains(needle)
    }

    /// Returns non-empty stderr lines.
    #[must_use]
    pub fn stderr_lines(&self) -> Vec<&str> {
        self.stderr.lines().filter(|line| !line.trim().is_empty()).collect()
    }
}

impl fmt::Display for ProcessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- gateway exit: {}", self.exit_status.as_deref().unwrap_or("unknown"))?;
        writeln!(f, "--- gateway stdout ---")?;
        writeln!(f, "{}", self.stdout.trim_end())?;
        writeln!(f, "--- gateway stderr ---")?;
        write!(f, "{}", self.stderr.trim_end())
    }
}

// ============================================================================
// SECTION: Process Handle
// ============================================================================

/// Shared sink a drain task appends to.
type OutputSink = Arc<Mutex<Vec<u8>>>;

/// A running gateway child with its output drains.
pub struct ProcessHandle {
    /// Child process.
    child: Child,
    /// Process id captured at spawn.
    pid: u32,
    /// Captured stdout bytes.
    stdout: OutputSink,
    /// Captured stderr bytes.
    stderr: OutputSink,
    /// Drain tasks, finished once the pipes close.
    drains: Vec<JoinHandle<()>>,
}

impl ProcessHandle {
    /// Spawns `command` with `scenario` applied to its environment.
    fn spawn(command: &GatewayCommand, scenario: &ScenarioConfig) -> Result<Self, HarnessError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        for key in GatewayEnv::ALL {
            cmd.env_remove(key.as_str());
        }
        cmd.envs(&command.env);
        cmd.envs(scenario.to_env());
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|err| {
            HarnessError::Spawn(format!("{}: {err}", command.program.display()))
        })?;
        let pid = child.id().ok_or_else(|| HarnessError::Spawn("child has no pid".to_string()))?;
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let mut drains = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            drains.push(tokio::spawn(drain(pipe, Arc::clone(&stdout))));
        }
        if let Some(pipe) = child.stderr.take() {
            drains.push(tokio::spawn(drain(pipe, Arc::clone(&stderr))));
        }
        Ok(Self {
            child,
            pid,
            stdout,
            stderr,
            drains,
        })
    }

    /// Returns the child's exit status when it has already exited.
    fn try_exit(&mut self) -> Result<Option<ExitStatus>, HarnessError> {
        Ok(self.child.try_wait()?)
    }

    /// Terminates the child, waits for exit, and collects its output.
    async fn terminate(mut self, grace: Duration) -> ProcessOutput {
        let status = match self.child.try_wait() {
            Ok(Some(status)) => Some(status),
            _ => {
                send_terminate(&mut self.child, self.pid);
                match timeout(grace, self.child.wait()).await {
                    Ok(Ok(status)) => Some(status),
                    Ok(Err(error)) => {
                        tracing::warn!(pid = self.pid, %error, "gateway wait failed");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(pid = self.pid, "gateway ignored termination, killing");
                        let _ = self.child.kill().await;
                        self.child.try_wait().ok().flatten()
                    }
                }
            }
        };
        for drain in self.drains.drain(..) {
            if timeout(grace, drain).await.is_err() {
                tracing::warn!(pid = self.pid, "gateway output pipe still open after exit");
            }
        }
        ProcessOutput {
            stdout: take_text(&self.stdout),
            stderr: take_text(&self.stderr),
            exit_status: status.map(|status| status.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Supervisor for the gateway-under-test process.
pub struct ProcessHarness {
    /// Launch command.
    command: GatewayCommand,
    /// Readiness and shutdown tuning.
    config: ProcessHarnessConfig,
    /// Health poll client.
    http: Client,
    /// Running process, if any.
    handle: Option<ProcessHandle>,
}

impl ProcessHarness {
    /// Creates a harness for `command`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when the health client cannot be built.
    pub fn new(command: GatewayCommand, config: ProcessHarnessConfig) -> Result<Self, HarnessError> {
        let http = Client::builder()
            .timeout(config.poll_timeout)
            .build()
            .map_err(|err| HarnessError::Config(format!("failed to build health client: {err}")))?;
        Ok(Self {
            command,
            config,
            http,
            handle: None,
        })
    }

    /// Returns the harness configuration.
    #[must_use]
    pub const fn config(&self) -> &ProcessHarnessConfig {
        &self.config
    }

    /// Returns the running gateway's pid.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(|handle| handle.pid)
    }

    /// Returns true while a gateway process is held.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawns the gateway and waits until its health endpoint succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::AlreadyRunning`] when a gateway is held,
    /// [`HarnessError::Spawn`] when the executable cannot be launched,
    /// [`HarnessError::EarlyExit`] when the child exits before becoming
    /// healthy, and [`HarnessError::NotReady`] when the attempt bound runs out.
    /// On failure no process is left running.
    pub async fn start(&mut self, scenario: &ScenarioConfig) -> Result<(), HarnessError> {
        if self.handle.is_some() {
            return Err(HarnessError::AlreadyRunning);
        }
        let handle = ProcessHandle::spawn(&self.command, scenario)?;
        tracing::info!(pid = handle.pid, program = %self.command.program.display(), "gateway spawned");
        self.handle = Some(handle);
        let mut attempts = 0u32;
        while attempts < self.config.max_attempts {
            attempts = attempts.saturating_add(1);
            let exited = match self.handle.as_mut() {
                Some(handle) => handle.try_exit(),
                None => return Err(HarnessError::NotRunning),
            };
            let exited = match exited {
                Ok(exited) => exited,
                Err(err) => {
                    let _ = self.collect().await;
                    return Err(err);
                }
            };
            if let Some(status) = exited {
                let output = self.collect().await;
                tracing::warn!(%status, attempts, "gateway exited before becoming healthy");
                return Err(HarnessError::EarlyExit {
                    status: status.to_string(),
                    output,
                });
            }
            if self.health_ok().await {
                tracing::info!(pid = ?self.pid(), attempts, "gateway healthy");
                return Ok(());
            }
            sleep(self.config.poll_interval).await;
        }
        let output = self.collect().await;
        Err(HarnessError::NotReady {
            attempts,
            output,
        })
    }

    /// Stops the gateway and returns its full stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::NotRunning`] when no gateway was started.
    pub async fn stop(&mut self) -> Result<ProcessOutput, HarnessError> {
        let handle = self.handle.take().ok_or(HarnessError::NotRunning)?;
        let pid = handle.pid;
        let output = handle.terminate(self.config.stop_grace).await;
        tracing::info!(pid, exit = ?output.exit_status, "gateway stopped");
        Ok(output)
    }

    /// Stops the gateway if one is held; safe to call unconditionally.
    pub async fn stop_if_running(&mut self) -> Option<ProcessOutput> {
        self.stop().await.ok()
    }

    /// Terminates any held process and returns its output.
    async fn collect(&mut self) -> ProcessOutput {
        self.stop_if_running().await.unwrap_or_default()
    }

    /// Issues one health poll.
    async fn health_ok(&self) -> bool {
        match self.http.get(&self.config.health_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::trace!(%error, "gateway health poll failed");
                false
            }
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Appends everything read from `pipe` to `sink` until EOF.
async fn drain<R>(mut pipe: R, sink: OutputSink)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; DRAIN_CHUNK_BYTES];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Err(error) => {
                tracing::warn!(%error, "gateway output pipe read failed");
                break;
            }
            Ok(read) => {
                let Ok(mut buffer) = sink.lock() else {
                    break;
                };
                buffer.extend_from_slice(&chunk[..read]);
            }
        }
    }
}

/// Decodes the bytes collected in `sink`.
fn take_text(sink: &OutputSink) -> String {
    sink.lock().map(|buffer| String::from_utf8_lossy(&buffer).into_owned()).unwrap_or_default()
}

/// Sends SIGTERM so the gateway can shut down gracefully.
#[cfg(unix)]
#[allow(unsafe_code, reason = "Graceful termination needs a raw SIGTERM via libc.")]
fn send_terminate(child: &mut Child, pid: u32) {
    let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
        let _ = child.start_kill();
        return;
    };
    // SAFETY: `raw_pid` belongs to a child this harness spawned and has not yet reaped.
    let result = unsafe { libc::kill(raw_pid, libc::SIGTERM) };
    if result != 0 {
        let _ = child.start_kill();
    }
}

/// Kills the gateway; platforms without signals have no graceful path.
#[cfg(not(unix))]
fn send_terminate(child: &mut Child, _pid: u32) {
    let _ = child.start_kill();
}
