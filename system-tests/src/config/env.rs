// system-tests/src/config/env.rs
// ============================================================================
// Module: System Test Environment
// Description: Environment-backed configuration for gateway system tests.
// Purpose: Centralize env parsing with strict UTF-8 validation.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Environment values are parsed with strict UTF-8 enforcement to avoid silent
//! misconfiguration. Invalid UTF-8 fails closed, as do override combinations
//! that cannot describe a runnable session.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// SECTION: Environment Constants
// ============================================================================

/// Environment keys for system test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTestEnv {
    /// Gateway executable override; defaults to the bundled stub gateway.
    GatewayBin,
    /// Gateway base URL override; requires a gateway executable override.
    GatewayUrl,
    /// External reputation store URL used for seeding.
    StoreUrl,
    /// API key for the external reputation store.
    ApiKey,
    /// Readiness poll attempt bound (positive integer).
    ReadyAttempts,
    /// Optional timeout override in seconds (positive integer).
    TimeoutSeconds,
    /// Optional run root override.
    RunRoot,
}

impl SystemTestEnv {
    /// Every key, in documentation order.
    pub const ALL: [Self; 7] = [
        Self::GatewayBin,
        Self::GatewayUrl,
        Self::StoreUrl,
        Self::ApiKey,
        Self::ReadyAttempts,
        Self::TimeoutSeconds,
        Self::RunRoot,
    ];

    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GatewayBin => "REPUTATION_GATE_SYSTEM_TEST_GATEWAY_BIN",
            Self::GatewayUrl => "REPUTATION_GATE_SYSTEM_TEST_GATEWAY_URL",
            Self::StoreUrl => "REPUTATION_GATE_SYSTEM_TEST_STORE_URL",
            Self::ApiKey => "REPUTATION_GATE_SYSTEM_TEST_API_KEY",
            Self::ReadyAttempts => "REPUTATION_GATE_SYSTEM_TEST_READY_ATTEMPTS",
            Self::TimeoutSeconds => "REPUTATION_GATE_SYSTEM_TEST_TIMEOUT_SEC",
            Self::RunRoot => "REPUTATION_GATE_SYSTEM_TEST_RUN_ROOT",
        }
    }
}

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Typed system test configuration derived from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SystemTestConfig {
    /// Gateway executable override.
    pub gateway_bin: Option<PathBuf>,
    /// Gateway base URL override.
    pub gateway_url: Option<String>,
    /// External reputation store URL.
    pub store_url: Option<String>,
    /// External reputation store API key.
    pub api_key: Option<String>,
    /// Readiness poll attempt bound.
    pub ready_attempts: Option<u32>,
    /// Optional timeout override in seconds (positive integer).
    pub timeout: Option<Duration>,
    /// Optional run root override.
    pub run_root: Option<PathBuf>,
}

impl SystemTestConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when an environment value is not valid UTF-8, is empty,
    /// or fails validation (for example, an invalid timeout), and when a store
    /// URL comes without its API key or a gateway URL without its executable.
    pub fn load() -> Result<Self, String> {
        let gateway_bin =
            read_env_nonempty(SystemTestEnv::GatewayBin.as_str())?.map(PathBuf::from);
        let gateway_url = read_env_nonempty(SystemTestEnv::GatewayUrl.as_str())?;
        let store_url = read_env_nonempty(SystemTestEnv::StoreUrl.as_str())?;
        let api_key = read_env_nonempty(SystemTestEnv::ApiKey.as_str())?;
        let ready_attempts = read_env_nonempty(SystemTestEnv::ReadyAttempts.as_str())?
            .map(|value| parse_positive(SystemTestEnv::ReadyAttempts.as_str(), &value))
            .transpose()?
            .map(|attempts| u32::try_from(attempts).unwrap_or(u32::MAX));
        let timeout = read_env_nonempty(SystemTestEnv::TimeoutSeconds.as_str())?
            .map(|value| parse_timeout_seconds(SystemTestEnv::TimeoutSeconds.as_str(), &value))
            .transpose()?;
        let run_root = read_env_nonempty(SystemTestEnv::RunRoot.as_str())?.map(PathBuf::from);
        if store_url.is_some() && api_key.is_none() {
            return Err(format!(
                "{} requires {}",
                SystemTestEnv::StoreUrl.as_str(),
                SystemTestEnv::ApiKey.as_str()
            ));
        }
        if gateway_url.is_some() && gateway_bin.is_none() {
            return Err(format!(
                "{} requires {}",
                SystemTestEnv::GatewayUrl.as_str(),
                SystemTestEnv::GatewayBin.as_str()
            ));
        }
        Ok(Self {
            gateway_bin,
            gateway_url,
            store_url,
            api_key,
            ready_attempts,
            timeout,
            run_root,
        })
    }

    /// Returns true when seeding goes to an external store.
    #[must_use]
    pub const fn uses_external_store(&self) -> bool {
        self.store_url.is_some()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads an environment variable and enforces UTF-8 validity.
///
/// # Errors
///
/// Returns an error when the environment variable contains invalid UTF-8.
pub fn read_env_strict(name: &str) -> Result<Option<String>, String> {
    std::env::var_os(name).map_or(Ok(None), |raw| {
        raw.into_string().map(Some).map_err(|_| format!("{name} must be valid UTF-8"))
    })
}

/// Reads an environment variable and rejects empty values.
///
/// # Errors
///
/// Returns an error when the variable is set but empty or whitespace.
fn read_env_nonempty(name: &str) -> Result<Option<String>, String> {
    match read_env_strict(name)? {
        Some(value) if value.trim().is_empty() => Err(format!("{name} must not be empty")),
        Some(value) => Ok(Some(value.trim().to_string())),
        None => Ok(None),
    }
}

/// Parses a positive integer.
///
/// # Errors
///
/// Returns an error when the value is non-numeric or zero.
fn parse_positive(name: &str, raw: &str) -> Result<u64, String> {
    let value: u64 =
        raw.trim().parse().map_err(|_| format!("{name} must be a positive integer"))?;
    if value == 0 {
        return Err(format!("{name} must be greater than zero"));
    }
    Ok(value)
}

/// Parses a positive timeout value from an environment variable string.
///
/// # Errors
///
/// Returns an error when the value is missing, non-numeric, or zero.
fn parse_timeout_seconds(name: &str, raw: &str) -> Result<Duration, String> {
    parse_positive(name, raw).map(Duration::from_secs)
}
