// crates/reputation-gate-harness/src/config.rs
// ============================================================================
// Module: Gateway Scenario Configuration
// Description: Immutable gateway configuration handed to the spawned process.
// Purpose: Replace process-global env mutation with an explicit structure.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The gateway reads its configuration from environment variables once at
//! startup. [`ScenarioConfig`] models that surface as an immutable value built
//! before the process starts and applied only to the child's environment.
//! [`ScenarioConfig::from_lookup`] parses the same surface back, with strict
//! validation; invalid values fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::HarnessError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Reference reputation threshold: scores at or above it are allowed.
pub const REFERENCE_THRESHOLD: i64 = 51;

/// Cache time-to-live applied when none is configured.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Upstream request timeout applied when none is configured.
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_millis(500);

// ============================================================================
// SECTION: Environment Names
// ============================================================================

/// Environment keys read by the gateway at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayEnv {
    /// Enforce mode switch (`1` rejects low reputation traffic).
    BlockingMode,
    /// Cache time-to-live in seconds.
    CacheTtl,
    /// Cache upstream errors (`1`/`0`).
    CacheErrors,
    /// Upstream reputation store URL.
    StoreUrl,
    /// Upstream reputation store API key.
    ApiKey,
    /// Upstream request timeout in milliseconds.
    Timeout,
    /// Reputation threshold below which traffic is rejected.
    Threshold,
}

impl GatewayEnv {
    /// Every gateway environment key, in the order they are emitted.
    pub const ALL: [Self; 7] = [
        Self::BlockingMode,
        Self::CacheTtl,
        Self::CacheErrors,
        Self::StoreUrl,
        Self::ApiKey,
        Self::Timeout,
        Self::Threshold,
    ];

    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BlockingMode => "BLOCKING_MODE",
            Self::CacheTtl => "IPREPD_CACHE_TTL",
            Self::CacheErrors => "IPREPD_CACHE_ERRORS",
            Self::StoreUrl => "IPREPD_URL",
            Self::ApiKey => "IPREPD_API_KEY",
            Self::Timeout => "IPREPD_TIMEOUT",
            Self::Threshold => "IPREPD_REPUTATION_THRESHOLD",
        }
    }
}

// ============================================================================
// SECTION: Scenario Config
// ============================================================================

/// Gateway configuration for one process lifetime.
///
/// # Invariants
/// - Values are fixed once the gateway is spawned; a new config needs a new
///   process.
/// - Unset optional fields are omitted from the child environment, so the
///   gateway applies its own defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioConfig {
    /// Reject low-reputation traffic instead of only logging it.
    pub blocking_mode: bool,
    /// Verdict cache time-to-live.
    pub cache_ttl: Option<Duration>,
    /// Cache upstream errors as fail-open verdicts.
    pub cache_errors: bool,
    /// Upstream reputation store URL.
    pub store_url: String,
    /// Upstream reputation store API key.
    pub api_key: String,
    /// Upstream request timeout.
    pub timeout: Option<Duration>,
    /// Reputation threshold.
    pub threshold: Option<i64>,
    /// Additional variables passed through verbatim.
    pub extra: BTreeMap<String, String>,
}

impl ScenarioConfig {
    /// Creates an observe-only config pointing at the given store.
    #[must_use]
    pub fn new(store_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            blocking_mode: false,
            cache_ttl: None,
            cache_errors: false,
            store_url: store_url.into(),
            api_key: api_key.into(),
            timeout: None,
            threshold: None,
            extra: BTreeMap::new(),
        }
    }

    /// Enables or disables enforce mode.
    #[must_use]
    pub const fn with_blocking_mode(mut self, enabled: bool) -> Self {
        self.blocking_mode = enabled;
        self
    }

    /// Sets the verdict cache time-to-live.
    ///
    /// The gateway reads whole seconds, so `ttl` is rounded up to the next
    /// second and never below one.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(round_up_secs(ttl));
        self
    }

    /// Enables or disables caching of upstream errors.
    #[must_use]
    pub const fn with_cache_errors(mut self, enabled: bool) -> Self {
        self.cache_errors = enabled;
        self
    }

    /// Replaces the upstream store URL.
    #[must_use]
    pub fn with_store_url(mut self, url: impl Into<String>) -> Self {
        self.store_url = url.into();
        self
    }

    /// Replaces the upstream API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    /// Sets the upstream request timeout.
    ///
    /// Rounded up to whole milliseconds, never below one.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(round_up_millis(timeout));
        self
    }

    /// Sets the reputation threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Adds a pass-through environment variable.
    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }

    /// Returns the environment pairs applied to the gateway process.
    #[must_use]
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut vars = Vec::new();
        if self.blocking_mode {
            vars.push((GatewayEnv::BlockingMode.as_str().to_string(), "1".to_string()));
        }
        if let Some(ttl) = self.cache_ttl {
            vars.push((GatewayEnv::CacheTtl.as_str().to_string(), ttl.as_secs().to_string()));
        }
        if self.cache_errors {
            vars.push((GatewayEnv::CacheErrors.as_str().to_string(), "1".to_string()));
        }
        vars.push((GatewayEnv::StoreUrl.as_str().to_string(), self.store_url.clone()));
        vars.push((GatewayEnv::ApiKey.as_str().to_string(), self.api_key.clone()));
        if let Some(timeout) = self.timeout {
            vars.push((GatewayEnv::Timeout.as_str().to_string(), timeout.as_millis().to_string()));
        }
        if let Some(threshold) = self.threshold {
            vars.push((GatewayEnv::Threshold.as_str().to_string(), threshold.to_string()));
        }
        vars.extend(self.extra.iter().map(|(name, value)| (name.clone(), value.clone())));
        vars
    }

    /// Parses a config from an environment lookup function.
    ///
    /// Only [`GatewayEnv`] keys are read; `extra` is left empty.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when the store URL or API key is
    /// missing, or when a value fails validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HarnessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: GatewayEnv| read_nonempty(&lookup, key);
        let store_url = read(GatewayEnv::StoreUrl)?.ok_or_else(|| {
            HarnessError::Config(format!("{} must be set", GatewayEnv::StoreUrl.as_str()))
        })?;
        let api_key = read(GatewayEnv::ApiKey)?.ok_or_else(|| {
            HarnessError::Config(format!("{} must be set", GatewayEnv::ApiKey.as_str()))
        })?;
        let blocking_mode = parse_bool(GatewayEnv::BlockingMode, read(GatewayEnv::BlockingMode)?)?;
        let cache_errors = parse_bool(GatewayEnv::CacheErrors, read(GatewayEnv::CacheErrors)?)?;
        let cache_ttl = read(GatewayEnv::CacheTtl)?
            .map(|raw| parse_positive(GatewayEnv::CacheTtl, &raw).map(Duration::from_secs))
            .transpose()?;
        let timeout = read(GatewayEnv::Timeout)?
            .map(|raw| parse_positive(GatewayEnv::Timeout, &raw).map(Duration::from_millis))
            .transpose()?;
        let threshold = read(GatewayEnv::Threshold)?
            .map(|raw| {
                raw.trim().parse::<i64>().map_err(|_| {
                    HarnessError::Config(format!(
                        "{} must be an integer",
                        GatewayEnv::Threshold.as_str()
                    ))
                })
            })
            .transpose()?;
        Ok(Self {
            blocking_mode,
            cache_ttl,
            cache_errors,
            store_url,
            api_key,
            timeout,
            threshold,
            extra: BTreeMap::new(),
        })
    }

    /// Returns the configured cache TTL or the gateway default.
    #[must_use]
    pub fn effective_cache_ttl(&self) -> Duration {
        self.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL)
    }

    /// Returns the configured upstream timeout or the gateway default.
    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_UPSTREAM_TIMEOUT)
    }

    /// Returns the configured threshold or [`REFERENCE_THRESHOLD`].
    #[must_use]
    pub fn effective_threshold(&self) -> i64 {
        self.threshold.unwrap_or(REFERENCE_THRESHOLD)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads a key and rejects values that are set but blank.
fn read_nonempty<F>(lookup: &F, key: GatewayEnv) -> Result<Option<String>, HarnessError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key.as_str()) {
        Some(value) if value.trim().is_empty() => {
            Err(HarnessError::Config(format!("{} must not be empty", key.as_str())))
        }
        other => Ok(other),
    }
}

/// Parses `1`/`0`/`true`/`false`; an unset key is `false`.
fn parse_bool(key: GatewayEnv, raw: Option<String>) -> Result<bool, HarnessError> {
    let Some(value) = raw else {
        return Ok(false);
    };
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed == "1" {
        return Ok(true);
    }
    if trimmed.eq_ignore_ascii_case("false") || trimmed == "0" {
        return Ok(false);
    }
    Err(HarnessError::Config(format!("{} must be 1, 0, true, or false", key.as_str())))
}

/// Rounds up to whole seconds with a floor of one second.
fn round_up_secs(ttl: Duration) -> Duration {
    let secs = ttl.as_secs();
    if ttl.is_zero() || ttl > Duration::from_secs(secs) {
        return Duration::from_secs(secs.saturating_add(1));
    }
    ttl
}

/// Rounds up to whole milliseconds with a floor of one millisecond.
fn round_up_millis(timeout: Duration) -> Duration {
    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    if timeout.is_zero() || timeout > Duration::from_millis(millis) {
        return Duration::from_millis(millis.saturating_add(1));
    }
    Duration::from_millis(millis)
}

/// Parses a strictly positive integer.
fn parse_positive(key: GatewayEnv, raw: &str) -> Result<u64, HarnessError> {
    let value: u64 = raw.trim().parse().map_err(|_| {
        HarnessError::Config(format!("{} must be a positive integer", key.as_str()))
    })?;
    if value == 0 {
        return Err(HarnessError::Config(format!("{} must be greater than zero", key.as_str())));
    }
    Ok(value)
}
