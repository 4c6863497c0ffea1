// crates/reputation-gate-harness/src/probe.rs
// ============================================================================
// Module: Gateway Probes
// Description: HTTP probes that trigger the gateway's reputation decision.
// Purpose: Record status codes and bodies observed by a client.
// Dependencies: reqwest
// ============================================================================

//! ## Overview
//! A probe is a plain GET against the gateway. The probe client's timeout must
//! exceed the gateway's upstream timeout so a stalled store is observed
//! through the gateway's answer rather than a client-side timeout.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use reqwest::Client;

use crate::error::HarnessError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Path answering `pong` when the caller is allowed.
pub const PING_PATH: &str = "/iprepd_ping";

/// Readiness path.
pub const HEALTH_PATH: &str = "/health";

/// Body of an allowed ping.
pub const PING_BODY: &str = "pong\n";

/// Body of an allowed request proxied to the backend.
pub const BACKEND_BODY: &str = "the backend!\n";

/// Default probe timeout; longer than any gateway upstream timeout in use.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SECTION: Endpoint
// ============================================================================

/// Base URL of a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEndpoint {
    /// Base URL without trailing slash.
    base_url: String,
}

impl GatewayEndpoint {
    /// Creates an endpoint from a base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Returns the health URL.
    #[must_use]
    pub fn health_url(&self) -> String {
        self.url(HEALTH_PATH)
    }
}

// ============================================================================
// SECTION: Probe
// ============================================================================

/// Outcome of one probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRecord {
    /// Requested path.
    pub path: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
    /// Round-trip latency.
    pub elapsed: Duration,
}

/// Client issuing probes against a gateway.
#[derive(Debug, Clone)]
pub struct GatewayProbe {
    /// Gateway endpoint.
    endpoint: GatewayEndpoint,
    /// HTTP client with the probe timeout.
    client: Client,
}

impl GatewayProbe {
    /// Creates a probe client with the given timeout.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when the HTTP client cannot be built.
    pub fn new(endpoint: GatewayEndpoint, timeout: Duration) -> Result<Self, HarnessError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| HarnessError::Config(format!("failed to build probe client: {err}")))?;
        Ok(Self {
            endpoint,
            client,
        })
    }

    /// Returns the gateway endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &GatewayEndpoint {
        &self.endpoint
    }

    /// Probes the ping path.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Probe`] on transport failures.
    pub async fn ping(&self) -> Result<ProbeRecord, HarnessError> {
        self.get(PING_PATH).await
    }

    /// Probes an arbitrary path.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Probe`] on transport failures.
    pub async fn get(&self, path: &str) -> Result<ProbeRecord, HarnessError> {
        let url = self.endpoint.url(path);
        let started = Instant::now();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| HarnessError::Probe(format!("GET {url}: {err}")))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| HarnessError::Probe(format!("GET {url}: body read failed: {err}")))?;
        Ok(ProbeRecord {
            path: path.to_string(),
            status,
            body,
            elapsed: started.elapsed(),
        })
    }
}
