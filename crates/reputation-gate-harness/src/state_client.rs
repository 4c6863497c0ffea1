// crates/reputation-gate-harness/src/state_client.rs
// ============================================================================
// Module: Reputation State Client
// Description: REST client for seeding and clearing reputation records.
// Purpose: Put the reputation store into a known state before each scenario.
// Dependencies: reqwest, serde, url
// ============================================================================

//! ## Overview
//! [`ReputationStateClient`] writes, reads, and deletes records through the
//! store's `/type/{type}/{object}` API using an `APIKey` authorization header.
//! Every non-2xx answer is surfaced as [`HarnessError::StoreStatus`]; an
//! unseeded scenario would otherwise produce misleading assertions.
//! Scores are sent as given; clamping to `[0, 100]` is the store's job.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

use crate::error::HarnessError;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Kind of identity a reputation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    /// IP address.
    Ip,
    /// Email address.
    Email,
}

impl IdentityType {
    /// Returns the path segment used by the store API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Email => "email",
        }
    }

    /// Parses a store path segment.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ip" => Some(Self::Ip),
            "email" => Some(Self::Email),
            _ => None,
        }
    }
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trust score for one identity; 100 is fully trusted, 0 fully distrusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationRecord {
    /// Identity value, such as an IP address.
    pub object: String,
    /// Identity kind.
    #[serde(rename = "type")]
    pub kind: IdentityType,
    /// Reputation score.
    pub reputation: i64,
}

impl ReputationRecord {
    /// Builds an IP reputation record.
    #[must_use]
    pub fn ip(object: impl Into<String>, reputation: i64) -> Self {
        Self {
            object: object.into(),
            kind: IdentityType::Ip,
            reputation,
        }
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Authenticated client for the reputation store's record API.
#[derive(Clone)]
pub struct ReputationStateClient {
    /// Store base URL.
    base_url: Url,
    /// Static API key.
    api_key: String,
    /// HTTP client with a bounded timeout.
    client: Client,
}

impl fmt::Debug for ReputationStateClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReputationStateClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ReputationStateClient {
    /// Creates a client for `base_url` authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] for an unparsable URL and
    /// [`HarnessError::Store`] when the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, HarnessError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| HarnessError::Config(format!("invalid store url {base_url}: {err}")))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| HarnessError::Store(format!("failed to build http client: {err}")))?;
        Ok(Self {
            base_url,
            api_key: api_key.to_string(),
            client,
        })
    }

    /// Returns the store base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Sets the reputation of an IP identity.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StoreStatus`] on any non-2xx answer and
    /// [`HarnessError::Store`] when the store is unreachable.
    pub async fn set_reputation(&self, identity: &str, score: i64) -> Result<(), HarnessError> {
        self.set_record(&ReputationRecord::ip(identity, score)).await
    }

    /// Writes a full reputation record.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StoreStatus`] on any non-2xx answer and
    /// [`HarnessError::Store`] when the store is unreachable.
    pub async fn set_record(&self, record: &ReputationRecord) -> Result<(), HarnessError> {
        let path = record_path(record.kind, &record.object);
        let response = self
            .client
            .put(self.url(&path)?)
            .header(AUTHORIZATION, self.authorization())
            .json(record)
            .send()
            .await
            .map_err(|err| HarnessError::Store(format!("PUT {path}: {err}")))?;
        ensure_success("PUT", path, response.status())?;
        tracing::debug!(object = %record.object, reputation = record.reputation, "seeded reputation");
        Ok(())
    }

    /// Removes any record for an IP identity.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StoreStatus`] on any non-2xx answer and
    /// [`HarnessError::Store`] when the store is unreachable.
    pub async fn delete_reputation(&self, identity: &str) -> Result<(), HarnessError> {
        let path = record_path(IdentityType::Ip, identity);
        let response = self
            .client
            .delete(self.url(&path)?)
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|err| HarnessError::Store(format!("DELETE {path}: {err}")))?;
        ensure_success("DELETE", path, response.status())?;
        tracing::debug!(object = identity, "cleared reputation");
        Ok(())
    }

    /// Reads the record for an IP identity; `None` when the store has none.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StoreStatus`] on a non-2xx answer other than
    /// 404, and [`HarnessError::Store`] on transport or decode failures.
    pub async fn get_reputation(
        &self,
        identity: &str,
    ) -> Result<Option<ReputationRecord>, HarnessError> {
        let path = record_path(IdentityType::Ip, identity);
        let response = self
            .client
            .get(self.url(&path)?)
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|err| HarnessError::Store(format!("GET {path}: {err}")))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        ensure_success("GET", path.clone(), response.status())?;
        let record = response
            .json::<ReputationRecord>()
            .await
            .map_err(|err| HarnessError::Store(format!("GET {path}: invalid record: {err}")))?;
        Ok(Some(record))
    }

    /// Appends a record path to the base URL, keeping any base path prefix.
    fn url(&self, path: &str) -> Result<Url, HarnessError> {
        let joined = format!("{}{path}", self.base_url.as_str().trim_end_matches('/'));
        Url::parse(&joined)
            .map_err(|err| HarnessError::Config(format!("invalid record path {path}: {err}")))
    }

    /// Returns the authorization header value.
    fn authorization(&self) -> String {
        format!("APIKey {}", self.api_key)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the store API path for a record.
fn record_path(kind: IdentityType, object: &str) -> String {
    format!("/type/{kind}/{object}")
}

/// Maps a non-2xx status to [`HarnessError::StoreStatus`].
fn ensure_success(method: &'static str, path: String, status: StatusCode) -> Result<(), HarnessError> {
    if status.is_success() {
        return Ok(());
    }
    Err(HarnessError::StoreStatus {
        method,
        path,
        status: status.as_u16(),
    })
}
