//! HTTP existence check against the owning service.
//!
//! `GET <base_url>/<id>`: 2xx means the entity exists, 4xx is a definite
//! negative, anything else (5xx, transport failure, timeout) is transient
//! and retried under the validation policy.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::config::{DependencyConfig, RetryConfig};
use crate::resilience::{execute, GuardedCall, RetryError, RetryPolicy};

/// Answer from the live dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid,
}

/// Failure of a single lookup attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("entity rejected with status {0}")]
    Rejected(u16),

    #[error("dependency responded with status {0}")]
    Server(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,
}

impl LookupError {
    /// Only definite negatives skip the remaining attempts.
    pub fn is_transient(&self) -> bool {
        !matches!(self, LookupError::Rejected(_))
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LookupError::Timeout
        } else {
            LookupError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupSetupError {
    #[error("invalid dependency url '{0}'")]
    Url(String),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Retried existence check, the call guarded by the validation breaker.
pub struct EntityLookup {
    client: reqwest::Client,
    base_url: Url,
    policy: RetryPolicy<LookupError>,
}

impl EntityLookup {
    pub fn new(base_url: &str, attempt_timeout: Duration, retry: &RetryConfig) -> Result<Self, LookupSetupError> {
        let base_url = Url::parse(base_url)
            .ok()
            .filter(|u| !u.cannot_be_a_base())
            .ok_or_else(|| LookupSetupError::Url(base_url.to_string()))?;

        let client = reqwest::Client::builder().timeout(attempt_timeout).build()?;
        let policy = RetryPolicy::from_config("entity-validation", retry).retry_if(LookupError::is_transient);

        Ok(Self {
            client,
            base_url,
            policy,
        })
    }

    pub fn from_config(dependency: &DependencyConfig, retry: &RetryConfig) -> Result<Self, LookupSetupError> {
        Self::new(&dependency.base_url, dependency.timeout(), retry)
    }

    pub fn entity_url(&self, id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(id);
        }
        url
    }

    async fn attempt(&self, id: &str) -> Result<(), LookupError> {
        let response = self.client.get(self.entity_url(id)).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(())
        } else if status.is_client_error() {
            Err(LookupError::Rejected(status.as_u16()))
        } else {
            Err(LookupError::Server(status.as_u16()))
        }
    }
}

#[async_trait]
impl GuardedCall for EntityLookup {
    type Output = Verdict;
    type Error = RetryError<LookupError>;

    async fn call(&self, id: &str) -> Result<Verdict, RetryError<LookupError>> {
        match execute(&self.policy, || self.attempt(id)).await {
            Ok(()) => Ok(Verdict::Valid),
            Err(RetryError::Bailed { error: LookupError::Rejected(status), .. }) => {
                tracing::debug!(id, status, "Dependency rejected entity");
                Ok(Verdict::Invalid)
            }
            Err(e) => Err(e),
        }
    }
}
