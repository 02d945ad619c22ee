//! # Multi-Endpoint Fetch
//!
//! Fetch one reference from several mirrors and keep the first good answer.
//!
//! ```text
//!                ┌──────────► mirror A ──(timeout)──► ✗ recorded
//!                │
//! fetch_first ───┼──────────► mirror B ──────────────► bytes ──parse──► ✓ wins
//!                │
//!                └──────────► mirror C ──(in flight)── dropped, cancelled
//!
//! at most `max_concurrent_fetches` requests in flight at once
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::config::SyncConfig;
use crate::error::{EndpointFailure, Error, Result};

/// One mirror that can serve content by reference
#[async_trait]
pub trait MirrorEndpoint: Send + Sync {
    /// Name used in logs and failure reports
    fn name(&self) -> &str;

    /// Raw bytes stored under `reference`
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;
}

/// Query `endpoints` for `reference` and return the first response `parse` accepts
///
/// Every request runs under `config.endpoint_timeout()`. Remaining requests
/// are cancelled as soon as one succeeds. When none does, the error lists
/// each endpoint's reason.
pub async fn fetch_first<T, F>(
    endpoints: &[Arc<dyn MirrorEndpoint>],
    reference: &str,
    config: &SyncConfig,
    parse: F,
) -> Result<T>
where
    F: Fn(&[u8]) -> Result<T>,
{
    if endpoints.is_empty() {
        return Err(Error::Validation("No mirror endpoints configured".into()));
    }

    let timeout = config.endpoint_timeout();
    let mut attempts = stream::iter(endpoints.iter().cloned())
        .map(|endpoint| async move {
            let outcome = match tokio::time::timeout(timeout, endpoint.fetch(reference)).await {
                Ok(Ok(bytes)) => Ok(bytes),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {} ms", timeout.as_millis())),
            };
            (endpoint.name().to_string(), outcome)
        })
        .buffer_unordered(config.max_concurrent_fetches.max(1));

    let mut failures = Vec::new();
    while let Some((endpoint, outcome)) = attempts.next().await {
        match outcome.and_then(|bytes| parse(&bytes).map_err(|e| e.to_string())) {
            Ok(value) => {
                tracing::debug!(endpoint = %endpoint, reference, "Mirror fetch succeeded");
                return Ok(value);
            }
            Err(reason) => {
                tracing::debug!(endpoint = %endpoint, reference, %reason, "Mirror fetch failed");
                failures.push(EndpointFailure { endpoint, reason });
            }
        }
    }

    tracing::warn!(reference, failed = failures.len(), "All mirror endpoints failed");
    Err(Error::AllEndpointsFailed(failures))
}
