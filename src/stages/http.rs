use anyhow::{Context, Result};
use std::time::Duration;

/// HTTP client with a hard per-request timeout
pub(crate) fn client_with_timeout(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}
