//! HTTP catalog source with endpoint failover
//!
//! The storefront publishes the same promotion feed behind several hosts.
//! This module tries them in order and returns the first usable response:
//! - one attempt per endpoint, failover is the retry mechanism
//! - bounded per-request timeout
//! - only success statuses with a non-empty, well-formed body count
//! - User-Agent rotation with browser-like headers

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};

use super::headers::{build_catalog_headers, random_user_agent};
use super::{CatalogProvider, RawCatalog, DEFAULT_ENDPOINTS};
use crate::config::CatalogConfig;
use crate::utils::error::FetchError;

/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Multi-endpoint catalog fetcher
pub struct CatalogSource {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Endpoints in priority order
    endpoints: Vec<String>,
}

impl CatalogSource {
    /// Create a source for the default storefront endpoints
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new() -> Result<Self, FetchError> {
        Self::with_endpoints(
            DEFAULT_ENDPOINTS.iter().map(|e| e.to_string()).collect(),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    /// Create a source with custom endpoints and timeout
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_endpoints(endpoints: Vec<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).gzip(true).build()?;

        Ok(Self { client, endpoints })
    }

    /// Create a source from the catalog section of the configuration
    pub fn from_config(config: &CatalogConfig) -> Result<Self, FetchError> {
        Self::with_endpoints(config.endpoints.clone(), config.request_timeout())
    }

    /// Configured endpoints in priority order
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Fetch the raw catalog from the first responsive endpoint
    ///
    /// # Errors
    ///
    /// Returns `FetchError::AllEndpointsFailed` carrying the last endpoint's
    /// error when no endpoint produced a usable response.
    pub async fn fetch_catalog(&self) -> Result<RawCatalog, FetchError> {
        let mut last_error = None;

        for endpoint in &self.endpoints {
            tracing::debug!(endpoint = %endpoint, "Trying catalog endpoint");

            match self.fetch_endpoint(endpoint).await {
                Ok(raw) => {
                    tracing::info!(
                        endpoint = %endpoint,
                        elements = raw.elements.len(),
                        "Fetched catalog"
                    );
                    return Ok(raw);
                }
                Err(e) => {
                    tracing::warn!(endpoint = %endpoint, error = %e, "Catalog endpoint failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(cause) => Err(FetchError::AllEndpointsFailed {
                attempts: self.endpoints.len(),
                last_cause: Box::new(cause),
            }),
            None => Err(FetchError::NoEndpoints),
        }
    }

    /// Single attempt against one endpoint
    async fn fetch_endpoint(&self, endpoint: &str) -> Result<RawCatalog, FetchError> {
        let headers = build_catalog_headers(random_user_agent());

        let response = self
            .client
            .get(endpoint)
            .headers(headers)
            .send()
            .await
            .map_err(Self::classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(Self::classify_request_error)?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody);
        }

        RawCatalog::from_body(endpoint, &body)
    }

    fn classify_request_error(e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(e)
        }
    }

    /// Hit every endpoint and report what each one returns
    ///
    /// Diagnostic only; the result is never fed to the cache.
    pub async fn probe(&self) -> Vec<EndpointProbe> {
        let mut probes = Vec::with_capacity(self.endpoints.len());

        for endpoint in &self.endpoints {
            let started = Instant::now();
            let result = self.fetch_endpoint(endpoint).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let probe = match result {
                Ok(raw) => EndpointProbe {
                    endpoint: endpoint.clone(),
                    ok: true,
                    element_count: Some(raw.elements.len()),
                    error: None,
                    elapsed_ms,
                },
                Err(e) => EndpointProbe {
                    endpoint: endpoint.clone(),
                    ok: false,
                    element_count: None,
                    error: Some(e.to_string()),
                    elapsed_ms,
                },
            };

            tracing::info!(
                endpoint = %probe.endpoint,
                ok = probe.ok,
                elements = ?probe.element_count,
                error = ?probe.error,
                elapsed_ms,
                "Probed catalog endpoint"
            );
            probes.push(probe);
        }

        probes
    }
}

#[async_trait]
impl CatalogProvider for CatalogSource {
    async fn fetch(&self) -> Result<RawCatalog, FetchError> {
        self.fetch_catalog().await
    }
}

/// Result of probing one endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EndpointProbe {
    pub endpoint: String,
    pub ok: bool,
    pub element_count: Option<usize>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_creation() {
        let source = CatalogSource::new().unwrap();
        assert_eq!(source.endpoints().len(), DEFAULT_ENDPOINTS.len());
        assert!(source.endpoints()[0].contains("ipv4"));
    }

    #[tokio::test]
    async fn test_no_endpoints() {
        let source = CatalogSource::with_endpoints(Vec::new(), Duration::from_secs(1)).unwrap();
        let err = source.fetch_catalog().await.unwrap_err();
        assert!(matches!(err, FetchError::NoEndpoints));
    }
}
