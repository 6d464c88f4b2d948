// # HTTP Snapshot Source
//
// This crate provides the bulk snapshot source for the phishing domain mirror.
//
// ## Purpose
//
// Fetches the authority's complete domain list with a single GET request.
// Every request carries the project identifier twice: as the `X-Identity`
// header and as the `User-Agent`.
//
// ## Response Format
//
// The endpoint answers with a JSON array of domain strings. An object of the
// form `{"domains": [...]}` is accepted as well.
//
// ## Retry Behavior
//
// None. A non-success status is returned as `Error::Fetch` and the caller
// decides what to do with it.

use phishgate_core::SourceRegistry;
use phishgate_core::config::{IDENTITY_HEADER, IdentityConfig, SnapshotConfig};
use phishgate_core::traits::{SnapshotSource, SnapshotSourceFactory};
use phishgate_core::{Error, Result};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Request timeout for the snapshot GET
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Accepted snapshot response bodies
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotBody {
    /// `["a.com", "b.com"]`
    List(Vec<String>),
    /// `{"domains": ["a.com", "b.com"]}`
    Wrapped { domains: Vec<String> },
}

impl SnapshotBody {
    fn into_domains(self) -> HashSet<String> {
        match self {
            SnapshotBody::List(domains) | SnapshotBody::Wrapped { domains } => {
                domains.into_iter().collect()
            }
        }
    }
}

/// Snapshot source backed by the authority's bulk HTTP endpoint
pub struct HttpSnapshotSource {
    /// URL of the bulk endpoint
    url: String,

    /// HTTP client with the identity headers preset
    client: reqwest::Client,
}

impl HttpSnapshotSource {
    /// Create a new HTTP snapshot source
    ///
    /// # Parameters
    ///
    /// - `url`: Bulk endpoint (e.g., "https://phish.sinking.yachts/v2/all")
    /// - `identity`: Project identifier sent with every request
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the identifier is not a valid header value.
    pub fn new(url: impl Into<String>, identity: &IdentityConfig) -> Result<Self> {
        identity.validate()?;

        let identifier = HeaderValue::from_str(&identity.project_identifier).map_err(|e| {
            Error::config(format!("Project identifier is not a valid header value: {}", e))
        })?;

        let header_name = HeaderName::from_bytes(IDENTITY_HEADER.as_bytes())
            .map_err(|e| Error::config(format!("Invalid identity header name: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(header_name, identifier.clone());
        headers.insert(reqwest::header::USER_AGENT, identifier);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// URL this source fetches from
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<HashSet<String>> {
        tracing::debug!("GET {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::fetch(&self.url, "GET", status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {}", e)))?;

        let domains = serde_json::from_slice::<SnapshotBody>(&body)?.into_domains();
        tracing::debug!("Snapshot contains {} domains", domains.len());

        Ok(domains)
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP snapshot sources
pub struct HttpSnapshotFactory;

impl SnapshotSourceFactory for HttpSnapshotFactory {
    fn create(
        &self,
        config: &SnapshotConfig,
        identity: &IdentityConfig,
    ) -> Result<Box<dyn SnapshotSource>> {
        match config {
            SnapshotConfig::Http { url } => {
                Ok(Box::new(HttpSnapshotSource::new(url.clone(), identity)?))
            }
            _ => Err(Error::config("Invalid config for HTTP snapshot source")),
        }
    }
}

/// Register the HTTP snapshot source with a registry
pub fn register(registry: &SourceRegistry) {
    registry.register_snapshot_source("http", Box::new(HttpSnapshotFactory));
}
