//! HTTP client for CalDAV operations.
//!
//! Thin wrapper over `reqwest` that adds credentials and conditional-request
//! headers, and maps unsuccessful statuses to [`TransportError`]s.

use calsync_core::VersionTag;
use reqwest::header::{ETAG, HeaderMap};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{TransportError, TransportResult};

use super::config::CalDavConfig;

/// Conditional header sent with a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    None,
    /// `If-None-Match: *`, the resource must not exist yet.
    Absent,
    /// `If-Match: "<etag>"`, the stored revision must match.
    Matches(VersionTag),
}

impl Precondition {
    pub fn from_etag(etag: Option<&VersionTag>) -> Self {
        match etag {
            Some(tag) => Self::Matches(tag.clone()),
            None => Self::None,
        }
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct DavResponse {
    pub status: u16,
    pub etag: Option<VersionTag>,
    pub body: String,
}

/// HTTP client for CalDAV operations.
pub struct CalDavClient {
    client: Client,
    config: CalDavConfig,
}

impl CalDavClient {
    /// Creates a new CalDAV client with the given configuration.
    pub fn new(config: CalDavConfig) -> TransportResult<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                TransportError::configuration(format!("Failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        Ok(Self { client, config })
    }

    /// Performs a REPORT request (calendar-query).
    pub async fn report(&self, url: Url, body: String) -> TransportResult<DavResponse> {
        let method = Method::from_bytes(b"REPORT")
            .map_err(|e| TransportError::internal(format!("Invalid HTTP method: {}", e)))?;
        let request = self
            .client
            .request(method, url.clone())
            .header("Depth", "1")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(body);
        self.send("REPORT", &url, request).await
    }

    /// Performs a GET request.
    pub async fn get(&self, url: Url) -> TransportResult<DavResponse> {
        let request = self.client.get(url.clone());
        self.send("GET", &url, request).await
    }

    /// Stores an iCalendar payload.
    pub async fn put(
        &self,
        url: Url,
        payload: String,
        precondition: Precondition,
        return_representation: bool,
    ) -> TransportResult<DavResponse> {
        let mut request = self
            .client
            .put(url.clone())
            .header("Content-Type", "text/calendar; charset=utf-8")
            .body(payload);
        request = with_precondition(request, &precondition);
        if return_representation {
            request = request.header("Prefer", "return=representation");
        }
        self.send("PUT", &url, request).await
    }

    /// Deletes a resource.
    pub async fn delete(&self, url: Url, precondition: Precondition) -> TransportResult<DavResponse> {
        let request = with_precondition(self.client.delete(url.clone()), &precondition);
        self.send("DELETE", &url, request).await
    }

    async fn send(
        &self,
        method: &str,
        url: &Url,
        mut request: RequestBuilder,
    ) -> TransportResult<DavResponse> {
        if let Some(ref credentials) = self.config.credentials {
            request = request.header("Authorization", credentials.header_value());
        }

        trace!(method = %method, url = %url, "Sending request");

        let response = request.send().await.map_err(|e| {
            TransportError::network(format!("{} {} failed: {}", method, url, e)).with_source(e)
        })?;

        let status = response.status();
        let etag = etag_from_headers(response.headers());
        trace!(status = %status, "Received response");

        let body = response.text().await.map_err(|e| {
            TransportError::network(format!("Failed to read response: {}", e)).with_source(e)
        })?;

        if status.is_success() {
            return Ok(DavResponse {
                status: status.as_u16(),
                etag,
                body,
            });
        }

        match status {
            StatusCode::PRECONDITION_FAILED => {
                debug!(method = %method, url = %url, "Version conflict");
            }
            s if s.is_server_error() => {
                warn!(method = %method, url = %url, status = %s, "Server error");
            }
            _ => {}
        }

        let reason = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            body
        };
        Err(TransportError::from_status(status.as_u16(), reason))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CalDavConfig {
        &self.config
    }
}

fn with_precondition(request: RequestBuilder, precondition: &Precondition) -> RequestBuilder {
    match precondition {
        Precondition::None => request,
        Precondition::Absent => request.header("If-None-Match", "*"),
        Precondition::Matches(tag) => request.header("If-Match", tag.header_value()),
    }
}

fn etag_from_headers(headers: &HeaderMap) -> Option<VersionTag> {
    headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(VersionTag::new)
}
