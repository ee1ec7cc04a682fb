//! HTTP-backed identity provider and object store.
//!
//! Both clients speak a small JSON-over-HTTP protocol:
//!
//! - `GET {endpoint}/identities/{name}`: `200` when the identity exists. Any
//!   other status is an error described by a `{"code": "...", "message": "..."}`
//!   body. Absence is only reported when that body carries `NoSuchEntity`; a
//!   bare `404` (wrong base URL, proxy route) is a provider error.
//! - `GET {endpoint}/{key}`: `200` with the raw object bytes, `404` when the key
//!   does not exist.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{SourceError, SourceResult, NO_SUCH_ENTITY, NO_SUCH_KEY};
use crate::traits::{validate_candidate, IdentityProvider, Lookup, ObjectStore};

/// Error body returned by providers on non-success statuses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// Reads an error body, falling back to the HTTP status when the body is not
/// in the expected shape.
async fn read_error(response: reqwest::Response) -> (String, String) {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => (body.code, body.message),
        Err(_) => (
            format!("HTTP{}", status.as_u16()),
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        ),
    }
}

fn build_client(timeout: Duration) -> SourceResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::InternalError {
            message: format!("failed to build HTTP client: {e}"),
        })
}

fn parse_endpoint(endpoint: &str) -> SourceResult<Url> {
    let url = Url::parse(endpoint).map_err(|e| SourceError::InvalidInput {
        message: format!("invalid endpoint '{endpoint}': {e}"),
    })?;
    if url.cannot_be_a_base() {
        return Err(SourceError::InvalidInput {
            message: format!("endpoint '{endpoint}' cannot be used as a base URL"),
        });
    }
    Ok(url)
}

/// Appends path segments to `base`, percent-encoding each one.
fn join_segments(base: &Url, segments: &[&str]) -> SourceResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| SourceError::InvalidInput {
            message: format!("endpoint '{base}' cannot be used as a base URL"),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn map_transport_error(err: reqwest::Error, operation: &str, timeout: Duration) -> SourceError {
    if err.is_timeout() {
        SourceError::QueryTimeout {
            operation: operation.to_string(),
            timeout,
        }
    } else {
        SourceError::ConnectionError {
            message: err.to_string(),
        }
    }
}

/// Identity provider reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpIdentityProvider {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpIdentityProvider {
    /// Creates a provider rooted at `endpoint` with a per-request timeout.
    pub fn new(endpoint: &str, timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: parse_endpoint(endpoint)?,
            timeout,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip(self))]
    async fn lookup(&self, candidate: &str) -> SourceResult<Lookup> {
        validate_candidate(candidate)?;
        let url = join_segments(&self.endpoint, &["identities", candidate])?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "lookup", self.timeout))?;

        match response.status() {
            status if status.is_success() => Ok(Lookup::Found),
            status => {
                let (code, message) = read_error(response).await;
                if code == NO_SUCH_ENTITY {
                    return Ok(Lookup::NotFound);
                }
                debug!(%status, %code, "identity provider returned an error");
                Err(SourceError::Provider { code, message })
            }
        }
    }
}

/// Object store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpObjectStore {
    /// Creates a store rooted at `endpoint` with a per-request timeout.
    pub fn new(endpoint: &str, timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: parse_endpoint(endpoint)?,
            timeout,
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(skip(self))]
    async fn fetch(&self, key: &str) -> SourceResult<Vec<u8>> {
        let url = join_segments(&self.endpoint, &[key])?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_transport_error(e, "fetch", self.timeout))?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| map_transport_error(e, "fetch", self.timeout))?;
                Ok(bytes.to_vec())
            }
            StatusCode::NOT_FOUND => Err(SourceError::FetchError {
                key: key.to_string(),
                code: NO_SUCH_KEY.to_string(),
                message: "the specified key does not exist".to_string(),
            }),
            _ => {
                let (code, message) = read_error(response).await;
                Err(SourceError::FetchError {
                    key: key.to_string(),
                    code,
                    message,
                })
            }
        }
    }
}
