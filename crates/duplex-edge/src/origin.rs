//! Origins the failover group routes between.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors from an origin fetch.
#[derive(Debug, Error, Clone)]
pub enum EdgeError {
    /// The origin could not be reached.
    #[error("origin {origin} unreachable: {reason}")]
    Unreachable {
        /// The origin id.
        origin: String,
        /// The underlying error.
        reason: String,
    },

    /// The configured origin group is inconsistent.
    #[error("invalid origin group: {0}")]
    InvalidGroup(String),
}

/// A request routed through the failover group.
///
/// Carries what is needed to replay the identical request against the
/// secondary origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginRequest {
    /// Request path, query string included.
    pub path: String,
}

impl OriginRequest {
    /// A GET request for the given path.
    pub fn get(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// A response from an origin.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Bytes,
}

impl OriginResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Bytes) -> Self {
        Self { status, body }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One member of an origin group.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Stable identifier of this origin.
    fn id(&self) -> &str;

    /// Fetches the request from this origin.
    ///
    /// A response with any status is `Ok`; `Err` means the origin was not
    /// reachable at all.
    async fn fetch(&self, request: &OriginRequest) -> Result<OriginResponse, EdgeError>;
}

/// HTTP origin backed by a regional endpoint.
pub struct HttpOrigin {
    id: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpOrigin {
    /// Creates an origin for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns `EdgeError::InvalidGroup` if the HTTP client cannot be built.
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EdgeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EdgeError::InvalidGroup(e.to_string()))?;
        Ok(Self { id: id.into(), base_url: base_url.into(), client })
    }
}

#[async_trait]
impl Origin for HttpOrigin {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, request: &OriginRequest) -> Result<OriginResponse, EdgeError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), request.path);

        let response = self.client.get(&url).send().await.map_err(|e| {
            EdgeError::Unreachable { origin: self.id.clone(), reason: e.to_string() }
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| EdgeError::Unreachable {
            origin: self.id.clone(),
            reason: e.to_string(),
        })?;

        Ok(OriginResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_http_origin_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let origin =
            HttpOrigin::new("east", server.uri(), Duration::from_secs(1)).unwrap();
        let response = origin.fetch(&OriginRequest::get("/index.html")).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(response.body, Bytes::from("hello"));
    }

    #[tokio::test]
    async fn test_http_origin_non_2xx_is_a_response_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let origin = HttpOrigin::new("east", server.uri(), Duration::from_secs(1)).unwrap();
        let response = origin.fetch(&OriginRequest::get("/missing")).await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_http_origin_unreachable() {
        let origin =
            HttpOrigin::new("east", "http://127.0.0.1:1", Duration::from_millis(200)).unwrap();
        let err = origin.fetch(&OriginRequest::get("/")).await.unwrap_err();
        assert!(matches!(err, EdgeError::Unreachable { .. }));
    }
}
