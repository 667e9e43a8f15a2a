//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest`, with middleware for
//! exponential backoff retries and standardized JSON response handling.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest_middleware::Error),

    #[error("failed to read response body: {0}")]
    Body(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// A standardized container for API responses.
///
/// Wraps the deserialized data along with metadata about the HTTP
/// transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// Converts a non-2xx response into [`ApiError::Status`].
    pub fn into_result(self) -> Result<T, ApiError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(ApiError::Status {
                status: self.status,
                body: self.error_body.unwrap_or_default(),
            }),
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs,
/// authentication tokens, and automatic retries.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
    /// An optional Bearer token used for authorization.
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a new `ApiClient` retrying transient failures up to `max_retries` times.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API (e.g., "http://edge.local:5000/").
    /// * `auth_token` - An optional string for the Authorization header.
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        max_retries: u32,
    ) -> Result<Self, ApiError> {
        // Joining relative paths onto a base without a trailing slash would
        // replace its last segment.
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let url = Url::parse(&base)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            auth_token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs a generic HTTP request and handles the response.
    ///
    /// Transport failures are errors; non-2xx statuses are not, they come
    /// back with `success == false` and the raw body in `error_body`. An
    /// empty 2xx body deserializes as JSON `null`.
    ///
    /// # Arguments
    /// * `method` - The HTTP verb (GET, POST, etc.).
    /// * `path` - The path relative to the base URL; a leading `/` is ignored.
    /// * `headers` - Optional additional headers for this specific request.
    /// * `body` - Optional serializable object to send as the JSON body.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<&B>,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let full_url = self.base_url.join(path.trim_start_matches('/'))?;
        tracing::debug!(%method, url = %full_url, "http request");
        let mut req = self.inner.request(method, full_url);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(b) = body {
            let json_body = serde_json::to_string(b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let bytes = response.bytes().await?;
            let data = if bytes.is_empty() {
                serde_json::from_slice(b"null")?
            } else {
                serde_json::from_slice(&bytes)?
            };
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            tracing::debug!(status = status.as_u16(), "http request unsuccessful");
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let client = ApiClient::new("http://edge.local:5000/api", None, 0).unwrap();
        assert_eq!(client.base_url().as_str(), "http://edge.local:5000/api/");
        let joined = client.base_url().join("headsets").unwrap();
        assert_eq!(joined.as_str(), "http://edge.local:5000/api/headsets");
    }

    #[test]
    fn relative_base_is_rejected() {
        assert!(matches!(
            ApiClient::new("edge.local/api", None, 0),
            Err(ApiError::Url(_))
        ));
    }

    #[test]
    fn unsuccessful_response_becomes_status_error() {
        let resp: ApiResponse<()> = ApiResponse {
            data: None,
            error_body: Some("no such location".into()),
            status: 404,
            success: false,
            headers: HeaderMap::new(),
        };
        match resp.into_result() {
            Err(ApiError::Status { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such location");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
