//! Wire-level request execution, abstracted for testability.

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::{HttpMethod, normalize_path};
use bytes::Bytes;
use serde::de::DeserializeOwned;

/// One request as it goes on the wire
#[derive(Clone, Debug)]
pub struct ApiRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Path relative to the API prefix (already normalized)
    pub path: String,
    /// Optional JSON body
    pub body: Option<serde_json::Value>,
}

/// A fully-read response
#[derive(Clone, Debug)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Value of the Content-Type header, if present
    pub content_type: Option<String>,
    /// Raw response body
    pub body: Bytes,
}

impl ApiResponse {
    /// Create a response from its parts
    pub fn new(status: u16, content_type: Option<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    /// Create a JSON response (used by test transports and fakes)
    pub fn json_value(status: u16, value: &serde_json::Value) -> Self {
        Self::new(
            status,
            Some("application/json".to_string()),
            value.to_string().into_bytes(),
        )
    }

    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Body as UTF-8 text (lossy)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Abstraction over sending one request, enabling testability.
///
/// Implementations return `Ok` for every response the server produced,
/// whatever its status; classifying non-2xx responses is up to the caller.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and read the whole response
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// Production [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_prefix: String,
}

impl HttpTransport {
    /// Build a transport from the API configuration
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Self::with_client(client, &config.base_url, &config.api_prefix)
    }

    /// Build a transport around an existing client
    pub fn with_client(client: reqwest::Client, base_url: &str, api_prefix: &str) -> Result<Self> {
        url::Url::parse(base_url)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix: api_prefix.trim_matches('/').to_string(),
        })
    }

    /// Absolute URL for an API path
    ///
    /// The path may or may not carry the API prefix already; it is added back
    /// exactly once.
    pub fn url_for(&self, path: &str) -> Result<url::Url> {
        let relative = normalize_path(path, &self.api_prefix);
        let full = if self.api_prefix.is_empty() {
            format!("{}/{}", self.base_url, relative)
        } else {
            format!("{}/{}/{}", self.base_url, self.api_prefix, relative)
        };
        Ok(url::Url::parse(&full)?)
    }

    /// The underlying HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(&request.path)?;

        let mut builder = self.client.request(request.method.into(), url.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(url = %url, error = %e, "request failed before a response arrived");
            Error::Network(e)
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        tracing::debug!(method = %request.method, url = %url, status, "response received");

        Ok(ApiResponse {
            status,
            content_type,
            body,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::with_client(reqwest::Client::new(), base, "/api").unwrap()
    }

    #[test]
    fn url_for_adds_api_prefix_once() {
        let t = transport("http://localhost:8000/");

        assert_eq!(
            t.url_for("courses/1").unwrap().as_str(),
            "http://localhost:8000/api/courses/1"
        );
        assert_eq!(
            t.url_for("/api/courses/1").unwrap().as_str(),
            "http://localhost:8000/api/courses/1"
        );
    }

    #[test]
    fn url_for_without_prefix() {
        let t = HttpTransport::with_client(reqwest::Client::new(), "http://h", "").unwrap();
        assert_eq!(t.url_for("/x/y").unwrap().as_str(), "http://h/x/y");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = HttpTransport::with_client(reqwest::Client::new(), "::nope::", "/api");
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn send_returns_non_success_responses_as_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/courses/9"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&server)
            .await;

        let t = transport(&server.uri());
        let response = t
            .send(&ApiRequest {
                method: HttpMethod::Get,
                path: "courses/9".to_string(),
                body: None,
            })
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert_eq!(response.text(), "missing");
    }

    #[tokio::test]
    async fn send_posts_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/quizzes/3/answer"))
            .and(body_json(serde_json::json!({ "answer": 2 })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "correct": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let t = transport(&server.uri());
        let response = t
            .send(&ApiRequest {
                method: HttpMethod::Post,
                path: "quizzes/3/answer".to_string(),
                body: Some(serde_json::json!({ "answer": 2 })),
            })
            .await
            .unwrap();

        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["correct"], true);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
    }
}
