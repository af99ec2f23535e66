//! Background runner port: performs one HTTP attempt.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use super::request::{Body, HttpRequest, HttpStatus, Method};

/// Performs a single attempt of a request.
///
/// Returns the status line of any HTTP response, or a description of the
/// network failure. Timeouts and retries are handled by the caller.
#[async_trait]
pub trait RequestRunner: Send + Sync + 'static {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpStatus, String>;
}

/// [`RequestRunner`] backed by reqwest.
#[derive(Debug, Clone, Default)]
pub struct HttpRunner {
    client: reqwest::Client,
}

impl HttpRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestRunner for HttpRunner {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpStatus, String> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };
        let builder = self.client.request(method, &request.url);
        let builder = match &request.body {
            Body::Empty => builder,
            Body::Text(text) => builder
                .header(CONTENT_TYPE, "text/plain; charset=UTF-8")
                .body(text.clone()),
            Body::Bytes { data, content_type } => builder
                .header(CONTENT_TYPE, content_type.as_str())
                .body(data.clone()),
        };

        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        Ok(HttpStatus {
            code: status.as_u16(),
            text: status.canonical_reason().unwrap_or_default().to_string(),
        })
    }
}
