use std::fmt;
use std::time::Duration;

use crate::config::HttpPolicy;

/// HTTP method of a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    /// Sent as `text/plain; charset=UTF-8`
    Text(String),
    Bytes { data: Vec<u8>, content_type: String },
}

/// One HTTP request against the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Body,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: Body::Empty,
        }
    }

    /// POST without a body.
    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Body::Empty,
        }
    }

    pub fn post_text(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Body::Text(text.into()),
        }
    }

    pub fn put_text(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            body: Body::Text(text.into()),
        }
    }

    pub fn post_bytes(
        url: impl Into<String>,
        data: Vec<u8>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Body::Bytes {
                data,
                content_type: content_type.into(),
            },
        }
    }
}

/// A request handed to the dispatcher, with its retry budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub id: u64,
    pub request: HttpRequest,
    /// Timeout of a single attempt
    pub timeout: Duration,
    /// Retries after the first attempt
    pub retries: u32,
    pub retry_wait: Duration,
}

impl PendingRequest {
    pub fn new(id: u64, request: HttpRequest, policy: &HttpPolicy) -> Self {
        Self {
            id,
            request,
            timeout: policy.timeout(),
            retries: policy.retries,
            retry_wait: policy.retry_wait(),
        }
    }
}

/// Status line returned by one successful round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpStatus {
    pub code: u16,
    pub text: String,
}

/// Terminal outcome of a request, reported by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResponse {
    pub request_id: u64,
    /// `None` when no response was received at all
    pub status: Option<u16>,
    pub status_text: String,
    pub error: Option<String>,
}

impl DispatchResponse {
    pub(crate) fn from_status(request_id: u64, status: HttpStatus) -> Self {
        Self {
            request_id,
            status: Some(status.code),
            status_text: status.text,
            error: None,
        }
    }

    pub(crate) fn from_error(request_id: u64, error: impl Into<String>) -> Self {
        Self {
            request_id,
            status: None,
            status_text: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_some_and(|code| (200..300).contains(&code))
    }

    /// Network errors, timeouts and server errors are worth another try;
    /// client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => true,
            Some(code) => code >= 500 || code == 408 || code == 429,
        }
    }

    /// `"{METHOD} to {url} failed: {status}, {statusText}, {error}"`, empty
    /// parts left out.
    pub fn failure_message(&self, request: &HttpRequest) -> String {
        let parts: Vec<String> = [
            self.status.map(|code| code.to_string()),
            Some(self.status_text.clone()),
            self.error.clone(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();
        format!(
            "{} to {} failed: {}",
            request.method,
            request.url,
            parts.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_skips_empty_parts() {
        let request = HttpRequest::post_text("http://host/log", "hi");
        let response = DispatchResponse {
            request_id: 1,
            status: Some(503),
            status_text: "Service Unavailable".to_string(),
            error: None,
        };
        assert_eq!(
            response.failure_message(&request),
            "POST to http://host/log failed: 503, Service Unavailable"
        );

        let response = DispatchResponse::from_error(2, "timeout");
        assert_eq!(
            response.failure_message(&HttpRequest::get("http://host/end")),
            "GET to http://host/end failed: timeout"
        );
    }

    #[test]
    fn test_outcome_classification() {
        let status = |code| {
            DispatchResponse::from_status(
                1,
                HttpStatus {
                    code,
                    text: String::new(),
                },
            )
        };
        assert!(status(204).is_success());
        assert!(!status(404).is_success());
        assert!(!status(404).is_retryable());
        assert!(status(502).is_retryable());
        assert!(DispatchResponse::from_error(1, "refused").is_retryable());
    }

    #[test]
    fn test_pending_request_takes_policy() {
        let policy = HttpPolicy::default();
        let pending = PendingRequest::new(7, HttpRequest::get("http://x"), &policy);
        assert_eq!(pending.retries, 5);
        assert_eq!(pending.timeout, Duration::from_secs(15));
        assert_eq!(pending.retry_wait, Duration::from_secs(1));
    }
}
