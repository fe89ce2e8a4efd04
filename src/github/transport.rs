//! GraphQL transport
//!
//! A [`Transport`] performs exactly one HTTP round trip and reports what came back,
//! without interpreting errors. Throttling and retries live in the executor.

use super::rate_limit::{self, RateLimit};
use crate::Result;
use core::time::Duration;
use ohno::{IntoAppError, app_err};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of body bytes echoed into an error message.
const MAX_ERROR_BODY: usize = 512;

/// A GraphQL request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Request {
    pub query: String,
    pub variables: Value,
}

/// One entry of a GraphQL `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GraphQlError {
    pub message: String,

    /// GitHub's error classification, e.g. `NOT_FOUND` or `RATE_LIMITED`
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl GraphQlError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }
}

/// What a single round trip produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// HTTP status code
    pub status: u16,

    /// The `data` member, absent on HTTP-level failures
    pub data: Option<Value>,

    /// GraphQL errors, or a synthesized entry describing an HTTP-level failure
    pub errors: Vec<GraphQlError>,

    /// Rate limit reported through response headers
    pub header_rate_limit: Option<RateLimit>,
}

impl Reply {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Sends one GraphQL request.
pub trait Transport: Send + Sync {
    fn send(&self, request: &Request) -> impl Future<Output = Result<Reply>> + Send;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,

    /// REST-style error message used for HTTP-level rejections
    message: Option<String>,
}

/// Transport that talks to a GraphQL endpoint over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Create a transport that authenticates every request with `token`.
    pub fn new(token: &str, endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut auth_val = HeaderValue::from_str(&format!("bearer {token}")).into_app_err("building authorization header")?;
        auth_val.set_sensitive(true);

        let mut headers = HeaderMap::new();
        let _ = headers.insert(AUTHORIZATION, auth_val);

        let client = reqwest::Client::builder()
            .user_agent("cve-finder")
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Reply> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .into_app_err_with(|| format!("sending GraphQL request to {}", self.endpoint))?;

        let status = resp.status();
        let header_rate_limit = rate_limit::from_headers(resp.headers());
        let body = resp.text().await.into_app_err("reading GraphQL response body")?;

        let envelope = serde_json::from_str::<Envelope>(&body);

        if status.is_success() {
            let envelope = envelope.into_app_err("decoding GraphQL response")?;
            return Ok(Reply {
                status: status.as_u16(),
                data: envelope.data,
                errors: envelope.errors.unwrap_or_default(),
                header_rate_limit,
            });
        }

        let errors = match envelope {
            Ok(Envelope { errors: Some(errors), .. }) if !errors.is_empty() => errors,
            Ok(Envelope { message: Some(message), .. }) => vec![GraphQlError::new(message)],
            _ => vec![GraphQlError::new(format!("HTTP {status}: {}", truncate(&body)))],
        };

        Ok(Reply {
            status: status.as_u16(),
            data: None,
            errors,
            header_rate_limit,
        })
    }
}

fn truncate(body: &str) -> &str {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }

    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body.get(..end).unwrap_or_default()
}

/// Fail with a descriptive error when a reply carries nothing usable.
pub fn describe_errors(errors: &[GraphQlError]) -> ohno::AppError {
    if errors.is_empty() {
        return app_err!("GraphQL response contained neither data nor errors");
    }

    let messages: Vec<_> = errors.iter().map(|e| e.message.as_str()).collect();
    app_err!("GraphQL request failed: {}", messages.join("; "))
}
