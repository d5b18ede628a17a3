//! JSON transport to hosted HTTP services (Neynar, the curation service).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as HttpClient, Method};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::Secret;
use crate::error::AppError;
use crate::metrics;

pub type Query<'a> = [(&'a str, String)];

/// A JSON request/response API. Trait object seam so tests can substitute
/// an in-memory fake for the hosted service.
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &Query<'_>,
        body: Option<&Value>,
    ) -> Result<Value, AppError>;

    async fn get(&self, path: &str, query: &Query<'_>) -> Result<Value, AppError> {
        self.request(Method::GET, path, query, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, AppError> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    async fn delete(&self, path: &str, body: &Value) -> Result<Value, AppError> {
        self.request(Method::DELETE, path, &[], Some(body)).await
    }
}

pub fn http_client(timeout: Duration) -> Result<HttpClient, AppError> {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Maps a transport failure to an upstream error. Timeouts become 504.
///
/// Request URLs can carry API keys and signer UUIDs in the query string, so
/// the URL is stripped before the error is logged and the client only sees
/// a fixed description.
pub(crate) fn transport_error(service: &'static str, err: reqwest::Error) -> AppError {
    metrics::UPSTREAM_FAILURES.with_label_values(&[service]).inc();
    let err = err.without_url();
    let (status, details) = if err.is_timeout() {
        (504, "timeout")
    } else if err.is_connect() {
        (502, "connection failed")
    } else if err.is_decode() || err.is_body() {
        (502, "invalid response body")
    } else {
        (502, "request failed")
    };
    warn!(service, error = %err, "upstream transport failure");
    AppError::upstream(service, status, Value::String(details.to_string()))
}

/// Reads a response body, relaying non-success statuses with the raw body.
pub(crate) async fn read_json(
    service: &'static str,
    response: reqwest::Response,
) -> Result<Value, AppError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| transport_error(service, e))?;
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };

    if status.is_success() {
        Ok(body)
    } else {
        metrics::UPSTREAM_FAILURES.with_label_values(&[service]).inc();
        Err(AppError::upstream(service, status.as_u16(), body))
    }
}

#[derive(Clone)]
pub struct HttpUpstream {
    service: &'static str,
    http_client: HttpClient,
    base_url: String,
    headers: HeaderMap,
}

impl HttpUpstream {
    pub fn new(service: &'static str, base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        Ok(Self {
            service,
            http_client: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: HeaderMap::new(),
        })
    }

    pub fn neynar(base_url: &str, api_key: &Secret, timeout: Duration) -> Result<Self, AppError> {
        Self::new("neynar", base_url, timeout)?.with_header("x-api-key", api_key.expose())
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Result<Self, AppError> {
        let value = HeaderValue::from_str(value)
            .map_err(|_| AppError::Config(format!("invalid value for header {}", name)))?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }
}

#[async_trait]
impl UpstreamApi for HttpUpstream {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &Query<'_>,
        body: Option<&Value>,
    ) -> Result<Value, AppError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(service = self.service, %method, path, "upstream request");

        let mut request = self
            .http_client
            .request(method, &url)
            .headers(self.headers.clone())
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let timer = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(self.service, e))?;
        metrics::UPSTREAM_LATENCY
            .with_label_values(&[self.service])
            .observe(timer.elapsed().as_secs_f64());

        read_json(self.service, response).await
    }
}
