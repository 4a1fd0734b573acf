//! Prometheus HTTP API client.
//!
//! Issues instant queries against `/api/v1/query` and decodes the first
//! series' value. Responses are decoded through an explicit schema; any
//! shape mismatch is reported as `MetricError::Malformed`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Uri;
use http_body_util::{BodyExt, Empty, Limited};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use tracing::debug;

use swarmscale_core::MetricError;

use crate::client::MetricSource;

/// Largest response body accepted from the backend.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Default bound on a single query, including reading the body.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

// ── Response schema ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<Series>,
}

#[derive(Debug, Deserialize)]
struct Series {
    /// `[<unix timestamp>, "<value>"]`
    value: (f64, String),
}

/// Decode a `/api/v1/query` body into the first series' value.
pub fn parse_query_response(body: &[u8]) -> Result<f64, MetricError> {
    let response: QueryResponse =
        serde_json::from_slice(body).map_err(|e| MetricError::Malformed(e.to_string()))?;

    if response.status != "success" {
        return Err(MetricError::QueryFailed(
            response
                .error
                .unwrap_or_else(|| format!("status `{}`", response.status)),
        ));
    }

    let data = response
        .data
        .ok_or_else(|| MetricError::Malformed("missing `data`".to_string()))?;
    let first = data.result.into_iter().next().ok_or(MetricError::EmptyResult)?;

    let raw = first.value.1;
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| MetricError::InvalidValue(raw.clone()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(MetricError::InvalidValue(raw));
    }
    Ok(value)
}

// ── Client ─────────────────────────────────────────────────────────

/// Prometheus-compatible query client.
///
/// Only plain `http://` backends are supported.
pub struct PrometheusClient {
    base_url: String,
    client: Client<HttpConnector, Empty<Bytes>>,
    timeout: Duration,
}

impl PrometheusClient {
    /// Create a client for `backend_url` (e.g. `http://localhost:9090`).
    pub fn new(backend_url: &str, timeout: Duration) -> Result<Self, MetricError> {
        let base_url = backend_url.trim().trim_end_matches('/').to_string();
        let uri: Uri = base_url
            .parse()
            .map_err(|e| MetricError::InvalidUrl(format!("{backend_url}: {e}")))?;
        if uri.scheme_str() != Some("http") || uri.authority().is_none() {
            return Err(MetricError::InvalidUrl(format!(
                "{backend_url}: expected http://host[:port]"
            )));
        }

        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn query_uri(&self, expression: &str) -> Result<Uri, MetricError> {
        let params = serde_urlencoded::to_string([("query", expression)])
            .map_err(|e| MetricError::InvalidUrl(e.to_string()))?;
        format!("{}/api/v1/query?{params}", self.base_url)
            .parse()
            .map_err(|e: http::uri::InvalidUri| MetricError::InvalidUrl(e.to_string()))
    }

    async fn fetch(&self, uri: Uri) -> Result<f64, MetricError> {
        let req = http::Request::builder()
            .method("GET")
            .uri(uri)
            .header("accept", "application/json")
            .header("user-agent", "swarmscale/0.1")
            .body(Empty::<Bytes>::new())
            .map_err(|e| MetricError::Transport(e.to_string()))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| MetricError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(MetricError::HttpStatus(status.as_u16()));
        }

        let body = Limited::new(resp.into_body(), MAX_BODY_BYTES)
            .collect()
            .await
            .map_err(|e| MetricError::Transport(e.to_string()))?
            .to_bytes();

        parse_query_response(&body)
    }
}

#[async_trait]
impl MetricSource for PrometheusClient {
    async fn try_query(&self, expression: &str) -> Result<f64, MetricError> {
        let uri = self.query_uri(expression)?;
        debug!(%uri, "querying metrics backend");

        match tokio::time::timeout(self.timeout, self.fetch(uri)).await {
            Ok(result) => result,
            Err(_) => Err(MetricError::Timeout(self.timeout)),
        }
    }
}
