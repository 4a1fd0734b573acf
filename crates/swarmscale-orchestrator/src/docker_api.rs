//! Docker Swarm via the Docker Engine HTTP API.
//!
//! Listing uses `GET /services?status=true`, which reports running and
//! desired task counts per service. Scaling is a read-modify-write of the
//! service spec: inspect for the current version index and spec, set
//! `Mode.Replicated.Replicas`, and post it back to
//! `/services/{name}/update?version=<index>`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Uri};
use http_body_util::{BodyExt, Full, Limited};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use swarmscale_core::{OrchestratorError, ReplicaCount, ServiceEntry};

use crate::client::Orchestrator;

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Escaped in a path segment: everything outside the RFC 3986 unreserved set.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

// ── Response schema ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceSummary {
    spec: SummarySpec,
    service_status: ServiceStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SummarySpec {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceStatus {
    running_tasks: u32,
    desired_tasks: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceInspect {
    version: ObjectVersion,
    /// Forwarded verbatim on update, so kept untyped.
    spec: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectVersion {
    index: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Set `Mode.Replicated.Replicas` in a service spec.
fn set_replicas(spec: &mut Value, replicas: u32) -> Result<(), OrchestratorError> {
    let replicated = spec
        .get_mut("Mode")
        .and_then(|mode| mode.get_mut("Replicated"))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| {
            OrchestratorError::Malformed("service is not in replicated mode".to_string())
        })?;
    replicated.insert("Replicas".to_string(), Value::from(replicas));
    Ok(())
}

/// `/services/{name}` with the name escaped as a single segment.
fn service_path(service: &str) -> String {
    format!("/services/{}", utf8_percent_encode(service, PATH_SEGMENT))
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, OrchestratorError> {
    serde_json::from_slice(body).map_err(|e| OrchestratorError::Malformed(e.to_string()))
}

// ── Client ─────────────────────────────────────────────────────────

/// `Orchestrator` backed by the Docker Engine API over plain HTTP
/// (e.g. `http://localhost:2375`).
pub struct DockerApi {
    base_url: String,
    client: Client<HttpConnector, Full<Bytes>>,
    timeout: Duration,
}

impl DockerApi {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, OrchestratorError> {
        let base_url = api_url.trim().trim_end_matches('/').to_string();
        let uri: Uri = base_url
            .parse()
            .map_err(|e| OrchestratorError::InvalidUrl(format!("{api_url}: {e}")))?;
        if uri.scheme_str() != Some("http") || uri.authority().is_none() {
            return Err(OrchestratorError::InvalidUrl(format!(
                "{api_url}: expected http://host[:port]"
            )));
        }

        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(Self {
            base_url,
            client,
            timeout,
        })
    }

    /// Issue one request, bounded by the configured timeout, and return
    /// the body of a 2xx response.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, OrchestratorError> {
        match tokio::time::timeout(self.timeout, self.send(method, path, body)).await {
            Ok(result) => result,
            Err(_) => Err(OrchestratorError::Timeout(self.timeout)),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, OrchestratorError> {
        let uri: Uri = format!("{}{path}", self.base_url)
            .parse()
            .map_err(|e: http::uri::InvalidUri| OrchestratorError::InvalidUrl(e.to_string()))?;

        debug!(%method, %uri, "docker engine request");

        let mut builder = http::Request::builder()
            .method(method)
            .uri(uri)
            .header("user-agent", "swarmscale/0.1");
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let req = builder
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?;

        let status = resp.status();
        let bytes = Limited::new(resp.into_body(), MAX_BODY_BYTES)
            .collect()
            .await
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            let message = serde_json::from_slice::<ApiErrorBody>(&bytes)
                .map(|b| b.message)
                .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());
            return Err(OrchestratorError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        Ok(bytes)
    }
}

#[async_trait]
impl Orchestrator for DockerApi {
    async fn list_services(&self) -> Result<Vec<ServiceEntry>, OrchestratorError> {
        let body = self
            .request(Method::GET, "/services?status=true", None)
            .await?;
        let services: Vec<ServiceSummary> = decode(&body)?;

        Ok(services
            .into_iter()
            .map(|s| ServiceEntry {
                name: s.spec.name,
                replicas: ReplicaCount {
                    running: s.service_status.running_tasks,
                    desired: s.service_status.desired_tasks,
                },
            })
            .collect())
    }

    async fn scale(&self, service: &str, replicas: u32) -> Result<(), OrchestratorError> {
        let path = service_path(service);
        let body = self.request(Method::GET, &path, None).await?;
        let inspect: ServiceInspect = decode(&body)?;
        let mut spec = inspect.spec;

        set_replicas(&mut spec, replicas)?;
        let payload =
            serde_json::to_vec(&spec).map_err(|e| OrchestratorError::Malformed(e.to_string()))?;

        self.request(
            Method::POST,
            &format!("{path}/update?version={}", inspect.version.index),
            Some(payload),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};

    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;

    const SERVICES: &str = r#"[
  {"ID":"q8v","Version":{"Index":41},"Spec":{"Name":"docker_service-a","Mode":{"Replicated":{"Replicas":3}}},"ServiceStatus":{"RunningTasks":2,"DesiredTasks":3,"CompletedTasks":0}},
  {"ID":"z1c","Version":{"Index":7},"Spec":{"Name":"docker_agent","Mode":{"Global":{}}},"ServiceStatus":{"RunningTasks":4,"DesiredTasks":4,"CompletedTasks":0}}
]"#;

    const INSPECT_REPLICATED: &str = r#"{"ID":"q8v","Version":{"Index":41},"Spec":{"Name":"docker_service-a","Labels":{"com.docker.stack.namespace":"docker"},"TaskTemplate":{"ContainerSpec":{"Image":"service-a:latest"}},"Mode":{"Replicated":{"Replicas":3}}}}"#;

    const INSPECT_GLOBAL: &str =
        r#"{"ID":"z1c","Version":{"Index":7},"Spec":{"Name":"docker_agent","Mode":{"Global":{}}}}"#;

    /// Recorded `POST .../update` calls: (path and query, body).
    type Updates = Arc<Mutex<Vec<(String, Value)>>>;

    fn respond(status: u16, body: String) -> Response<Full<Bytes>> {
        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }

    async fn handle(req: Request<Incoming>, updates: Updates) -> Response<Full<Bytes>> {
        let path = req.uri().path().to_string();
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default();

        match (req.method().clone(), path.as_str()) {
            (Method::GET, "/services") => respond(200, SERVICES.to_string()),
            (Method::GET, "/services/docker_service-a") => {
                respond(200, INSPECT_REPLICATED.to_string())
            }
            (Method::GET, "/services/docker_agent") => respond(200, INSPECT_GLOBAL.to_string()),
            (Method::POST, "/services/docker_service-a/update") => {
                let body = req.into_body().collect().await.unwrap().to_bytes();
                let spec: Value = serde_json::from_slice(&body).unwrap();
                updates.lock().unwrap().push((path_and_query, spec));
                respond(200, r#"{"Warnings":[]}"#.to_string())
            }
            (_, other) => respond(
                404,
                format!(r#"{{"message":"service {} not found"}}"#, other.trim_start_matches("/services/")),
            ),
        }
    }

    async fn start_engine() -> (String, Updates) {
        let updates: Updates = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let recorded = updates.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let updates = recorded.clone();
                tokio::spawn(async move {
                    let svc = service_fn(move |req| {
                        let updates = updates.clone();
                        async move { Ok::<_, Infallible>(handle(req, updates).await) }
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await;
                });
            }
        });

        (format!("http://{addr}"), updates)
    }

    #[test]
    fn set_replicas_rewrites_replicated_mode() {
        let mut spec: Value = serde_json::from_str(
            r#"{"Name":"x","Mode":{"Replicated":{"Replicas":1}},"Labels":{"a":"b"}}"#,
        )
        .unwrap();
        set_replicas(&mut spec, 4).unwrap();
        assert_eq!(spec["Mode"]["Replicated"]["Replicas"], 4);
        assert_eq!(spec["Labels"]["a"], "b");
    }

    #[test]
    fn set_replicas_rejects_global_mode() {
        let mut spec: Value = serde_json::from_str(r#"{"Mode":{"Global":{}}}"#).unwrap();
        assert!(matches!(
            set_replicas(&mut spec, 2),
            Err(OrchestratorError::Malformed(_))
        ));
    }

    #[test]
    fn service_path_escapes_reserved_characters() {
        assert_eq!(service_path("docker_service-a"), "/services/docker_service-a");
        assert_eq!(service_path("my app/v2?x"), "/services/my%20app%2Fv2%3Fx");
    }

    #[test]
    fn new_rejects_unsupported_urls() {
        assert!(DockerApi::new("unix:///var/run/docker.sock", Duration::from_secs(1)).is_err());
        assert!(DockerApi::new("http://localhost:2375/", Duration::from_secs(1)).is_ok());
    }

    #[tokio::test]
    async fn list_services_reads_task_counts() {
        let (url, _) = start_engine().await;
        let api = DockerApi::new(&url, Duration::from_secs(2)).unwrap();

        let services = api.list_services().await.unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].name, "docker_service-a");
        assert_eq!(services[0].replicas, ReplicaCount { running: 2, desired: 3 });
    }

    #[tokio::test]
    async fn scale_posts_updated_spec_with_version() {
        let (url, updates) = start_engine().await;
        let api = DockerApi::new(&url, Duration::from_secs(2)).unwrap();

        api.scale("docker_service-a", 5).await.unwrap();

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        let (path, spec) = &updates[0];
        assert_eq!(path, "/services/docker_service-a/update?version=41");
        assert_eq!(spec["Mode"]["Replicated"]["Replicas"], 5);
        // Untouched fields survive the round-trip.
        assert_eq!(spec["TaskTemplate"]["ContainerSpec"]["Image"], "service-a:latest");
    }

    #[tokio::test]
    async fn scale_global_service_fails_without_update() {
        let (url, updates) = start_engine().await;
        let api = DockerApi::new(&url, Duration::from_secs(2)).unwrap();

        assert!(api.scale("docker_agent", 2).await.is_err());
        assert!(updates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn scale_unknown_service_reports_api_message() {
        let (url, _) = start_engine().await;
        let api = DockerApi::new(&url, Duration::from_secs(2)).unwrap();

        let err = api.scale("docker_missing", 2).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::HttpStatus { status: 404, ref message } if message.contains("docker_missing")
        ));
    }

    #[tokio::test]
    async fn scale_escapes_service_name_in_path() {
        let (url, updates) = start_engine().await;
        let api = DockerApi::new(&url, Duration::from_secs(2)).unwrap();

        // Reaches the engine as one segment instead of failing to build a URI.
        let err = api.scale("docker_my app/v2", 2).await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::HttpStatus { status: 404, ref message } if message.contains("docker_my%20app%2Fv2")
        ));
        assert!(updates.lock().unwrap().is_empty());
    }
}
