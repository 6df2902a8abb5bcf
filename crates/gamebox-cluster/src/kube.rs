//! Kubernetes REST gateway.
//!
//! Speaks plain HTTP/1 to an API server endpoint such as `kubectl proxy` or
//! an in-cluster sidecar that terminates TLS. One connection per call; the
//! whole exchange is bounded by the configured timeout.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, StatusCode, Uri, header};
use http_body_util::{BodyExt, Full};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ClusterError, ClusterResult};
use crate::gateway::ClusterGateway;
use crate::objects::{ClusterObject, ObjectKind};

const USER_AGENT: &str = "gamebox/0.1";

/// Cluster gateway backed by the Kubernetes API.
#[derive(Debug, Clone)]
pub struct KubeGateway {
    /// `host:port` to connect to.
    authority: String,
    /// Path prefix of the API server (usually empty).
    base_path: String,
    token: Option<String>,
    timeout: Duration,
}

impl KubeGateway {
    /// Build a gateway for an `http://host[:port][/prefix]` API url.
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> ClusterResult<Self> {
        let uri = api_url
            .parse::<Uri>()
            .map_err(|e| ClusterError::InvalidUrl(format!("{api_url}: {e}")))?;
        if uri.scheme_str() != Some("http") {
            return Err(ClusterError::InvalidUrl(format!(
                "{api_url}: only http:// endpoints are supported"
            )));
        }
        let host = uri
            .host()
            .ok_or_else(|| ClusterError::InvalidUrl(format!("{api_url}: missing host")))?;
        let port = uri.port_u16().unwrap_or(80);

        Ok(Self {
            authority: format!("{host}:{port}"),
            base_path: uri.path().trim_end_matches('/').to_string(),
            token,
            timeout,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> ClusterResult<(StatusCode, Bytes)> {
        let uri = format!("{}{path}", self.base_path);
        tokio::time::timeout(self.timeout, self.exchange(method, &uri, body))
            .await
            .map_err(|_| ClusterError::Timeout(self.timeout))?
    }

    async fn exchange(
        &self,
        method: Method,
        uri: &str,
        body: Option<Vec<u8>>,
    ) -> ClusterResult<(StatusCode, Bytes)> {
        let stream = tokio::net::TcpStream::connect(&self.authority)
            .await
            .map_err(|e| ClusterError::Connect(format!("{}: {e}", self.authority)))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ClusterError::Connect(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "api connection closed with error");
            }
        });

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(header::HOST, &self.authority)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/json");
        if let Some(token) = &self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(body))),
            None => builder.body(Full::new(Bytes::new())),
        }
        .map_err(|e| ClusterError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ClusterError::Request(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ClusterError::Request(e.to_string()))?
            .to_bytes();

        debug!(%method, %uri, %status, "api call finished");
        Ok((status, body))
    }
}

/// Pull the `message` out of a Kubernetes `Status` body, or fall back to
/// the start of the raw body.
fn status_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).chars().take(200).collect())
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn create(&self, object: &ClusterObject) -> ClusterResult<()> {
        let kind = object.kind();
        let manifest = serde_json::to_vec(&object.to_manifest())
            .map_err(|e| ClusterError::Serialize(e.to_string()))?;
        let path = kind.collection_path(object.namespace());

        let (status, body) = self.send(Method::POST, &path, Some(manifest)).await?;
        if status.is_success() {
            info!(%kind, namespace = object.namespace(), name = object.name(), "object created");
            return Ok(());
        }
        if status == StatusCode::CONFLICT {
            return Err(ClusterError::AlreadyExists {
                kind,
                namespace: object.namespace().to_string(),
                name: object.name().to_string(),
            });
        }
        Err(ClusterError::Status {
            status: status.as_u16(),
            message: status_message(&body),
        })
    }

    async fn delete(&self, kind: ObjectKind, namespace: &str, name: &str) -> ClusterResult<()> {
        let path = kind.object_path(namespace, name);
        let (status, body) = self.send(Method::DELETE, &path, None).await?;
        if status.is_success() || status == StatusCode::NOT_FOUND {
            info!(%kind, %namespace, %name, gone = status == StatusCode::NOT_FOUND, "object deleted");
            return Ok(());
        }
        Err(ClusterError::Status {
            status: status.as_u16(),
            message: status_message(&body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::State;
    use axum::http::HeaderMap;

    use crate::objects::{ServiceSpec, WorkloadSpec, owner_labels};

    #[derive(Default)]
    struct FakeApi {
        objects: HashSet<String>,
        auth: Vec<Option<String>>,
    }

    type Shared = Arc<Mutex<FakeApi>>;

    /// Minimal API server: stores object paths, rejects services.
    async fn fake_api(
        State(state): State<Shared>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> (StatusCode, String) {
        let mut api = state.lock().unwrap();
        api.auth.push(
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        );
        let path = uri.path().to_string();

        if path.contains("/services") {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"kind":"Status","message":"etcd unavailable"}"#.to_string(),
            );
        }

        if method == Method::POST {
            let manifest: Value = serde_json::from_slice(&body).unwrap();
            let name = manifest["metadata"]["name"].as_str().unwrap();
            let key = format!("{path}/{name}");
            if api.objects.insert(key) {
                (StatusCode::CREATED, manifest.to_string())
            } else {
                (StatusCode::CONFLICT, r#"{"message":"exists"}"#.to_string())
            }
        } else if method == Method::DELETE {
            if api.objects.remove(&path) {
                (StatusCode::OK, "{}".to_string())
            } else {
                (StatusCode::NOT_FOUND, r#"{"message":"not found"}"#.to_string())
            }
        } else {
            (StatusCode::METHOD_NOT_ALLOWED, String::new())
        }
    }

    async fn spawn_fake_api() -> (String, Shared) {
        let state: Shared = Arc::default();
        let router = Router::new().fallback(fake_api).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}"), state)
    }

    fn workload() -> ClusterObject {
        ClusterObject::Workload(WorkloadSpec {
            name: "gamebox-ns1-abcd1234".to_string(),
            namespace: "ns1".to_string(),
            image: "nginx".to_string(),
            port: 8080,
            labels: owner_labels("abcd1234", "img-1"),
            resources: None,
        })
    }

    #[test]
    fn parses_api_url() {
        let gw = KubeGateway::new("http://10.0.0.1:8001/", None, Duration::from_secs(1)).unwrap();
        assert_eq!(gw.authority(), "10.0.0.1:8001");
        assert_eq!(gw.base_path, "");

        let gw = KubeGateway::new("http://proxy/k8s", None, Duration::from_secs(1)).unwrap();
        assert_eq!(gw.authority(), "proxy:80");
        assert_eq!(gw.base_path, "/k8s");

        assert!(matches!(
            KubeGateway::new("https://10.0.0.1", None, Duration::from_secs(1)),
            Err(ClusterError::InvalidUrl(_))
        ));
    }

    #[test]
    fn status_message_extraction() {
        assert_eq!(status_message(br#"{"message":"quota exceeded"}"#), "quota exceeded");
        assert_eq!(status_message(b"plain failure"), "plain failure");
    }

    #[tokio::test]
    async fn create_and_delete_workload() {
        let (url, state) = spawn_fake_api().await;
        let gw = KubeGateway::new(&url, Some("t0ken".to_string()), Duration::from_secs(5)).unwrap();

        gw.create(&workload()).await.unwrap();
        assert!(
            state
                .lock()
                .unwrap()
                .objects
                .contains("/api/v1/namespaces/ns1/pods/gamebox-ns1-abcd1234")
        );

        let err = gw.create(&workload()).await.unwrap_err();
        assert!(matches!(err, ClusterError::AlreadyExists { kind: ObjectKind::Workload, .. }));

        gw.delete(ObjectKind::Workload, "ns1", "gamebox-ns1-abcd1234")
            .await
            .unwrap();
        assert!(state.lock().unwrap().objects.is_empty());

        // Already gone is still a successful delete.
        gw.delete(ObjectKind::Workload, "ns1", "gamebox-ns1-abcd1234")
            .await
            .unwrap();

        let auth = state.lock().unwrap().auth.clone();
        assert!(auth.iter().all(|a| a.as_deref() == Some("Bearer t0ken")));
    }

    #[tokio::test]
    async fn server_error_surfaces_status_message() {
        let (url, _state) = spawn_fake_api().await;
        let gw = KubeGateway::new(&url, None, Duration::from_secs(5)).unwrap();

        let service = ClusterObject::Service(ServiceSpec {
            name: "svc".to_string(),
            namespace: "ns1".to_string(),
            port: 8080,
            target_port: 8080,
            selector: BTreeMap::new(),
            labels: BTreeMap::new(),
        });
        match gw.create(&service).await {
            Err(ClusterError::Status { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "etcd unavailable");
            }
            other => panic!("expected status error, got {other:?}"),
        }
        assert!(matches!(
            gw.delete(ObjectKind::Service, "ns1", "svc").await,
            Err(ClusterError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let gw = KubeGateway::new(&format!("http://{addr}"), None, Duration::from_secs(2)).unwrap();
        assert!(matches!(
            gw.create(&workload()).await,
            Err(ClusterError::Connect(_))
        ));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold connections without ever answering.
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let gw = KubeGateway::new(&format!("http://{addr}"), None, Duration::from_millis(200))
            .unwrap();
        assert!(matches!(
            gw.delete(ObjectKind::Ingress, "ns1", "x").await,
            Err(ClusterError::Timeout(_))
        ));
    }
}
