use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::Value;
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use crate::config::DockerConfig;
use crate::dto::service::SwarmService;

use super::{Orchestrator, OrchestratorError, VersionedSpec};

/// Body of `GET /services/{id}`, the spec stays untyped.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectResponse {
    version: InspectVersion,
    spec: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectVersion {
    index: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpdateResponse {
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Point the spec at a new image and bump `ForceUpdate` so every task gets replaced.
pub fn apply_image_update(spec: &mut Value, image: &str) -> Result<(), OrchestratorError> {
    let task_template = spec.get_mut("TaskTemplate")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| OrchestratorError::MalformedSpec("missing TaskTemplate".to_string()))?;

    let force_update = task_template.get("ForceUpdate")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    task_template.insert("ForceUpdate".to_string(), Value::from(force_update + 1));

    let container_spec = task_template.get_mut("ContainerSpec")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| OrchestratorError::MalformedSpec("missing TaskTemplate.ContainerSpec".to_string()))?;
    container_spec.insert("Image".to_string(), Value::from(image));

    Ok(())
}

/// Client for the swarm endpoints of the Docker engine API, over its unix socket.
///
/// Each request opens a fresh connection to the socket, the client itself is cheap to share.
pub struct SwarmClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl SwarmClient {
    pub fn new(config: &DockerConfig) -> Self {
        Self {
            socket_path: PathBuf::from(&config.socket_path),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    async fn request(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<(StatusCode, Bytes), OrchestratorError> {
        tokio::time::timeout(self.timeout, self.send(method, path, body))
            .await
            .map_err(|_| OrchestratorError::Timeout(self.timeout))?
    }

    async fn send(&self, method: Method, path: &str, body: Option<Vec<u8>>) -> Result<(StatusCode, Bytes), OrchestratorError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Docker socket connection closed with error: {}", e);
            }
        });

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(header::HOST, "docker")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?;

        let response = sender.send_request(request)
            .await
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response.into_body()
            .collect()
            .await
            .map_err(|e| OrchestratorError::Transport(e.to_string()))?
            .to_bytes();

        Ok((status, body))
    }

    /// Turn an unsuccessful response into an error.
    fn api_error(id: Option<&str>, status: StatusCode, body: &[u8]) -> OrchestratorError {
        let message = serde_json::from_slice::<ErrorResponse>(body)
            .map(|e| e.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());

        // Swarm reports a stale version as "update out of sequence".
        match id {
            Some(id) if status == StatusCode::CONFLICT || message.contains("out of sequence") => OrchestratorError::Conflict {
                id: id.to_string(),
                message,
            },
            _ => OrchestratorError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

#[async_trait]
impl Orchestrator for SwarmClient {
    async fn list_services(&self) -> Result<Vec<SwarmService>, OrchestratorError> {
        let (status, body) = self.request(Method::GET, "/services", None).await?;
        if !status.is_success() {
            return Err(Self::api_error(None, status, &body));
        }

        serde_json::from_slice(&body)
            .map_err(|e| OrchestratorError::InvalidResponse(e.to_string()))
    }

    async fn inspect_service(&self, id: &str) -> Result<VersionedSpec, OrchestratorError> {
        let (status, body) = self.request(Method::GET, &format!("/services/{}", id), None).await?;
        if !status.is_success() {
            return Err(Self::api_error(None, status, &body));
        }

        let inspect: InspectResponse = serde_json::from_slice(&body)
            .map_err(|e| OrchestratorError::InvalidResponse(e.to_string()))?;

        Ok(VersionedSpec {
            version: inspect.version.index,
            spec: inspect.spec,
        })
    }

    async fn update_service_image(&self, id: &str, current: VersionedSpec, image: &str) -> Result<(), OrchestratorError> {
        let VersionedSpec { version, mut spec } = current;
        apply_image_update(&mut spec, image)?;

        let body = serde_json::to_vec(&spec)
            .map_err(|e| OrchestratorError::MalformedSpec(e.to_string()))?;

        info!("Updating service {} to image {}", id, image);
        let path = format!("/services/{}/update?version={}", id, version);
        let (status, body) = self.request(Method::POST, &path, Some(body)).await?;
        if !status.is_success() {
            return Err(Self::api_error(Some(id), status, &body));
        }

        let response: UpdateResponse = serde_json::from_slice(&body).unwrap_or_default();
        for warning in response.warnings.unwrap_or_default() {
            warn!("Orchestrator warning while updating service {}: {}", id, warning);
        }

        Ok(())
    }
}
