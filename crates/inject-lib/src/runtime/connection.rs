//! gRPC connection to a CRI runtime over a Unix socket

use super::{Dialer, RuntimeService};
use crate::error::InjectError;
use crate::proto::{
    ContainerStatusRequest, ListPodSandboxRequest, PodSandbox, PodSandboxFilter,
    PodSandboxStatusRequest, RuntimeServiceClient,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::debug;

/// Open channel plus typed client for exactly one runtime backend
///
/// Dropping the connection closes the channel; [`RuntimeConnection::close`]
/// does the same explicitly at the end of a successful resolution.
#[derive(Debug)]
pub struct RuntimeConnection {
    endpoint: String,
    client: RuntimeServiceClient<Channel>,
}

impl RuntimeConnection {
    pub fn new(endpoint: impl Into<String>, channel: Channel) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: RuntimeServiceClient::new(channel),
        }
    }

    /// Endpoint URI this connection was opened on
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Release the connection
    pub fn close(self) {
        debug!(endpoint = %self.endpoint, "Closing runtime connection");
    }
}

#[async_trait]
impl RuntimeService for RuntimeConnection {
    async fn list_pod_sandbox(
        &mut self,
        filter: PodSandboxFilter,
    ) -> Result<Vec<PodSandbox>, InjectError> {
        let request = ListPodSandboxRequest {
            filter: Some(filter),
        };
        let response = self
            .client
            .list_pod_sandbox(request)
            .await
            .map_err(|source| InjectError::RuntimeCall {
                call: "ListPodSandbox",
                source,
            })?;
        Ok(response.into_inner().items)
    }

    async fn pod_sandbox_status(
        &mut self,
        sandbox_id: &str,
    ) -> Result<HashMap<String, String>, InjectError> {
        let request = PodSandboxStatusRequest {
            pod_sandbox_id: sandbox_id.to_string(),
            verbose: true,
        };
        let response = self
            .client
            .pod_sandbox_status(request)
            .await
            .map_err(|source| InjectError::RuntimeCall {
                call: "PodSandboxStatus",
                source,
            })?;
        Ok(response.into_inner().info)
    }

    async fn container_status(
        &mut self,
        container_id: &str,
    ) -> Result<HashMap<String, String>, InjectError> {
        let request = ContainerStatusRequest {
            container_id: container_id.to_string(),
            verbose: true,
        };
        let response = self
            .client
            .container_status(request)
            .await
            .map_err(|source| InjectError::RuntimeCall {
                call: "ContainerStatus",
                source,
            })?;
        Ok(response.into_inner().info)
    }
}

/// Dials a CRI runtime with tonic over a Unix domain socket
#[derive(Debug, Clone)]
pub struct GrpcDialer {
    connect_timeout: Duration,
}

impl GrpcDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Dialer for GrpcDialer {
    type Connection = RuntimeConnection;

    async fn dial(&self, endpoint: &str, socket: &Path) -> Result<RuntimeConnection, InjectError> {
        let path = socket.to_path_buf();

        // The authority is never resolved; the connector always dials `path`.
        let channel_endpoint =
            Endpoint::from_static("http://[::]:50051").connect_timeout(self.connect_timeout);
        let connecting = channel_endpoint
            .connect_with_connector(service_fn(move |_: Uri| UnixStream::connect(path.clone())));

        let channel = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| InjectError::Connect {
                endpoint: endpoint.to_string(),
                source: format!("timed out after {:?}", self.connect_timeout).into(),
            })?
            .map_err(|e| InjectError::Connect {
                endpoint: endpoint.to_string(),
                source: Box::new(e),
            })?;

        Ok(RuntimeConnection::new(endpoint, channel))
    }
}
