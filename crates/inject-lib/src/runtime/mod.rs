//! Container runtime (CRI) access
//!
//! This module provides:
//! - The ordered list of runtime endpoint candidates
//! - A connector that tries the candidates in order over Unix sockets
//! - The [`RuntimeService`] seam the resolver talks to

mod connection;
mod connector;

#[cfg(test)]
mod tests;

pub use connection::{GrpcDialer, RuntimeConnection};
pub use connector::{Connector, Dialer, RuntimeEndpoint, DEFAULT_CONNECT_TIMEOUT, ENDPOINT_ENV};

use crate::context::ExecContext;
use crate::error::InjectError;
use crate::proto::{PodSandbox, PodSandboxFilter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// The subset of the CRI runtime service used for namespace resolution
#[async_trait]
pub trait RuntimeService: Send {
    /// List pod sandboxes matching `filter`
    async fn list_pod_sandbox(
        &mut self,
        filter: PodSandboxFilter,
    ) -> Result<Vec<PodSandbox>, InjectError>;

    /// Verbose status of a sandbox; returns the `info` map
    async fn pod_sandbox_status(
        &mut self,
        sandbox_id: &str,
    ) -> Result<HashMap<String, String>, InjectError>;

    /// Verbose status of a container; returns the `info` map
    async fn container_status(
        &mut self,
        container_id: &str,
    ) -> Result<HashMap<String, String>, InjectError>;
}

/// Connect to the local container runtime
///
/// Candidates are searched in order:
///   - `explicit`
///   - `$CONTAINER_RUNTIME_ENDPOINT`
///   - `unix:///run/crio/crio.sock`
///   - `unix:///run/containerd/containerd.sock`
///   - `unix:///var/run/crio/crio.sock`
pub async fn discover(
    ctx: &ExecContext,
    explicit: Option<&str>,
    connect_timeout: Duration,
) -> Result<RuntimeConnection, InjectError> {
    let endpoint = RuntimeEndpoint::from_env(explicit);
    Connector::new(GrpcDialer::new(connect_timeout))
        .connect(ctx, &endpoint)
        .await
}
