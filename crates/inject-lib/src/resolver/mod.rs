//! Network namespace resolution
//!
//! Two strategies share one tail:
//! - sandbox lookup: list the pod's ready sandbox by label, then query its
//!   verbose status
//! - container lookup: take the first running container of an externally
//!   resolved workload, then query its verbose status
//!
//! Either way the namespace is read from the status `info` document, see
//! [`StatusInfo::network_namespace`].

mod status_info;


pub use status_info::{Field, NetnsSource, StatusInfo};

use crate::context::ExecContext;
use crate::error::InjectError;
use crate::proto::{
    PodSandboxFilter, PodSandboxState, PodSandboxStateValue, POD_NAME_LABEL, POD_NAMESPACE_LABEL,
};
use crate::runtime::{self, RuntimeConnection, RuntimeService};
use crate::workload::{WorkloadDescriptor, WorkloadIdentity};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Filesystem path of a network namespace; never empty
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetnsPath(String);

impl NetnsPath {
    /// `None` for an empty path
    pub fn new(path: impl Into<String>) -> Option<Self> {
        let path = path.into();
        if path.is_empty() {
            None
        } else {
            Some(Self(path))
        }
    }

    /// `/proc/<pid>/ns/net`
    pub fn from_pid(pid: u32) -> Self {
        Self(format!("/proc/{}/ns/net", pid))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetnsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NetnsPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Result of a sandbox lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxNetns {
    pub netns: NetnsPath,
    pub sandbox_id: String,
}

/// Result of a container lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNetns {
    pub netns: NetnsPath,
    pub container_id: String,
}

/// Resolves network namespaces through a runtime service it owns
pub struct NamespaceResolver<R> {
    runtime: R,
}

impl<R: RuntimeService> NamespaceResolver<R> {
    pub fn new(runtime: R) -> Self {
        Self { runtime }
    }

    /// Give the runtime service back, e.g. to close it
    pub fn into_inner(self) -> R {
        self.runtime
    }

    /// Sandbox lookup by pod labels
    ///
    /// Exactly one ready sandbox must match; no status query is issued
    /// otherwise.
    pub async fn resolve_sandbox(
        &mut self,
        ctx: &ExecContext,
        identity: &WorkloadIdentity,
    ) -> Result<SandboxNetns, InjectError> {
        let filter = sandbox_filter(identity);
        let mut sandboxes = ctx
            .run("list sandboxes", self.runtime.list_pod_sandbox(filter))
            .await?;

        let sandbox = match sandboxes.len() {
            1 => sandboxes.remove(0),
            0 => {
                return Err(InjectError::NotFound {
                    kind: "sandbox",
                    namespace: identity.namespace.clone(),
                    name: identity.name.clone(),
                });
            }
            count => {
                return Err(InjectError::AmbiguousMatch {
                    kind: "sandbox",
                    namespace: identity.namespace.clone(),
                    name: identity.name.clone(),
                    count,
                });
            }
        };
        ctx.logger().log_sandbox_selected(&sandbox.id);

        let info = ctx
            .run("sandbox status", self.runtime.pod_sandbox_status(&sandbox.id))
            .await?;
        let netns = read_netns(ctx, &sandbox.id, &info)?;

        Ok(SandboxNetns {
            netns,
            sandbox_id: sandbox.id,
        })
    }

    /// Container lookup through the first running container of `workload`
    pub async fn resolve_container(
        &mut self,
        ctx: &ExecContext,
        workload: &WorkloadDescriptor,
    ) -> Result<ContainerNetns, InjectError> {
        let reference = workload.first_running()?;
        let container_id = reference.id().to_string();

        let info = ctx
            .run("container status", self.runtime.container_status(&container_id))
            .await?;
        let netns = read_netns(ctx, &container_id, &info)?;

        Ok(ContainerNetns {
            netns,
            container_id,
        })
    }
}

fn sandbox_filter(identity: &WorkloadIdentity) -> PodSandboxFilter {
    let label_selector = HashMap::from([
        (POD_NAME_LABEL.to_string(), identity.name.clone()),
        (POD_NAMESPACE_LABEL.to_string(), identity.namespace.clone()),
    ]);

    PodSandboxFilter {
        id: String::new(),
        state: Some(PodSandboxStateValue {
            state: PodSandboxState::SandboxReady as i32,
        }),
        label_selector,
    }
}

fn read_netns(
    ctx: &ExecContext,
    id: &str,
    info: &HashMap<String, String>,
) -> Result<NetnsPath, InjectError> {
    let status = StatusInfo::from_info_map(info)?;
    ctx.logger().log_status_info(id, status.as_value());

    let (netns, source) = status.network_namespace()?;
    ctx.logger()
        .log_netns_resolved(netns.as_str(), id, source == NetnsSource::Pid);
    Ok(netns)
}

/// Connect, resolve by sandbox lookup, close
pub async fn sandbox_netns(
    ctx: &ExecContext,
    endpoint: Option<&str>,
    connect_timeout: Duration,
    identity: &WorkloadIdentity,
) -> Result<SandboxNetns, InjectError> {
    let conn = runtime::discover(ctx, endpoint, connect_timeout).await?;
    let mut resolver = NamespaceResolver::new(conn);
    let res = resolver.resolve_sandbox(ctx, identity).await;
    close(resolver);
    res
}

/// Connect, resolve by container lookup, close
pub async fn container_netns(
    ctx: &ExecContext,
    endpoint: Option<&str>,
    connect_timeout: Duration,
    workload: &WorkloadDescriptor,
) -> Result<ContainerNetns, InjectError> {
    let conn = runtime::discover(ctx, endpoint, connect_timeout).await?;
    let mut resolver = NamespaceResolver::new(conn);
    let res = resolver.resolve_container(ctx, workload).await;
    close(resolver);
    res
}

fn close(resolver: NamespaceResolver<RuntimeConnection>) {
    resolver.into_inner().close();
}
