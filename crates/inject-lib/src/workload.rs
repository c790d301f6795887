//! Workload identity and the externally resolved workload descriptor

use crate::error::InjectError;
use async_trait::async_trait;
use std::fmt;
use url::Url;

/// Namespace and name of a pod
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadIdentity {
    pub namespace: String,
    pub name: String,
}

impl WorkloadIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Status of one container as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatusEntry {
    pub name: String,
    /// Runtime-qualified id, e.g. `containerd://<id>`; absent before start
    pub container_id: Option<String>,
    pub running: bool,
}

/// A pod with its container statuses, in the order the cluster lists them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadDescriptor {
    pub identity: WorkloadIdentity,
    pub containers: Vec<ContainerStatusEntry>,
}

impl WorkloadDescriptor {
    /// Reference of the first running container
    pub fn first_running(&self) -> Result<ContainerReference, InjectError> {
        let no_running = || InjectError::NoRunningContainer {
            namespace: self.identity.namespace.clone(),
            name: self.identity.name.clone(),
        };

        let entry = self
            .containers
            .iter()
            .find(|c| c.running)
            .ok_or_else(no_running)?;

        match entry.container_id.as_deref() {
            Some(id) if !id.is_empty() => ContainerReference::parse(id),
            _ => Err(no_running()),
        }
    }
}

/// Resolves a [`WorkloadIdentity`] into a [`WorkloadDescriptor`]
#[async_trait]
pub trait WorkloadLookup: Send + Sync {
    async fn get_workload(
        &self,
        identity: &WorkloadIdentity,
    ) -> Result<WorkloadDescriptor, InjectError>;
}

/// `scheme://id` container reference as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerReference {
    runtime: String,
    id: String,
}

impl ContainerReference {
    pub fn parse(reference: &str) -> Result<Self, InjectError> {
        let invalid = |reason: &str| InjectError::InvalidContainerReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(reference).map_err(|e| invalid(&e.to_string()))?;
        let id = url.host_str().unwrap_or_default();
        if id.is_empty() {
            return Err(invalid("empty container id"));
        }
        if !matches!(url.path(), "" | "/") {
            return Err(invalid("unexpected path after container id"));
        }

        Ok(Self {
            runtime: url.scheme().to_string(),
            id: id.to_string(),
        })
    }

    /// Runtime name, e.g. `containerd` or `cri-o`
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    /// Bare runtime container id
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ContainerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.runtime, self.id)
    }
}
