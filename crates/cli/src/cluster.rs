//! Workload lookup through the Kubernetes API

use inject_lib::error::BoxError;
use inject_lib::{
    ContainerStatusEntry, InjectError, WorkloadDescriptor, WorkloadIdentity, WorkloadLookup,
};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::config::{Config, KubeConfigOptions};
use kube::Client;
use tracing::debug;

/// Pods looked up by name with a field selector
pub struct KubeWorkloads {
    client: Client,
}

impl KubeWorkloads {
    /// In-cluster configuration first, the default kubeconfig second
    pub async fn connect() -> Result<Self, InjectError> {
        let config = match Config::incluster() {
            Ok(config) => config,
            Err(e) => {
                debug!(error = %e, "Not running in a cluster, trying kubeconfig");
                Config::from_kubeconfig(&KubeConfigOptions::default())
                    .await
                    .map_err(lookup_error)?
            }
        };
        let client = Client::try_from(config).map_err(lookup_error)?;
        Ok(Self { client })
    }
}

fn lookup_error(e: impl Into<BoxError>) -> InjectError {
    InjectError::WorkloadLookup(e.into())
}

#[async_trait::async_trait]
impl WorkloadLookup for KubeWorkloads {
    async fn get_workload(
        &self,
        identity: &WorkloadIdentity,
    ) -> Result<WorkloadDescriptor, InjectError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &identity.namespace);
        let params = ListParams::default().fields(&format!("metadata.name={}", identity.name));
        let mut items = pods.list(&params).await.map_err(lookup_error)?.items;

        match items.len() {
            1 => Ok(descriptor_from_pod(identity, &items.remove(0))),
            0 => Err(InjectError::NotFound {
                kind: "pod",
                namespace: identity.namespace.clone(),
                name: identity.name.clone(),
            }),
            count => Err(InjectError::AmbiguousMatch {
                kind: "pod",
                namespace: identity.namespace.clone(),
                name: identity.name.clone(),
                count,
            }),
        }
    }
}

/// Container statuses in the order the API reports them
pub fn descriptor_from_pod(identity: &WorkloadIdentity, pod: &Pod) -> WorkloadDescriptor {
    let statuses = pod
        .status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();

    WorkloadDescriptor {
        identity: identity.clone(),
        containers: statuses
            .iter()
            .map(|cs| ContainerStatusEntry {
                name: cs.name.clone(),
                container_id: cs.container_id.clone(),
                running: cs.state.as_ref().is_some_and(|s| s.running.is_some()),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStatus,
        PodStatus,
    };

    fn status(name: &str, id: Option<&str>, state: ContainerState) -> ContainerStatus {
        ContainerStatus {
            name: name.to_string(),
            container_id: id.map(str::to_string),
            state: Some(state),
            ..Default::default()
        }
    }

    fn running() -> ContainerState {
        ContainerState {
            running: Some(ContainerStateRunning::default()),
            ..Default::default()
        }
    }

    fn terminated() -> ContainerState {
        ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code: 0,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_descriptor_from_pod() {
        let pod = Pod {
            status: Some(PodStatus {
                container_statuses: Some(vec![
                    status("init", Some("containerd://aaa"), terminated()),
                    status("app", Some("containerd://bbb"), running()),
                    status("pending", None, ContainerState::default()),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let identity = WorkloadIdentity::new("default", "web-0");

        let workload = descriptor_from_pod(&identity, &pod);

        assert_eq!(workload.identity, identity);
        let summary: Vec<_> = workload
            .containers
            .iter()
            .map(|c| (c.name.as_str(), c.container_id.as_deref(), c.running))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("init", Some("containerd://aaa"), false),
                ("app", Some("containerd://bbb"), true),
                ("pending", None, false),
            ]
        );
        assert_eq!(workload.first_running().unwrap().id(), "bbb");
    }

    #[test]
    fn test_pod_without_status() {
        let identity = WorkloadIdentity::new("default", "web-0");
        let workload = descriptor_from_pod(&identity, &Pod::default());
        assert!(workload.containers.is_empty());
        assert!(matches!(
            workload.first_running(),
            Err(InjectError::NoRunningContainer { .. })
        ));
    }
}
