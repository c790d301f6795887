//! Structured logging for injection events
//!
//! The tracing subscriber itself is installed by the binary; this module only
//! provides consistent, named events carrying the target workload's identity.

use crate::error::PluginOp;
use tracing::{debug, error, info, trace, warn};

/// Structured logger for one invocation
///
/// Every event carries the namespace and pod the invocation targets, so a
/// single grep on the pod name yields the whole pipeline.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    namespace: String,
    pod: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pod(&self) -> &str {
        &self.pod
    }

    /// Log a runtime endpoint candidate that could not be used
    pub fn log_candidate_rejected(&self, endpoint: &str, reason: &dyn std::fmt::Display) {
        debug!(
            event = "runtime_candidate_rejected",
            endpoint = %endpoint,
            reason = %reason,
            "Runtime endpoint skipped"
        );
    }

    /// Log the runtime connection that was established
    pub fn log_connected(&self, endpoint: &str) {
        debug!(
            event = "runtime_connected",
            endpoint = %endpoint,
            "Connected to container runtime"
        );
    }

    /// Log the sandbox chosen for the pod
    pub fn log_sandbox_selected(&self, sandbox_id: &str) {
        debug!(
            event = "sandbox_selected",
            namespace = %self.namespace,
            pod = %self.pod,
            sandbox_id = %sandbox_id,
            "Pod sandbox selected"
        );
    }

    /// Log the raw status info document; only visible at trace level
    pub fn log_status_info(&self, id: &str, info: &serde_json::Value) {
        trace!(
            event = "status_info",
            id = %id,
            info = %info,
            "Status info reported by runtime"
        );
    }

    /// Log a resolved network namespace
    pub fn log_netns_resolved(&self, netns: &str, id: &str, via_pid: bool) {
        info!(
            event = "netns_resolved",
            namespace = %self.namespace,
            pod = %self.pod,
            id = %id,
            netns = %netns,
            via_pid = via_pid,
            "Network namespace resolved"
        );
    }

    /// Log a single plugin execution
    pub fn log_plugin_invoked(
        &self,
        op: PluginOp,
        plugin: &str,
        container_id: &str,
        if_name: &str,
    ) {
        debug!(
            event = "plugin_invoked",
            namespace = %self.namespace,
            pod = %self.pod,
            op = %op,
            plugin = %plugin,
            container_id = %container_id,
            if_name = %if_name,
            "Invoking network plugin"
        );
    }

    /// Log a result cache problem; never fatal
    pub fn log_cache_problem(
        &self,
        network: &str,
        container_id: &str,
        problem: &dyn std::fmt::Display,
    ) {
        warn!(
            event = "result_cache",
            namespace = %self.namespace,
            pod = %self.pod,
            network = %network,
            container_id = %container_id,
            problem = %problem,
            "Result cache unavailable"
        );
    }

    /// Log the failure that ends an invocation
    pub fn log_failure(&self, stage: &str, error: &dyn std::fmt::Display) {
        error!(
            event = "invocation_failed",
            namespace = %self.namespace,
            pod = %self.pod,
            stage = %stage,
            error = %error,
            "Invocation failed"
        );
    }
}
