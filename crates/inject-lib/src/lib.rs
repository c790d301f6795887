//! Network namespace discovery and CNI plugin injection for running pods
//!
//! This crate provides the core functionality for:
//! - Locating the node's container runtime over its Unix socket
//! - Resolving a pod's network namespace through the CRI
//! - Running a CNI plugin chain inside that namespace
//! - Structured logging and cancellation for a single invocation

pub mod context;
pub mod error;
pub mod observability;
pub mod plugin;
pub mod proto;
pub mod resolver;
pub mod runtime;
pub mod workload;

pub use context::{CancelHandle, CancelSignal, ExecContext};
pub use error::{InjectError, PluginOp};
pub use observability::StructuredLogger;
pub use plugin::{NetworkSpec, PluginOrchestrator, RuntimeConf};
pub use resolver::{ContainerNetns, NamespaceResolver, NetnsPath, SandboxNetns};
pub use runtime::{RuntimeConnection, RuntimeEndpoint, RuntimeService};
pub use workload::{
    ContainerReference, ContainerStatusEntry, WorkloadDescriptor, WorkloadIdentity, WorkloadLookup,
};
