//! Error taxonomy for namespace resolution and plugin invocation

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// CNI operation requested from the plugin chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginOp {
    Add,
    Del,
    Check,
}

impl PluginOp {
    /// Value passed to plugins in `CNI_COMMAND`
    pub fn cni_command(&self) -> &'static str {
        match self {
            PluginOp::Add => "ADD",
            PluginOp::Del => "DEL",
            PluginOp::Check => "CHECK",
        }
    }
}

impl fmt::Display for PluginOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PluginOp::Add => "add",
            PluginOp::Del => "del",
            PluginOp::Check => "check",
        })
    }
}

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("runtime not found")]
    RuntimeNotFound,

    #[error("invalid runtime endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("cannot connect to runtime endpoint {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: BoxError,
    },

    #[error("{kind} not found: {namespace}/{name}")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("ambiguous {kind} match for {namespace}/{name}: {count} matches")]
    AmbiguousMatch {
        kind: &'static str,
        namespace: String,
        name: String,
        count: usize,
    },

    #[error("no running container in pod {namespace}/{name}")]
    NoRunningContainer { namespace: String, name: String },

    #[error("invalid container reference {reference:?}: {reason}")]
    InvalidContainerReference { reference: String, reason: String },

    #[error("cannot parse status info field `{field}`: {reason}")]
    InfoParse { field: String, reason: String },

    #[error("network namespace not found in status info ({detail})")]
    NamespaceNotFound { detail: String },

    #[error("runtime call {call} failed")]
    RuntimeCall {
        call: &'static str,
        #[source]
        source: tonic::Status,
    },

    #[error("cannot load network spec {}", path.display())]
    SpecLoad {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("plugin {plugin} {op} failed")]
    PluginInvocation {
        op: PluginOp,
        plugin: String,
        #[source]
        source: BoxError,
    },

    #[error("missing required argument -{0}")]
    MissingArgument(&'static str),

    #[error("workload lookup failed")]
    WorkloadLookup(#[source] BoxError),

    #[error("{stage} cancelled")]
    Cancelled { stage: &'static str },
}

impl InjectError {
    pub(crate) fn info_parse(field: impl Into<String>, reason: impl Into<String>) -> Self {
        InjectError::InfoParse {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn plugin(op: PluginOp, plugin: &str, source: impl Into<BoxError>) -> Self {
        InjectError::PluginInvocation {
            op,
            plugin: plugin.to_string(),
            source: source.into(),
        }
    }

    /// Process exit code for this failure: 2 for a malformed invocation,
    /// 1 for everything operational.
    pub fn exit_code(&self) -> u8 {
        match self {
            InjectError::MissingArgument(_) => 2,
            _ => 1,
        }
    }
}
