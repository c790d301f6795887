//! Ordered runtime endpoint search
//!
//! Tries each candidate in turn: parse, check that it names an existing Unix
//! socket, then dial. The first successful dial wins; every rejected candidate
//! is logged and discarded.

use crate::context::ExecContext;
use crate::error::InjectError;
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable naming an endpoint override
pub const ENDPOINT_ENV: &str = "CONTAINER_RUNTIME_ENDPOINT";

/// Well-known runtime sockets, in search order
const WELL_KNOWN_ENDPOINTS: &[&str] = &[
    "unix:///run/crio/crio.sock",
    "unix:///run/containerd/containerd.sock",
    "unix:///var/run/crio/crio.sock",
];

/// Bound on establishing the runtime channel
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Ordered runtime endpoint candidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEndpoint {
    candidates: Vec<String>,
}

impl RuntimeEndpoint {
    /// Candidates from an explicit override, `$CONTAINER_RUNTIME_ENDPOINT`
    /// and the well-known sockets
    pub fn from_env(explicit: Option<&str>) -> Self {
        let env = std::env::var(ENDPOINT_ENV).ok();
        Self::build(explicit, env.as_deref())
    }

    fn build(explicit: Option<&str>, env: Option<&str>) -> Self {
        let mut candidates = Vec::with_capacity(WELL_KNOWN_ENDPOINTS.len() + 2);
        candidates.push(explicit.unwrap_or_default().to_string());
        candidates.push(env.unwrap_or_default().to_string());
        candidates.extend(WELL_KNOWN_ENDPOINTS.iter().map(|s| s.to_string()));
        Self { candidates }
    }

    /// Use exactly the given candidates
    pub fn with_candidates<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }
}

/// Opens a channel to a runtime listening on a Unix socket
#[async_trait]
pub trait Dialer: Send + Sync {
    type Connection: Send;

    async fn dial(&self, endpoint: &str, socket: &Path)
        -> Result<Self::Connection, InjectError>;
}

/// Sequential trial loop over [`RuntimeEndpoint`] candidates
pub struct Connector<D> {
    dialer: D,
}

impl<D: Dialer> Connector<D> {
    pub fn new(dialer: D) -> Self {
        Self { dialer }
    }

    /// Connect to the first usable candidate
    ///
    /// Fails with [`InjectError::RuntimeNotFound`] when no candidate can be
    /// used; cancellation aborts the search immediately.
    pub async fn connect(
        &self,
        ctx: &ExecContext,
        endpoint: &RuntimeEndpoint,
    ) -> Result<D::Connection, InjectError> {
        for uri in endpoint.candidates() {
            if uri.is_empty() {
                continue;
            }

            match self.try_candidate(ctx, uri).await {
                Ok(conn) => {
                    ctx.logger().log_connected(uri);
                    return Ok(conn);
                }
                Err(e @ InjectError::Cancelled { .. }) => return Err(e),
                Err(e) => ctx.logger().log_candidate_rejected(uri, &e),
            }
        }

        Err(InjectError::RuntimeNotFound)
    }

    async fn try_candidate(
        &self,
        ctx: &ExecContext,
        uri: &str,
    ) -> Result<D::Connection, InjectError> {
        let socket = socket_path(uri)?;
        check_socket(uri, &socket).await?;
        ctx.run("connect", self.dialer.dial(uri, &socket)).await
    }
}

/// Extract the socket path from a `unix://` endpoint URI
pub(crate) fn socket_path(uri: &str) -> Result<PathBuf, InjectError> {
    let invalid = |reason: String| InjectError::InvalidEndpoint {
        endpoint: uri.to_string(),
        reason,
    };

    let url = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "unix" {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().is_some_and(|h| !h.is_empty()) {
        return Err(invalid("unix endpoints take an absolute path".to_string()));
    }
    if url.path().is_empty() || url.path() == "/" {
        return Err(invalid("empty socket path".to_string()));
    }

    // `Url` keeps the path percent-encoded; the socket lives at the decoded one
    let decoded: Vec<u8> = percent_decode_str(url.path()).collect();
    Ok(PathBuf::from(OsString::from_vec(decoded)))
}

/// Reject missing paths and anything that is not a socket special file
async fn check_socket(uri: &str, socket: &Path) -> Result<(), InjectError> {
    let metadata = tokio::fs::metadata(socket)
        .await
        .map_err(|e| InjectError::InvalidEndpoint {
            endpoint: uri.to_string(),
            reason: e.to_string(),
        })?;

    if !metadata.file_type().is_socket() {
        return Err(InjectError::InvalidEndpoint {
            endpoint: uri.to_string(),
            reason: format!("not a unix socket {}", socket.display()),
        });
    }

    Ok(())
}
