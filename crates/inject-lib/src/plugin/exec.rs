//! Execution of a single CNI plugin binary

use super::RuntimeConf;
use crate::error::PluginOp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};

const SPAWN_ATTEMPTS: u32 = 5;
const SPAWN_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Error document a plugin prints when it fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginError {
    pub code: u32,
    pub msg: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)?;
        if !self.details.is_empty() {
            write!(f, "; {}", self.details)?;
        }
        write!(f, " (code {})", self.code)
    }
}

impl std::error::Error for PluginError {}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("plugin binary {plugin_type:?} not found in {dirs}")]
    NotFound { plugin_type: String, dirs: String },

    #[error("failed to run {}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("plugin exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("invalid plugin output")]
    Output(#[source] serde_json::Error),

    #[error("cannot encode plugin request")]
    Request(#[source] serde_json::Error),
}

/// Runs one plugin for one operation
#[async_trait]
pub trait PluginExec: Send + Sync {
    /// Execute `plugin_type`, writing `stdin` to it
    ///
    /// Returns the parsed result, or `None` when the plugin printed nothing.
    async fn exec(
        &self,
        op: PluginOp,
        plugin_type: &str,
        conf: &RuntimeConf,
        stdin: Vec<u8>,
    ) -> Result<Option<Value>, ExecError>;
}

/// Runs plugin binaries as child processes
#[derive(Debug, Clone)]
pub struct ProcessExec {
    bin_dirs: Vec<PathBuf>,
}

impl ProcessExec {
    pub fn new(bin_dirs: Vec<PathBuf>) -> Self {
        Self { bin_dirs }
    }

    /// `CNI_PATH` value
    fn cni_path(&self) -> String {
        self.bin_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// First executable regular file named `plugin_type` in the plugin dirs
    pub async fn find(&self, plugin_type: &str) -> Result<PathBuf, ExecError> {
        let not_found = || ExecError::NotFound {
            plugin_type: plugin_type.to_string(),
            dirs: self.cni_path(),
        };

        // A type with a path separator could escape the plugin directories.
        if plugin_type.contains('/') {
            return Err(not_found());
        }

        for dir in &self.bin_dirs {
            let candidate = dir.join(plugin_type);
            if is_executable(&candidate).await {
                return Ok(candidate);
            }
        }
        Err(not_found())
    }
}

async fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[async_trait]
impl PluginExec for ProcessExec {
    async fn exec(
        &self,
        op: PluginOp,
        plugin_type: &str,
        conf: &RuntimeConf,
        stdin: Vec<u8>,
    ) -> Result<Option<Value>, ExecError> {
        let binary = self.find(plugin_type).await?;
        let spawn_err = |source| ExecError::Spawn {
            binary: binary.clone(),
            source,
        };

        let mut command = Command::new(&binary);
        command
            .env("CNI_COMMAND", op.cni_command())
            .env("CNI_CONTAINERID", &conf.container_id)
            .env("CNI_NETNS", conf.netns.as_str())
            .env("CNI_IFNAME", &conf.if_name)
            .env("CNI_ARGS", conf.cni_args())
            .env("CNI_PATH", self.cni_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = spawn(&mut command).await.map_err(spawn_err)?;

        let mut input = child
            .stdin
            .take()
            .ok_or_else(|| spawn_err(io::Error::other("stdin not captured")))?;
        let write = async move {
            match input.write_all(&stdin).await {
                // the plugin may exit without reading its configuration
                Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        };

        let (_, output) =
            tokio::try_join!(write, child.wait_with_output()).map_err(spawn_err)?;

        decode_output(output.status, &output.stdout, &output.stderr)
    }
}

/// Spawn, retrying while the binary is still open for writing elsewhere
async fn spawn(command: &mut Command) -> io::Result<Child> {
    let mut attempt = 1;
    loop {
        match command.spawn() {
            Err(e) if e.raw_os_error() == Some(libc::ETXTBSY) && attempt < SPAWN_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(SPAWN_RETRY_DELAY).await;
            }
            res => return res,
        }
    }
}

/// Interpret a finished plugin process
pub(crate) fn decode_output(
    status: ExitStatus,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<Option<Value>, ExecError> {
    if status.success() {
        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        return serde_json::from_slice(stdout)
            .map(Some)
            .map_err(ExecError::Output);
    }

    for stream in [stdout, stderr] {
        if let Ok(err) = serde_json::from_slice::<PluginError>(stream) {
            return Err(ExecError::Plugin(err));
        }
    }

    Err(ExecError::Failed {
        status,
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
    })
}
