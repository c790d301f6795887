//! Configuration management for the CLI
//!
//! Defaults, then an optional file (`--config`), then `IF_INJECT_*`
//! environment variables. Command-line flags are applied on top by the caller.

use anyhow::{Context, Result};
use inject_lib::plugin::{DEFAULT_BIN_DIR, DEFAULT_CACHE_DIR};
use inject_lib::runtime::DEFAULT_CONNECT_TIMEOUT;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "IF_INJECT";

/// CLI configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Runtime endpoint tried before `$CONTAINER_RUNTIME_ENDPOINT`
    #[serde(default)]
    pub runtime_endpoint: Option<String>,

    /// Bound on connecting to the runtime, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Directories searched for plugin binaries, in order
    #[serde(default = "default_cni_bin_dirs")]
    pub cni_bin_dirs: Vec<PathBuf>,

    /// Result cache directory
    #[serde(default = "default_cni_cache_dir")]
    pub cni_cache_dir: PathBuf,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_cni_bin_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from(DEFAULT_BIN_DIR)]
}

fn default_cni_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            runtime_endpoint: None,
            connect_timeout_secs: default_connect_timeout(),
            cni_bin_dirs: default_cni_bin_dirs(),
            cni_cache_dir: default_cni_cache_dir(),
        }
    }
}

impl Settings {
    /// Load configuration from an optional file and the process environment
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::load_with_env(file, None)
    }

    /// Like [`Settings::load`]; `env` replaces the process environment
    fn load_with_env(
        file: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(":")
                .with_list_parse_key("cni_bin_dirs")
                .source(env),
        );

        let settings = builder
            .build()
            .context("Failed to load configuration")?
            .try_deserialize::<Settings>()
            .context("Invalid configuration")?;

        if settings.connect_timeout_secs == 0 {
            anyhow::bail!("connect_timeout_secs must be greater than zero");
        }
        Ok(settings)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
