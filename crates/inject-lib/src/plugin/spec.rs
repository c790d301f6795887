//! Network configuration loading
//!
//! Accepts both a configuration list (`{cniVersion, name, plugins: [...]}`)
//! and a single configuration (`{cniVersion, name, type, ...}`), which is
//! promoted to a one-element list. Plugin entries are kept as raw JSON
//! objects so plugin-specific keys pass through untouched.

use crate::error::InjectError;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing network name")]
    MissingName,

    #[error("neither `plugins` nor `type` present")]
    NoPlugins,

    #[error("empty plugin list")]
    EmptyPluginList,

    #[error("plugin {index} has no `type`")]
    MissingType { index: usize },
}

#[derive(Deserialize)]
struct RawSpec {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "cniVersion", default)]
    cni_version: Option<String>,
    #[serde(rename = "disableCheck", default)]
    disable_check: bool,
    #[serde(default)]
    plugins: Option<Vec<Map<String, Value>>>,
}

/// One plugin entry of a network configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConf {
    plugin_type: String,
    raw: Map<String, Value>,
}

impl PluginConf {
    fn from_raw(index: usize, raw: Map<String, Value>) -> Result<Self, SpecError> {
        let plugin_type = match raw.get("type") {
            Some(Value::String(t)) if !t.is_empty() => t.clone(),
            _ => return Err(SpecError::MissingType { index }),
        };
        Ok(Self { plugin_type, raw })
    }

    /// Binary name, e.g. `bridge`
    pub fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Stdin document for one execution of this plugin
    pub fn request(
        &self,
        network: &str,
        cni_version: &str,
        prev_result: Option<&Value>,
    ) -> Result<Vec<u8>, serde_json::Error> {
        let mut conf = self.raw.clone();
        conf.insert("name".to_string(), Value::from(network));
        conf.insert("cniVersion".to_string(), Value::from(cni_version));
        if let Some(prev) = prev_result {
            conf.insert("prevResult".to_string(), prev.clone());
        }
        serde_json::to_vec(&conf)
    }
}

/// Parsed network configuration
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSpec {
    name: String,
    cni_version: String,
    disable_check: bool,
    plugins: Vec<PluginConf>,
    source: Value,
}

impl NetworkSpec {
    /// Read and parse a spec file
    pub async fn load(path: &Path) -> Result<Self, InjectError> {
        read_spec(path).await.map_err(|e| InjectError::SpecLoad {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, SpecError> {
        let source: Value = serde_json::from_slice(bytes)?;
        let raw = RawSpec::deserialize(&source)?;

        let name = raw
            .name
            .filter(|n| !n.is_empty())
            .ok_or(SpecError::MissingName)?;

        let entries = match raw.plugins {
            Some(plugins) if plugins.is_empty() => return Err(SpecError::EmptyPluginList),
            Some(plugins) => plugins,
            None => match &source {
                Value::Object(conf) if conf.contains_key("type") => vec![conf.clone()],
                _ => return Err(SpecError::NoPlugins),
            },
        };

        let plugins = entries
            .into_iter()
            .enumerate()
            .map(|(i, raw)| PluginConf::from_raw(i, raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            cni_version: raw.cni_version.unwrap_or_default(),
            disable_check: raw.disable_check,
            plugins,
            source,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cni_version(&self) -> &str {
        &self.cni_version
    }

    pub fn disable_check(&self) -> bool {
        self.disable_check
    }

    pub fn plugins(&self) -> &[PluginConf] {
        &self.plugins
    }

    /// The document as it was loaded
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Whether the configured version supports CHECK (0.4.0 and later)
    pub fn supports_check(&self) -> bool {
        version_at_least(&self.cni_version, (0, 4, 0))
    }
}

async fn read_spec(path: &Path) -> Result<NetworkSpec, SpecError> {
    let bytes = tokio::fs::read(path).await?;
    NetworkSpec::parse(&bytes)
}

fn version_at_least(version: &str, min: (u64, u64, u64)) -> bool {
    let mut parts = version.split('.').map(|p| p.parse::<u64>());
    let mut next = || parts.next().unwrap_or(Ok(0));
    match (next(), next(), next()) {
        (Ok(major), Ok(minor), Ok(patch)) => (major, minor, patch) >= min,
        _ => false,
    }
}
