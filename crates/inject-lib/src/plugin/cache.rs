//! On-disk cache of ADD results, read back by CHECK and DEL

use super::{NetworkSpec, RuntimeConf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CACHE_KIND: &str = "cniCacheV1";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed cache entry {}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    kind: String,
    #[serde(rename = "containerId")]
    container_id: String,
    #[serde(rename = "ifName")]
    if_name: String,
    #[serde(rename = "networkName")]
    network_name: String,
    #[serde(default)]
    config: Value,
    result: Value,
}

/// Results stored as `<dir>/results/<network>-<containerId>-<ifName>`
#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
}

impl ResultCache {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: cache_dir.as_ref().join("results"),
        }
    }

    pub fn entry_path(&self, network: &str, conf: &RuntimeConf) -> PathBuf {
        self.dir
            .join(format!("{}-{}-{}", network, conf.container_id, conf.if_name))
    }

    /// Cached result, `None` when no entry exists
    pub async fn load(
        &self,
        network: &str,
        conf: &RuntimeConf,
    ) -> Result<Option<Value>, CacheError> {
        let path = self.entry_path(network, conf);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(source) => return Err(CacheError::Json { path, source }),
        };
        Ok(Some(entry.result))
    }

    pub async fn store(
        &self,
        spec: &NetworkSpec,
        conf: &RuntimeConf,
        result: &Value,
    ) -> Result<(), CacheError> {
        let path = self.entry_path(spec.name(), conf);
        let entry = CacheEntry {
            kind: CACHE_KIND.to_string(),
            container_id: conf.container_id.clone(),
            if_name: conf.if_name.clone(),
            network_name: spec.name().to_string(),
            config: spec.source().clone(),
            result: result.clone(),
        };
        let bytes = serde_json::to_vec(&entry).map_err(|source| CacheError::Json {
            path: path.clone(),
            source,
        })?;

        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        tokio::fs::write(&path, bytes).await.map_err(io_err)
    }

    /// Remove an entry; a missing entry is not an error
    pub async fn remove(&self, network: &str, conf: &RuntimeConf) -> Result<(), CacheError> {
        let path = self.entry_path(network, conf);
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                Err(CacheError::Io { path, source: e })
            }
            _ => Ok(()),
        }
    }
}
