//! CNI plugin chain execution
//!
//! Runs the plugins of a network configuration against a resolved network
//! namespace:
//! - ADD runs the plugins in order, each result becoming the next
//!   `prevResult`; the final result is cached
//! - DEL runs them in reverse with the cached result, then drops the cache
//! - CHECK runs them in order with the cached result; it needs version
//!   0.4.0 or later and is skipped when the configuration disables it

mod cache;
mod exec;
mod spec;

#[cfg(test)]
mod tests;

pub use cache::{CacheError, ResultCache};
pub use exec::{ExecError, PluginError, PluginExec, ProcessExec};
pub use spec::{NetworkSpec, PluginConf, SpecError};

use crate::context::ExecContext;
use crate::error::{InjectError, PluginOp};
use crate::resolver::NetnsPath;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default plugin binary directory
pub const DEFAULT_BIN_DIR: &str = "/opt/cni/bin";

/// Default cache directory; results live under `results/`
pub const DEFAULT_CACHE_DIR: &str = "/var/lib/cni";

/// Per-invocation binding of container, namespace and interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConf {
    pub container_id: String,
    pub netns: NetnsPath,
    pub if_name: String,
    /// Extra `CNI_ARGS` pairs
    pub args: Vec<(String, String)>,
}

impl RuntimeConf {
    pub fn new(
        container_id: impl Into<String>,
        netns: NetnsPath,
        if_name: impl Into<String>,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            netns,
            if_name: if_name.into(),
            args: Vec::new(),
        }
    }

    /// `CNI_ARGS` value, `K=V` pairs joined by `;`
    pub fn cni_args(&self) -> String {
        self.args
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Executes network configurations through a [`PluginExec`]
pub struct PluginOrchestrator<E> {
    exec: E,
    cache: ResultCache,
}

impl PluginOrchestrator<ProcessExec> {
    /// Orchestrator running real plugin binaries
    pub fn with_dirs(bin_dirs: Vec<PathBuf>, cache_dir: impl AsRef<Path>) -> Self {
        Self::new(ProcessExec::new(bin_dirs), ResultCache::new(cache_dir))
    }
}

impl<E: PluginExec> PluginOrchestrator<E> {
    pub fn new(exec: E, cache: ResultCache) -> Self {
        Self { exec, cache }
    }

    /// Load the configuration at `path`, then [`invoke`](Self::invoke)
    pub async fn invoke_from_file(
        &self,
        ctx: &ExecContext,
        op: PluginOp,
        path: &Path,
        conf: &RuntimeConf,
    ) -> Result<Option<Value>, InjectError> {
        let spec = NetworkSpec::load(path).await?;
        self.invoke(ctx, op, &spec, conf).await
    }

    /// Run `op` over the plugin chain of `spec`
    ///
    /// Only ADD yields a result. A failing plugin stops the chain; nothing
    /// already done is rolled back.
    pub async fn invoke(
        &self,
        ctx: &ExecContext,
        op: PluginOp,
        spec: &NetworkSpec,
        conf: &RuntimeConf,
    ) -> Result<Option<Value>, InjectError> {
        match op {
            PluginOp::Add => self.add(ctx, spec, conf).await,
            PluginOp::Del => self.del(ctx, spec, conf).await.map(|_| None),
            PluginOp::Check => self.check(ctx, spec, conf).await.map(|_| None),
        }
    }

    async fn add(
        &self,
        ctx: &ExecContext,
        spec: &NetworkSpec,
        conf: &RuntimeConf,
    ) -> Result<Option<Value>, InjectError> {
        let mut prev_result: Option<Value> = None;
        for plugin in spec.plugins() {
            if let Some(result) = self
                .exec_one(ctx, PluginOp::Add, spec, plugin, conf, prev_result.as_ref())
                .await?
            {
                prev_result = Some(result);
            }
        }

        if let Some(result) = &prev_result {
            if let Err(e) = self.cache.store(spec, conf, result).await {
                ctx.logger()
                    .log_cache_problem(spec.name(), &conf.container_id, &e);
            }
        }
        Ok(prev_result)
    }

    async fn del(
        &self,
        ctx: &ExecContext,
        spec: &NetworkSpec,
        conf: &RuntimeConf,
    ) -> Result<(), InjectError> {
        let cached = self.cached_result(ctx, spec, conf).await;
        for plugin in spec.plugins().iter().rev() {
            self.exec_one(ctx, PluginOp::Del, spec, plugin, conf, cached.as_ref())
                .await?;
        }

        if let Err(e) = self.cache.remove(spec.name(), conf).await {
            ctx.logger()
                .log_cache_problem(spec.name(), &conf.container_id, &e);
        }
        Ok(())
    }

    async fn check(
        &self,
        ctx: &ExecContext,
        spec: &NetworkSpec,
        conf: &RuntimeConf,
    ) -> Result<(), InjectError> {
        if spec.disable_check() {
            info!(network = %spec.name(), "Checks disabled for network, skipping");
            return Ok(());
        }
        if !spec.supports_check() {
            return Err(InjectError::plugin(
                PluginOp::Check,
                spec.name(),
                format!(
                    "configuration version {:?} does not support CHECK, 0.4.0 or later required",
                    spec.cni_version()
                ),
            ));
        }

        let cached = self.cached_result(ctx, spec, conf).await;
        for plugin in spec.plugins() {
            self.exec_one(ctx, PluginOp::Check, spec, plugin, conf, cached.as_ref())
                .await?;
        }
        Ok(())
    }

    /// Cached ADD result; absence is logged and tolerated
    async fn cached_result(
        &self,
        ctx: &ExecContext,
        spec: &NetworkSpec,
        conf: &RuntimeConf,
    ) -> Option<Value> {
        match self.cache.load(spec.name(), conf).await {
            Ok(Some(result)) => Some(result),
            Ok(None) => {
                ctx.logger().log_cache_problem(
                    spec.name(),
                    &conf.container_id,
                    &"no cached result, continuing without prevResult",
                );
                None
            }
            Err(e) => {
                ctx.logger()
                    .log_cache_problem(spec.name(), &conf.container_id, &e);
                None
            }
        }
    }

    async fn exec_one(
        &self,
        ctx: &ExecContext,
        op: PluginOp,
        spec: &NetworkSpec,
        plugin: &PluginConf,
        conf: &RuntimeConf,
        prev_result: Option<&Value>,
    ) -> Result<Option<Value>, InjectError> {
        let plugin_type = plugin.plugin_type();
        ctx.logger()
            .log_plugin_invoked(op, plugin_type, &conf.container_id, &conf.if_name);

        let stdin = plugin
            .request(spec.name(), spec.cni_version(), prev_result)
            .map_err(|e| InjectError::plugin(op, plugin_type, ExecError::Request(e)))?;

        let call = async {
            self.exec
                .exec(op, plugin_type, conf, stdin)
                .await
                .map_err(|e| InjectError::plugin(op, plugin_type, e))
        };
        ctx.run("plugin", call).await
    }
}
