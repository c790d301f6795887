//! `add`, `del` and `check`: run a plugin chain inside a pod's namespace

use anyhow::{Context, Result};
use inject_lib::plugin::PluginExec;
use inject_lib::runtime;
use inject_lib::{
    ExecContext, NamespaceResolver, NetworkSpec, PluginOp, PluginOrchestrator, RuntimeConf,
    RuntimeService, WorkloadIdentity, WorkloadLookup,
};
use std::io::Write;
use std::path::Path;
use tracing::info;

use crate::cluster::KubeWorkloads;
use crate::config::Settings;
use crate::output::render_result;

/// Run `op` for interface `if_name` of the pod
///
/// The network spec is loaded first so a bad file fails before any cluster
/// or runtime access.
pub async fn run_plugins(
    ctx: &ExecContext,
    settings: &Settings,
    op: PluginOp,
    identity: &WorkloadIdentity,
    if_name: &str,
    spec_path: &Path,
) -> Result<()> {
    let spec = NetworkSpec::load(spec_path).await?;

    let workloads = ctx
        .run("cluster connect", KubeWorkloads::connect())
        .await
        .context("Failed to connect to the Kubernetes API")?;
    let conn = runtime::discover(
        ctx,
        settings.runtime_endpoint.as_deref(),
        settings.connect_timeout(),
    )
    .await
    .context("Failed to connect to the container runtime")?;

    let mut injection = NetworkInjection {
        workloads: &workloads,
        resolver: NamespaceResolver::new(conn),
        orchestrator: PluginOrchestrator::with_dirs(
            settings.cni_bin_dirs.clone(),
            &settings.cni_cache_dir,
        ),
    };
    let res = injection
        .run(ctx, op, identity, if_name, &spec, &mut std::io::stdout())
        .await;
    injection.resolver.into_inner().close();
    res
}

/// Workload lookup, namespace resolution and plugin chain for one pod
pub struct NetworkInjection<'a, R, E> {
    pub workloads: &'a dyn WorkloadLookup,
    pub resolver: NamespaceResolver<R>,
    pub orchestrator: PluginOrchestrator<E>,
}

impl<R: RuntimeService, E: PluginExec> NetworkInjection<'_, R, E> {
    /// Resolve the pod's container namespace, run `op` and write the ADD
    /// result to `out`
    pub async fn run(
        &mut self,
        ctx: &ExecContext,
        op: PluginOp,
        identity: &WorkloadIdentity,
        if_name: &str,
        spec: &NetworkSpec,
        out: &mut dyn Write,
    ) -> Result<()> {
        let workload = ctx
            .run("workload lookup", self.workloads.get_workload(identity))
            .await
            .with_context(|| format!("Failed to look up pod {}", identity))?;

        let resolved = self
            .resolver
            .resolve_container(ctx, &workload)
            .await
            .with_context(|| format!("Failed to resolve network namespace of pod {}", identity))?;

        let conf = RuntimeConf::new(resolved.container_id, resolved.netns, if_name);
        let result = self
            .orchestrator
            .invoke(ctx, op, spec, &conf)
            .await
            .with_context(|| {
                format!(
                    "Failed to {} interface {} of pod {} with network {}",
                    op,
                    if_name,
                    identity,
                    spec.name()
                )
            })?;

        info!(
            op = %op,
            network = %spec.name(),
            interface = %if_name,
            container_id = %conf.container_id,
            "Plugin chain completed"
        );

        if let Some(result) = result {
            writeln!(out, "{}", render_result(&result)?)?;
        }
        Ok(())
    }
}
