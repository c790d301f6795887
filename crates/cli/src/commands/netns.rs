//! `netns`: print the network namespace of a pod

use anyhow::{Context, Result};
use inject_lib::resolver;
use inject_lib::{ExecContext, WorkloadIdentity};

use crate::config::Settings;
use crate::output::{render_netns, OutputFormat};

/// Resolve through the pod's ready sandbox and print the namespace path
pub async fn show_netns(
    ctx: &ExecContext,
    settings: &Settings,
    identity: &WorkloadIdentity,
    format: OutputFormat,
) -> Result<()> {
    let resolved = resolver::sandbox_netns(
        ctx,
        settings.runtime_endpoint.as_deref(),
        settings.connect_timeout(),
        identity,
    )
    .await
    .with_context(|| format!("Failed to resolve network namespace of pod {}", identity))?;

    println!("{}", render_netns(&resolved, format)?);
    Ok(())
}
