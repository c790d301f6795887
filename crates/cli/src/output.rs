//! Output formatting utilities
//!
//! Command output goes to stdout; logs go to stderr.

use anyhow::Result;
use clap::ValueEnum;
use inject_lib::SandboxNetns;
use serde::Serialize;
use serde_json::Value;

/// Output format for the `netns` command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Bare namespace path (default)
    #[default]
    Text,
    /// JSON object with the namespace path and sandbox id
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetnsOutput<'a> {
    netns: &'a str,
    sandbox_id: &'a str,
}

pub fn render_netns(resolved: &SandboxNetns, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => resolved.netns.to_string(),
        OutputFormat::Json => serde_json::to_string(&NetnsOutput {
            netns: resolved.netns.as_str(),
            sandbox_id: &resolved.sandbox_id,
        })?,
    })
}

/// Pretty-printed plugin result
pub fn render_result(result: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}
