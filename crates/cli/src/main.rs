//! if-inject CLI
//!
//! Finds the network namespace of a running pod through the node's container
//! runtime and adds, removes or checks extra interfaces in it with CNI
//! plugins.

mod cluster;
mod commands;
mod config;
mod flags;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use inject_lib::{
    CancelHandle, CancelSignal, ExecContext, InjectError, PluginOp, StructuredLogger,
    WorkloadIdentity,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pod network namespace discovery and interface injection
#[derive(Parser, Debug)]
#[command(name = "if-inject")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log verbosity: 0 info, 1 debug, 2 or more trace (RUST_LOG overrides)
    #[arg(long, global = true, default_value_t = 0)]
    pub loglevel: u8,

    /// Container runtime endpoint, tried before CONTAINER_RUNTIME_ENDPOINT
    #[arg(long, global = true)]
    pub runtime_endpoint: Option<String>,

    /// Configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Cancel the whole invocation after this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Output format of `netns`
    #[arg(long, global = true, value_enum, default_value_t = output::OutputFormat::Text)]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the network namespace of a pod
    #[command(alias = "getnetns")]
    Netns(PodArgs),

    /// Add an interface to a pod
    Add(NetworkArgs),

    /// Remove an interface from a pod
    Del(NetworkArgs),

    /// Check an interface of a pod
    Check(NetworkArgs),
}

#[derive(Args, Debug)]
pub struct PodArgs {
    /// Namespace of the pod
    #[arg(long, default_value = "default")]
    pub ns: String,

    /// Name of the pod (required)
    #[arg(long)]
    pub pod: Option<String>,
}

#[derive(Args, Debug)]
pub struct NetworkArgs {
    #[command(flatten)]
    pub target: PodArgs,

    /// Interface name inside the pod
    #[arg(long, default_value = "net1")]
    pub interface: String,

    /// CNI network configuration file, .conf or .conflist (required)
    #[arg(long)]
    pub spec: Option<PathBuf>,
}

impl PodArgs {
    fn identity(&self) -> Result<WorkloadIdentity, InjectError> {
        match self.pod.as_deref() {
            Some(pod) if !pod.is_empty() => Ok(WorkloadIdentity::new(&self.ns, pod)),
            _ => Err(InjectError::MissingArgument("pod")),
        }
    }
}

impl NetworkArgs {
    fn spec(&self) -> Result<&PathBuf, InjectError> {
        self.spec.as_ref().ok_or(InjectError::MissingArgument("spec"))
    }
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Netns(_) => "netns",
            Commands::Add(_) => "add",
            Commands::Del(_) => "del",
            Commands::Check(_) => "check",
        }
    }

    fn target(&self) -> &PodArgs {
        match self {
            Commands::Netns(args) => args,
            Commands::Add(args) | Commands::Del(args) | Commands::Check(args) => &args.target,
        }
    }
}

impl Cli {
    /// File and environment configuration with flags applied on top
    fn settings(&self) -> Result<Settings> {
        let mut settings = Settings::load(self.config.as_deref())?;
        if let Some(endpoint) = &self.runtime_endpoint {
            settings.runtime_endpoint = Some(endpoint.clone());
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_from(flags::normalize(std::env::args_os()));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(cli.loglevel)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    debug!(version = VERSION, command = cli.command.name(), "Starting if-inject");

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(exit_code(&err)),
    }
}

fn default_filter(loglevel: u8) -> EnvFilter {
    let level = match loglevel {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    EnvFilter::new(format!("warn,inject_lib={0},if_inject={0}", level))
}

/// 2 for a malformed invocation, 1 for any other failure
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<InjectError>())
        .map_or(1, InjectError::exit_code)
}

async fn run(cli: &Cli) -> Result<()> {
    let prepared = cli
        .command
        .target()
        .identity()
        .map_err(anyhow::Error::from)
        .and_then(|identity| Ok((identity, cli.settings()?)));
    let (identity, settings) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            error!(
                command = cli.command.name(),
                error = %format!("{:#}", err),
                "Invalid invocation"
            );
            return Err(err);
        }
    };

    let (handle, signal) = CancelSignal::new();
    let watcher = tokio::spawn(cancel_on_signal(handle, cli.timeout.map(Duration::from_secs)));
    let ctx = ExecContext::new(
        StructuredLogger::new(&identity.namespace, &identity.name),
        signal,
    );

    let res = dispatch(cli, &settings, &ctx, &identity).await;
    watcher.abort();

    if let Err(err) = &res {
        ctx.logger()
            .log_failure(cli.command.name(), &format!("{:#}", err));
    }
    res
}

async fn dispatch(
    cli: &Cli,
    settings: &Settings,
    ctx: &ExecContext,
    identity: &WorkloadIdentity,
) -> Result<()> {
    let (op, args) = match &cli.command {
        Commands::Netns(_) => {
            return commands::netns::show_netns(ctx, settings, identity, cli.format).await;
        }
        Commands::Add(args) => (PluginOp::Add, args),
        Commands::Del(args) => (PluginOp::Del, args),
        Commands::Check(args) => (PluginOp::Check, args),
    };

    let spec = args.spec()?;
    commands::network::run_plugins(ctx, settings, op, identity, &args.interface, spec).await
}

/// Cancel on Ctrl-C or once `timeout` has elapsed
async fn cancel_on_signal(handle: CancelHandle, timeout: Option<Duration>) {
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        Ok(()) = tokio::signal::ctrl_c() => warn!("Interrupted, cancelling"),
        _ = deadline => warn!(timeout = ?timeout, "Deadline reached, cancelling"),
    }
    handle.cancel();
}
