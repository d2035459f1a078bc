use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use graphnode::runtime::{Runtime, RuntimeOptions};
use tokio::sync::broadcast;

/// Starts a bare node runtime against a directory server, for exercising the
/// slave API and transport negotiation from the command line.
#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    /// Directory (master) XML-RPC URI, e.g. http://localhost:11311/
    #[arg(long, short = 'm')]
    directory: String,

    /// Host this node advertises to peers in its slave/stream URIs.
    #[arg(long, default_value = "127.0.0.1")]
    advertised_host: String,

    /// Local address to bind the slave, stream, and datagram sockets on.
    #[arg(long, default_value = "0.0.0.0")]
    bind_ip: IpAddr,

    /// Node namespace.
    #[arg(long, default_value = "/")]
    namespace: String,

    /// Node name, resolved under the namespace.
    #[arg(long)]
    node_name: String,

    /// Seconds to wait for the directory to become reachable during init.
    /// Omit to wait indefinitely.
    #[arg(long)]
    init_timeout_secs: Option<u64>,

    /// Log level.
    #[arg(long, default_value = "info")]
    log_level: log::LevelFilter,

    /// Remap arguments, e.g. `chatter:=/voice` or `__name:=talker` (§6).
    /// Accepted after a `--` separator so they don't collide with clap's
    /// own flag parsing.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    remap_args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    simple_logger::init_with_level(cli.log_level.to_level().unwrap_or(log::Level::Info))
        .context("failed to initialize logger")?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let opts = RuntimeOptions {
        directory_uri: cli.directory,
        advertised_host: cli.advertised_host,
        bind_ip: cli.bind_ip,
        namespace: cli.namespace,
        node_name: cli.node_name,
        init_timeout: cli.init_timeout_secs.map(Duration::from_secs),
        remap_args: cli.remap_args,
    };

    let runtime = Runtime::start(opts, shutdown_tx.clone()).await?;
    log::info!("node {} running; press ctrl-c to shut down", runtime.caller_id);

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    runtime.shutdown().await;
    Ok(())
}
