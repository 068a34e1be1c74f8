//! Kustomizer daemon
//!
//! Receives revision events for source repositories and publishes the
//! rendered kustomize manifest to the overlay repository.
//!
//! ## Commands
//!
//! - `serve`: listen for CloudEvents over HTTP
//! - `trigger`: run the pipeline once for an event given on the command line

mod config;
mod receiver;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use kustomizer_core::{init_tracing, EventKind, InboundEvent};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{info, Level};

use crate::config::ConfigArgs;

#[derive(Parser)]
#[command(name = "kustomizerd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Render source revisions through a kustomize overlay and publish them", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive CloudEvents over HTTP
    Serve(ServeArgs),

    /// Run the pipeline once and print the run report
    Trigger(TriggerArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "KUSTOMIZER_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Release,
    Tag,
    Commit,
}

impl From<KindArg> for EventKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Release => EventKind::Release,
            KindArg::Tag => EventKind::Tag,
            KindArg::Commit => EventKind::Commit,
        }
    }
}

#[derive(Args)]
struct TriggerArgs {
    /// Kind of revision
    #[arg(long, value_enum)]
    kind: KindArg,

    /// Release id, tag name or commit hash
    #[arg(long)]
    id: String,

    /// Owner of the source repository
    #[arg(long)]
    owner: String,

    /// Name of the source repository
    #[arg(long)]
    repository: String,

    /// Clone URL of the source repository (tag and commit events)
    #[arg(long)]
    clone_url: Option<String>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Trigger(args) => trigger(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let dispatcher = args.config.dispatcher()?;
    tokio::fs::create_dir_all(&args.config.base_dir)
        .await
        .with_context(|| format!("creating {}", args.config.base_dir.display()))?;

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        event = "receiver.listening",
        %addr,
        overlay = %args.config.overlay_url,
        max_runs = args.config.max_runs,
        "kustomizerd listening"
    );

    axum::serve(listener, receiver::router(Arc::new(dispatcher)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    info!(event = "receiver.stopped", "kustomizerd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn trigger(args: TriggerArgs) -> Result<()> {
    let dispatcher = args.config.dispatcher()?;
    let event = InboundEvent {
        id: Some(args.id),
        kind: Some(args.kind.into()),
        owner: Some(args.owner),
        repository: Some(args.repository),
        clone_url: args.clone_url,
    };

    let report = dispatcher.dispatch(&event).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
