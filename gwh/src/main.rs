//! The `generic-webhook` binary: validate and/or mutate Kubernetes manifests.

use anyhow::Context;
use clap::{Parser, Subcommand};
use gwh::{cli, server, ConfigLoader};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "generic-webhook", version, about = "Program to validate and/or modify K8S manifests")]
struct Cli {
    /// GenericWebhookConfig config file
    #[arg(long)]
    config: PathBuf,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an http(s) server
    Server {
        /// Port where the server will listen
        #[arg(long)]
        port: u16,

        /// Certificate file for the TLS connection. Without it the server is
        /// plain http.
        #[arg(long, requires = "key_file")]
        cert_file: Option<PathBuf>,

        /// Key file for the TLS connection
        #[arg(long, requires = "cert_file")]
        key_file: Option<PathBuf>,

        /// Seconds between two reads of the config file
        #[arg(long, default_value_t = 5)]
        refresh_period: u64,
    },

    /// Use the program as a cli utility
    Cli {
        /// K8S manifest file that the webhook will process
        #[arg(long)]
        k8s_manifest: PathBuf,

        /// The name of the webhook that will be used to process the k8s manifest
        #[arg(long)]
        wh_name: String,

        /// Show the patch that would be applied instead of the resulting manifest
        #[arg(long)]
        show_patch: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Cli::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match args.command {
        Command::Server {
            port,
            cert_file,
            key_file,
            refresh_period,
        } => {
            run_server(
                args.config,
                port,
                cert_file.zip(key_file),
                Duration::from_secs(refresh_period),
            )
            .await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Cli {
            k8s_manifest,
            wh_name,
            show_patch,
        } => {
            let accept = cli::run(&args.config, &k8s_manifest, &wh_name, show_patch)?;
            Ok(if accept { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}

async fn run_server(
    config: PathBuf,
    port: u16,
    tls: Option<(PathBuf, PathBuf)>,
    refresh_period: Duration,
) -> anyhow::Result<()> {
    let loader = Arc::new(ConfigLoader::new(&config).context("failed to load the webhook config")?);
    let (stop_tx, stop_rx) = watch::channel(false);

    let reloader = loader.clone();
    tokio::spawn(async move { reloader.run(refresh_period, stop_rx).await });

    let handle = axum_server::Handle::new();
    tokio::spawn(shutdown_signal(handle.clone(), stop_tx));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");
    server::serve(server::app(loader), addr, tls, handle).await?;
    info!("server stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then stop the reloader and drain the listener.
/// In-flight requests complete on their own.
async fn shutdown_signal(handle: axum_server::Handle<SocketAddr>, stop_tx: watch::Sender<bool>) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install the SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
    info!("shutting down");
    let _ = stop_tx.send(true);
    handle.graceful_shutdown(Some(Duration::from_secs(30)));
}
