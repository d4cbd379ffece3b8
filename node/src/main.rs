// Copyright (c) 2026 WebPay Contributors. MIT License.
// See LICENSE for details.

//! # WebPay Node
//!
//! Entry point for the `webpay-node` binary. Hosts one payment provider or
//! acquirer: the signed Authority document and the transaction endpoint,
//! plus a Prometheus scrape endpoint on a separate port.
//!
//! Subcommands:
//!
//! - `run`     start the node
//! - `init`    generate devnet credentials in the data directory
//! - `version` print build version information

mod api;
mod cli;
mod credentials;
mod logging;
mod metrics;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;

use webpay_protocol::transport::HttpsTransport;

use cli::{Commands, WebpayNodeCli};
use credentials::{Credentials, CREDENTIALS_FILE};
use logging::LogFormat;
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = WebpayNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the transaction endpoint and the metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        logging::DEFAULT_DIRECTIVE,
        LogFormat::from_str_lossy(&args.log_format),
    );

    tracing::info!(
        role = args.role.as_str(),
        port = args.port,
        metrics_port = args.metrics_port,
        public_url = %args.public_url,
        data_dir = %args.data_dir.display(),
        "starting webpay-node"
    );

    // --- Credentials ---
    let credentials_path = args.data_dir.join(CREDENTIALS_FILE);
    let credentials = Credentials::load(&credentials_path).with_context(|| {
        format!(
            "failed to load credentials from {} (run `webpay-node init` first)",
            credentials_path.display()
        )
    })?;
    tracing::info!(
        network = %credentials.network,
        subject = %credentials.keys(args.role).certificate_path.subject(),
        "credentials loaded"
    );

    // --- Application state ---
    let transport = Arc::new(HttpsTransport::new().context("failed to build HTTP client")?);
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let urls = api::PublicUrls::from_base(&args.public_url);
    let app_state = api::build_state(
        args.role,
        &credentials,
        &urls,
        args.duplicate_finalize.into(),
        transport,
        Arc::clone(&node_metrics),
    )?;
    tracing::info!(
        authority_url = %urls.authority_url,
        transaction_url = %urls.transaction_url,
        "authority published"
    );

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("webpay-node stopped");
    Ok(())
}

/// Generates devnet roots and party credentials in the data directory.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("webpay_node=info", LogFormat::Pretty);

    let data_dir = &args.data_dir;
    let path = data_dir.join(CREDENTIALS_FILE);
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    if path.exists() && !args.force {
        bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let credentials = Credentials::generate_devnet(&args.provider_subject, &args.acquirer_subject)
        .context("failed to generate devnet credentials")?;
    credentials.save(&path)?;

    tracing::info!(path = %path.display(), "devnet credentials written");

    println!("Node initialized successfully.");
    println!("  Credentials : {}", path.display());
    println!("  Network     : {}", credentials.network);
    println!("  Provider    : {}", credentials.provider.certificate_path);
    println!("  Acquirer    : {}", credentials.acquirer.certificate_path);

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("webpay-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", webpay_protocol::config::PROTOCOL_VERSION);
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
