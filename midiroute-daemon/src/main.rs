// Copyright 2025 Midiroute Contributors
// SPDX-License-Identifier: MIT

//! Midiroute daemon entry point
//!
//! Loads the routing configuration, builds the engine (catalog, session,
//! routing worker) over the midir backend, and runs until interrupted.
//!
//! Exit codes: 0 on clean shutdown, 1 on startup failure, 2 when the
//! configuration cannot be loaded.

use clap::Parser;
use midiroute_core::catalog::EndpointCatalog;
use midiroute_core::config::JsonLoopbackStore;
use midiroute_core::logging::{LoggingConfig, init_logging};
use midiroute_core::message_log::MessageLog;
use midiroute_core::route::RouteMatrix;
use midiroute_core::traffic::TrafficAnalyzer;
use midiroute_daemon::{
    MidiSession, MidirPortProvider, ProviderSet, RoutingWorker, RuntimeSupervisor, SessionConfig,
    WorkerConfig,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

/// Midiroute - MIDI routing daemon
///
/// Forwards MIDI messages between a changing set of input and output
/// endpoints according to per-route channel and message-type filters,
/// with hot-plug reconciliation and user-managed loopback endpoints.
#[derive(Parser, Debug)]
#[command(name = "midirouted")]
#[command(version)]
#[command(about = "Midiroute - MIDI routing daemon", long_about = None)]
struct Args {
    /// Path to the configuration file
    ///
    /// Defaults to <config dir>/midiroute/config.json. The loopback
    /// endpoint document lives next to it as endpoints.json.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run without console output (log to file only)
    #[arg(long)]
    background: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    verbose: bool,

    /// Enable trace-level logging
    #[arg(short = 'T', long)]
    trace: bool,
}

fn main() {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_dir().join("config.json"),
    };
    let endpoints_path = config_path
        .parent()
        .map(|dir| dir.join("endpoints.json"))
        .unwrap_or_else(|| PathBuf::from("endpoints.json"));

    let app_config = match midiroute_core::load_app_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: cannot load configuration {}: {e}", config_path.display());
            process::exit(2);
        }
    };

    let logging = logging_config(&args, app_config.logging.clone());
    if let Err(e) = init_logging(&logging) {
        eprintln!("Error: failed to initialize logging: {e}");
        process::exit(1);
    }

    info!("midirouted starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", config_path.display());
    info!(
        profile = app_config.active_profile_name(),
        routes = app_config.active_routes().len(),
        "configuration loaded"
    );

    // Engine wiring: midir backend → catalog/session, matrix from the
    // active profile, worker over the session's packet queue.
    let providers = ProviderSet::native(Arc::new(MidirPortProvider::new("midiroute")));
    let catalog = Arc::new(EndpointCatalog::new(
        Arc::new(providers.clone()),
        Arc::new(JsonLoopbackStore::new(&endpoints_path)),
    ));

    let matrix = Arc::new(RouteMatrix::new());
    if let Err(e) = matrix.replace_all(app_config.active_routes()) {
        eprintln!("Error: invalid route configuration: {e}");
        process::exit(2);
    }

    let message_log = Arc::new(MessageLog::with_capacity(app_config.log_buffer_size));
    let traffic = Arc::new(TrafficAnalyzer::new());

    let (session, packet_rx) =
        MidiSession::new(catalog.clone(), providers, SessionConfig::default());
    let worker = Arc::new(RoutingWorker::new(
        matrix,
        catalog.clone(),
        session.clone(),
        traffic,
        message_log,
        WorkerConfig::default(),
    ));
    let supervisor = RuntimeSupervisor::new(catalog, session, worker, packet_rx);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to create runtime: {e}");
            process::exit(1);
        }
    };

    let exit_code = runtime.block_on(async {
        if let Err(e) = supervisor.start().await {
            error!("startup failed: {e}");
            return 1;
        }

        info!("running, press Ctrl-C to stop");
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {e}");
        }

        supervisor.shutdown().await;
        0
    });

    process::exit(exit_code);
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("midiroute")
}

fn logging_config(args: &Args, configured: Option<LoggingConfig>) -> LoggingConfig {
    let mut logging = configured.unwrap_or_default();
    if args.trace {
        logging.level = "trace".to_string();
    } else if args.verbose {
        logging.level = "debug".to_string();
    }
    if args.background {
        // Background mode keeps the console quiet; everything goes to
        // the rotated file instead.
        logging.console_enabled = false;
        logging.file_enabled = true;
    }
    logging
}
