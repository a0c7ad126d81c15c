//! `spotlink` – robot ↔ fleet backend bridge
//!
//! This binary wires the whole stack together:
//!
//! 1. Loads `~/.spotlink/config.toml` (writing a template on first run).
//! 2. Connects to rosbridge and feeds middleware topics into the event bus.
//! 3. Serves the trip command endpoints on `listen_port`.
//! 4. Starts the status reporter and the trip poller.
//! 5. Logs in to the fleet backend in the background, retrying until it
//!    succeeds.
//! 6. Intercepts **Ctrl-C** to shut every task down gracefully.

mod config;

use colored::Colorize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use spotlink_middleware::{BusGoalPublisher, EventBus, RosbridgeClient};
use spotlink_runtime::{Coordinator, HttpBackend, init_tracing};
use spotlink_server::{AppState, SpotlinkServer};

#[tokio::main]
async fn main() {
    // RUST_LOG filters (default "info"); SPOTLINK_LOG_FORMAT=json for JSON
    // lines; OTEL_EXPORTER_OTLP_ENDPOINT enables span export.
    let _telemetry = init_tracing("spotlink");

    print_banner();
    let cfg = load_config();

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let shutdown_ctrlc = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_ctrlc.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Shared state ──────────────────────────────────────────────────────
    let bus = Arc::new(EventBus::default());
    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&bus),
        Arc::new(HttpBackend::new(cfg.backend_url.clone(), cfg.spot_id.clone())),
        Arc::new(BusGoalPublisher::new(Arc::clone(&bus))),
        cfg.credentials(),
        cfg.coordinator_config(),
        shutdown.clone(),
    ));
    let listeners = coordinator.spawn_listeners();

    // ── Middleware + HTTP surface ─────────────────────────────────────────
    let rosbridge = tokio::spawn(
        RosbridgeClient::new(Arc::clone(&bus), cfg.rosbridge_config()).run(shutdown.clone()),
    );
    let server = tokio::spawn(
        SpotlinkServer::new(AppState::from_coordinator(&coordinator))
            .with_port(cfg.listen_port)
            .run(shutdown.clone()),
    );

    // ── Timers, then backend login ────────────────────────────────────────
    // The timers run with an empty token until a login succeeds.
    let reporter = coordinator.start_timers();
    let login = coordinator.spawn_login(cfg.login_retry(), cfg.login_attempts);
    let login_report = {
        let backend_url = cfg.backend_url.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match login.await {
                Ok(true) => println!("  {} Logged in to {}", "✓".green().bold(), backend_url.bold()),
                Ok(false) if !shutdown.is_cancelled() => {
                    warn!(backend = %backend_url, "gave up on backend login; running without a session")
                }
                Ok(false) => {}
                Err(e) => error!(error = %e, "login task panicked"),
            }
        })
    };

    report_server_exit(server.await);
    shutdown.cancel();

    let _ = login_report.await;
    let _ = reporter.await;
    let _ = rosbridge.await;
    for handle in listeners {
        let _ = handle.await;
    }
    println!("{}", "  ✓ Exiting spotlink.".green());
}

fn report_server_exit(result: Result<Result<(), spotlink_types::SpotError>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("command endpoint closed"),
        Ok(Err(e)) => error!(error = %e, "command endpoint failed"),
        Err(e) => error!(error = %e, "command endpoint task panicked"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

fn load_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Wrote config template to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   _____             __  ___       __  "#.bold().cyan());
    println!("{}", r#"  / ___/____  ____  / /_/ (_)___  / /__"#.bold().cyan());
    println!("{}", r#"  \__ \/ __ \/ __ \/ __/ / / __ \/ //_/"#.bold().cyan());
    println!("{}", r#" ___/ / /_/ / /_/ / /_/ / / / / / ,<   "#.bold().cyan());
    println!("{}", r#"/____/ .___/\____/\__/_/_/_/ /_/_/|_|  "#.bold().cyan());
    println!("{}", r#"    /_/                                "#.bold().cyan());
    println!();
    println!("  {} {}",
        "spotlink".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Robot ↔ fleet backend bridge");
    println!();
}
