//! THOR OCPP - CLI Server
//!
//! Headless OCPP 1.6J central system for one Growatt THOR charger.
//!
//! ```sh
//! # Run with default config (~/.config/thor-ocpp/config.toml)
//! thor-ocpp
//!
//! # Custom config path and ports
//! thor-ocpp --config /etc/thor-ocpp/config.toml --ws-port 9000 --api-port 8080
//!
//! # Validate config without starting
//! thor-ocpp --check
//!
//! # Read `refresh`, `state` and `quit` commands from stdin
//! thor-ocpp --console
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use thor_ocpp::config::AppConfig;
use thor_ocpp::server::{init_tracing, ServerHandle, ServerOptions};

/// THOR OCPP - OCPP 1.6J central system for a Growatt THOR charger.
#[derive(Parser, Debug)]
#[command(
    name = "thor-ocpp",
    version,
    about = "OCPP 1.6J central system for a Growatt THOR charger",
    long_about = "WebSocket OCPP 1.6J server plus a small admin HTTP API.\n\n\
                  Default config: ~/.config/thor-ocpp/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "THOR_OCPP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the admin API listen port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the OCPP WebSocket listen port.
    #[arg(long)]
    ws_port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,

    /// Accept `refresh`, `state` and `quit` on stdin.
    #[arg(long)]
    console: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.unwrap_or_else(thor_ocpp::default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) if cli.check => {
            eprintln!("❌ Invalid configuration in {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            error!("Failed to load config from {}: {}", config_path.display(), e);
            return Err(e.into());
        }
    };

    // ── Apply CLI overrides ────────────────────────────────────
    if let Some(port) = cli.api_port {
        config.api.port = port;
    }
    if let Some(port) = cli.ws_port {
        config.server.ws_port = port;
    }
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        println!("✅ Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!(
            "   OCPP        : ws://{}:{}{}/{{charge_point_id}}",
            config.server.ws_host, config.server.ws_port, config.server.base_path
        );
        if config.api.enabled {
            println!("   Admin API   : http://{}:{}", config.api.host, config.api.port);
        } else {
            println!("   Admin API   : disabled");
        }
        println!("   Max sessions: {}", config.server.max_sessions);
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    init_tracing(&config);
    info!("Configuration loaded from {}", config_path.display());

    // ── Start server ───────────────────────────────────────────
    let handle = ServerHandle::start(ServerOptions { config }).await?;
    handle.install_signal_handler();

    if cli.console {
        spawn_console(&handle);
    }

    info!("🚀 Press Ctrl+C to shutdown gracefully.");
    handle.wait().await;

    Ok(())
}

fn spawn_console(handle: &ServerHandle) {
    let refresh = handle.refresh.clone();
    let state = handle.state.clone();
    let shutdown = handle.shutdown_signal();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let output = match line.trim() {
                "" => continue,
                "refresh" => serde_json::to_string_pretty(&refresh.refresh().await),
                "state" => serde_json::to_string_pretty(&state.snapshot()),
                "quit" | "exit" => {
                    shutdown.trigger();
                    break;
                }
                other => {
                    warn!(command = other, "Unknown console command (refresh, state, quit)");
                    continue;
                }
            };
            match output {
                Ok(text) => println!("{text}"),
                Err(e) => error!("Failed to render output: {}", e),
            }
        }
    });
}
