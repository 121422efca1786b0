//! OCPP CSMS — headless CLI server.
//!
//! Runs the OCPP 1.5/1.6 Central System suitable for deployment as a
//! systemd service or container process.
//!
//! ```sh
//! # Run with default config (~/.config/ocpp-csms/config.toml)
//! ocpp-csms
//!
//! # Custom config path
//! ocpp-csms --config /etc/ocpp-csms/config.toml
//!
//! # Validate config without starting
//! ocpp-csms --check
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use ocpp_core::config::AppConfig;
use ocpp_core::server::{init_tracing, ServerHandle, ServerOptions};

/// OCPP 1.5/1.6 Central System for EV charging stations.
#[derive(Parser, Debug)]
#[command(
    name = "ocpp-csms",
    version,
    about = "OCPP Central System for EV charging station management",
    long_about = "WebSocket (OCPP 1.6/JSON) + SOAP (OCPP 1.5/XML) ingress \
                  for EV charging stations.\n\n\
                  Default config: ~/.config/ocpp-csms/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "OCPP_CONFIG")]
    config: Option<PathBuf>,

    /// Override the REST/SOAP listen port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the WebSocket listen port.
    #[arg(long)]
    ws_port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit without starting the server.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(ocpp_core::config::default_config_path);

    let mut config = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            init_tracing(&cfg);
            info!("Configuration loaded from {}", config_path.display());
            cfg
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            error!("Failed to load config from {}: {}", config_path.display(), e);
            error!("Using default configuration.");
            AppConfig::default()
        }
    };

    if let Some(port) = cli.api_port {
        info!(port, "CLI override: api_port");
        config.server.api_port = port;
    }
    if let Some(port) = cli.ws_port {
        info!(port, "CLI override: ws_port");
        config.server.ws_port = port;
    }
    if let Some(ref level) = cli.log_level {
        info!(level, "CLI override: log_level");
        config.logging.level = level.clone();
    }

    if cli.check {
        println!("Configuration is valid");
        println!("  Config file : {}", config_path.display());
        println!("  API address : {}:{}", config.server.api_host, config.server.api_port);
        println!("  WS address  : {}:{}", config.server.ws_host, config.server.ws_port);
        println!("  Log level   : {}", config.logging.level);
        return Ok(());
    }

    let handle = ServerHandle::start(ServerOptions { config }).await?;
    handle.install_signal_handler();

    info!("Press Ctrl+C to shut down gracefully.");
    handle.shutdown_signal().wait().await;
    handle.wait().await;

    Ok(())
}
