//! soniclink-server: standalone LAN control server.
//!
//! Serves the reference in-memory player over the LAN control protocol so
//! remotes can connect without a full desktop host running.

use clap::Parser;
use rand::Rng;
use soniclink_server::config::ServerConfig;
use soniclink_server::{InMemoryPlayer, LanControlManager};
use soniclink_core::RejectAll;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// soniclink-server — LAN control server for remotes
#[derive(Parser, Debug)]
#[command(name = "soniclink-server", version, about = "LAN control server")]
struct Cli {
    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Pairing password (generated if omitted)
    #[arg(long)]
    password: Option<String>,

    /// Config file path
    #[arg(long, default_value = "~/.soniclink/server.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Six uppercase alphanumerics, like the pairing codes remotes expect.
fn generate_password() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    use tracing_subscriber::EnvFilter;
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let config_path = PathBuf::from(&cli.config);
    let server_config = match ServerConfig::load(
        Some(&config_path),
        cli.port,
        cli.password.as_deref(),
    ) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };

    let password = server_config
        .password
        .clone()
        .unwrap_or_else(generate_password);
    let control_config = server_config.into_control_config(password.clone());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = control_config.port,
        "starting soniclink-server"
    );

    let player = Arc::new(InMemoryPlayer::demo());
    let manager = LanControlManager::new(control_config, player, Arc::new(RejectAll));

    let status = match manager.start().await {
        Ok(status) => status,
        Err(e) => {
            error!(error = %e, "failed to start control server");
            std::process::exit(1);
        }
    };

    info!(port = status.port, password = %password, "ready for remotes");
    if let Some(addresses) = &status.addresses {
        for address in addresses {
            info!(address = %address, "reachable at");
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to wait for shutdown signal");
    }
    info!("shutting down");
    manager.stop().await;
}
