//! # roomcastd
//!
//! Relay server binary — loads configuration, wires the engine to the HTTP
//! front end, and runs until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use roomcast_engine::{run_reaper, Hub, HubConfig};
use roomcast_server::auth::Authenticator;
use roomcast_server::config::RelayConfig;
use roomcast_server::{metrics, RelayServer};
use tracing_subscriber::EnvFilter;

/// roomcast relay server.
#[derive(Parser, Debug)]
#[command(name = "roomcastd", about = "roomcast relay server")]
struct Cli {
    /// Path to a JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

/// How long shutdown waits for sessions and the reaper to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Subcommand, Debug)]
enum Command {
    /// Mint an access token for the configured secret and exit.
    GenerateToken,
}

fn load_config(cli: &Cli) -> Result<RelayConfig> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RelayConfig::from_env(),
    };
    if let Some(host) = &cli.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

fn init_tracing(config: &RelayConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Some(Command::GenerateToken) = cli.command {
        if config.auth.secret.is_empty() {
            bail!("cannot generate a token: no auth secret configured (set ROOMCAST_SECRET or auth.secret)");
        }
        println!("{}", Authenticator::new(&config.auth.secret).generate_token());
        return Ok(());
    }

    init_tracing(&config);

    let metrics_handle = metrics::install_recorder();

    let hub = Arc::new(Hub::new(HubConfig {
        room_capacity: config.rooms.max_members,
    }));

    let server = RelayServer::new(config.clone(), hub.clone(), metrics_handle);

    let reaper_handle = tokio::spawn(run_reaper(
        hub.clone(),
        Duration::from_secs(config.session.reaper_interval_secs),
        Duration::from_secs(config.session.idle_timeout_secs),
        server.shutdown().token(),
    ));

    let (addr, server_handle) = server.listen().await.context("failed to bind server")?;
    tracing::info!("roomcast relay listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down...");
    server
        .shutdown()
        .drain(vec![server_handle, reaper_handle], SHUTDOWN_GRACE)
        .await;
    hub.shutdown();

    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["roomcastd"]);
        assert!(cli.config.is_none());
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_overrides_apply() {
        let cli = Cli::parse_from(["roomcastd", "--host", "127.0.0.1", "--port", "9000"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn cli_generate_token_subcommand() {
        let cli = Cli::parse_from(["roomcastd", "generate-token"]);
        assert!(matches!(cli.command, Some(Command::GenerateToken)));
    }

    #[test]
    fn config_file_feeds_the_cli() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"auth": {{"secret": "s3cret"}}}}"#).unwrap();

        let cli = Cli::parse_from([
            "roomcastd",
            "--config",
            f.path().to_str().unwrap(),
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.auth.secret, "s3cret");
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cli = Cli::parse_from(["roomcastd", "--config", "/nonexistent/cfg.json"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.server.port, 8080);
    }
}
