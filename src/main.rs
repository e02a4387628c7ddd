// src/main.rs

//! The main entry point for the ChatRelay server application.

use anyhow::Result;
use chatrelay::config::Config;
use chatrelay::core::ChatRelayError;
use chatrelay::server;
use std::env;
use std::path::Path;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("ChatRelay version {VERSION}");
        return Ok(());
    }

    // Logging comes up first so config loading can warn; the filter is swapped
    // for the configured level once the config is known.
    let env_log_level = env::var("RUST_LOG").ok();
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(
        env_log_level.as_deref().unwrap_or("info"),
    ));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true), // Enable ANSI color codes for log levels.
        )
        .init();

    // Determine the configuration path. An explicit --config must exist; the
    // default file is optional and built-in defaults apply without it.
    let explicit_path = args
        .iter()
        .position(|arg| arg == "--config")
        .map(|i| args.get(i + 1).map(|s| s.as_str()));
    let mut config = match explicit_path {
        Some(Some(path)) => load_or_exit(path),
        Some(None) => {
            eprintln!("--config flag requires a value");
            std::process::exit(1);
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => load_or_exit(DEFAULT_CONFIG_PATH),
        None => Config::default(),
    };

    // Override port if provided as a command-line argument
    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) if port != 0 => config.port = port,
                _ => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
    }

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    // RUST_LOG wins over the config file.
    if env_log_level.is_none() {
        if let Err(e) = reload_handle.reload(EnvFilter::new(&config.log_level)) {
            eprintln!("Failed to apply log level \"{}\": {e}", config.log_level);
        }
    }

    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {}", e);
        if let Some(err) = e.downcast_ref::<ChatRelayError>() {
            if err.is_construction_error() {
                error!("Failed to initialize server components: {}", err);
            }
        }
        return Err(e);
    }

    Ok(())
}

fn load_or_exit(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{path}\": {e:#}");
            std::process::exit(1);
        }
    }
}
