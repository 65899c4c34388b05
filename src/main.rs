//! TideKV server binary
//!
//! Reads the configuration, restores data from disk and serves clients
//! until Ctrl+C.

use std::path::PathBuf;
use tidekv::{Config, Server};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line options
#[derive(Debug, Default)]
struct Args {
    host: Option<String>,
    port: Option<u16>,
    config: Option<PathBuf>,
}

impl Args {
    /// Parse configuration from command-line arguments
    fn parse() -> Self {
        let mut parsed = Args::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    parsed.host = Some(value_of(&args, i, "--host"));
                    i += 2;
                }
                "--port" | "-p" => {
                    let port = value_of(&args, i, "--port");
                    parsed.port = Some(port.parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    }));
                    i += 2;
                }
                "--config" | "-c" => {
                    parsed.config = Some(PathBuf::from(value_of(&args, i, "--config")));
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("TideKV version {}", tidekv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        parsed
    }

    /// Builds the effective configuration: file, then environment, then flags.
    fn into_config(self) -> tidekv::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env()?;
        if let Some(host) = self.host {
            config.server.bind = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        config.validate()?;
        Ok(config)
    }
}

fn value_of(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(value) => value.clone(),
        None => {
            eprintln!("Error: {flag} requires a value");
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
TideKV - An In-Memory Key-Value Server

USAGE:
    tidekv [OPTIONS]

OPTIONS:
    -h, --host <HOST>      Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>      Port to listen on (default: 6379)
    -c, --config <FILE>    TOML configuration file
    -v, --version          Print version information
        --help             Print this help message

ENVIRONMENT:
    TIDEKV_BIND, TIDEKV_PORT, TIDEKV_DATABASES, TIDEKV_HZ,
    TIDEKV_ACTIVE_EXPIRE, TIDEKV_APPENDONLY, TIDEKV_APPENDFSYNC, TIDEKV_DIR
    RUST_LOG controls log verbosity (default: info)

EXAMPLES:
    tidekv                              # Start on 127.0.0.1:6379
    tidekv --port 6380                  # Start on port 6380
    tidekv --config /etc/tidekv.toml    # Load settings from a file
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    info!(
        version = tidekv::VERSION,
        databases = config.server.databases,
        hz = config.server.hz,
        appendonly = config.persistence.appendonly,
        appendfsync = %config.persistence.appendfsync,
        "Starting TideKV"
    );

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| tidekv::Error::Bind { addr: addr.clone(), source })?;
    info!(addr = %addr, "Listening");

    let server = Server::start(config)?;

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    server.run(listener, shutdown).await?;
    Ok(())
}
