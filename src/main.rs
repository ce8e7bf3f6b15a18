//! factord: a prime factorization server
//!
//! This server speaks a line-oriented text protocol:
//! - `factor <target> <low> <high>` asks for the prime factors of `target`
//!   that lie between `low` and `high` inclusive
//! - the server answers with `found`/`done` reply lines, or `invalid` for
//!   requests that fail validation
//!
//! Features:
//! - Arbitrary-precision targets and range bounds
//! - Probabilistic primality testing with a configurable certainty
//! - One client served at a time; per-connection failures never stop the
//!   accept loop
//! - Configuration via CLI arguments or TOML file

mod config;
mod engine;
mod protocol;
mod server;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        certainty = config.certainty,
        "Starting factord server"
    );

    let server = Server::bind(&config).await?;
    server.serve().await?;

    Ok(())
}
