//! Memoix sync command-line tool
//!
//! Drives the sync engine against a local database and the configured
//! remote folder.
//!
//! Usage:
//!   memoix-sync --db ~/memoix.db repo add Kitchen local_folder ~/Dropbox/Memoix --activate
//!   memoix-sync push
//!
//! Logs go to stderr; `RUST_LOG` overrides the default level.

use anyhow::Result;
use clap::Parser;
use memoix_cli::{App, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let app = App::open(&cli).await?;
    let output = app.run(&cli.command).await?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
