//! chatline - conversation pipeline CLI

mod app;
mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use chatline_config::ConfigLoader;
use chatline_conversation::Surface;
use chatline_security::RedactingWriter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("warning: failed to load .env: {e}");
        }
    }
    init_tracing();

    let cli = Cli::parse();

    let loader = ConfigLoader::new()?;
    let config = match &cli.config {
        Some(path) => loader.load_from(path)?,
        None => loader.load()?,
    };

    let surface: Surface = cli.surface.parse()?;
    let surfaces = app::build_surfaces(&config, cli.actor.clone())?;
    let orchestrator = surfaces.get(surface);
    tracing::debug!(%surface, namespace = orchestrator.namespace(), "surface selected");

    commands::run(orchestrator, cli.command, cli.json).await
}

/// Log to stderr through the secret-redacting writer. `RUST_LOG` overrides
/// the default level.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(RedactingWriter::stderr()))
        .init();
}
