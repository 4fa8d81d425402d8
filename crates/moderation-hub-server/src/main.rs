mod api;
mod catalog;
mod config;
mod models;
mod moderation_db;
mod moderation_service;
mod openapi;
mod resolver;
mod startup;
mod state;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "moderation-hub-server", version)]
pub(crate) struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:5000 (overrides PORT and config)
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,

    /// Optional server config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the frontend index.html
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,moderation_hub_server=info")
        }))
        .init();

    startup::run(args).await
}
