use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vfs_hook::cli::handle_command;
use vfs_hook::config::Config;
use vfs_hook::Commands;

#[derive(Parser, Debug)]
#[command(name = "vfs-hook", version)]
#[command(about = "Gate filesystem operations on a hook script")]
struct Cli {
    /// Path to config file (default: <config dir>/vfs-hook/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vfs_hook=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    handle_command(cli.command, &config).await
}
