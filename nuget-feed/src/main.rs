//! `nuget-feed` command line
//!
//! `serve` runs the feed; `inspect` reads the identity out of a local package
//! archive the same way the server does on publish.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nuget_feed::{
    archive::PackageArchive, config::Config, logging, nuspec::NuspecField, run_server,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nuget-feed")]
#[command(about = "NuGet v3 package feed server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the feed server
    Serve {
        /// JSON configuration file; defaults apply when it does not exist
        #[arg(long, default_value = "nuget-feed.json")]
        config: PathBuf,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for package storage
        #[arg(long)]
        data: Option<PathBuf>,

        /// Public base URL of the feed
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Print the identity of a package archive
    Inspect {
        /// Path to a .nupkg file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = logging::init_subscriber();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            data,
            base_url,
        } => {
            let mut config = Config::load_or_default(&config)
                .with_context(|| format!("Failed to load {}", config.display()))?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data) = data {
                config.storage.data_dir = data;
            }
            if base_url.is_some() {
                config.server.base_url = base_url;
            }
            run_server(config).await
        }

        Commands::Inspect { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let nuspec = PackageArchive::new(&bytes)
                .read_nuspec()
                .with_context(|| format!("{} is not a valid package", file.display()))?;
            println!("id:      {}", nuspec.id().raw());
            println!("version: {}", nuspec.version().raw());
            println!("storage: {}", nuspec.identity().content_key());
            if let Some(authors) = nuspec.authors() {
                println!("authors: {authors}");
            }
            Ok(())
        }
    }
}
