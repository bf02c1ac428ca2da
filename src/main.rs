use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use netlens::cli::{self, Cli};
use netlens::config::{config_path, Config};
use netlens::logger::init_logging;
use netlens::services::NetlensService;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // La configuration détermine aussi le mode de log
    let config = Config::load(cli.config.as_deref()).context("chargement de la configuration")?;
    init_logging(&config);
    info!("netlens {} démarré", env!("CARGO_PKG_VERSION"));

    let path = config_path(cli.config.as_deref());
    if path.exists() {
        info!("Configuration chargée depuis {}", path.display());
    } else {
        info!("Configuration {} absente, valeurs par défaut", path.display());
    }

    let service = NetlensService::from_config(config).context("initialisation du service")?;
    cli::run(cli.command, Arc::new(service)).await
}
