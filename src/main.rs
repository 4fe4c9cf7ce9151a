mod bulk;
mod cli;
mod config;
mod error;
mod export;
mod import;
mod ledger;
mod logging;
mod menu;
mod model;
mod prep;
mod prompt;
mod providers;
mod update;
mod util;
mod workflow;

use anyhow::Result;
use clap::Parser;

use cli::Cli;
use config::AppConfig;
use providers::jira::JiraClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = config::load_settings_file()?;
    logging::init()?;
    match settings {
        Some(path) => log::debug!("Loaded settings from {}", path.display()),
        None => log::debug!("No settings file found; using the environment only"),
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {e:#}");
            return Err(e);
        }
    };
    let client = JiraClient::from_config(&config);
    log::info!("Using Jira at {}", client.base_url());

    match cli.command {
        Some(command) => cli::run(command, &config, &client).await,
        None => menu::run(&config, &client).await,
    }
}
