use anyhow::Context;
use clap::Parser;
use tracing::info;

use routeplane::cli::{run_serve, run_validate, Cli, Commands};
use routeplane::observability::{init_observability, log_config_info};
use routeplane::{AppConfig, APP_NAME, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists; must happen before any config is read
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    let mut config = AppConfig::from_env().context("failed to load configuration")?;
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }

    match cli.command {
        Commands::Serve { manifests, overrides } => {
            overrides.apply(&mut config).context("invalid command line overrides")?;
            init_observability(&config.observability)?;

            info!(app_name = APP_NAME, version = VERSION, "Starting routeplane control plane");
            log_config_info(&config);

            run_serve(&manifests, config).await.context("xDS server terminated")?;
            info!("Control plane shutdown completed");
        }
        Commands::Validate { paths, output, overrides } => {
            overrides.apply(&mut config).context("invalid command line overrides")?;
            let summary = run_validate(&paths, &config, output)?;
            print!("{}", summary);
        }
    }

    Ok(())
}
