use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newsrelay::app::AppContext;
use newsrelay::cli::{commands, Cli, Commands};
use newsrelay::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newsrelay=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { dry_run: true } => {
            config.validate_pipeline()?;
            let ctx = AppContext::new(config, cli.db)?;
            commands::dry_run(&ctx).await?;
        }
        Commands::Run { dry_run: false } => {
            config.validate()?;
            let ctx = AppContext::new(config, cli.db)?;
            commands::run_once(&ctx).await?;
        }
        Commands::Serve => {
            config.validate()?;
            let ctx = AppContext::new(config, cli.db)?;
            commands::serve(&ctx).await?;
        }
        Commands::Sources => {
            config.validate_pipeline()?;
            commands::list_sources(&config)?;
        }
        Commands::Seen { limit } => {
            let ctx = AppContext::new(config, cli.db)?;
            commands::list_seen(&ctx, limit)?;
        }
    }

    Ok(())
}
