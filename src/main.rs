use clap::Parser;

use runnel::app::AppContext;
use runnel::cli::{commands, Cli, Commands};
use runnel::config::{Config, Credentials};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    runnel::logging::init(&config.logging)?;

    match cli.command {
        Commands::Run => {
            // Missing credentials or an unusable store stop startup here.
            let credentials = Credentials::from_env()?;
            let ctx = AppContext::open(config, &credentials.database_url)?;
            commands::run(ctx, &credentials).await?;
        }
        Commands::Bootstrap => {
            let ctx = AppContext::open(config, &Credentials::database_url_from_env()?)?;
            commands::bootstrap(&ctx);
        }
        Commands::Feeds => {
            let ctx = AppContext::open(config, &Credentials::database_url_from_env()?)?;
            commands::list_feeds(&ctx)?;
        }
        Commands::Preview { url, format, limit } => {
            commands::preview(&url, format.as_deref(), limit).await?;
        }
    }

    Ok(())
}
