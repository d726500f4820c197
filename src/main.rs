use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use forager::app::{AppContext, RunContext};
use forager::cli::{commands, Cli, Commands};
use forager::config::Config;
use forager::pipeline::RunOptions;
use forager::session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let run = RunContext::new(!cli.quiet);

    // Logs go to stderr; stdout is reserved for per-item progress lines.
    let default_filter = if run.log_enabled { "info" } else { "error" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }

    let cookies_path = cli.cookies.unwrap_or_else(|| config.cookies_file.clone());
    let session = Session::load(&cookies_path);

    {
        let run = run.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Received termination signal, stopping gracefully");
                run.cancel();
            }
        });
    }

    let ctx = AppContext::new(config, session, run)?;

    match cli.command {
        Commands::Scrape {
            category_url,
            generate_urls,
            update_urls,
            force_refetch,
            force_reparse,
        } => {
            let opts = RunOptions {
                generate_urls,
                update_urls,
                force_refetch,
                force_reparse,
            };
            commands::scrape(&ctx, &category_url, &opts).await?;
        }
        Commands::Product { url } => {
            commands::product(&ctx, &url).await?;
        }
        Commands::Check { csv, output } => {
            commands::check(&ctx, &csv, output.as_deref()).await?;
        }
        Commands::Enrich { csv, output } => {
            commands::enrich(&ctx, &csv, output.as_deref()).await?;
        }
        Commands::Migrate { replace, update } => {
            commands::migrate(&ctx, replace, update)?;
        }
    }

    Ok(())
}
