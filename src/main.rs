mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ref_indexer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Index {
            project,
            out,
            strategy,
            max_unsupported_kinds,
            snapshot_content,
        } => {
            cli::index_project(
                &project,
                &out,
                strategy,
                max_unsupported_kinds,
                snapshot_content,
            )
            .await?;
        }
        Commands::Stats { db } => {
            cli::show_stats(&db)?;
        }
    }

    Ok(())
}
