use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tradegate::cli::{self, Cli, Commands, PaperTrade};
use tradegate::coordination::cancel_pair;
use tradegate::error::Result;
use tradegate::paper::PaperEnvironment;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, shutdown_signal};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::CheckConfig) | None => {
            init_logging_simple();
            let config = cli::load_config(&cli.config)?;
            cli::show_config(&config);
        }
        Some(Commands::Paper {
            venue,
            input_asset,
            amount,
            output_asset,
            expected,
            json,
        }) => {
            let config = cli::load_config(&cli.config)?;
            init_logging(&config.logging);

            let env = PaperEnvironment::from_config(&config)?;
            let intent = PaperTrade {
                venue: venue.clone(),
                input_asset: input_asset.clone(),
                amount: *amount,
                output_asset: output_asset.clone(),
                expected: *expected,
            }
            .into_intent(&env);
            let intent_id = intent.id;

            let (handle, signal) = cancel_pair();
            let pipeline = Arc::clone(&env.pipeline);
            let trade = tokio::spawn(async move {
                pipeline.execute_trade_with_cancel(&intent, signal).await
            });
            tokio::spawn(async move {
                shutdown_signal().await;
                warn!("Shutdown requested, cancelling trade before broadcast");
                handle.cancel();
            });

            match trade.await {
                Ok(Ok(tx_id)) => info!(%intent_id, %tx_id, "Paper trade executed"),
                Ok(Err(e)) => warn!(%intent_id, error = %e, "Paper trade failed"),
                Err(e) => warn!(%intent_id, error = %e, "Paper trade task aborted"),
            }

            println!();
            for record in env.journal.executions().await {
                cli::show_record(&record);
            }
            cli::show_paper_state(&env, *json).await?;
        }
    }

    Ok(())
}
