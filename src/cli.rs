use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::domain::{AssetAmount, ExecutionRecord, TradeIntent};
use crate::error::{Result, TradegateError};
use crate::paper::PaperEnvironment;
use crate::persistence::JournalEntry;

#[derive(Parser)]
#[command(name = "tradegate")]
#[command(version = "0.1.0")]
#[command(about = "Compliance-gated, dual-custody trade execution pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory (default.toml plus TRADEGATE_ENV overrides)
    #[arg(short, long, default_value = "config")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate configuration, then print it
    CheckConfig,
    /// Run one trade through the full pipeline against paper collaborators
    Paper {
        /// Venue id from [[paper.venues]]
        #[arg(long, default_value = "V1")]
        venue: String,
        /// Asset to spend
        #[arg(long, default_value = "USDC")]
        input_asset: String,
        /// Amount of the input asset
        #[arg(long)]
        amount: Decimal,
        /// Asset to receive
        #[arg(long, default_value = "SOL")]
        output_asset: String,
        /// Output the caller expects before slippage
        #[arg(long)]
        expected: Decimal,
        /// Print the journal as JSON lines
        #[arg(long)]
        json: bool,
    },
}

/// Intent for the paper command; the fee payer always owns the trade
#[derive(Debug, Clone)]
pub struct PaperTrade {
    pub venue: String,
    pub input_asset: String,
    pub amount: Decimal,
    pub output_asset: String,
    pub expected: Decimal,
}

impl PaperTrade {
    pub fn into_intent(self, env: &PaperEnvironment) -> TradeIntent {
        TradeIntent::new(
            self.venue,
            env.fee_payer,
            AssetAmount::new(self.input_asset, self.amount),
            self.output_asset,
            self.expected,
        )
    }
}

pub fn load_config(dir: &Path) -> Result<AppConfig> {
    let config = AppConfig::load_from(dir)?;
    config.validate().map_err(TradegateError::InvalidConfig)?;
    Ok(config)
}

/// Print the effective configuration
pub fn show_config(config: &AppConfig) {
    println!("Configuration OK\n");
    println!("  Pipeline:");
    println!(
        "    compliance timeout: {}ms, model timeout: {}ms, liquidity timeout: {}ms",
        config.pipeline.compliance_timeout_ms,
        config.pipeline.model_timeout_ms,
        config.pipeline.liquidity_timeout_ms
    );
    println!(
        "    scoring: {} (min confidence {})",
        if config.pipeline.fail_closed_scoring { "fail-closed" } else { "degrade" },
        config.pipeline.min_confidence
    );
    println!(
        "    slippage: conservative {} bps, max {} bps",
        config.pipeline.conservative_slippage_bps, config.pipeline.max_slippage_bps
    );
    println!("  Broadcast:");
    println!(
        "    max attempts: {}, base delay: {}ms",
        config.broadcast.max_attempts, config.broadcast.base_delay_ms
    );
    println!("  Custody:");
    println!(
        "    kms key: {}, hsm slot: {}, signer timeout: {}ms",
        config.custody.kms_key_id, config.custody.hsm_slot, config.custody.signer_timeout_ms
    );
    println!("  Paper venues:");
    if config.paper.venues.is_empty() {
        println!("    (none)");
    }
    for venue in &config.paper.venues {
        println!(
            "    {} [{}] {} -> {}",
            venue.id,
            venue.kind.as_str(),
            venue.input_asset,
            venue.output_asset
        );
    }
    println!();
}

pub fn show_record(record: &ExecutionRecord) {
    let status = match record.error {
        None => format!("\x1b[32m{}\x1b[0m", record.status),
        Some(_) => format!("\x1b[31m{}\x1b[0m", record.status),
    };
    println!("  Intent:   {}", record.intent_id);
    println!("  Status:   {status}");
    if let Some(tx) = &record.tx_id {
        println!("  Tx:       {tx}");
    }
    println!("  Latency:  {}ms", record.latency_ms);
    if let Some(bps) = record.slippage_bps {
        println!("  Slippage: {bps} bps");
    }
    if let (Some(stage), Some(err)) = (&record.failed_stage, &record.error) {
        println!("  Failed:   {stage}: {err}");
    }
}

/// Balances, metrics and journal after a paper run
pub async fn show_paper_state(env: &PaperEnvironment, json: bool) -> Result<()> {
    println!("\n  Balances:");
    for (asset, amount) in env.ledger.snapshot().await {
        println!("    {asset}: {amount}");
    }

    println!("\n  Metrics: {}", env.metrics.summary());

    let entries = env.journal.len().await;
    println!("\n  Journal ({entries} entries):");
    for record in env.journal.reconciliations().await {
        println!(
            "    \x1b[33mRECONCILE\x1b[0m {} tx={} confirmed={}: {}",
            record.intent_id, record.tx_id, record.broadcast_confirmed, record.reason
        );
    }
    if json {
        for record in env.journal.executions().await {
            println!("{}", serde_json::to_string(&JournalEntry::Execution(record))?);
        }
        println!("\n{}", env.metrics.prometheus());
    }
    println!();
    Ok(())
}
