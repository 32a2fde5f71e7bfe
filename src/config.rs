use config::{Config, ConfigError, Environment, File};
use ethers::types::Address;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::supervisor::AlertManagerConfig;
use crate::venue::{BookLevel, VenueKind};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub custody: CustodyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub alerts: AlertManagerConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Timeout for the compliance collaborator in milliseconds
    #[serde(default = "default_compliance_timeout")]
    pub compliance_timeout_ms: u64,
    /// Timeout for model inference in milliseconds
    #[serde(default = "default_model_timeout")]
    pub model_timeout_ms: u64,
    /// Timeout for venue liquidity reads in milliseconds
    #[serde(default = "default_liquidity_timeout")]
    pub liquidity_timeout_ms: u64,
    /// Abort the trade instead of degrading when scoring fails
    #[serde(default)]
    pub fail_closed_scoring: bool,
    /// Scores below this confidence fall back to the conservative tolerance
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Slippage tolerance used when the score is missing or weak (bps)
    #[serde(default = "default_conservative_slippage")]
    pub conservative_slippage_bps: Decimal,
    /// Upper bound on slippage tolerance for high-confidence scores (bps)
    #[serde(default = "default_max_slippage")]
    pub max_slippage_bps: Decimal,
    /// Append execution records as JSON lines to this file
    #[serde(default)]
    pub journal_path: Option<String>,
}

fn default_compliance_timeout() -> u64 {
    2000
}

fn default_model_timeout() -> u64 {
    500
}

fn default_liquidity_timeout() -> u64 {
    2000
}

fn default_min_confidence() -> f64 {
    0.55
}

fn default_conservative_slippage() -> Decimal {
    Decimal::from(30)
}

fn default_max_slippage() -> Decimal {
    Decimal::from(100)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compliance_timeout_ms: default_compliance_timeout(),
            model_timeout_ms: default_model_timeout(),
            liquidity_timeout_ms: default_liquidity_timeout(),
            fail_closed_scoring: false,
            min_confidence: default_min_confidence(),
            conservative_slippage_bps: default_conservative_slippage(),
            max_slippage_bps: default_max_slippage(),
            journal_path: None,
        }
    }
}

impl PipelineConfig {
    pub fn compliance_timeout(&self) -> Duration {
        Duration::from_millis(self.compliance_timeout_ms)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    pub fn liquidity_timeout(&self) -> Duration {
        Duration::from_millis(self.liquidity_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Maximum submission attempts (including the first)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Linear backoff base: wait base * attempt after a retryable failure
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Per-submission timeout; a timeout is treated as an ambiguous outcome
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_ms: u64,
    /// Timeout for status lookups after an ambiguous outcome
    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    100
}

fn default_submit_timeout() -> u64 {
    5000
}

fn default_lookup_timeout() -> u64 {
    2000
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            submit_timeout_ms: default_submit_timeout(),
            lookup_timeout_ms: default_lookup_timeout(),
        }
    }
}

impl BroadcastConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustodyConfig {
    /// Key identifier in the cloud key-management service
    #[serde(default = "default_kms_key_id")]
    pub kms_key_id: String,
    /// Physical HSM slot to open a session against
    #[serde(default)]
    pub hsm_slot: u64,
    /// Per-signer call timeout in milliseconds
    #[serde(default = "default_signer_timeout")]
    pub signer_timeout_ms: u64,
    /// Known KMS public address (hex); derived from the signer when unset
    #[serde(default)]
    pub kms_address: Option<String>,
    /// Known HSM public address (hex); derived from the signer when unset
    #[serde(default)]
    pub hsm_address: Option<String>,
}

fn default_kms_key_id() -> String {
    "tradegate-fee-payer".to_string()
}

fn default_signer_timeout() -> u64 {
    3000
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            kms_key_id: default_kms_key_id(),
            hsm_slot: 0,
            signer_timeout_ms: default_signer_timeout(),
            kms_address: None,
            hsm_address: None,
        }
    }
}

impl CustodyConfig {
    pub fn signer_timeout(&self) -> Duration {
        Duration::from_millis(self.signer_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Paper-mode collaborators (local keys, static pools, in-memory network)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PaperConfig {
    #[serde(default)]
    pub venues: Vec<PaperVenueConfig>,
    /// Opening ledger balances
    #[serde(default)]
    pub balances: Vec<BalanceConfig>,
    #[serde(default)]
    pub compliance: ComplianceLimits,
    /// Path to a JSON dense-network model; a neutral model is used when unset
    #[serde(default)]
    pub model_path: Option<String>,
    /// Number of submissions the paper network drops before accepting
    #[serde(default)]
    pub congested_submissions: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperVenueConfig {
    pub id: String,
    pub kind: VenueKind,
    pub input_asset: String,
    pub output_asset: String,
    #[serde(default)]
    pub reserve_in: Decimal,
    #[serde(default)]
    pub reserve_out: Decimal,
    #[serde(default)]
    pub fee_bps: u32,
    /// Ask levels for order-book venues, best first
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

/// Listed rather than keyed by asset: config keys are case-folded
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceConfig {
    pub asset: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ComplianceLimits {
    /// Maximum input amount per trade (0 = unlimited)
    #[serde(default)]
    pub max_input_amount: Decimal,
    /// Assets that may not be traded in either direction
    #[serde(default)]
    pub blocked_assets: Vec<String>,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overrides (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRADEGATE_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // TRADEGATE__BROADCAST__MAX_ATTEMPTS=5, etc.
            .add_source(
                Environment::with_prefix("TRADEGATE")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.broadcast.max_attempts == 0 {
            errors.push("broadcast.max_attempts must be at least 1".to_string());
        }
        if self.broadcast.submit_timeout_ms == 0 {
            errors.push("broadcast.submit_timeout_ms must be positive".to_string());
        }

        let p = &self.pipeline;
        if p.compliance_timeout_ms == 0 || p.model_timeout_ms == 0 || p.liquidity_timeout_ms == 0 {
            errors.push("pipeline timeouts must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&p.min_confidence) {
            errors.push("pipeline.min_confidence must be between 0 and 1".to_string());
        }
        if p.conservative_slippage_bps < Decimal::ZERO {
            errors.push("pipeline.conservative_slippage_bps must not be negative".to_string());
        }
        if p.max_slippage_bps < p.conservative_slippage_bps {
            errors.push(
                "pipeline.max_slippage_bps must be >= conservative_slippage_bps".to_string(),
            );
        }

        if self.alerts.max_alerts_per_minute == 0 {
            errors.push("alerts.max_alerts_per_minute must be at least 1".to_string());
        }

        if self.custody.signer_timeout_ms == 0 {
            errors.push("custody.signer_timeout_ms must be positive".to_string());
        }
        if self.custody.kms_key_id.trim().is_empty() {
            errors.push("custody.kms_key_id must not be empty".to_string());
        }
        for (name, addr) in [
            ("kms_address", &self.custody.kms_address),
            ("hsm_address", &self.custody.hsm_address),
        ] {
            if let Some(raw) = addr {
                if raw.parse::<Address>().is_err() {
                    errors.push(format!("custody.{name} is not a valid address: {raw}"));
                }
            }
        }
        if let (Some(kms), Some(hsm)) = (&self.custody.kms_address, &self.custody.hsm_address) {
            if kms.eq_ignore_ascii_case(hsm) {
                errors.push("custody signers must use distinct keys".to_string());
            }
        }

        for balance in &self.paper.balances {
            if balance.amount < Decimal::ZERO {
                errors.push(format!("paper balance for {} must not be negative", balance.asset));
            }
        }

        for venue in &self.paper.venues {
            match venue.kind {
                VenueKind::ConstantProduct => {
                    if venue.reserve_in <= Decimal::ZERO || venue.reserve_out <= Decimal::ZERO {
                        errors.push(format!("paper venue {} needs positive reserves", venue.id));
                    }
                    if venue.fee_bps >= 10_000 {
                        errors.push(format!("paper venue {} fee_bps must be < 10000", venue.id));
                    }
                }
                VenueKind::OrderBook => {
                    if venue.asks.is_empty() {
                        errors.push(format!("paper venue {} needs at least one ask", venue.id));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base() -> AppConfig {
        AppConfig {
            pipeline: PipelineConfig::default(),
            broadcast: BroadcastConfig::default(),
            custody: CustodyConfig::default(),
            logging: LoggingConfig::default(),
            alerts: AlertManagerConfig::default(),
            paper: PaperConfig::default(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = base();
        assert_eq!(cfg.broadcast.max_attempts, 3);
        assert_eq!(cfg.broadcast.base_delay(), Duration::from_millis(100));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_collects_every_problem() {
        let mut cfg = base();
        cfg.broadcast.max_attempts = 0;
        cfg.pipeline.min_confidence = 1.5;
        cfg.custody.kms_address = Some("not-an-address".into());
        cfg.paper.venues.push(PaperVenueConfig {
            id: "V1".into(),
            kind: VenueKind::ConstantProduct,
            input_asset: "A".into(),
            output_asset: "B".into(),
            reserve_in: dec!(0),
            reserve_out: dec!(1000),
            fee_bps: 30,
            asks: vec![],
        });

        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
    }

    #[test]
    fn same_key_for_both_custodians_is_rejected() {
        let mut cfg = base();
        let addr = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string();
        cfg.custody.kms_address = Some(addr.clone());
        cfg.custody.hsm_address = Some(addr.to_uppercase().replace("0X", "0x"));
        let errors = cfg.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("distinct")));
    }

    #[test]
    fn negative_opening_balance_is_rejected() {
        let mut cfg = base();
        cfg.paper.balances.push(BalanceConfig {
            asset: "USDC".into(),
            amount: dec!(-1),
        });
        let errors = cfg.validate().unwrap_err();
        assert_eq!(errors, vec!["paper balance for USDC must not be negative".to_string()]);
    }

    #[test]
    fn shipped_default_config_loads() {
        let cfg = AppConfig::load_from(concat!(env!("CARGO_MANIFEST_DIR"), "/config")).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.paper.venues.len(), 2);
        assert_eq!(cfg.paper.venues[0].kind, VenueKind::ConstantProduct);
        assert!(cfg
            .paper
            .balances
            .iter()
            .any(|b| b.asset == "USDC" && b.amount == dec!(10000)));
        assert_eq!(cfg.paper.compliance.blocked_assets, vec!["SANCTIONED".to_string()]);
    }
}
