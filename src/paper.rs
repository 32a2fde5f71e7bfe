//! Paper-mode wiring: the full pipeline over in-process collaborators.
//!
//! Local keys stand in for KMS/HSM, static pools for venue liquidity and an
//! in-memory network for the chain. Used by the `paper` subcommand and by
//! integration tests.

use ethers::types::Address;
use std::sync::Arc;
use tracing::{info, warn};

use crate::broadcast::PaperNetwork;
use crate::compliance::LimitCompliance;
use crate::config::AppConfig;
use crate::error::{ExecutionError, Result, TradegateError};
use crate::execution::{ExecutionPipeline, PipelineComponents};
use crate::ledger::PortfolioLedger;
use crate::ml::{DenseModel, DenseNetwork, PredictiveModel};
use crate::persistence::ExecutionJournal;
use crate::services::ExecutionMetrics;
use crate::signing::{
    HsmCustodian, KmsCustodian, LocalHsm, LocalKey, LocalKms, SignerQuorum, DEV_HSM_KEY,
    DEV_KMS_KEY,
};
use crate::supervisor::AlertManager;
use crate::venue::{StaticLiquidity, VenueRegistry};

/// Environment variables holding the paper signer keys
pub const KMS_KEY_ENV: &str = "TRADEGATE_KMS_PRIVATE_KEY";
pub const HSM_KEY_ENV: &str = "TRADEGATE_HSM_PRIVATE_KEY";

pub struct PaperEnvironment {
    pub pipeline: Arc<ExecutionPipeline>,
    pub ledger: Arc<PortfolioLedger>,
    pub metrics: Arc<ExecutionMetrics>,
    pub journal: Arc<ExecutionJournal>,
    pub network: Arc<PaperNetwork>,
    pub liquidity: Arc<StaticLiquidity>,
    pub hsm: Arc<LocalHsm>,
    pub alerts: Arc<AlertManager>,
    /// KMS address; intents must name it as owner
    pub fee_payer: Address,
}

impl PaperEnvironment {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let network = PaperNetwork::new().with_congestion(config.paper.congested_submissions);
        Self::with_network(config, Arc::new(network))
    }

    /// Wire everything around a caller-supplied network
    pub fn with_network(config: &AppConfig, network: Arc<PaperNetwork>) -> Result<Self> {
        config.validate().map_err(TradegateError::InvalidConfig)?;

        let kms_key = LocalKey::from_env_or(KMS_KEY_ENV, DEV_KMS_KEY)?;
        let hsm_key = LocalKey::from_env_or(HSM_KEY_ENV, DEV_HSM_KEY)?;
        let (kms_address, hsm_address) = (kms_key.address(), hsm_key.address());
        check_expected_address("kms_address", config.custody.kms_address.as_deref(), kms_address)?;
        check_expected_address("hsm_address", config.custody.hsm_address.as_deref(), hsm_address)?;

        let custody = &config.custody;
        let kms = Arc::new(LocalKms::new().with_key(custody.kms_key_id.clone(), kms_key));
        let hsm = Arc::new(LocalHsm::new().with_slot(custody.hsm_slot, hsm_key));
        let quorum = SignerQuorum::new(
            Arc::new(KmsCustodian::new(kms, custody.kms_key_id.clone(), kms_address)),
            Arc::new(HsmCustodian::new(hsm.clone(), custody.hsm_slot, hsm_address)),
            custody.signer_timeout(),
        )
        .map_err(ExecutionError::from)?;

        let liquidity = Arc::new(StaticLiquidity::from_config(&config.paper.venues));
        let mut venues = VenueRegistry::new(liquidity.clone(), config.pipeline.liquidity_timeout());
        for venue in &config.paper.venues {
            venues.register(venue.id.clone(), venue.kind);
        }
        if config.paper.venues.is_empty() {
            warn!("No paper venues configured; every trade will fail as unsupported");
        }

        let model: Arc<dyn PredictiveModel> = match &config.paper.model_path {
            Some(path) => Arc::new(DenseModel::new(DenseNetwork::from_file(path)?)?),
            None => Arc::new(DenseModel::neutral()),
        };

        let journal = Arc::new(match &config.pipeline.journal_path {
            Some(path) => ExecutionJournal::with_file(path),
            None => ExecutionJournal::new(),
        });
        let ledger = Arc::new(PortfolioLedger::with_balances(
            config
                .paper
                .balances
                .iter()
                .map(|b| (b.asset.clone(), b.amount)),
        ));
        let metrics = Arc::new(ExecutionMetrics::new());
        let alerts = Arc::new(AlertManager::new(config.alerts.clone()));

        let pipeline = ExecutionPipeline::new(
            PipelineComponents {
                compliance: Arc::new(LimitCompliance::new(&config.paper.compliance)),
                model,
                venues,
                quorum,
                network: network.clone(),
                ledger: ledger.clone(),
                metrics: metrics.clone(),
                notifier: alerts.clone(),
                journal: journal.clone(),
            },
            &config.pipeline,
            &config.broadcast,
        );

        info!(
            fee_payer = ?kms_address,
            co_signer = ?hsm_address,
            venues = config.paper.venues.len(),
            "Paper environment ready"
        );

        Ok(Self {
            pipeline: Arc::new(pipeline),
            ledger,
            metrics,
            journal,
            network,
            liquidity,
            hsm,
            alerts,
            fee_payer: kms_address,
        })
    }
}

fn check_expected_address(name: &str, expected: Option<&str>, actual: Address) -> Result<()> {
    let Some(raw) = expected else {
        return Ok(());
    };
    let expected: Address = raw
        .parse()
        .map_err(|_| TradegateError::Validation(format!("custody.{name} is not an address")))?;
    if expected != actual {
        return Err(TradegateError::Wallet(format!(
            "custody.{name} {expected:?} does not match loaded key {actual:?}"
        )));
    }
    Ok(())
}
