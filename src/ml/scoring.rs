use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ModelFeatures;
use crate::config::PipelineConfig;
use crate::error::CollaboratorError;

/// Advisory model output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Model output, e.g. probability the fill meets expectation
    pub value: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl Score {
    pub fn is_finite(&self) -> bool {
        self.value.is_finite() && self.confidence.is_finite()
    }
}

/// Predictive-model collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictiveModel: Send + Sync {
    async fn predict(&self, features: &ModelFeatures) -> Result<Score, CollaboratorError>;
}

/// How the slippage tolerance for a trade was decided
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored(Score),
    /// Score unusable; conservative default applied
    Degraded { reason: String },
}

/// Translates a score into downstream execution parameters
#[derive(Debug, Clone)]
pub struct ScoringPolicy {
    pub min_confidence: f64,
    pub conservative_slippage_bps: Decimal,
    pub max_slippage_bps: Decimal,
    pub fail_closed: bool,
}

impl ScoringPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            min_confidence: config.min_confidence,
            conservative_slippage_bps: config.conservative_slippage_bps,
            max_slippage_bps: config.max_slippage_bps,
            fail_closed: config.fail_closed_scoring,
        }
    }

    /// Classify a model result; low confidence counts as degraded
    pub fn assess(&self, result: Result<Score, CollaboratorError>) -> ScoreOutcome {
        match result {
            Ok(score) if !score.is_finite() => ScoreOutcome::Degraded {
                reason: "non-finite score".to_string(),
            },
            Ok(score) if score.confidence < self.min_confidence => ScoreOutcome::Degraded {
                reason: format!(
                    "confidence {:.3} below {:.3}",
                    score.confidence, self.min_confidence
                ),
            },
            Ok(score) => ScoreOutcome::Scored(score),
            Err(e) => ScoreOutcome::Degraded {
                reason: e.to_string(),
            },
        }
    }

    /// Slippage tolerance in bps; scales from conservative to max with confidence
    pub fn slippage_bps(&self, outcome: &ScoreOutcome) -> Decimal {
        match outcome {
            ScoreOutcome::Degraded { .. } => self.conservative_slippage_bps,
            ScoreOutcome::Scored(score) => {
                let span = (1.0 - self.min_confidence).max(f64::EPSILON);
                let weight = ((score.confidence - self.min_confidence) / span).clamp(0.0, 1.0);
                let weight = Decimal::from_f64(weight).unwrap_or(Decimal::ZERO);
                let range = self.max_slippage_bps - self.conservative_slippage_bps;
                (self.conservative_slippage_bps + range * weight).round_dp(2)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn policy() -> ScoringPolicy {
        ScoringPolicy {
            min_confidence: 0.5,
            conservative_slippage_bps: dec!(30),
            max_slippage_bps: dec!(100),
            fail_closed: false,
        }
    }

    #[test]
    fn model_failure_degrades_to_conservative() {
        let p = policy();
        let outcome = p.assess(Err(CollaboratorError::timeout("model", 500)));
        assert!(matches!(outcome, ScoreOutcome::Degraded { .. }));
        assert_eq!(p.slippage_bps(&outcome), dec!(30));
    }

    #[test]
    fn low_confidence_and_nan_degrade() {
        let p = policy();
        let low = p.assess(Ok(Score {
            value: 0.9,
            confidence: 0.2,
        }));
        assert!(matches!(low, ScoreOutcome::Degraded { .. }));

        let nan = p.assess(Ok(Score {
            value: f64::NAN,
            confidence: 0.9,
        }));
        assert!(matches!(nan, ScoreOutcome::Degraded { .. }));
    }

    #[test]
    fn confidence_scales_tolerance() {
        let p = policy();
        let full = p.assess(Ok(Score {
            value: 1.0,
            confidence: 1.0,
        }));
        assert_eq!(p.slippage_bps(&full), dec!(100));

        let mid = p.assess(Ok(Score {
            value: 0.8,
            confidence: 0.75,
        }));
        assert_eq!(p.slippage_bps(&mid), dec!(65));
    }
}
