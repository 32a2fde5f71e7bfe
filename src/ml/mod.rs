//! Advisory scoring: feature preprocessing, the model collaborator, and the
//! policy that turns a score into a slippage tolerance.

pub mod dense;
pub mod features;
pub mod scoring;

pub use dense::{Activation, DenseLayer, DenseModel, DenseNetwork};
pub use features::{preprocess, ModelFeatures, FEATURE_DIM};
#[cfg(test)]
pub use scoring::MockPredictiveModel;
pub use scoring::{PredictiveModel, Score, ScoreOutcome, ScoringPolicy};
