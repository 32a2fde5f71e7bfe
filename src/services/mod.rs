pub mod metrics;

#[cfg(test)]
pub use metrics::MockMetricsSink;
pub use metrics::{ExecutionMetrics, ExecutionTimer, MetricsSink};
