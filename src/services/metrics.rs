use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::domain::ExecutionStatus;

/// Latency histogram upper bounds in milliseconds
const LATENCY_BUCKETS_MS: [u64; 10] = [5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000];

/// Telemetry collaborator
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    fn record_latency(&self, venue: &str, status: ExecutionStatus, elapsed: Duration);

    /// Realized slippage in basis points (positive = worse than expected)
    fn record_slippage(&self, venue: &str, slippage_bps: Decimal);

    fn increment_critical_errors(&self, kind: &str);
}

/// In-process execution metrics with Prometheus text export
pub struct ExecutionMetrics {
    executed: AtomicU64,
    rejected: AtomicU64,
    errored: AtomicU64,
    critical_errors: AtomicU64,
    latency_buckets: [AtomicU64; LATENCY_BUCKETS_MS.len()],
    latency_count: AtomicU64,
    latency_sum_ms: AtomicU64,
    last_slippage_bps: RwLock<Decimal>,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self {
            executed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            errored: AtomicU64::new(0),
            critical_errors: AtomicU64::new(0),
            latency_buckets: Default::default(),
            latency_count: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
            last_slippage_bps: RwLock::new(Decimal::ZERO),
        }
    }

    pub fn critical_errors(&self) -> u64 {
        self.critical_errors.load(Ordering::Relaxed)
    }

    /// Runs observed with the given final status
    pub fn count(&self, status: ExecutionStatus) -> u64 {
        match status {
            ExecutionStatus::Executed => self.executed.load(Ordering::Relaxed),
            ExecutionStatus::Rejected => self.rejected.load(Ordering::Relaxed),
            ExecutionStatus::Errored => self.errored.load(Ordering::Relaxed),
        }
    }

    pub fn latency_samples(&self) -> u64 {
        self.latency_count.load(Ordering::Relaxed)
    }

    pub fn last_slippage_bps(&self) -> Decimal {
        *self.last_slippage_bps.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Short human-readable status block
    pub fn summary(&self) -> String {
        let samples = self.latency_samples();
        let avg_ms = if samples > 0 {
            self.latency_sum_ms.load(Ordering::Relaxed) / samples
        } else {
            0
        };
        format!(
            "executed={} rejected={} errored={} critical={} avg_latency_ms={} last_slippage_bps={}",
            self.count(ExecutionStatus::Executed),
            self.count(ExecutionStatus::Rejected),
            self.count(ExecutionStatus::Errored),
            self.critical_errors(),
            avg_ms,
            self.last_slippage_bps(),
        )
    }

    pub fn log_status(&self) {
        info!("{}", self.summary());
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP tradegate_executions_total Pipeline runs by final status\n");
        out.push_str("# TYPE tradegate_executions_total counter\n");
        for status in [
            ExecutionStatus::Executed,
            ExecutionStatus::Rejected,
            ExecutionStatus::Errored,
        ] {
            out.push_str(&format!(
                "tradegate_executions_total{{status=\"{}\"}} {}\n",
                status.to_string().to_lowercase(),
                self.count(status)
            ));
        }

        out.push_str("\n# HELP tradegate_critical_errors_total Escalated pipeline failures\n");
        out.push_str("# TYPE tradegate_critical_errors_total counter\n");
        out.push_str(&format!(
            "tradegate_critical_errors_total {}\n",
            self.critical_errors()
        ));

        out.push_str("\n# HELP tradegate_execution_latency_ms End-to-end pipeline latency\n");
        out.push_str("# TYPE tradegate_execution_latency_ms histogram\n");
        let mut cumulative = 0;
        for (bound, bucket) in LATENCY_BUCKETS_MS.iter().zip(&self.latency_buckets) {
            cumulative += bucket.load(Ordering::Relaxed);
            out.push_str(&format!(
                "tradegate_execution_latency_ms_bucket{{le=\"{bound}\"}} {cumulative}\n"
            ));
        }
        let count = self.latency_samples();
        out.push_str(&format!(
            "tradegate_execution_latency_ms_bucket{{le=\"+Inf\"}} {count}\n"
        ));
        out.push_str(&format!(
            "tradegate_execution_latency_ms_sum {}\n",
            self.latency_sum_ms.load(Ordering::Relaxed)
        ));
        out.push_str(&format!("tradegate_execution_latency_ms_count {count}\n"));

        out.push_str("\n# HELP tradegate_slippage_bps Slippage of the last executed trade\n");
        out.push_str("# TYPE tradegate_slippage_bps gauge\n");
        out.push_str(&format!(
            "tradegate_slippage_bps {}\n",
            self.last_slippage_bps().to_f64().unwrap_or(0.0)
        ));

        out
    }
}

impl Default for ExecutionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for ExecutionMetrics {
    fn record_latency(&self, _venue: &str, status: ExecutionStatus, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        match status {
            ExecutionStatus::Executed => &self.executed,
            ExecutionStatus::Rejected => &self.rejected,
            ExecutionStatus::Errored => &self.errored,
        }
        .fetch_add(1, Ordering::Relaxed);

        if let Some(idx) = LATENCY_BUCKETS_MS.iter().position(|bound| ms <= *bound) {
            self.latency_buckets[idx].fetch_add(1, Ordering::Relaxed);
        }
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ms.fetch_add(ms, Ordering::Relaxed);
    }

    fn record_slippage(&self, _venue: &str, slippage_bps: Decimal) {
        *self
            .last_slippage_bps
            .write()
            .unwrap_or_else(|e| e.into_inner()) = slippage_bps;
    }

    fn increment_critical_errors(&self, _kind: &str) {
        self.critical_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Scoped latency timer; records on drop, whatever path the run took.
pub struct ExecutionTimer {
    sink: Arc<dyn MetricsSink>,
    venue: String,
    status: ExecutionStatus,
    started: Instant,
}

impl ExecutionTimer {
    /// Starts with status `Errored` until told otherwise
    pub fn start(sink: Arc<dyn MetricsSink>, venue: impl Into<String>) -> Self {
        Self {
            sink,
            venue: venue.into(),
            status: ExecutionStatus::Errored,
            started: Instant::now(),
        }
    }

    pub fn set_status(&mut self, status: ExecutionStatus) {
        self.status = status;
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for ExecutionTimer {
    fn drop(&mut self) {
        self.sink
            .record_latency(&self.venue, self.status, self.started.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn timer_records_once_on_drop() {
        let metrics = Arc::new(ExecutionMetrics::new());
        {
            let mut timer = ExecutionTimer::start(metrics.clone(), "V1");
            timer.set_status(ExecutionStatus::Executed);
        }
        {
            let _timer = ExecutionTimer::start(metrics.clone(), "V1");
        }

        assert_eq!(metrics.latency_samples(), 2);
        assert_eq!(metrics.count(ExecutionStatus::Executed), 1);
        assert_eq!(metrics.count(ExecutionStatus::Errored), 1);
    }

    #[test]
    fn timer_records_with_mock_sink() {
        let mut sink = MockMetricsSink::new();
        sink.expect_record_latency()
            .withf(|venue, status, _| venue == "V2" && *status == ExecutionStatus::Rejected)
            .times(1)
            .return_const(());

        let mut timer = ExecutionTimer::start(Arc::new(sink), "V2");
        timer.set_status(ExecutionStatus::Rejected);
    }

    #[test]
    fn prometheus_export_has_histogram_and_gauge() {
        let metrics = ExecutionMetrics::new();
        metrics.record_latency("V1", ExecutionStatus::Executed, Duration::from_millis(42));
        metrics.record_latency("V1", ExecutionStatus::Errored, Duration::from_secs(60));
        metrics.record_slippage("V1", dec!(12.5));
        metrics.increment_critical_errors("signing_error");

        let text = metrics.prometheus();
        assert!(text.contains("tradegate_execution_latency_ms_bucket{le=\"50\"} 1"));
        assert!(text.contains("tradegate_execution_latency_ms_bucket{le=\"+Inf\"} 2"));
        assert!(text.contains("tradegate_critical_errors_total 1"));
        assert!(text.contains("tradegate_slippage_bps 12.5"));
        assert!(text.contains("tradegate_executions_total{status=\"executed\"} 1"));
    }
}
