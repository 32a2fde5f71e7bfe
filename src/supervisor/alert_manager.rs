//! Incident escalation.
//!
//! Routes incidents by severity, fans them out to subscribers and rate-limits
//! repeats so a failing dependency cannot flood on-call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{Stage, TransactionId};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Informational - log only
    Info,
    Warning,
    /// Trade failed on a system fault
    Error,
    /// Funds or ledger state may be inconsistent; page immediately
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A critical pipeline failure handed to the escalation path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub intent_id: Uuid,
    pub venue: String,
    pub stage: Stage,
    pub level: AlertLevel,
    /// Short error tag, e.g. `signing_error`
    pub kind: String,
    pub message: String,
    pub tx_id: Option<TransactionId>,
    pub occurred_at: DateTime<Utc>,
}

/// Incident collaborator. Must not block the trade path.
#[cfg_attr(test, mockall::automock)]
pub trait IncidentNotifier: Send + Sync {
    fn notify(&self, incident: Incident);
}

/// Alert payload delivered to subscribers
#[derive(Debug, Clone)]
pub struct Alert {
    pub level: AlertLevel,
    pub component: String,
    pub title: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, component: &str, title: &str, message: &str) -> Self {
        Self {
            level,
            component: component.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// One-line human summary for chat/pager sinks
    pub fn summary(&self) -> String {
        format!(
            "[{}] {} ({}) at {}: {}",
            self.level.as_str().to_uppercase(),
            self.title,
            self.component,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.message
        )
    }
}

impl From<&Incident> for Alert {
    fn from(incident: &Incident) -> Self {
        Alert {
            level: incident.level,
            component: incident.stage.to_string(),
            title: format!("Trade failed: {}", incident.kind),
            message: incident.message.clone(),
            metadata: Some(serde_json::json!({
                "intent_id": incident.intent_id,
                "venue": incident.venue,
                "tx_id": incident.tx_id,
            })),
            timestamp: incident.occurred_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertManagerConfig {
    /// Minimum interval between duplicate alerts
    #[serde(default = "default_rate_limit_secs")]
    pub rate_limit_secs: u64,
    /// Whether info alerts reach subscribers
    #[serde(default)]
    pub notify_info: bool,
    /// Maximum alerts per minute before throttling
    #[serde(default = "default_max_alerts_per_minute")]
    pub max_alerts_per_minute: u32,
}

fn default_rate_limit_secs() -> u64 {
    60
}

fn default_max_alerts_per_minute() -> u32 {
    10
}

impl Default for AlertManagerConfig {
    fn default() -> Self {
        Self {
            rate_limit_secs: default_rate_limit_secs(),
            notify_info: false,
            max_alerts_per_minute: default_max_alerts_per_minute(),
        }
    }
}

#[derive(Debug)]
struct RateLimitState {
    last_sent: DateTime<Utc>,
    suppressed_count: u32,
}

#[derive(Debug, Default)]
struct Throttle {
    per_key: HashMap<String, RateLimitState>,
    recent: Vec<DateTime<Utc>>,
}

pub struct AlertManager {
    config: AlertManagerConfig,
    throttle: Mutex<Throttle>,
    event_tx: broadcast::Sender<Alert>,
}

impl AlertManager {
    pub fn new(config: AlertManagerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config,
            throttle: Mutex::new(Throttle::default()),
            event_tx,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(AlertManagerConfig::default())
    }

    /// Subscribe to delivered alerts (pager, chat, dashboards)
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.event_tx.subscribe()
    }

    fn rate_limit_key(alert: &Alert) -> String {
        format!("{}:{}:{}", alert.component, alert.level, alert.title)
    }

    /// Returns true when the alert must not be delivered.
    ///
    /// Error and Critical alerts each belong to one escalated failure and are
    /// always delivered; they still count towards the per-minute budget.
    fn should_suppress(&self, alert: &Alert) -> bool {
        let now = Utc::now();
        let mut throttle = self.throttle.lock().unwrap_or_else(|e| e.into_inner());

        let minute_ago = now - chrono::Duration::minutes(1);
        throttle.recent.retain(|t| *t > minute_ago);

        if alert.level >= AlertLevel::Error {
            throttle.recent.push(now);
            return false;
        }

        let key = Self::rate_limit_key(alert);
        if let Some(state) = throttle.per_key.get_mut(&key) {
            let elapsed = now.signed_duration_since(state.last_sent).num_seconds().max(0) as u64;
            if elapsed < self.config.rate_limit_secs {
                state.suppressed_count += 1;
                debug!(
                    "Rate limiting alert '{}' ({} suppressed)",
                    alert.title, state.suppressed_count
                );
                return true;
            }
            state.last_sent = now;
            state.suppressed_count = 0;
        } else {
            throttle.per_key.insert(
                key,
                RateLimitState {
                    last_sent: now,
                    suppressed_count: 0,
                },
            );
        }

        if throttle.recent.len() >= self.config.max_alerts_per_minute as usize {
            warn!(
                "Alert throttling: {} alerts in last minute (max: {})",
                throttle.recent.len(),
                self.config.max_alerts_per_minute
            );
            return true;
        }
        throttle.recent.push(now);
        false
    }

    /// Log and, unless suppressed, deliver an alert. Returns whether it was delivered.
    pub fn alert(&self, alert: Alert) -> bool {
        match alert.level {
            AlertLevel::Info => info!("[{}] {}: {}", alert.component, alert.title, alert.message),
            AlertLevel::Warning => {
                warn!("[{}] {}: {}", alert.component, alert.title, alert.message)
            }
            AlertLevel::Error => {
                error!("[{}] {}: {}", alert.component, alert.title, alert.message)
            }
            AlertLevel::Critical => {
                error!(
                    "CRITICAL [{}] {}: {}",
                    alert.component, alert.title, alert.message
                )
            }
        }

        if alert.level == AlertLevel::Info && !self.config.notify_info {
            return false;
        }
        if self.should_suppress(&alert) {
            return false;
        }

        // No subscribers is not an error
        let _ = self.event_tx.send(alert);
        true
    }

    /// Suppressed counts per rate-limit key
    pub fn suppressed_counts(&self) -> HashMap<String, u32> {
        let throttle = self.throttle.lock().unwrap_or_else(|e| e.into_inner());
        throttle
            .per_key
            .iter()
            .filter(|(_, state)| state.suppressed_count > 0)
            .map(|(key, state)| (key.clone(), state.suppressed_count))
            .collect()
    }

    pub fn reset_rate_limits(&self) {
        let mut throttle = self.throttle.lock().unwrap_or_else(|e| e.into_inner());
        throttle.per_key.clear();
        throttle.recent.clear();
        debug!("Alert rate limits reset");
    }
}

impl IncidentNotifier for AlertManager {
    fn notify(&self, incident: Incident) {
        self.alert(Alert::from(&incident));
    }
}
