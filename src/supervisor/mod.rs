//! Escalation layer: severity-routed, rate-limited incident alerts.

pub mod alert_manager;

#[cfg(test)]
pub use alert_manager::MockIncidentNotifier;
pub use alert_manager::{
    Alert, AlertLevel, AlertManager, AlertManagerConfig, Incident, IncidentNotifier,
};
