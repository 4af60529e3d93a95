//! Health Checks
//!
//! Per-tier health and the overall status derived from it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every enabled tier is working
    Healthy,
    /// L1 is serving but L2 is not
    Degraded,
    /// Nothing usable
    Unhealthy,
}

impl HealthStatus {
    /// Check if status is healthy or degraded (operational)
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    /// Check if status is healthy
    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health of a single tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierHealth {
    /// Tier name
    pub name: String,
    /// Whether the tier is configured on
    pub enabled: bool,
    /// Status (a disabled tier reports healthy)
    pub status: HealthStatus,
    /// Detail, such as the probe error
    pub message: Option<String>,
    /// Duration of the probe
    pub duration_ms: u64,
}

impl TierHealth {
    /// Create a healthy result
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            status: HealthStatus::Healthy,
            message: None,
            duration_ms: 0,
        }
    }

    /// Create an unhealthy result
    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            duration_ms: 0,
        }
    }

    /// Create a result for a tier that is turned off
    pub fn disabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: false,
            status: HealthStatus::Healthy,
            message: Some("disabled".to_string()),
            duration_ms: 0,
        }
    }

    /// Set message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set duration
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    fn is_failing(&self) -> bool {
        self.enabled && !self.status.is_healthy()
    }
}

/// Overall health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status
    pub status: HealthStatus,
    /// L1 detail
    pub l1: TierHealth,
    /// L2 detail
    pub l2: TierHealth,
    /// When the probes ran
    pub checked_at: DateTime<Utc>,
    /// Version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
}

impl HealthReport {
    /// Combine tier results
    ///
    /// Healthy when no enabled tier is failing; degraded when L1 is enabled
    /// and fine but L2 is failing; unhealthy otherwise.
    pub fn new(l1: TierHealth, l2: TierHealth, uptime: Duration) -> Self {
        let status = Self::overall(&l1, &l2);
        Self {
            status,
            l1,
            l2,
            checked_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
        }
    }

    fn overall(l1: &TierHealth, l2: &TierHealth) -> HealthStatus {
        if !l1.is_failing() && !l2.is_failing() {
            HealthStatus::Healthy
        } else if l1.enabled && !l1.is_failing() {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const UPTIME: Duration = Duration::from_secs(60);

    #[test]
    fn test_health_status() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(HealthStatus::Healthy.is_operational());
        assert!(!HealthStatus::Degraded.is_healthy());
        assert!(HealthStatus::Degraded.is_operational());
        assert!(!HealthStatus::Unhealthy.is_healthy());
        assert!(!HealthStatus::Unhealthy.is_operational());
    }

    #[test]
    fn test_health_status_display() {
        assert_eq!(format!("{}", HealthStatus::Healthy), "healthy");
        assert_eq!(format!("{}", HealthStatus::Degraded), "degraded");
        assert_eq!(format!("{}", HealthStatus::Unhealthy), "unhealthy");
    }

    #[test]
    fn test_tier_health() {
        let healthy = TierHealth::healthy("l1");
        assert_eq!(healthy.status, HealthStatus::Healthy);
        assert!(healthy.message.is_none());

        let unhealthy = TierHealth::unhealthy("l2", "connection refused")
            .with_duration(Duration::from_millis(12));
        assert_eq!(unhealthy.status, HealthStatus::Unhealthy);
        assert_eq!(unhealthy.duration_ms, 12);

        let disabled = TierHealth::disabled("l2");
        assert!(!disabled.enabled);
        assert!(!disabled.is_failing());
    }

    #[test]
    fn test_all_enabled_healthy() {
        let report = HealthReport::new(TierHealth::healthy("l1"), TierHealth::healthy("l2"), UPTIME);
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.uptime_seconds, 60);
    }

    #[test]
    fn test_l2_down_with_l1_is_degraded() {
        let report = HealthReport::new(
            TierHealth::healthy("l1"),
            TierHealth::unhealthy("l2", "down"),
            UPTIME,
        );
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_l2_down_without_l1_is_unhealthy() {
        let report = HealthReport::new(
            TierHealth::disabled("l1"),
            TierHealth::unhealthy("l2", "down"),
            UPTIME,
        );
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_disabled_tiers_do_not_fail() {
        let report = HealthReport::new(TierHealth::healthy("l1"), TierHealth::disabled("l2"), UPTIME);
        assert_eq!(report.status, HealthStatus::Healthy);

        let report = HealthReport::new(TierHealth::disabled("l1"), TierHealth::disabled("l2"), UPTIME);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_serialization() {
        let report = HealthReport::new(
            TierHealth::healthy("l1"),
            TierHealth::unhealthy("l2", "down"),
            UPTIME,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["l2"]["message"], "down");

        let back: HealthReport = serde_json::from_value(json).unwrap();
        assert_eq!(back.status, HealthStatus::Degraded);
    }
}
