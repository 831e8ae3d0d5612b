//! Alert records and the dispatch status state machine
//!
//! Status transitions are explicit functions rather than string
//! comparisons, so an illegal move such as `acknowledged -> sent`
//! cannot be expressed by callers.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Threshold policy selected in configuration
///
/// Serialized as `{"type": "percentage", "value": 10.0}` to match the
/// configuration file shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ThresholdPolicy {
    /// Delta as a percentage of the tracked price.
    Percentage(f64),
    /// Delta as a flat currency amount.
    Absolute(f64),
}

impl ThresholdPolicy {
    /// Whether a positive delta against the tracked price crosses this
    /// threshold. The boundary is inclusive: a delta exactly at the
    /// configured value counts as a crossing.
    pub fn is_crossed(&self, tracked_price: f64, delta: f64) -> bool {
        if delta <= 0.0 {
            return false;
        }
        match *self {
            Self::Percentage(pct) => {
                if tracked_price <= 0.0 {
                    return false;
                }
                (delta / tracked_price) * 100.0 >= pct
            }
            Self::Absolute(amount) => delta >= amount,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Percentage(_) => "percentage",
            Self::Absolute(_) => "absolute",
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            Self::Percentage(v) | Self::Absolute(v) => v,
        }
    }

    /// Reassemble a policy from its persisted (type, value) columns.
    pub fn from_parts(type_name: &str, value: f64) -> Option<Self> {
        match type_name {
            "percentage" => Some(Self::Percentage(value)),
            "absolute" => Some(Self::Absolute(value)),
            _ => None,
        }
    }

    /// Startup validation. A non-finite or non-positive threshold value
    /// would either never fire or fire on every comparison.
    pub fn validate(&self) -> Result<(), String> {
        let value = self.value();
        if !value.is_finite() || value <= 0.0 {
            return Err(format!(
                "threshold value must be a positive number, got {value}"
            ));
        }
        if let Self::Percentage(pct) = self {
            if *pct > 100.0 {
                return Err(format!("percentage threshold above 100 ({pct}) can never fire"));
            }
        }
        Ok(())
    }
}

/// Dispatch lifecycle of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Row created, notification not yet attempted.
    Pending,
    /// Notification delivered.
    Sent,
    /// Notification dispatch failed; cooldown stays active.
    Failed,
    /// Operator has seen and dismissed the alert.
    Acknowledged,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Acknowledged => "acknowledged",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "acknowledged" => Some(Self::Acknowledged),
            _ => None,
        }
    }

    /// Record the outcome of a dispatch attempt. Only a pending alert
    /// can move to sent or failed.
    pub fn dispatch_outcome(self, delivered: bool) -> Result<Self, InvalidTransition> {
        let target = if delivered { Self::Sent } else { Self::Failed };
        match self {
            Self::Pending => Ok(target),
            from => Err(InvalidTransition { from, to: target }),
        }
    }

    /// Operator acknowledgement. Idempotent: acknowledging an already
    /// acknowledged alert stays acknowledged and is not an error.
    pub fn acknowledge(self) -> Self {
        Self::Acknowledged
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid alert status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: AlertStatus,
    pub to: AlertStatus,
}

/// A persisted threshold crossing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub book_id: i64,
    pub policy: ThresholdPolicy,
    /// Tracked price at trigger time.
    pub tracked_price: f64,
    pub competing_price: f64,
    pub competing_source: String,
    pub triggered_at: DateTime<Utc>,
    pub status: AlertStatus,
}

impl Alert {
    pub fn delta(&self) -> f64 {
        self.tracked_price - self.competing_price
    }

    /// Whether this alert still suppresses new triggers for its
    /// (book, source) pair at `now`.
    pub fn within_cooldown(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        now - self.triggered_at < cooldown
    }
}

/// Filter criteria for the alert listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertSearchCriteria {
    pub status: Option<AlertStatus>,
    /// Inclusive lower bound on triggered_at
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on triggered_at
    pub to: Option<DateTime<Utc>>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Alert listing with pagination, newest triggers first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSearchResult {
    pub alerts: Vec<Alert>,
    pub total_count: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}
