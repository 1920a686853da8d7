//! Dashboard configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Contract columns whose change also refreshes the financials section.
pub const PAYMENT_FIELDS: [&str; 5] = [
    "monthly_amount",
    "payment_status",
    "paid_amount",
    "total_amount",
    "balance_due",
];

/// Configuration for the dashboard aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// TTL of the cached summary (ms).
    pub summary_ttl_ms: u64,
    /// Contract columns treated as payment-related.
    pub payment_fields: Vec<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            summary_ttl_ms: 3 * 60 * 1000,
            payment_fields: PAYMENT_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl DashboardConfig {
    pub fn summary_ttl(&self) -> Duration {
        Duration::from_millis(self.summary_ttl_ms)
    }
}
