//! Configuration for the realtime coordinator.

use fleetdesk_types::{ResourceType, TenantId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the realtime coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Name of the logical channel opened on the feed.
    pub channel_name: String,
    /// Tenant whose rows the channel is filtered to. Also the fallback tenant
    /// for invalidation when an event does not carry one.
    pub tenant_id: Option<TenantId>,
    /// Column the server-side tenant filter applies to.
    pub tenant_column: String,
    /// Resource types to listen to.
    pub resources: Vec<ResourceType>,
    /// Delay before reconnecting after a graceful close (ms).
    pub graceful_retry_ms: u64,
    /// Delay before reconnecting after a channel error (ms).
    pub error_retry_ms: u64,
    /// Interval between health probes (ms).
    pub health_check_interval_ms: u64,
    /// Timeout for the channel handshake (ms).
    pub handshake_timeout_ms: u64,
    /// How long an unconfirmed optimistic update is kept (ms).
    pub optimistic_timeout_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_name: "fleetdesk-realtime".to_string(),
            tenant_id: None,
            tenant_column: "company_id".to_string(),
            resources: ResourceType::DEFAULT_TRACKED.to_vec(),
            graceful_retry_ms: 3_000,
            error_retry_ms: 10_000,
            health_check_interval_ms: 30_000,
            handshake_timeout_ms: 10_000,
            optimistic_timeout_ms: 30_000,
        }
    }
}

impl RealtimeConfig {
    /// Creates a config scoped to `tenant` with default timings.
    pub fn for_tenant(tenant: TenantId) -> Self {
        Self {
            tenant_id: Some(tenant),
            ..Default::default()
        }
    }

    pub fn graceful_retry(&self) -> Duration {
        Duration::from_millis(self.graceful_retry_ms)
    }

    pub fn error_retry(&self) -> Duration {
        Duration::from_millis(self.error_retry_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn optimistic_timeout(&self) -> Duration {
        Duration::from_millis(self.optimistic_timeout_ms)
    }
}
