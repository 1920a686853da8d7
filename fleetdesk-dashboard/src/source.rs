//! Read-only business data the dashboard is computed from.

use crate::error::DashboardResult;
use async_trait::async_trait;
use fleetdesk_types::TenantId;
use fleetdesk_types::rows::{ContractRow, InvoiceRow, PaymentRow, VehicleRow};
use serde::{Deserialize, Serialize};

/// Server-side contract counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractStats {
    pub total: u64,
    pub active: u64,
}

/// Query interface over the tenant's business tables.
///
/// Every method returns plain rows; filtering and aggregation happen in
/// the dashboard.
#[async_trait]
pub trait BusinessData: Send + Sync {
    async fn contract_stats(&self, tenant: &TenantId) -> DashboardResult<ContractStats>;

    async fn all_contracts(&self, tenant: &TenantId) -> DashboardResult<Vec<ContractRow>>;

    async fn all_vehicles(&self, tenant: &TenantId) -> DashboardResult<Vec<VehicleRow>>;

    /// Payments received recently. The window is up to the implementation.
    async fn recent_payments(&self, tenant: &TenantId) -> DashboardResult<Vec<PaymentRow>>;

    async fn all_invoices(&self, tenant: &TenantId) -> DashboardResult<Vec<InvoiceRow>>;
}
