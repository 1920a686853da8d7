//! Dashboard sections and the figures computed for each.

use chrono::{DateTime, NaiveDate, Utc};
use fleetdesk_types::RecordId;
use fleetdesk_types::rows::{ContractRow, InvoiceRow, PaymentRow, VehicleRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::source::ContractStats;

/// An independently refreshable slice of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardSection {
    Contracts,
    Customers,
    Vehicles,
    Financials,
}

impl DashboardSection {
    pub const ALL: [DashboardSection; 4] = [Self::Contracts, Self::Customers, Self::Vehicles, Self::Financials];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Contracts => "contracts",
            Self::Customers => "customers",
            Self::Vehicles => "vehicles",
            Self::Financials => "financials",
        }
    }
}

impl fmt::Display for DashboardSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractsStats {
    pub total_contracts: u64,
    pub active_contracts: u64,
    /// Sum of `monthly_amount` over active contracts.
    pub monthly_recurring_revenue: f64,
}

impl ContractsStats {
    #[must_use]
    pub fn compute(stats: &ContractStats, contracts: &[ContractRow]) -> Self {
        Self {
            total_contracts: stats.total,
            active_contracts: stats.active,
            monthly_recurring_revenue: contracts
                .iter()
                .filter(|c| c.is_active())
                .map(|c| c.monthly_amount)
                .sum(),
        }
    }
}

/// Customer figures derived from contracts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomersStats {
    /// Distinct customers with any contract.
    pub total_customers: u64,
    /// Distinct customers with an active contract.
    pub active_customers: u64,
}

impl CustomersStats {
    #[must_use]
    pub fn from_contracts(contracts: &[ContractRow]) -> Self {
        let all: BTreeSet<&RecordId> = contracts.iter().filter_map(|c| c.customer_id.as_ref()).collect();
        let active: BTreeSet<&RecordId> = contracts
            .iter()
            .filter(|c| c.is_active())
            .filter_map(|c| c.customer_id.as_ref())
            .collect();
        Self {
            total_customers: all.len() as u64,
            active_customers: active.len() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehiclesStats {
    pub total_vehicles: u64,
    pub available_vehicles: u64,
    pub rented_vehicles: u64,
    pub maintenance_vehicles: u64,
    /// Share of the fleet currently rented, 0.0 to 1.0.
    pub utilization: f64,
}

impl VehiclesStats {
    #[must_use]
    pub fn from_vehicles(vehicles: &[VehicleRow]) -> Self {
        let count = |f: fn(&VehicleRow) -> bool| vehicles.iter().filter(|v| f(v)).count() as u64;
        let total = vehicles.len() as u64;
        let rented = count(VehicleRow::is_rented);
        Self {
            total_vehicles: total,
            available_vehicles: count(VehicleRow::is_available),
            rented_vehicles: rented,
            maintenance_vehicles: count(VehicleRow::is_in_maintenance),
            utilization: if total == 0 { 0.0 } else { rented as f64 / total as f64 },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialStats {
    /// Sum of settled recent payments.
    pub total_revenue: f64,
    /// Amount still owed on overdue invoices.
    pub pending_payments: f64,
    pub overdue_invoices: u64,
}

impl FinancialStats {
    #[must_use]
    pub fn compute(payments: &[PaymentRow], invoices: &[InvoiceRow], today: NaiveDate) -> Self {
        let overdue: Vec<&InvoiceRow> = invoices.iter().filter(|i| i.is_overdue(today)).collect();
        Self {
            total_revenue: payments.iter().filter(|p| p.is_settled()).map(|p| p.amount).sum(),
            pending_payments: overdue.iter().map(|i| i.outstanding()).sum(),
            overdue_invoices: overdue.len() as u64,
        }
    }
}

/// One section's figures plus its refresh state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionState<T> {
    pub stats: T,
    pub is_updating: bool,
    pub last_updated: Option<DateTime<Utc>>,
    /// Message of the last failed refresh, cleared by the next success.
    pub last_error: Option<String>,
}

impl<T> SectionState<T> {
    pub(crate) fn begin(&mut self) {
        self.is_updating = true;
    }

    pub(crate) fn succeed(&mut self, stats: T, at: DateTime<Utc>) {
        self.stats = stats;
        self.is_updating = false;
        self.last_updated = Some(at);
        self.last_error = None;
    }

    /// Keeps the stale figures.
    pub(crate) fn fail(&mut self, error: String) {
        self.is_updating = false;
        self.last_error = Some(error);
    }
}

/// All four sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub contracts: SectionState<ContractsStats>,
    pub customers: SectionState<CustomersStats>,
    pub vehicles: SectionState<VehiclesStats>,
    pub financials: SectionState<FinancialStats>,
}

impl DashboardSnapshot {
    /// Whether `section` is being refreshed.
    #[must_use]
    pub fn is_updating(&self, section: DashboardSection) -> bool {
        match section {
            DashboardSection::Contracts => self.contracts.is_updating,
            DashboardSection::Customers => self.customers.is_updating,
            DashboardSection::Vehicles => self.vehicles.is_updating,
            DashboardSection::Financials => self.financials.is_updating,
        }
    }

    #[must_use]
    pub fn last_updated(&self, section: DashboardSection) -> Option<DateTime<Utc>> {
        match section {
            DashboardSection::Contracts => self.contracts.last_updated,
            DashboardSection::Customers => self.customers.last_updated,
            DashboardSection::Vehicles => self.vehicles.last_updated,
            DashboardSection::Financials => self.financials.last_updated,
        }
    }

    pub(crate) fn begin(&mut self, section: DashboardSection) {
        match section {
            DashboardSection::Contracts => self.contracts.begin(),
            DashboardSection::Customers => self.customers.begin(),
            DashboardSection::Vehicles => self.vehicles.begin(),
            DashboardSection::Financials => self.financials.begin(),
        }
    }

    pub(crate) fn fail(&mut self, section: DashboardSection, error: String) {
        match section {
            DashboardSection::Contracts => self.contracts.fail(error),
            DashboardSection::Customers => self.customers.fail(error),
            DashboardSection::Vehicles => self.vehicles.fail(error),
            DashboardSection::Financials => self.financials.fail(error),
        }
    }
}
