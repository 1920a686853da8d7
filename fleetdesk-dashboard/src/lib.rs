//! Live dashboard statistics for Fleetdesk.
//!
//! The dashboard has four sections (contracts, customers, vehicles,
//! financials). [`DashboardAggregator::load_all_stats`] computes all of them
//! from the [`BusinessData`] collaborators; afterwards the
//! [`DashboardSubscriber`] refreshes only the sections a change affects, so
//! the UI never reloads the whole dashboard for a single row change.

mod aggregator;
mod config;
mod error;
mod source;
mod stats;
mod subscriber;

pub use aggregator::DashboardAggregator;
pub use config::{DashboardConfig, PAYMENT_FIELDS};
pub use error::{DashboardError, DashboardResult};
pub use source::{BusinessData, ContractStats};
pub use stats::{
    ContractsStats, CustomersStats, DashboardSection, DashboardSnapshot, FinancialStats, SectionState, VehiclesStats,
};
pub use subscriber::{sections_for, DashboardSubscriber, ROUTED_RESOURCES};
