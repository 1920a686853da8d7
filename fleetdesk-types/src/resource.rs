//! Resource types carried by the change feed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A backend table whose changes the realtime layer observes.
///
/// The tracked business tables are closed variants; anything else is kept
/// verbatim in [`ResourceType::Other`] so new tables flow through the default
/// invalidation rule without code changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceType {
    Contracts,
    Customers,
    Vehicles,
    Payments,
    Invoices,
    ChartOfAccounts,
    CostCenters,
    Other(String),
}

impl ResourceType {
    /// The resources the coordinator listens to unless configured otherwise.
    pub const DEFAULT_TRACKED: [ResourceType; 5] = [
        ResourceType::Contracts,
        ResourceType::Customers,
        ResourceType::Vehicles,
        ResourceType::Payments,
        ResourceType::Invoices,
    ];

    /// Returns the backend table name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Contracts => "contracts",
            Self::Customers => "customers",
            Self::Vehicles => "vehicles",
            Self::Payments => "payments",
            Self::Invoices => "invoices",
            Self::ChartOfAccounts => "chart_of_accounts",
            Self::CostCenters => "cost_centers",
            Self::Other(name) => name,
        }
    }

    /// Parses a backend table name. Never fails: unknown names become `Other`.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "contracts" => Self::Contracts,
            "customers" => Self::Customers,
            "vehicles" => Self::Vehicles,
            "payments" => Self::Payments,
            "invoices" => Self::Invoices,
            "chart_of_accounts" => Self::ChartOfAccounts,
            "cost_centers" => Self::CostCenters,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ResourceType {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl From<String> for ResourceType {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<ResourceType> for String {
    fn from(resource: ResourceType) -> Self {
        resource.as_str().to_string()
    }
}
