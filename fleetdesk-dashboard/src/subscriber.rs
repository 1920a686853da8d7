//! Keeps the dashboard live from the change feed.

use crate::aggregator::DashboardAggregator;
use crate::stats::DashboardSection;
use async_trait::async_trait;
use fleetdesk_realtime::{ChangeHandler, RealtimeCoordinator, RealtimeError, RealtimeResult};
use fleetdesk_types::{ChangeEvent, Operation, ResourceType, SubscriptionId};
use std::sync::Arc;

/// Resources whose changes feed the dashboard.
pub const ROUTED_RESOURCES: [ResourceType; 5] = [
    ResourceType::Contracts,
    ResourceType::Customers,
    ResourceType::Vehicles,
    ResourceType::Payments,
    ResourceType::Invoices,
];

/// Sections a change affects.
///
/// A contract change refreshes contracts, and financials too when a
/// payment-related column changed. Payments and invoices both map to
/// financials.
#[must_use]
pub fn sections_for(event: &ChangeEvent, payment_fields: &[String]) -> Vec<DashboardSection> {
    match event.resource {
        ResourceType::Contracts => {
            let fields: Vec<&str> = payment_fields.iter().map(String::as_str).collect();
            let payment_related = match event.operation {
                Operation::Update => event.any_field_changed(&fields),
                Operation::Insert | Operation::Delete => false,
            };
            if payment_related {
                vec![DashboardSection::Contracts, DashboardSection::Financials]
            } else {
                vec![DashboardSection::Contracts]
            }
        }
        ResourceType::Customers => vec![DashboardSection::Customers],
        ResourceType::Vehicles => vec![DashboardSection::Vehicles],
        ResourceType::Payments | ResourceType::Invoices => vec![DashboardSection::Financials],
        _ => Vec::new(),
    }
}

/// Change handler that refreshes the affected dashboard sections.
#[derive(Debug, Clone)]
pub struct DashboardSubscriber {
    aggregator: Arc<DashboardAggregator>,
}

impl DashboardSubscriber {
    pub fn new(aggregator: Arc<DashboardAggregator>) -> Self {
        Self { aggregator }
    }

    /// Subscribes to every routed resource on `coordinator`.
    pub async fn register(self, coordinator: &RealtimeCoordinator) -> Vec<SubscriptionId> {
        let handler: Arc<dyn ChangeHandler> = Arc::new(self);
        let mut ids = Vec::with_capacity(ROUTED_RESOURCES.len());
        for resource in ROUTED_RESOURCES {
            ids.push(coordinator.subscribe_to_table(resource, Arc::clone(&handler)).await);
        }
        ids
    }
}

#[async_trait]
impl ChangeHandler for DashboardSubscriber {
    async fn handle(&self, event: &ChangeEvent) -> RealtimeResult<()> {
        let mut first_error = None;
        for section in sections_for(event, &self.aggregator.config().payment_fields) {
            if let Err(e) = self.aggregator.update_section_stats(section).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(RealtimeError::Handler(e.to_string())),
            None => Ok(()),
        }
    }
}
