//! Mapping from changed resources to the cache patterns they affect.
//!
//! The rule table encodes real domain dependencies: a contract change
//! affects vehicle availability, a payment changes invoice balances, and
//! almost every business table feeds the dashboard.

use crate::key::{KeyPattern, Segment};
use crate::store::CacheStore;
use fleetdesk_types::{ResourceType, TenantId};
use std::collections::HashMap;
use tracing::debug;

/// A key pattern with the tenant left open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternTemplate {
    resource: String,
    qualifier: Option<Segment>,
}

impl PatternTemplate {
    /// `resource:*:{tenant}`
    #[must_use]
    pub fn any(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            qualifier: Some(Segment::Any),
        }
    }

    /// `resource:qualifier:{tenant}`
    #[must_use]
    pub fn exact(resource: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            qualifier: Some(Segment::Exact(qualifier.into())),
        }
    }

    /// `resource:{tenant}`
    #[must_use]
    pub fn scoped(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            qualifier: None,
        }
    }

    /// Binds the template to a tenant.
    #[must_use]
    pub fn for_tenant(&self, tenant: &TenantId) -> KeyPattern {
        KeyPattern::from_segments(
            Segment::Exact(self.resource.clone()),
            self.qualifier.clone(),
            tenant.clone(),
        )
    }
}

/// Maps a changed resource type to the cache-key patterns it invalidates.
///
/// Resources without a rule fall back to `{resource}:*:{tenant}`. Rules can
/// be replaced or extended at construction time without touching callers.
#[derive(Debug, Clone)]
pub struct InvalidationMapper {
    rules: HashMap<ResourceType, Vec<PatternTemplate>>,
}

impl Default for InvalidationMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationMapper {
    /// Creates a mapper with the built-in domain table.
    #[must_use]
    pub fn new() -> Self {
        use PatternTemplate as P;

        let mut rules = HashMap::new();
        rules.insert(
            ResourceType::Contracts,
            vec![P::any("contracts"), P::any("dashboard"), P::exact("vehicles", "available")],
        );
        rules.insert(ResourceType::Customers, vec![P::any("customers"), P::any("dashboard")]);
        rules.insert(ResourceType::Vehicles, vec![P::any("vehicles"), P::any("dashboard")]);
        rules.insert(
            ResourceType::Payments,
            vec![P::any("payments"), P::any("invoices"), P::any("dashboard")],
        );
        rules.insert(ResourceType::Invoices, vec![P::any("invoices"), P::any("dashboard")]);
        rules.insert(ResourceType::ChartOfAccounts, vec![P::any("accounts")]);
        rules.insert(ResourceType::CostCenters, vec![P::scoped("cost_centers")]);
        Self { rules }
    }

    /// Creates a mapper with no built-in rules; every resource uses the default.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Replaces the rule for `resource`.
    #[must_use]
    pub fn with_rule(mut self, resource: ResourceType, templates: Vec<PatternTemplate>) -> Self {
        self.rules.insert(resource, templates);
        self
    }

    /// Adds templates to the rule for `resource`, starting from the default
    /// when it has none yet.
    #[must_use]
    pub fn extend_rule(mut self, resource: ResourceType, templates: Vec<PatternTemplate>) -> Self {
        let default = PatternTemplate::any(resource.as_str());
        self.rules
            .entry(resource)
            .or_insert_with(|| vec![default])
            .extend(templates);
        self
    }

    /// Returns the patterns a change to `resource` invalidates for `tenant`.
    #[must_use]
    pub fn patterns_for(&self, resource: &ResourceType, tenant: &TenantId) -> Vec<KeyPattern> {
        match self.rules.get(resource) {
            Some(templates) => templates.iter().map(|t| t.for_tenant(tenant)).collect(),
            None => vec![KeyPattern::resource(resource.as_str(), tenant.clone())],
        }
    }

    /// Evicts every entry a change to `resource` affects. Returns the number
    /// of evicted entries.
    pub async fn apply(&self, cache: &CacheStore, resource: &ResourceType, tenant: &TenantId) -> usize {
        let mut evicted = 0;
        for pattern in self.patterns_for(resource, tenant) {
            evicted += cache.invalidate_pattern(&pattern).await;
        }
        debug!(%resource, %tenant, evicted, "applied invalidation rule");
        evicted
    }
}
