//! Section-by-section dashboard aggregation.
//!
//! A full load fetches every collaborator once, concurrently, and writes all
//! four sections. A section refresh fetches only what that section needs and
//! writes back only that section. Failures are soft: the section keeps its
//! previous figures, records the error and raises a notice.

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::source::BusinessData;
use crate::stats::{
    ContractsStats, CustomersStats, DashboardSection, DashboardSnapshot, FinancialStats, VehiclesStats,
};
use chrono::{NaiveDate, Utc};
use fleetdesk_cache::{CacheKey, CacheStore};
use fleetdesk_realtime::{Notice, Notifier};
use fleetdesk_types::TenantId;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

enum SectionStats {
    Contracts(ContractsStats),
    Customers(CustomersStats),
    Vehicles(VehiclesStats),
    Financials(FinancialStats),
}

/// Keeps the dashboard snapshot for one tenant.
pub struct DashboardAggregator {
    tenant: TenantId,
    data: Arc<dyn BusinessData>,
    cache: Arc<CacheStore>,
    notifier: Arc<dyn Notifier>,
    config: DashboardConfig,
    snapshot: RwLock<DashboardSnapshot>,
}

impl std::fmt::Debug for DashboardAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardAggregator")
            .field("tenant", &self.tenant)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DashboardAggregator {
    pub fn new(
        tenant: TenantId,
        data: Arc<dyn BusinessData>,
        cache: Arc<CacheStore>,
        notifier: Arc<dyn Notifier>,
        config: DashboardConfig,
    ) -> Self {
        Self {
            tenant,
            data,
            cache,
            notifier,
            config,
            snapshot: RwLock::new(DashboardSnapshot::default()),
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Cache key of the summary: `dashboard:summary:{tenant}`.
    #[must_use]
    pub fn summary_key(&self) -> CacheKey {
        CacheKey::new("dashboard", "summary", self.tenant.clone())
    }

    /// The current figures.
    pub async fn snapshot(&self) -> DashboardSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Recomputes every section.
    ///
    /// Sections whose data could not be fetched keep their stale figures;
    /// the call then returns [`DashboardError::Partial`] naming them. The
    /// summary is cached only when every section refreshed.
    pub async fn load_all_stats(&self) -> DashboardResult<DashboardSnapshot> {
        {
            let mut snapshot = self.snapshot.write().await;
            for section in DashboardSection::ALL {
                snapshot.begin(section);
            }
        }

        let tenant = &self.tenant;
        let (stats, contracts, vehicles, payments, invoices) = futures::join!(
            self.data.contract_stats(tenant),
            self.data.all_contracts(tenant),
            self.data.all_vehicles(tenant),
            self.data.recent_payments(tenant),
            self.data.all_invoices(tenant),
        );
        let today = today();

        let outcomes = [
            (
                DashboardSection::Contracts,
                both(&stats, &contracts).map(|(s, c)| SectionStats::Contracts(ContractsStats::compute(s, c))),
            ),
            (
                DashboardSection::Customers,
                one(&contracts).map(|c| SectionStats::Customers(CustomersStats::from_contracts(c))),
            ),
            (
                DashboardSection::Vehicles,
                one(&vehicles).map(|v| SectionStats::Vehicles(VehiclesStats::from_vehicles(v))),
            ),
            (
                DashboardSection::Financials,
                both(&payments, &invoices)
                    .map(|(p, i)| SectionStats::Financials(FinancialStats::compute(p, i, today))),
            ),
        ];

        let mut failed = Vec::new();
        let snapshot = {
            let mut snapshot = self.snapshot.write().await;
            let now = Utc::now();
            for (section, outcome) in outcomes {
                match outcome {
                    Ok(stats) => write_section(&mut snapshot, stats, now),
                    Err(message) => {
                        snapshot.fail(section, message.clone());
                        self.report_failure(section, &message);
                        failed.push(section);
                    }
                }
            }
            snapshot.clone()
        };

        if !failed.is_empty() {
            return Err(DashboardError::Partial(failed));
        }
        self.cache
            .set_from(self.summary_key(), &snapshot, self.config.summary_ttl())
            .await?;
        info!(tenant = %self.tenant, "dashboard statistics loaded");
        Ok(snapshot)
    }

    /// Recomputes one section and writes back only that section.
    ///
    /// On failure the section keeps its previous figures, `is_updating` is
    /// reset, and a notice is raised.
    pub async fn update_section_stats(&self, section: DashboardSection) -> DashboardResult<()> {
        self.snapshot.write().await.begin(section);
        debug!(tenant = %self.tenant, %section, "refreshing dashboard section");

        match self.compute(section).await {
            Ok(stats) => {
                let snapshot = {
                    let mut snapshot = self.snapshot.write().await;
                    write_section(&mut snapshot, stats, Utc::now());
                    snapshot.clone()
                };
                self.refresh_summary(&snapshot).await
            }
            Err(e) => {
                let message = e.to_string();
                self.snapshot.write().await.fail(section, message.clone());
                self.report_failure(section, &message);
                Err(e)
            }
        }
    }

    /// Returns the cached summary, loading and caching it on a miss.
    /// Concurrent callers share one load.
    pub async fn cached_or_load(&self) -> DashboardResult<DashboardSnapshot> {
        let key = self.summary_key();
        self.cache
            .get_or_set_as(&key, self.config.summary_ttl(), move || async move { self.load_all_stats().await })
            .await
    }

    async fn compute(&self, section: DashboardSection) -> DashboardResult<SectionStats> {
        let tenant = &self.tenant;
        Ok(match section {
            DashboardSection::Contracts => {
                let (stats, contracts) =
                    futures::try_join!(self.data.contract_stats(tenant), self.data.all_contracts(tenant))?;
                SectionStats::Contracts(ContractsStats::compute(&stats, &contracts))
            }
            DashboardSection::Customers => {
                let contracts = self.data.all_contracts(tenant).await?;
                SectionStats::Customers(CustomersStats::from_contracts(&contracts))
            }
            DashboardSection::Vehicles => {
                let vehicles = self.data.all_vehicles(tenant).await?;
                SectionStats::Vehicles(VehiclesStats::from_vehicles(&vehicles))
            }
            DashboardSection::Financials => {
                let (payments, invoices) =
                    futures::try_join!(self.data.recent_payments(tenant), self.data.all_invoices(tenant))?;
                SectionStats::Financials(FinancialStats::compute(&payments, &invoices, today()))
            }
        })
    }

    /// Keeps the cached summary in step with a complete snapshot and drops
    /// it otherwise.
    async fn refresh_summary(&self, snapshot: &DashboardSnapshot) -> DashboardResult<()> {
        let complete = DashboardSection::ALL
            .iter()
            .all(|s| snapshot.last_updated(*s).is_some())
            && [
                &snapshot.contracts.last_error,
                &snapshot.customers.last_error,
                &snapshot.vehicles.last_error,
                &snapshot.financials.last_error,
            ]
            .iter()
            .all(|e| e.is_none());

        if complete {
            self.cache
                .set_from(self.summary_key(), snapshot, self.config.summary_ttl())
                .await?;
        } else {
            self.cache.invalidate(&self.summary_key()).await;
        }
        Ok(())
    }

    fn report_failure(&self, section: DashboardSection, message: &str) {
        warn!(tenant = %self.tenant, %section, error = %message, "dashboard section refresh failed");
        self.notifier.notify(Notice::error(
            "Dashboard update failed",
            format!("Could not refresh {section} statistics: {message}"),
        ));
    }
}

fn write_section(snapshot: &mut DashboardSnapshot, stats: SectionStats, at: chrono::DateTime<Utc>) {
    match stats {
        SectionStats::Contracts(s) => snapshot.contracts.succeed(s, at),
        SectionStats::Customers(s) => snapshot.customers.succeed(s, at),
        SectionStats::Vehicles(s) => snapshot.vehicles.succeed(s, at),
        SectionStats::Financials(s) => snapshot.financials.succeed(s, at),
    }
}

fn one<T>(result: &DashboardResult<T>) -> Result<&T, String> {
    result.as_ref().map_err(ToString::to_string)
}

fn both<'a, A, B>(a: &'a DashboardResult<A>, b: &'a DashboardResult<B>) -> Result<(&'a A, &'a B), String> {
    Ok((one(a)?, one(b)?))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}
