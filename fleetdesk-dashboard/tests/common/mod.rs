//! Shared test helpers for dashboard tests.

#![allow(dead_code)]

use async_trait::async_trait;
use fleetdesk_dashboard::{BusinessData, ContractStats, DashboardError, DashboardResult};
use fleetdesk_types::TenantId;
use fleetdesk_types::rows::{ContractRow, InvoiceRow, PaymentRow, VehicleRow};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::Semaphore;

pub fn tenant() -> TenantId {
    TenantId::new("T1")
}

pub fn contract(id: &str, customer: &str, status: &str, monthly: f64) -> ContractRow {
    serde_json::from_value(json!({
        "id": id,
        "customer_id": customer,
        "status": status,
        "monthly_amount": monthly,
    }))
    .unwrap()
}

pub fn vehicle(id: u64, status: &str) -> VehicleRow {
    serde_json::from_value(json!({"id": id, "status": status})).unwrap()
}

pub fn payment(id: u64, amount: f64, status: &str) -> PaymentRow {
    serde_json::from_value(json!({"id": id, "amount": amount, "status": status})).unwrap()
}

pub fn invoice(id: u64, total: f64, paid: f64, status: &str, due: &str) -> InvoiceRow {
    serde_json::from_value(json!({
        "id": id,
        "total_amount": total,
        "paid_amount": paid,
        "status": status,
        "due_date": due,
    }))
    .unwrap()
}

/// In-memory business data with call recording and injectable failures.
pub struct FakeData {
    pub contracts: Mutex<Vec<ContractRow>>,
    pub vehicles: Mutex<Vec<VehicleRow>>,
    pub payments: Mutex<Vec<PaymentRow>>,
    pub invoices: Mutex<Vec<InvoiceRow>>,
    failing: Mutex<HashSet<&'static str>>,
    calls: Mutex<Vec<&'static str>>,
    /// Holds `all_vehicles` until a permit is added.
    pub vehicles_gate: Semaphore,
}

impl FakeData {
    /// A small fleet: three contracts, four vehicles, three payments and
    /// three invoices.
    pub fn seeded() -> Self {
        Self {
            contracts: Mutex::new(vec![
                contract("c1", "a", "active", 100.0),
                contract("c2", "a", "active", 50.0),
                contract("c3", "b", "ended", 70.0),
            ]),
            vehicles: Mutex::new(vec![
                vehicle(1, "available"),
                vehicle(2, "rented"),
                vehicle(3, "rented"),
                vehicle(4, "maintenance"),
            ]),
            payments: Mutex::new(vec![
                payment(1, 100.0, "completed"),
                payment(2, 50.0, "pending"),
                payment(3, 25.0, "paid"),
            ]),
            invoices: Mutex::new(vec![
                invoice(1, 200.0, 50.0, "overdue", "2099-01-01"),
                invoice(2, 80.0, 0.0, "sent", "2000-01-01"),
                invoice(3, 90.0, 90.0, "paid", "2000-01-01"),
            ]),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            vehicles_gate: Semaphore::new(Semaphore::MAX_PERMITS),
        }
    }

    /// Like [`FakeData::seeded`], but `all_vehicles` blocks until released.
    pub fn gated() -> Self {
        Self {
            vehicles_gate: Semaphore::new(0),
            ..Self::seeded()
        }
    }

    pub fn fail(&self, method: &'static str) {
        self.failing.lock().unwrap().insert(method);
    }

    pub fn recover(&self, method: &'static str) {
        self.failing.lock().unwrap().remove(method);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == method).count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn enter(&self, method: &'static str) -> DashboardResult<()> {
        self.calls.lock().unwrap().push(method);
        if self.failing.lock().unwrap().contains(method) {
            return Err(DashboardError::Source(format!("{method} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl BusinessData for FakeData {
    async fn contract_stats(&self, _tenant: &TenantId) -> DashboardResult<ContractStats> {
        self.enter("contract_stats")?;
        let contracts = self.contracts.lock().unwrap();
        Ok(ContractStats {
            total: contracts.len() as u64,
            active: contracts.iter().filter(|c| c.is_active()).count() as u64,
        })
    }

    async fn all_contracts(&self, _tenant: &TenantId) -> DashboardResult<Vec<ContractRow>> {
        self.enter("all_contracts")?;
        Ok(self.contracts.lock().unwrap().clone())
    }

    async fn all_vehicles(&self, _tenant: &TenantId) -> DashboardResult<Vec<VehicleRow>> {
        self.enter("all_vehicles")?;
        let _permit = self.vehicles_gate.acquire().await.unwrap();
        Ok(self.vehicles.lock().unwrap().clone())
    }

    async fn recent_payments(&self, _tenant: &TenantId) -> DashboardResult<Vec<PaymentRow>> {
        self.enter("recent_payments")?;
        Ok(self.payments.lock().unwrap().clone())
    }

    async fn all_invoices(&self, _tenant: &TenantId) -> DashboardResult<Vec<InvoiceRow>> {
        self.enter("all_invoices")?;
        Ok(self.invoices.lock().unwrap().clone())
    }
}
