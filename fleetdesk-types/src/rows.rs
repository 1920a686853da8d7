//! Typed row views for the tracked business tables.
//!
//! The feed delivers rows as loose JSON objects. Each tracked table gets a
//! struct with a fixed field set so consumers never guess at payload shape;
//! unknown columns are ignored and missing optional columns fall back to
//! defaults.

use crate::{Record, RecordId, ResourceType, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

fn de_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<RecordId, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    RecordId::from_json(&value)
        .ok_or_else(|| serde::de::Error::custom("row id must be a string or number"))
}

fn de_opt_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<RecordId>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(value.as_ref().and_then(RecordId::from_json))
}

fn default_true() -> bool {
    true
}

/// A rental contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRow {
    #[serde(deserialize_with = "de_id")]
    pub id: RecordId,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub customer_id: Option<RecordId>,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub vehicle_id: Option<RecordId>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub monthly_amount: f64,
    #[serde(default)]
    pub contract_amount: f64,
    #[serde(default)]
    pub payment_status: Option<String>,
}

impl ContractRow {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// A customer account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRow {
    #[serde(deserialize_with = "de_id")]
    pub id: RecordId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A fleet vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRow {
    #[serde(deserialize_with = "de_id")]
    pub id: RecordId,
    #[serde(default)]
    pub plate_number: Option<String>,
    #[serde(default)]
    pub status: String,
}

impl VehicleRow {
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status == "available"
    }

    #[must_use]
    pub fn is_rented(&self) -> bool {
        self.status == "rented"
    }

    #[must_use]
    pub fn is_in_maintenance(&self) -> bool {
        self.status == "maintenance"
    }
}

/// A received payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRow {
    #[serde(deserialize_with = "de_id")]
    pub id: RecordId,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
}

impl PaymentRow {
    /// Payments that count towards revenue.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "paid")
    }
}

/// A customer invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRow {
    #[serde(deserialize_with = "de_id")]
    pub id: RecordId,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub paid_amount: f64,
    #[serde(default)]
    pub balance_due: Option<f64>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl InvoiceRow {
    /// Amount still owed on the invoice, never negative.
    #[must_use]
    pub fn outstanding(&self) -> f64 {
        self.balance_due
            .unwrap_or(self.total_amount - self.paid_amount)
            .max(0.0)
    }

    /// An invoice is overdue when marked so, or when it is still open past
    /// its due date.
    #[must_use]
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        match self.status.as_str() {
            "overdue" => true,
            "paid" | "cancelled" | "void" => false,
            _ => self.due_date.is_some_and(|due| due < today) && self.outstanding() > 0.0,
        }
    }
}

/// A decoded row of any tracked table.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceRow {
    Contract(ContractRow),
    Customer(CustomerRow),
    Vehicle(VehicleRow),
    Payment(PaymentRow),
    Invoice(InvoiceRow),
    /// Tables without a typed view keep their raw record.
    Other(Record),
}

impl ResourceRow {
    /// Decodes a record according to the table it came from.
    pub fn decode(resource: &ResourceType, record: &Record) -> Result<Self> {
        let value = serde_json::Value::Object(record.clone());
        Ok(match resource {
            ResourceType::Contracts => Self::Contract(serde_json::from_value(value)?),
            ResourceType::Customers => Self::Customer(serde_json::from_value(value)?),
            ResourceType::Vehicles => Self::Vehicle(serde_json::from_value(value)?),
            ResourceType::Payments => Self::Payment(serde_json::from_value(value)?),
            ResourceType::Invoices => Self::Invoice(serde_json::from_value(value)?),
            _ => Self::Other(record.clone()),
        })
    }
}
