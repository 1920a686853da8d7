//! Change events delivered by the backend change feed.
//!
//! A [`ChangePayload`] is the raw wire shape of one row-level notification.
//! The router normalizes it into a [`ChangeEvent`], which is immutable once
//! built and carries everything subscribers need: the resource, the
//! operation, the row before and after, and when it was observed.

use crate::rows::ResourceRow;
use crate::{Error, RecordId, ResourceType, Result, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A backend row as delivered by the feed.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Row-level operation reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// Parses the feed's `eventType` field.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Self::Insert),
            "UPDATE" => Ok(Self::Update),
            "DELETE" => Ok(Self::Delete),
            _ => Err(Error::UnknownOperation(s.to_string())),
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw notification payload: `{eventType, old?, new?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Record>,
}

impl ChangePayload {
    /// Builds an INSERT payload.
    #[must_use]
    pub fn insert(new: Record) -> Self {
        Self {
            event_type: Operation::Insert.as_str().to_string(),
            old: None,
            new: Some(new),
        }
    }

    /// Builds an UPDATE payload.
    #[must_use]
    pub fn update(old: Record, new: Record) -> Self {
        Self {
            event_type: Operation::Update.as_str().to_string(),
            old: Some(old),
            new: Some(new),
        }
    }

    /// Builds a DELETE payload.
    #[must_use]
    pub fn delete(old: Record) -> Self {
        Self {
            event_type: Operation::Delete.as_str().to_string(),
            old: Some(old),
            new: None,
        }
    }
}

/// A normalized row-level change.
///
/// For a single resource, events arrive in backend commit order. The feed
/// delivers at least once; consumers must tolerate repeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The table that changed.
    pub resource: ResourceType,
    /// What happened to the row.
    pub operation: Operation,
    /// Row state before the change (updates and deletes).
    pub before: Option<Record>,
    /// Row state after the change (inserts and updates).
    pub after: Option<Record>,
    /// When the event was observed locally.
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Creates an event observed now.
    #[must_use]
    pub fn new(
        resource: ResourceType,
        operation: Operation,
        before: Option<Record>,
        after: Option<Record>,
    ) -> Self {
        Self {
            resource,
            operation,
            before: before.filter(|r| !r.is_empty()),
            after: after.filter(|r| !r.is_empty()),
            observed_at: Utc::now(),
        }
    }

    /// Normalizes a raw feed payload. Empty `old`/`new` objects are treated
    /// as absent.
    pub fn from_payload(resource: ResourceType, payload: ChangePayload) -> Result<Self> {
        let operation = Operation::parse(&payload.event_type)?;
        Ok(Self::new(resource, operation, payload.old, payload.new))
    }

    /// Creates an insert event.
    #[must_use]
    pub fn insert(resource: ResourceType, after: Record) -> Self {
        Self::new(resource, Operation::Insert, None, Some(after))
    }

    /// Creates an update event.
    #[must_use]
    pub fn update(resource: ResourceType, before: Record, after: Record) -> Self {
        Self::new(resource, Operation::Update, Some(before), Some(after))
    }

    /// Creates a delete event.
    #[must_use]
    pub fn delete(resource: ResourceType, before: Record) -> Self {
        Self::new(resource, Operation::Delete, Some(before), None)
    }

    /// The most recent known row state: `after`, or `before` for deletes.
    #[must_use]
    pub fn current(&self) -> Option<&Record> {
        self.after.as_ref().or(self.before.as_ref())
    }

    fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.after
            .as_ref()
            .and_then(|r| r.get(name))
            .or_else(|| self.before.as_ref().and_then(|r| r.get(name)))
    }

    /// Identity of the changed row.
    #[must_use]
    pub fn record_id(&self) -> Option<RecordId> {
        self.field("id").and_then(RecordId::from_json)
    }

    /// Tenant that owns the changed row, read from `tenant_id` or `company_id`.
    #[must_use]
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.field("tenant_id")
            .or_else(|| self.field("company_id"))
            .and_then(|v| match v {
                serde_json::Value::String(s) if !s.is_empty() => Some(TenantId::new(s.clone())),
                serde_json::Value::Number(n) => Some(TenantId::new(n.to_string())),
                _ => None,
            })
    }

    /// Returns true if an update changed `field`.
    ///
    /// Inserts and deletes report every present field as changed. For
    /// updates, a field present on only one side counts as changed.
    #[must_use]
    pub fn field_changed(&self, field: &str) -> bool {
        let before = self.before.as_ref().and_then(|r| r.get(field));
        let after = self.after.as_ref().and_then(|r| r.get(field));
        match self.operation {
            Operation::Insert => after.is_some(),
            Operation::Delete => before.is_some(),
            Operation::Update => before != after,
        }
    }

    /// Returns true if any of `fields` changed.
    #[must_use]
    pub fn any_field_changed(&self, fields: &[&str]) -> bool {
        fields.iter().any(|f| self.field_changed(f))
    }

    /// Decodes `after` into its typed row view.
    pub fn typed_after(&self) -> Result<Option<ResourceRow>> {
        self.after
            .as_ref()
            .map(|r| ResourceRow::decode(&self.resource, r))
            .transpose()
    }

    /// Decodes `before` into its typed row view.
    pub fn typed_before(&self) -> Result<Option<ResourceRow>> {
        self.before
            .as_ref()
            .map(|r| ResourceRow::decode(&self.resource, r))
            .transpose()
    }
}
