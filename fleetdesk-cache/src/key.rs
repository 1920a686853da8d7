//! Structured cache keys and typed key patterns.
//!
//! A [`CacheKey`] cannot be built without a tenant, so every cached value is
//! tenant-scoped by construction. Keys render as `resource:qualifier:tenant`
//! (or `resource:tenant` when there is no qualifier), which is also the form
//! accepted by [`CacheKey::parse`].

use crate::error::{CacheError, CacheResult};
use fleetdesk_types::TenantId;
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = ':';
const WILDCARD: &str = "*";

/// A tenant-scoped cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    resource: String,
    qualifier: Option<String>,
    tenant: TenantId,
}

impl CacheKey {
    /// Creates a `resource:qualifier:tenant` key.
    #[must_use]
    pub fn new(resource: impl Into<String>, qualifier: impl Into<String>, tenant: TenantId) -> Self {
        Self {
            resource: resource.into(),
            qualifier: Some(qualifier.into()),
            tenant,
        }
    }

    /// Creates a `resource:tenant` key with no qualifier.
    #[must_use]
    pub fn scoped(resource: impl Into<String>, tenant: TenantId) -> Self {
        Self {
            resource: resource.into(),
            qualifier: None,
            tenant,
        }
    }

    /// Parses the textual form. The first segment is the resource, the last
    /// is the tenant, anything between is the qualifier.
    pub fn parse(s: &str) -> CacheResult<Self> {
        let (resource, rest) = s
            .split_once(SEPARATOR)
            .ok_or_else(|| CacheError::InvalidKey(s.to_string()))?;
        let (qualifier, tenant) = match rest.rsplit_once(SEPARATOR) {
            Some((q, t)) => (Some(q), t),
            None => (None, rest),
        };
        if resource.is_empty() || tenant.is_empty() || qualifier.is_some_and(str::is_empty) {
            return Err(CacheError::InvalidKey(s.to_string()));
        }
        Ok(Self {
            resource: resource.to_string(),
            qualifier: qualifier.map(str::to_string),
            tenant: TenantId::new(tenant),
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}:{}:{}", self.resource, q, self.tenant),
            None => write!(f, "{}:{}", self.resource, self.tenant),
        }
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One segment of a [`KeyPattern`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Matches any value.
    Any,
    /// Matches exactly this value.
    Exact(String),
}

impl Segment {
    fn parse(s: &str) -> Self {
        if s == WILDCARD {
            Self::Any
        } else {
            Self::Exact(s.to_string())
        }
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => expected == value,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(WILDCARD),
            Self::Exact(v) => f.write_str(v),
        }
    }
}

/// A typed matcher over [`CacheKey`]s.
///
/// A three-segment pattern (`contracts:*:T1`) matches keys that have a
/// qualifier; a two-segment pattern (`cost_centers:T1`) matches only keys
/// without one. The tenant segment is always exact so a pattern can never
/// reach into another tenant's entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern {
    resource: Segment,
    qualifier: Option<Segment>,
    tenant: TenantId,
}

impl KeyPattern {
    /// `resource:*:tenant`: every qualified key of a resource.
    #[must_use]
    pub fn resource(resource: impl Into<String>, tenant: TenantId) -> Self {
        Self {
            resource: Segment::Exact(resource.into()),
            qualifier: Some(Segment::Any),
            tenant,
        }
    }

    /// `resource:qualifier:tenant`: exactly one qualified key.
    #[must_use]
    pub fn exact(resource: impl Into<String>, qualifier: impl Into<String>, tenant: TenantId) -> Self {
        Self {
            resource: Segment::Exact(resource.into()),
            qualifier: Some(Segment::Exact(qualifier.into())),
            tenant,
        }
    }

    /// `resource:tenant`: the unqualified key of a resource.
    #[must_use]
    pub fn scoped(resource: impl Into<String>, tenant: TenantId) -> Self {
        Self {
            resource: Segment::Exact(resource.into()),
            qualifier: None,
            tenant,
        }
    }

    /// Builds a pattern from segments.
    #[must_use]
    pub fn from_segments(resource: Segment, qualifier: Option<Segment>, tenant: TenantId) -> Self {
        Self {
            resource,
            qualifier,
            tenant,
        }
    }

    /// Parses the textual form, where `*` stands for any segment value.
    pub fn parse(s: &str) -> CacheResult<Self> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        let invalid = || CacheError::InvalidKey(s.to_string());
        let (resource, qualifier, tenant) = match parts.as_slice() {
            [resource, tenant] => (*resource, None, *tenant),
            [resource, qualifier @ .., tenant] if !qualifier.is_empty() => {
                (*resource, Some(qualifier.join(":")), *tenant)
            }
            _ => return Err(invalid()),
        };
        if resource.is_empty() || tenant.is_empty() || tenant == WILDCARD {
            return Err(invalid());
        }
        Ok(Self {
            resource: Segment::parse(resource),
            qualifier: qualifier.as_deref().map(Segment::parse),
            tenant: TenantId::new(tenant),
        })
    }

    /// Returns true if `key` matches this pattern.
    #[must_use]
    pub fn matches(&self, key: &CacheKey) -> bool {
        if key.tenant != self.tenant || !self.resource.matches(&key.resource) {
            return false;
        }
        match (&self.qualifier, &key.qualifier) {
            (None, None) => true,
            (Some(pattern), Some(q)) => pattern.matches(q),
            _ => false,
        }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}:{}:{}", self.resource, q, self.tenant),
            None => write!(f, "{}:{}", self.resource, self.tenant),
        }
    }
}

impl FromStr for KeyPattern {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
