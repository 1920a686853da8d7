//! Tenant-scoped TTL cache for derived query results.
//!
//! Query results and dashboard statistics are cached under structured keys
//! (`resource:qualifier:tenant`). When the change feed reports a row change,
//! the [`InvalidationMapper`] turns the changed resource into the set of key
//! patterns it affects and the [`CacheStore`] evicts every matching entry.
//!
//! # Example
//!
//! ```
//! use fleetdesk_cache::{CacheKey, CacheStore, InvalidationMapper};
//! use fleetdesk_types::{ResourceType, TenantId};
//! use std::time::Duration;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # rt.block_on(async {
//! let tenant = TenantId::new("T1");
//! let cache = CacheStore::default();
//! cache
//!     .set(CacheKey::new("contracts", "list", tenant.clone()), serde_json::json!([]), Duration::from_secs(60))
//!     .await;
//!
//! let mapper = InvalidationMapper::new();
//! let evicted = mapper.apply(&cache, &ResourceType::Contracts, &tenant).await;
//! assert_eq!(evicted, 1);
//! # });
//! ```

mod error;
mod invalidation;
mod key;
mod store;

pub use error::{CacheError, CacheResult};
pub use invalidation::{InvalidationMapper, PatternTemplate};
pub use key::{CacheKey, KeyPattern, Segment};
pub use store::{CacheConfig, CacheStats, CacheStore};
