//! Cache Module
//!
//! The generic two-tier engine: namespace registry, keys, the in-process
//! L1 tier, the shared L2 tier and the background L2 writer.

mod engine;
mod entry;
mod key;
mod l1;
mod l2;
mod namespace;
mod stats;
mod store;
mod writer;


// Re-export public types
pub use engine::{CacheValue, CascadeRules, EngineOptions, TwoTierCache};
pub use entry::{CacheEntry, CachedValue};
pub use key::{CacheKey, KeyQualifier};
pub use l1::L1Cache;
pub use l2::{L2Store, MemoryL2, RedisL2};
pub use namespace::{CacheNamespace, CacheNamespaceConfig, NamespaceRegistry};
pub use stats::{CacheStats, StatsCounters};
pub use store::L1Segment;
pub use writer::{L2WriteJob, L2WritePool, WriteFence};
