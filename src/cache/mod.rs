/// Cache module - Encrypted on-disk license state
pub mod records;
pub mod store;

pub use records::{
    CACHE_VALIDITY_MS, FailureRecord, GRACE_PERIOD_MS, LicenseCacheEntry, ValidationStats,
};
pub use store::CacheStore;
