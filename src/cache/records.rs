/// Records persisted by the cache store
use serde::{Deserialize, Serialize};

/// Freshness window of a cached online validation (24h)
pub const CACHE_VALIDITY_MS: i64 = 24 * 60 * 60 * 1000;

/// Offline tolerance after the first online failure (24h)
pub const GRACE_PERIOD_MS: i64 = 24 * 60 * 60 * 1000;

/// Failure count at which validation locks out
pub const LOCKOUT_THRESHOLD: u32 = 2;

/// Schema version written into new stats records
pub const STATS_SCHEMA_VERSION: &str = "1.0";

/// Result of the most recent successful online validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseCacheEntry {
    pub fingerprint: String,
    pub valid: bool,
    pub timestamp_ms: i64,
    pub expire_date: Option<String>,
}

impl LicenseCacheEntry {
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms - self.timestamp_ms <= CACHE_VALIDITY_MS
    }
}

/// Consecutive online failures on one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub fingerprint: String,
    pub first_failure_time_ms: i64,
    pub failure_count: u32,
}

impl FailureRecord {
    pub fn first(fingerprint: &str, now_ms: i64) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            first_failure_time_ms: now_ms,
            failure_count: 1,
        }
    }

    pub fn is_locked_out(&self) -> bool {
        self.failure_count >= LOCKOUT_THRESHOLD
    }

    pub fn in_grace_period(&self, now_ms: i64) -> bool {
        now_ms - self.first_failure_time_ms <= GRACE_PERIOD_MS
    }
}

/// Audit counters for validation attempts on one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStats {
    pub fingerprint: String,
    pub first_validation_time_ms: i64,
    pub last_validation_time_ms: i64,
    pub total_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub schema_version: String,
}

impl ValidationStats {
    pub fn new(fingerprint: &str, now_ms: i64) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            first_validation_time_ms: now_ms,
            last_validation_time_ms: now_ms,
            total_count: 0,
            success_count: 0,
            failure_count: 0,
            schema_version: STATS_SCHEMA_VERSION.to_string(),
        }
    }

    pub fn record(&mut self, success: bool, now_ms: i64) {
        self.last_validation_time_ms = now_ms;
        self.total_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
    }
}

/// On-disk envelope; the tag lets a file holding the wrong kind read as absent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum StoredRecord {
    Cache(LicenseCacheEntry),
    Failure(FailureRecord),
    Stats(ValidationStats),
}
