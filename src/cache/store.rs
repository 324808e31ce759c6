/// Encrypted, hidden-on-disk license state
///
/// Each record is bincode-encoded, base64-encoded, encrypted with the device
/// fingerprint and written to its own file. Anything that fails on the way
/// back in (missing file, wrong device, corruption, a record of the wrong
/// kind) reads as "absent": this store heals itself by being overwritten and
/// never fails a validation on its own.
use base64::{Engine as _, engine::general_purpose};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::records::{FailureRecord, LicenseCacheEntry, StoredRecord, ValidationStats};
use crate::crypto::symmetric;
use crate::error::LicenseError;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::platform::{hidden_cache_dir, hide_path};

/// File names are meant to pass for system scratch files
const CACHE_FILE_NAME: &str = "syscache.tmp";
const FAILURE_FILE_NAME: &str = "sysfail.tmp";
const STATS_FILE_NAME: &str = "sysinfo.tmp";

#[derive(Debug, Error)]
enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Cipher(#[from] LicenseError),

    #[error("file is not valid UTF-8")]
    Utf8,
}

/// Owner of the cache, failure and stats records
pub struct CacheStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    /// Store rooted at `dir`, using the system clock
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    pub fn with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }

    /// Store in the OS-specific hidden cache directory
    pub fn at_default_location() -> Self {
        Self::new(hidden_cache_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn ensure_dir(&self) -> io::Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
            if let Err(e) = hide_path(&self.dir) {
                debug!("could not hide cache directory: {}", e);
            }
        }
        Ok(())
    }

    fn write_record(&self, name: &str, record: &StoredRecord, key: &str) -> Result<(), StoreError> {
        let encoded = bincode::serialize(record)?;
        let b64 = general_purpose::STANDARD.encode(encoded);
        let encrypted = symmetric::encrypt(&b64, key)?;

        self.ensure_dir()?;
        let path = self.path(name);
        fs::write(&path, encrypted.as_bytes())?;
        if let Err(e) = hide_path(&path) {
            debug!("could not hide {}: {}", path.display(), e);
        }
        Ok(())
    }

    fn try_read_record(&self, name: &str, key: &str) -> Result<Option<StoredRecord>, StoreError> {
        let bytes = match fs::read(self.path(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let encrypted = String::from_utf8(bytes).map_err(|_| StoreError::Utf8)?;
        let b64 = symmetric::decrypt(&encrypted, key)?;
        let encoded = general_purpose::STANDARD.decode(b64)?;
        Ok(Some(bincode::deserialize(&encoded)?))
    }

    fn read_record(&self, name: &str, key: &str) -> Option<StoredRecord> {
        match self.try_read_record(name, key) {
            Ok(record) => record,
            Err(e) => {
                warn!("ignoring unreadable {}: {}", name, e);
                None
            }
        }
    }

    fn remove(&self, name: &str) {
        match fs::remove_file(self.path(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {}", name, e),
        }
    }

    // ---- online validation cache ----

    /// Cached online result, if it belongs to this device and is under 24h old
    pub fn get_cache(&self, fingerprint: &str) -> Option<LicenseCacheEntry> {
        let entry = match self.read_record(CACHE_FILE_NAME, fingerprint)? {
            StoredRecord::Cache(entry) => entry,
            _ => {
                warn!("cache file holds an unexpected record");
                return None;
            }
        };

        if entry.fingerprint != fingerprint {
            info!("cache belongs to another machine, clearing it");
            self.clear_cache();
            return None;
        }

        if !entry.is_fresh(self.now()) {
            info!("license cache expired");
            return None;
        }

        Some(entry)
    }

    /// Cache an online result and count it in the stats
    pub fn save_cache(&self, fingerprint: &str, valid: bool, expire_date: Option<&str>) {
        let entry = LicenseCacheEntry {
            fingerprint: fingerprint.to_string(),
            valid,
            timestamp_ms: self.now(),
            expire_date: expire_date.map(str::to_string),
        };
        match self.write_record(CACHE_FILE_NAME, &StoredRecord::Cache(entry), fingerprint) {
            Ok(()) => info!("license validation result cached"),
            Err(e) => error!("failed to save license cache: {}", e),
        }

        self.update_validation_info(fingerprint, valid);
    }

    pub fn clear_cache(&self) {
        self.remove(CACHE_FILE_NAME);
    }

    // ---- failure tracking ----

    /// Count an online failure
    ///
    /// # Returns
    /// The updated record, or None once the lockout threshold is reached and
    /// the process must terminate
    pub fn record_failure(&self, fingerprint: &str) -> Option<FailureRecord> {
        let now = self.now();
        let record = match self.get_failure_record(fingerprint) {
            Some(mut record) => {
                if record.failure_count == 0 {
                    record.first_failure_time_ms = now;
                }
                record.failure_count += 1;
                record
            }
            None => FailureRecord::first(fingerprint, now),
        };

        if let Err(e) = self.write_record(
            FAILURE_FILE_NAME,
            &StoredRecord::Failure(record.clone()),
            fingerprint,
        ) {
            error!("failed to save failure record: {}", e);
        }

        self.update_validation_info(fingerprint, false);

        if record.is_locked_out() {
            error!(
                failures = record.failure_count,
                "license validation failure limit reached"
            );
            return None;
        }
        Some(record)
    }

    /// Failure record for this device, if any
    pub fn get_failure_record(&self, fingerprint: &str) -> Option<FailureRecord> {
        match self.read_record(FAILURE_FILE_NAME, fingerprint)? {
            StoredRecord::Failure(record) if record.fingerprint == fingerprint => Some(record),
            _ => None,
        }
    }

    /// Whether this device is within 24h of its first recorded failure
    pub fn is_in_grace_period(&self, fingerprint: &str) -> bool {
        self.get_failure_record(fingerprint)
            .map(|record| record.in_grace_period(self.now()))
            .unwrap_or(false)
    }

    /// Delete the failure record, but only if it belongs to this device
    pub fn clear_failure_record(&self, fingerprint: &str) {
        if self.get_failure_record(fingerprint).is_some() {
            self.remove(FAILURE_FILE_NAME);
            info!("failure record cleared");
        }
    }

    // ---- audit stats ----

    /// Stats for this device, starting fresh if none exist or they belong elsewhere
    pub fn get_validation_info(&self, fingerprint: &str) -> ValidationStats {
        match self.read_record(STATS_FILE_NAME, fingerprint) {
            Some(StoredRecord::Stats(stats)) if stats.fingerprint == fingerprint => return stats,
            Some(_) => info!("validation stats belong to another machine, reinitializing"),
            None => debug!("no validation stats yet, initializing"),
        }

        let stats = ValidationStats::new(fingerprint, self.now());
        let record = StoredRecord::Stats(stats.clone());
        if let Err(e) = self.write_record(STATS_FILE_NAME, &record, fingerprint) {
            error!("failed to initialize validation stats: {}", e);
        }
        stats
    }

    /// Count one validation attempt
    pub fn update_validation_info(&self, fingerprint: &str, success: bool) {
        let mut stats = self.get_validation_info(fingerprint);
        stats.record(success, self.now());

        let record = StoredRecord::Stats(stats.clone());
        match self.write_record(STATS_FILE_NAME, &record, fingerprint) {
            Ok(()) => debug!(
                total = stats.total_count,
                success = stats.success_count,
                failure = stats.failure_count,
                "validation stats updated"
            ),
            Err(e) => error!("failed to update validation stats: {}", e),
        }
    }
}
