/// Startup license gate: online check, local fallback, lockout enforcement
use tracing::{error, info, warn};

use super::artifact::ArtifactHasher;
use super::codec;
use super::network::{AuthTransport, HttpTransport, OnlineOutcome, OnlineValidator};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{LicenseError, LicenseResult};

/// How the gate was passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassMode {
    /// Checking is turned off in configuration
    Disabled,
    /// Fresh cached online result
    Cached,
    /// Online failed once; tolerated for 24h
    GracePeriod,
    /// Authorization server confirmed the license
    Online { expire_date: Option<String> },
    /// Local license key is valid until the given `YYMMDD`
    Local { expiry_date: String },
}

impl From<OnlineOutcome> for PassMode {
    fn from(outcome: OnlineOutcome) -> Self {
        match outcome {
            OnlineOutcome::Cached => PassMode::Cached,
            OnlineOutcome::GracePeriod => PassMode::GracePeriod,
            OnlineOutcome::Verified { expire_date } => PassMode::Online { expire_date },
        }
    }
}

/// Decides whether this process may start
pub struct LicenseValidator<'a> {
    config: &'a Config,
    fingerprint: String,
    store: CacheStore,
    transport: Box<dyn AuthTransport + 'a>,
    artifact: ArtifactHasher,
}

impl<'a> LicenseValidator<'a> {
    /// Build a validator with the production store, HTTP transport and artifact
    ///
    /// # Arguments
    /// * `config` - Loaded configuration
    /// * `fingerprint` - Fingerprint of this device
    pub fn new(config: &'a Config, fingerprint: impl Into<String>) -> LicenseResult<Self> {
        let store = match &config.cache_dir {
            Some(dir) => CacheStore::new(dir),
            None => CacheStore::at_default_location(),
        };
        let artifact = match &config.artifact_path {
            Some(path) => ArtifactHasher::for_path(path),
            None => ArtifactHasher::current_exe(),
        };
        let transport = HttpTransport::new(config.request_timeout())?;
        Ok(Self::with_parts(
            config,
            fingerprint,
            store,
            Box::new(transport),
            artifact,
        ))
    }

    /// Build a validator from explicit collaborators
    pub fn with_parts(
        config: &'a Config,
        fingerprint: impl Into<String>,
        store: CacheStore,
        transport: Box<dyn AuthTransport + 'a>,
        artifact: ArtifactHasher,
    ) -> Self {
        Self {
            config,
            fingerprint: fingerprint.into(),
            store,
            transport,
            artifact,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Run one validation attempt
    ///
    /// # Returns
    /// How the gate was passed. Any error blocks startup; `LockedOut` must
    /// additionally terminate the process (see [`LicenseValidator::enforce`]).
    pub fn check(&self) -> LicenseResult<PassMode> {
        if !self.config.license_enabled {
            warn!(
                app = %self.config.app_name,
                "license verification is disabled, skipping all checks"
            );
            return Ok(PassMode::Disabled);
        }

        if self.config.online_license_enabled {
            match self.check_online() {
                Ok(outcome) => {
                    let mode = PassMode::from(outcome);
                    info!(app = %self.config.app_name, ?mode, "license verified online");
                    return Ok(mode);
                }
                Err(e) if e.is_lockout() => return Err(e),
                Err(e) => warn!("online validation failed, falling back to local license: {}", e),
            }
        }

        let record = codec::decode_and_verify(&self.config.license_key, &self.fingerprint)?;
        self.store.update_validation_info(&self.fingerprint, true);
        info!(
            app = %self.config.app_name,
            expiry = %record.expiry_date,
            "license verified"
        );
        Ok(PassMode::Local {
            expiry_date: record.expiry_date,
        })
    }

    fn check_online(&self) -> LicenseResult<OnlineOutcome> {
        let auth_url = self.config.effective_auth_url().ok_or_else(|| {
            LicenseError::NotConfigured("encrypted_auth_url is missing".to_string())
        })?;
        let private_key = self.config.effective_private_key().ok_or_else(|| {
            LicenseError::NotConfigured("encrypted_private_key is missing".to_string())
        })?;

        OnlineValidator::new(
            &self.fingerprint,
            &self.store,
            self.transport.as_ref(),
            self.artifact.clone(),
        )
        .validate(&auth_url, &private_key)
    }

    /// Run [`LicenseValidator::check`] and terminate the process on lockout
    pub fn enforce(&self) -> LicenseResult<PassMode> {
        match self.check() {
            Err(e) if e.is_lockout() => {
                error!("{}", e);
                error!(
                    fingerprint = %self.fingerprint,
                    "process terminated, request a new license for this machine code"
                );
                std::process::exit(1);
            }
            other => other,
        }
    }
}
