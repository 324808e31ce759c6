/// Online license validation against the authorization server
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use super::artifact::ArtifactHasher;
use crate::cache::CacheStore;
use crate::crypto::{asymmetric, symmetric};
use crate::error::{LicenseError, LicenseResult};

/// Default request timeout for the authorization server
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Verification request payload
#[derive(Debug, Serialize)]
pub struct VerifyRequest {
    #[serde(rename = "machineCode")]
    pub machine_code: String,
}

/// Verification response from server
#[derive(Debug, Deserialize)]
pub struct VerifyResponse {
    pub valid: Option<bool>,
    #[serde(rename = "expireDate")]
    pub expire_date: Option<String>,
    pub message: Option<String>,
}

/// Raw HTTP answer
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Carries a verification request to the authorization server
pub trait AuthTransport {
    /// POST `request` as JSON to `url`
    ///
    /// Errors only for failures below HTTP (DNS, connect, timeout, TLS).
    fn post_json(&self, url: &str, request: &VerifyRequest) -> LicenseResult<TransportResponse>;
}

/// Blocking reqwest transport with a bounded timeout
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> LicenseResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(false) // Enforce SSL verification
            .build()
            .map_err(|e| LicenseError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl AuthTransport for HttpTransport {
    fn post_json(&self, url: &str, request: &VerifyRequest) -> LicenseResult<TransportResponse> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .map_err(|e| LicenseError::Transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| LicenseError::Transport(format!("failed to read response body: {}", e)))?;
        Ok(TransportResponse { status, body })
    }
}

/// How an online validation passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnlineOutcome {
    /// A fresh cached result was used; no request was made
    Cached,
    /// Previous attempt failed once and the 24h grace window is still open
    GracePeriod,
    /// Server confirmed the license just now
    Verified { expire_date: Option<String> },
}

/// Validates this device against the authorization server
pub struct OnlineValidator<'a> {
    fingerprint: &'a str,
    store: &'a CacheStore,
    transport: &'a dyn AuthTransport,
    artifact: ArtifactHasher,
}

impl<'a> OnlineValidator<'a> {
    pub fn new(
        fingerprint: &'a str,
        store: &'a CacheStore,
        transport: &'a dyn AuthTransport,
        artifact: ArtifactHasher,
    ) -> Self {
        Self {
            fingerprint,
            store,
            transport,
            artifact,
        }
    }

    /// Run the online validation
    ///
    /// # Arguments
    /// * `encrypted_auth_url` - Server URL, RSA-encrypted with the public key
    /// * `encrypted_private_key` - RSA private key, AES-encrypted with the artifact hash
    ///
    /// # Returns
    /// How validation passed, or the reason it failed. `LockedOut` means the
    /// caller must terminate the process.
    pub fn validate(
        &self,
        encrypted_auth_url: &str,
        encrypted_private_key: &str,
    ) -> LicenseResult<OnlineOutcome> {
        let fp = self.fingerprint;

        if let Some(cache) = self.store.get_cache(fp) {
            if cache.valid {
                info!(
                    expire_date = cache.expire_date.as_deref().unwrap_or("unknown"),
                    "using cached online validation"
                );
                return Ok(OnlineOutcome::Cached);
            }
        }

        if let Some(record) = self.store.get_failure_record(fp) {
            if record.is_locked_out() {
                error!(
                    failures = record.failure_count,
                    "online validation failed too many times"
                );
                return Err(LicenseError::LockedOut {
                    failures: record.failure_count,
                });
            }
            if self.store.is_in_grace_period(fp) {
                warn!("online validation failed earlier, running inside the 24h grace period");
                return Ok(OnlineOutcome::GracePeriod);
            }
            info!("grace period over, retrying online validation");
            self.store.clear_failure_record(fp);
        }

        let artifact_hash = self.artifact.hash()?;

        let private_key = symmetric::decrypt(encrypted_private_key, &artifact_hash).map_err(|e| {
            error!("failed to decrypt private key, artifact may have been modified: {}", e);
            LicenseError::Integrity("embedded private key does not match this artifact".to_string())
        })?;

        let auth_url = asymmetric::decrypt(encrypted_auth_url, &private_key).map_err(|e| {
            error!("failed to decrypt authorization URL: {}", e);
            LicenseError::Integrity("authorization URL cannot be decrypted".to_string())
        })?;

        let request = VerifyRequest {
            machine_code: fp.to_string(),
        };

        let response = match self.transport.post_json(&auth_url, &request) {
            Ok(response) => response,
            Err(e) => {
                error!("authorization server unreachable: {}", e);
                return Err(self.fail(e));
            }
        };

        info!(status = response.status, "authorization server responded");
        if response.status != 200 {
            return Err(self.fail(LicenseError::Transport(format!(
                "server returned status {}",
                response.status
            ))));
        }

        let parsed: VerifyResponse = serde_json::from_str(&response.body).map_err(|e| {
            error!("failed to parse authorization response: {}", e);
            LicenseError::ResponseFormat(format!("invalid JSON: {}", e))
        })?;

        match parsed.valid {
            Some(true) => {}
            Some(false) => {
                let message = parsed.message.unwrap_or_else(|| "unknown error".to_string());
                error!(%message, "authorization server rejected license");
                return Err(self.fail(LicenseError::RemoteDenied(message)));
            }
            None => {
                return Err(self.fail(LicenseError::ResponseFormat(
                    "missing `valid` flag".to_string(),
                )));
            }
        }

        self.store.save_cache(fp, true, parsed.expire_date.as_deref());
        self.store.clear_failure_record(fp);
        info!(
            expire_date = parsed.expire_date.as_deref().unwrap_or("unknown"),
            "online license validation succeeded"
        );
        Ok(OnlineOutcome::Verified {
            expire_date: parsed.expire_date,
        })
    }

    /// Count a failure; escalate to lockout once the limit is hit
    fn fail(&self, err: LicenseError) -> LicenseError {
        match self.store.record_failure(self.fingerprint) {
            Some(_) => err,
            None => {
                error!("license validation failure limit exceeded");
                LicenseError::LockedOut {
                    failures: crate::cache::records::LOCKOUT_THRESHOLD,
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::GRACE_PERIOD_MS;
    use crate::utils::clock::ManualClock;
    use std::cell::RefCell;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::{NamedTempFile, TempDir};

    pub(crate) const FP: &str = "5c1e9a3b7d2f4e6a8c0b1d3f5e7a9c2b4d6f8e0a1c3b5d7f9e2a4c6b8d0f1e3a";
    pub(crate) const AUTH_URL: &str = "https://auth.example.com/api/license/verify";

    /// Replays canned answers and records what was sent
    pub(crate) struct StubTransport {
        responses: RefCell<Vec<LicenseResult<TransportResponse>>>,
        pub calls: RefCell<Vec<(String, String)>>,
    }

    impl StubTransport {
        pub fn new(responses: Vec<LicenseResult<TransportResponse>>) -> Self {
            Self {
                responses: RefCell::new(responses),
                calls: RefCell::new(Vec::new()),
            }
        }

        pub fn ok(body: &str) -> LicenseResult<TransportResponse> {
            Ok(TransportResponse {
                status: 200,
                body: body.to_string(),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl AuthTransport for StubTransport {
        fn post_json(&self, url: &str, request: &VerifyRequest) -> LicenseResult<TransportResponse> {
            let body = serde_json::to_string(request).unwrap();
            self.calls.borrow_mut().push((url.to_string(), body));
            let mut responses = self.responses.borrow_mut();
            if responses.is_empty() {
                return Err(LicenseError::Transport("no canned response".to_string()));
            }
            responses.remove(0)
        }
    }

    /// Artifact on disk plus credentials sealed for it
    pub(crate) struct Sealed {
        pub artifact: NamedTempFile,
        pub encrypted_url: String,
        pub encrypted_key: String,
    }

    pub(crate) fn seal(url: &str) -> Sealed {
        let mut artifact = NamedTempFile::new().unwrap();
        artifact.write_all(b"\x7fELF protected application").unwrap();
        artifact.flush().unwrap();

        let pair = asymmetric::generate_key_pair(1024).unwrap();
        let hash = ArtifactHasher::for_path(artifact.path()).hash().unwrap();
        Sealed {
            encrypted_url: asymmetric::encrypt(url, &pair.public_key).unwrap(),
            encrypted_key: symmetric::encrypt(&pair.private_key, &hash).unwrap(),
            artifact,
        }
    }

    fn store(dir: &TempDir, clock: &ManualClock) -> CacheStore {
        CacheStore::with_clock(dir.path(), Arc::new(clock.clone()))
    }

    fn run(
        sealed: &Sealed,
        store: &CacheStore,
        transport: &StubTransport,
    ) -> LicenseResult<OnlineOutcome> {
        OnlineValidator::new(
            FP,
            store,
            transport,
            ArtifactHasher::for_path(sealed.artifact.path()),
        )
        .validate(&sealed.encrypted_url, &sealed.encrypted_key)
    }

    #[test]
    fn test_verify_request_serialization() {
        let req = VerifyRequest {
            machine_code: "fp_test".to_string(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"machineCode":"fp_test"}"#);
    }

    #[test]
    fn test_response_parsing() {
        let parsed: VerifyResponse =
            serde_json::from_str(r#"{"valid":true,"expireDate":"2099-12-31","extra":1}"#).unwrap();
        assert_eq!(parsed.valid, Some(true));
        assert_eq!(parsed.expire_date.as_deref(), Some("2099-12-31"));
        assert!(parsed.message.is_none());
    }

    #[test]
    fn test_success_caches_and_sends_fingerprint() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        let sealed = seal(AUTH_URL);
        let transport = StubTransport::new(vec![StubTransport::ok(
            r#"{"valid":true,"expireDate":"2099-12-31"}"#,
        )]);

        let outcome = run(&sealed, &store, &transport).unwrap();
        assert_eq!(
            outcome,
            OnlineOutcome::Verified {
                expire_date: Some("2099-12-31".to_string())
            }
        );

        let calls = transport.calls.borrow();
        assert_eq!(calls[0].0, AUTH_URL);
        assert_eq!(calls[0].1, format!(r#"{{"machineCode":"{}"}}"#, FP));

        let cache = store.get_cache(FP).unwrap();
        assert!(cache.valid);
        assert_eq!(cache.expire_date.as_deref(), Some("2099-12-31"));
    }

    #[test]
    fn test_fresh_cache_skips_network() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        store.save_cache(FP, true, Some("2099-12-31"));

        let sealed = seal(AUTH_URL);
        let transport = StubTransport::new(vec![]);
        assert_eq!(run(&sealed, &store, &transport).unwrap(), OnlineOutcome::Cached);
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_stale_cache_goes_online() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        store.save_cache(FP, true, None);
        clock.advance(crate::cache::CACHE_VALIDITY_MS + 1);

        let sealed = seal(AUTH_URL);
        let transport = StubTransport::new(vec![StubTransport::ok(r#"{"valid":true}"#)]);
        assert!(matches!(
            run(&sealed, &store, &transport).unwrap(),
            OnlineOutcome::Verified { expire_date: None }
        ));
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_transport_failure_then_grace_then_retry() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        let sealed = seal(AUTH_URL);
        let transport = StubTransport::new(vec![
            Err(LicenseError::Transport("timed out".to_string())),
            Err(LicenseError::Transport("timed out".to_string())),
        ]);

        // First failure surfaces as a transport error
        assert!(matches!(
            run(&sealed, &store, &transport),
            Err(LicenseError::Transport(_))
        ));
        assert_eq!(store.get_failure_record(FP).unwrap().failure_count, 1);

        // Within 24h the next start passes without a request
        clock.advance(60 * 60 * 1000);
        assert_eq!(
            run(&sealed, &store, &transport).unwrap(),
            OnlineOutcome::GracePeriod
        );
        assert_eq!(transport.call_count(), 1);

        // After the window the stale record is cleared and the server tried again
        clock.advance(GRACE_PERIOD_MS);
        assert!(matches!(
            run(&sealed, &store, &transport),
            Err(LicenseError::Transport(_))
        ));
        assert_eq!(transport.call_count(), 2);
        assert_eq!(store.get_failure_record(FP).unwrap().failure_count, 1);
    }

    #[test]
    fn test_existing_lockout_is_fatal_without_request() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        store.record_failure(FP);
        store.record_failure(FP);

        let sealed = seal(AUTH_URL);
        let transport = StubTransport::new(vec![]);
        assert!(matches!(
            run(&sealed, &store, &transport),
            Err(LicenseError::LockedOut { failures: 2 })
        ));
        assert_eq!(transport.call_count(), 0);
    }

    #[test]
    fn test_second_failure_locks_out() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        let sealed = seal(AUTH_URL);

        // An earlier failure past its grace window, never cleared
        store.record_failure(FP);
        clock.advance(GRACE_PERIOD_MS + 1);

        // Stale record is cleared, so this failure counts as the first again
        let transport = StubTransport::new(vec![Ok(TransportResponse {
            status: 503,
            body: String::new(),
        })]);
        assert!(matches!(
            run(&sealed, &store, &transport),
            Err(LicenseError::Transport(_))
        ));

        // Same-window second failure hits the limit
        let transport = StubTransport::new(vec![Ok(TransportResponse {
            status: 500,
            body: String::new(),
        })]);
        let validator = OnlineValidator::new(
            FP,
            &store,
            &transport,
            ArtifactHasher::for_path(sealed.artifact.path()),
        );
        assert!(matches!(
            validator.fail(LicenseError::Transport("x".into())),
            LicenseError::LockedOut { .. }
        ));
    }

    #[test]
    fn test_remote_denied_records_failure() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        let sealed = seal(AUTH_URL);
        let transport = StubTransport::new(vec![StubTransport::ok(
            r#"{"valid":false,"message":"license revoked"}"#,
        )]);

        let result = run(&sealed, &store, &transport);
        assert!(matches!(result, Err(LicenseError::RemoteDenied(ref m)) if m == "license revoked"));
        assert_eq!(store.get_failure_record(FP).unwrap().failure_count, 1);
        assert!(store.get_cache(FP).is_none());
    }

    #[test]
    fn test_missing_valid_flag_records_failure() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        let sealed = seal(AUTH_URL);
        let transport = StubTransport::new(vec![StubTransport::ok(r#"{"expireDate":"x"}"#)]);

        assert!(matches!(
            run(&sealed, &store, &transport),
            Err(LicenseError::ResponseFormat(_))
        ));
        assert!(store.get_failure_record(FP).is_some());
    }

    #[test]
    fn test_unparsable_body() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        let sealed = seal(AUTH_URL);
        let transport = StubTransport::new(vec![StubTransport::ok("<html>oops</html>")]);

        assert!(matches!(
            run(&sealed, &store, &transport),
            Err(LicenseError::ResponseFormat(_))
        ));
    }

    #[test]
    fn test_tampered_artifact_is_integrity_error() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        let mut sealed = seal(AUTH_URL);
        sealed.artifact.write_all(b" patched").unwrap();
        sealed.artifact.flush().unwrap();

        let transport = StubTransport::new(vec![]);
        assert!(matches!(
            run(&sealed, &store, &transport),
            Err(LicenseError::Integrity(_))
        ));
        assert_eq!(transport.call_count(), 0);
        // Tampering is not a network failure
        assert!(store.get_failure_record(FP).is_none());
    }

    #[test]
    fn test_missing_artifact_is_integrity_error() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        let sealed = seal(AUTH_URL);
        let transport = StubTransport::new(vec![]);

        let result = OnlineValidator::new(
            FP,
            &store,
            &transport,
            ArtifactHasher::for_path(dir.path().join("gone.bin")),
        )
        .validate(&sealed.encrypted_url, &sealed.encrypted_key);
        assert!(matches!(result, Err(LicenseError::Integrity(_))));
    }

    #[test]
    fn test_success_clears_failure_record() {
        let dir = TempDir::new().unwrap();
        let clock = ManualClock::new(1_700_000_000_000);
        let store = store(&dir, &clock);
        store.record_failure(FP);
        clock.advance(GRACE_PERIOD_MS + 1);

        let sealed = seal(AUTH_URL);
        let transport = StubTransport::new(vec![StubTransport::ok(r#"{"valid":true}"#)]);
        assert!(run(&sealed, &store, &transport).is_ok());
        assert!(store.get_failure_record(FP).is_none());
    }
}
