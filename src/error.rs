/// Error types for license verification
use thiserror::Error;

/// Everything that can go wrong while deciding whether this process may start.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Malformed base64, wrong key, or corrupted ciphertext.
    #[error("cipher error: {0}")]
    Cipher(String),

    /// Decrypted payload is not `fingerprint,expiry`.
    #[error("license payload malformed: {0}")]
    LicenseFormat(String),

    /// License was issued for another device.
    #[error("license does not belong to this device")]
    MachineMismatch,

    /// Expiry is not a valid `YYMMDD` date.
    #[error("invalid expiry date {0:?}, expected YYMMDD (e.g. 250101)")]
    DateFormat(String),

    /// License ran out at the end of the given day.
    #[error("license expired on {0}")]
    Expired(String),

    /// Artifact hash unavailable or embedded secrets failed to decrypt.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Network error, timeout, or non-200 answer from the authorization server.
    #[error("authorization server unreachable: {0}")]
    Transport(String),

    /// Authorization server answered with something we cannot interpret.
    #[error("unexpected authorization response: {0}")]
    ResponseFormat(String),

    /// Authorization server explicitly rejected this device.
    #[error("license rejected by authorization server: {0}")]
    RemoteDenied(String),

    /// Required license material missing from configuration.
    #[error("license not configured: {0}")]
    NotConfigured(String),

    /// Too many consecutive online failures. The host process must terminate.
    #[error("license locked out after {failures} failed online validations")]
    LockedOut { failures: u32 },
}

impl LicenseError {
    /// Whether this error must end the process instead of falling back.
    pub fn is_lockout(&self) -> bool {
        matches!(self, LicenseError::LockedOut { .. })
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to locate executable: {0}")]
    Executable(#[source] std::io::Error),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_lockout_is_fatal() {
        assert!(LicenseError::LockedOut { failures: 2 }.is_lockout());
        assert!(!LicenseError::MachineMismatch.is_lockout());
        assert!(!LicenseError::Transport("timeout".into()).is_lockout());
    }

    #[test]
    fn test_messages() {
        let err = LicenseError::Expired("250101".to_string());
        assert_eq!(err.to_string(), "license expired on 250101");

        let err = LicenseError::LockedOut { failures: 2 };
        assert!(err.to_string().contains("2 failed"));
    }
}
