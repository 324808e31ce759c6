/// Verification module - Device binding, license keys and online authorization
pub mod artifact;
pub mod codec;
pub mod fingerprint;
pub mod network;
pub mod validator;

pub use artifact::ArtifactHasher;
pub use fingerprint::get_machine_fingerprint;
pub use network::{AuthTransport, HttpTransport, OnlineOutcome, OnlineValidator, VerifyResponse};
pub use validator::{LicenseValidator, PassMode};
