/// License Gate - machine-bound license checks for application startup
///
/// Binds a license to this device's fingerprint, optionally confirms it
/// with an authorization server, and remembers outcomes in an encrypted,
/// hidden cache so a single network failure does not stop the application.
pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod execution;
pub mod utils;
pub mod verification;

pub use config::{Config, load_config, load_config_from};
pub use error::{ConfigError, LicenseError, LicenseResult};
pub use verification::{LicenseValidator, PassMode, get_machine_fingerprint};
