/// Utility modules
pub mod clock;
pub mod logging;
pub mod platform;
