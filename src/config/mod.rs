/// Configuration module - Load and validate license gate configuration
pub mod loader;
pub mod schema;

pub use loader::{default_config_path, load_config, load_config_from};
pub use schema::Config;
