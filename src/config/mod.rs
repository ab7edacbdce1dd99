//! Configuration schema, loading, and hierarchy merging.

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::{ConfigLoader, USER_CONFIG_DIR, USER_CONFIG_FILE};
pub use schema::{Config, PolicyConfig, ServerConfig, DEFAULT_REFRESH_MINS};
