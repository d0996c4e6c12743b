pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str, SUPPORTED_CONFIG_VERSION};
pub use schema::{Config, ImportConfig, LoggingConfig, ProviderConfig, ProviderKind};
