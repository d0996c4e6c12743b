use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;
use crate::secrets::has_secret_source;

pub const SUPPORTED_CONFIG_VERSION: &str = "1.0";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != SUPPORTED_CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let provider = &config.provider;
    if provider.model.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "provider.model must not be empty".to_string(),
        });
    }
    if provider.timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "provider.timeout_secs must be greater than zero".to_string(),
        });
    }
    if let Some(base_url) = &provider.base_url {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Validation {
                message: format!("provider.base_url must be an http(s) URL: {}", base_url),
            });
        }
    }
    // A local compatible server may not need a key, so only vendor endpoints
    // require one.
    if provider.base_url.is_none()
        && !has_secret_source(
            provider.api_key.as_deref(),
            provider.api_key_file.as_deref(),
            provider.api_key_env.as_deref(),
        )
    {
        return Err(ConfigError::Validation {
            message: "provider needs one of api_key, api_key_file or api_key_env".to_string(),
        });
    }

    Ok(())
}
