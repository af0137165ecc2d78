//! The `config` module loads layered settings: built-in defaults, then an
//! optional `config/default.*` file, then `LCMCHAN_*` environment variables
//! (sections separated by `__`, e.g. `LCMCHAN_CLIENT__PROVIDER_URL`).
//!
//! When no provider URL is configured the `LCM_DEFAULT_URL` environment
//! variable is consulted before falling back to `memq://`.

mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{
    ClientSettings, DEFAULT_URL_ENV, FALLBACK_PROVIDER_URL, LoggingSettings, PublisherSettings,
    Settings, SubscriptionSettings, default_provider_url,
};

/// Loads the configuration from the default file and environment variables
/// Merges the configuration with default values
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as [`load_config`] with an explicit file stem (extension optional).
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("LCMCHAN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    // Merge with defaults
    let default = Settings::default();

    Ok(Settings {
        client: ClientSettings {
            provider_url: partial
                .client
                .as_ref()
                .and_then(|c| c.provider_url.clone())
                .unwrap_or_else(default_provider_url),
            poll_interval_ms: partial
                .client
                .as_ref()
                .and_then(|c| c.poll_interval_ms)
                .unwrap_or(default.client.poll_interval_ms),
            error_capacity: partial
                .client
                .as_ref()
                .and_then(|c| c.error_capacity)
                .unwrap_or(default.client.error_capacity),
        },
        subscription: SubscriptionSettings {
            default_capacity: partial
                .subscription
                .as_ref()
                .and_then(|s| s.default_capacity)
                .unwrap_or(default.subscription.default_capacity),
        },
        publisher: PublisherSettings {
            input_capacity: partial
                .publisher
                .as_ref()
                .and_then(|p| p.input_capacity)
                .unwrap_or(default.publisher.input_capacity),
            error_capacity: partial
                .publisher
                .as_ref()
                .and_then(|p| p.error_capacity)
                .unwrap_or(default.publisher.error_capacity),
        },
        logging: LoggingSettings {
            level: partial
                .logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or(default.logging.level),
        },
    })
}

#[cfg(test)]
mod tests;
