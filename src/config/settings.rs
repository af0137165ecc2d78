use serde::{Deserialize, Serialize};

/// Environment variable naming the provider URL used when none is configured.
pub const DEFAULT_URL_ENV: &str = "LCM_DEFAULT_URL";

/// Provider used when neither configuration nor `LCM_DEFAULT_URL` names one.
pub const FALLBACK_PROVIDER_URL: &str = "memq://";

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    pub client: ClientSettings,
    pub subscription: SubscriptionSettings,
    pub publisher: PublisherSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for a client session.
///
/// `poll_interval_ms` bounds how long the event loop waits inside the
/// transport before it re-checks whether the client was closed.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClientSettings {
    pub provider_url: String,
    pub poll_interval_ms: u64,
    pub error_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SubscriptionSettings {
    pub default_capacity: usize,
}

/// Configuration settings for publisher pipelines.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PublisherSettings {
    pub input_capacity: usize,
    pub error_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub client: Option<PartialClientSettings>,
    pub subscription: Option<PartialSubscriptionSettings>,
    pub publisher: Option<PartialPublisherSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub provider_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub error_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialSubscriptionSettings {
    pub default_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPublisherSettings {
    pub input_capacity: Option<usize>,
    pub error_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// Provider URL from `LCM_DEFAULT_URL`, or `memq://` when it is unset or empty.
pub fn default_provider_url() -> String {
    std::env::var(DEFAULT_URL_ENV)
        .ok()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_PROVIDER_URL.to_string())
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            client: ClientSettings::default(),
            subscription: SubscriptionSettings {
                default_capacity: 1024,
            },
            publisher: PublisherSettings {
                input_capacity: 1024,
                error_capacity: 64,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            provider_url: FALLBACK_PROVIDER_URL.to_string(),
            poll_interval_ms: 50,
            error_capacity: 64,
        }
    }
}
