//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the platform limits the bot has to respect.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Messaging channel secret, used to verify webhook signatures
    pub channel_secret: String,
    /// Messaging channel access token
    pub channel_token: String,

    /// Base URL of the recognition service API
    pub recognizer_api_endpoint: String,
    /// Admin identity used to register users with the recognition service
    pub recognizer_admin_email: String,
    /// Admin token paired with `recognizer_admin_email`
    pub recognizer_admin_token: String,

    /// Base64 encoded AES key (16, 24 or 32 bytes) protecting stored user tokens
    pub token_cipher_key: String,

    /// Path the messaging platform posts webhook events to
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL of this service, used for thumbnail links
    #[serde(default)]
    pub app_url: String,
    /// Domain appended to platform user ids to form recognizer identities
    #[serde(default = "default_platform_domain")]
    pub platform_domain: String,

    /// Treat plain text messages as label queries
    #[serde(default)]
    pub text_query_enabled: bool,
    /// Wire the negative carousel button as a reject postback instead of a text reply
    #[serde(default)]
    pub reject_via_postback: bool,
}

fn default_callback_path() -> String {
    "/callback".to_string()
}

const fn default_port() -> u16 {
    8080
}

fn default_platform_domain() -> String {
    "line.me".to_string()
}

/// Builds the layered configuration source shared by all settings loaders.
///
/// # Errors
///
/// Returns a `ConfigError` if any source fails to load.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // UPPER_SNAKE_CASE variables map onto snake_case keys; empty ones count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use face_manager_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or a required key is missing.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Public URL of the thumbnail proxy endpoint.
    #[must_use]
    pub fn thumbnail_base_url(&self) -> String {
        format!("{}/thumbnail", self.app_url.trim_end_matches('/'))
    }
}

/// Maximum number of columns the platform accepts in one carousel
pub const CAROUSEL_MAX_COLUMNS: usize = 5;
/// Maximum characters in a carousel column title
pub const CAROUSEL_TITLE_MAX_CHARS: usize = 40;
/// Maximum characters in a carousel column text
pub const CAROUSEL_TEXT_MAX_CHARS: usize = 60;
/// Maximum bytes of postback action data
pub const POSTBACK_DATA_MAX_BYTES: usize = 300;
/// Alt text shown by clients that cannot render templates
pub const TEMPLATE_ALT_TEXT: &str = "template message";

/// Base URL of the messaging platform API
pub const PLATFORM_API_BASE: &str = "https://api.line.me";
/// Base URL of the messaging platform content API
pub const PLATFORM_DATA_API_BASE: &str = "https://api-data.line.me";

// Reply retry policy
/// Initial backoff for platform API retries
pub const PLATFORM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Maximum backoff for platform API retries
pub const PLATFORM_API_MAX_BACKOFF_MS: u64 = 4000;
/// Maximum retries for platform API calls
pub const PLATFORM_API_MAX_RETRIES: usize = 3;

/// Default HTTP timeout for outbound calls
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
/// Default capacity of the credential cache
pub const DEFAULT_CREDENTIAL_CACHE_MAX_SIZE: u64 = 10_000;

/// HTTP timeout for the platform and recognizer clients.
///
/// Reads `HTTP_TIMEOUT_SECS`, falls back to 30 seconds.
#[must_use]
pub fn get_http_timeout_secs() -> u64 {
    std::env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS)
}

/// Maximum number of decrypted-token entries kept in memory.
///
/// Reads `CREDENTIAL_CACHE_MAX_SIZE`, falls back to 10 000.
#[must_use]
pub fn get_credential_cache_max_size() -> u64 {
    std::env::var("CREDENTIAL_CACHE_MAX_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_CREDENTIAL_CACHE_MAX_SIZE)
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        channel_secret: "secret".to_string(),
        channel_token: "token".to_string(),
        recognizer_api_endpoint: "http://recognizer.test".to_string(),
        recognizer_admin_email: "admin@example.com".to_string(),
        recognizer_admin_token: "admin-token".to_string(),
        token_cipher_key: "MDEyMzQ1Njc4OWFiY2RlZg==".to_string(),
        callback_path: default_callback_path(),
        port: default_port(),
        app_url: "https://bot.example.com/".to_string(),
        platform_domain: default_platform_domain(),
        text_query_enabled: false,
        reject_via_postback: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Single test so environment mutation stays sequential
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("CHANNEL_SECRET", "s");
        env::set_var("CHANNEL_TOKEN", "t");
        env::set_var("RECOGNIZER_API_ENDPOINT", "https://recognizer.example.com");
        env::set_var("RECOGNIZER_ADMIN_EMAIL", "admin@example.com");
        env::set_var("RECOGNIZER_ADMIN_TOKEN", "adm");
        env::set_var("TOKEN_CIPHER_KEY", "MDEyMzQ1Njc4OWFiY2RlZg==");
        env::set_var("CALLBACK_PATH", "");

        let settings = Settings::new()?;
        assert_eq!(
            settings.recognizer_api_endpoint,
            "https://recognizer.example.com"
        );
        // Empty values fall back to defaults
        assert_eq!(settings.callback_path, "/callback");
        assert!(!settings.text_query_enabled);

        for key in [
            "CHANNEL_SECRET",
            "CHANNEL_TOKEN",
            "RECOGNIZER_API_ENDPOINT",
            "RECOGNIZER_ADMIN_EMAIL",
            "RECOGNIZER_ADMIN_TOKEN",
            "TOKEN_CIPHER_KEY",
            "CALLBACK_PATH",
        ] {
            env::remove_var(key);
        }
        Ok(())
    }

    #[test]
    fn test_thumbnail_base_url_strips_trailing_slash() {
        let settings = test_settings();
        assert_eq!(
            settings.thumbnail_base_url(),
            "https://bot.example.com/thumbnail"
        );
    }
}
