use std::path::Path;

use config::{Config, Environment, File, FileFormat, Map};
use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "profile_sync.toml";
pub const ENV_PREFIX: &str = "PROFILE_SYNC";
pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:5173/callback.html";

/// Endpoints the client needs before anything else can run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub provider_url: String,
    #[serde(default)]
    pub provider_anon_key: String,
    #[serde(default)]
    pub backend_url: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
}

fn default_redirect_url() -> String {
    DEFAULT_REDIRECT_URL.to_string()
}

impl ClientConfig {
    /// Reads `path` (or `profile_sync.toml` when present) and then
    /// `PROFILE_SYNC__*` environment variables. The result is not validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    fn load_with_env(
        path: Option<&Path>,
        env: Option<Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let config = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").source(env))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Normalizes URLs and rejects missing endpoints.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.provider_url = self.provider_url.trim().trim_end_matches('/').to_string();
        self.provider_anon_key = self.provider_anon_key.trim().to_string();
        self.backend_url = self.backend_url.trim().trim_end_matches('/').to_string();
        self.redirect_url = self.redirect_url.trim().to_string();

        if self.provider_url.is_empty() {
            return Err(ConfigError::Missing("provider_url"));
        }
        if self.provider_anon_key.is_empty() {
            return Err(ConfigError::Missing("provider_anon_key"));
        }
        if self.backend_url.is_empty() {
            return Err(ConfigError::Missing("backend_url"));
        }
        if self.redirect_url.is_empty() {
            self.redirect_url = default_redirect_url();
        }
        for (field, value) in [
            ("provider_url", &self.provider_url),
            ("backend_url", &self.backend_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| ConfigError::Invalid(format!("{field} {value:?}: {e}")))?;
        }
        Ok(self)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
