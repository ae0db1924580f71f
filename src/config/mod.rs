use crate::error::{RecourseError, Result};
use axum::http::StatusCode;
use dashmap::DashMap;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

/// Prefix of the environment variables picked up by [`ConfigService::from_env`]
pub const ENV_PREFIX: &str = "RECOURSE_";

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `RECOURSE_*` environment variable
    pub fn from_env() -> Self {
        let service = Self::default();
        for (key, value) in env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)) {
            service.set(&key, &value);
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Parse a value, `Ok(None)` when the key is absent
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| RecourseError::invalid_config(key, format!("{raw:?}: {e}")))
            })
            .transpose()
    }
}

/// Settings of the error filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSettings {
    /// Status set by intercepted redirects
    pub redirect_status: StatusCode,
    /// Whether panics escaping downstream code are dispatched like failures
    pub catch_panics: bool,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            redirect_status: StatusCode::FOUND,
            catch_panics: true,
        }
    }
}

impl FilterSettings {
    pub const REDIRECT_STATUS_KEY: &'static str = "RECOURSE_REDIRECT_STATUS";
    pub const CATCH_PANICS_KEY: &'static str = "RECOURSE_CATCH_PANICS";

    pub fn from_config(config: &ConfigService) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(code) = config.get_parsed::<u16>(Self::REDIRECT_STATUS_KEY)? {
            let status = StatusCode::from_u16(code)
                .map_err(|e| RecourseError::invalid_config(Self::REDIRECT_STATUS_KEY, e.to_string()))?;
            if !status.is_redirection() {
                return Err(RecourseError::invalid_config(
                    Self::REDIRECT_STATUS_KEY,
                    format!("{code} is not a redirect status"),
                ));
            }
            settings.redirect_status = status;
        }

        if let Some(catch_panics) = config.get_parsed::<bool>(Self::CATCH_PANICS_KEY)? {
            settings.catch_panics = catch_panics;
        }

        Ok(settings)
    }

    pub fn from_env() -> Result<Self> {
        Self::from_config(&ConfigService::from_env())
    }
}
