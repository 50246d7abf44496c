//! Startup configuration resolved from the process environment.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;

pub const API_KEY_VAR: &str = "AIWEN_API_KEY";
pub const IPV4_ACCURACY_VAR: &str = "IPV4_ACCURACY";
pub const IPV6_ACCURACY_VAR: &str = "IPV6_ACCURACY";

/// Granularity of geolocation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Accuracy {
    #[default]
    City,
    District,
    Street,
}

impl Accuracy {
    pub fn as_str(self) -> &'static str {
        match self {
            Accuracy::City => "city",
            Accuracy::District => "district",
            Accuracy::Street => "street",
        }
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown accuracy '{0}'")]
pub struct ParseAccuracyError(String);

impl FromStr for Accuracy {
    type Err = ParseAccuracyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "city" => Ok(Accuracy::City),
            "district" => Ok(Accuracy::District),
            "street" => Ok(Accuracy::Street),
            _ => Err(ParseAccuracyError(s.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("AIWEN_API_KEY environment variable is not set")]
    MissingApiKey,
    #[error("invalid {var} value '{value}': must be one of city, district, street")]
    InvalidAccuracy { var: &'static str, value: String },
}

/// Immutable settings shared by the client and the dispatcher.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub api_key: String,
    pub ipv4_accuracy: Accuracy,
    pub ipv6_accuracy: Accuracy,
}

// Keeps the key out of logs and panic messages.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("ipv4_accuracy", &self.ipv4_accuracy)
            .field("ipv6_accuracy", &self.ipv6_accuracy)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::from_lookup(|name| std::env::var(name).ok())?;
        info!(
            "Resolved accuracy: ipv4={}, ipv6={}",
            config.ipv4_accuracy, config.ipv6_accuracy
        );
        Ok(config)
    }

    /// Resolve configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR)
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        Ok(Self {
            api_key,
            ipv4_accuracy: accuracy_from(&lookup, IPV4_ACCURACY_VAR)?,
            ipv6_accuracy: accuracy_from(&lookup, IPV6_ACCURACY_VAR)?,
        })
    }
}

fn accuracy_from<F>(lookup: &F, var: &'static str) -> Result<Accuracy, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(Accuracy::default()),
        Some(value) if value.trim().is_empty() => Ok(Accuracy::default()),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidAccuracy { var, value }),
    }
}
