//! Typed access to environment-style settings
//!
//! Missing or blank variables read as `None` so callers can fall back to
//! defaults; malformed values are reported instead of silently ignored.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Error raised for a variable that is present but cannot be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct EnvError {
    pub key: String,
    pub value: String,
    pub reason: String,
}

/// Source of key/value settings
///
/// Wraps the process environment in production and a plain map in tests, so
/// configuration can be exercised without mutating global state.
pub struct EnvSource<'a> {
    lookup: Box<dyn Fn(&str) -> Option<String> + Send + Sync + 'a>,
}

impl EnvSource<'static> {
    /// Read from the process environment
    pub fn process() -> Self {
        Self::from_fn(|key| std::env::var(key).ok())
    }
}

impl<'a> EnvSource<'a> {
    /// Read through an arbitrary lookup function
    pub fn from_fn(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'a) -> Self {
        Self {
            lookup: Box::new(lookup),
        }
    }

    /// Read from a borrowed map
    pub fn from_map(map: &'a HashMap<String, String>) -> Self {
        Self::from_fn(move |key| map.get(key).cloned())
    }

    /// Raw value, trimmed; blank values count as missing
    pub fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Parse a value with `FromStr`
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, EnvError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|value| {
                value.parse::<T>().map_err(|e| EnvError {
                    key: key.to_string(),
                    value: value.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Parse a boolean flag (`true/false`, `1/0`, `yes/no`, `on/off`)
    pub fn parse_bool(&self, key: &str) -> Result<Option<bool>, EnvError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };

        match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(EnvError {
                key: key.to_string(),
                value,
                reason: "expected a boolean".to_string(),
            }),
        }
    }

    /// Split a comma-separated list, dropping empty entries
    pub fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
    }
}
