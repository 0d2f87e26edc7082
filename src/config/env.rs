//! Environment lookups shared by the ambient configuration and the OAuth broker.
//!
//! Every lookup goes through [`normalize_env_value`], so accidental quoting in
//! `.env` files (`GOOGLE_REDIRECT_URI="https://..."`) behaves the same as the
//! unquoted value.

use std::{collections::BTreeMap, env};

use crate::error::BrokerError;

/// Trim surrounding whitespace and strip exactly one matching pair of quotes.
///
/// Mismatched quotes (`'value"`) and lone quotes are left alone apart from trimming.
pub fn normalize_env_value(value: &str) -> String {
    let cleaned = value.trim();
    let mut chars = cleaned.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if first == last && (first == '\'' || first == '"') => {
            chars.as_str().trim().to_string()
        }
        _ => cleaned.to_string(),
    }
}

/// Read-only view over configuration variables.
///
/// The broker holds one of these instead of reaching for `std::env` directly, so
/// request handling re-reads configuration on every call while tests inject a
/// fixed map.
pub trait EnvSource: Send + Sync {
    /// Raw value exactly as stored, before normalization.
    fn raw(&self, name: &str) -> Option<String>;

    /// Normalized value; may be empty.
    fn get(&self, name: &str) -> Option<String> {
        self.raw(name).map(|value| normalize_env_value(&value))
    }

    /// Normalized value that must be present and non-empty.
    fn require(&self, name: &str) -> Result<String, BrokerError> {
        match self.get(name) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(BrokerError::Configuration {
                name: name.to_string(),
            }),
        }
    }
}

/// Process environment layered over a snapshot of dotenv files.
///
/// The process environment always wins and is consulted live on each lookup;
/// the dotenv snapshot only fills gaps.
#[derive(Debug, Clone, Default)]
pub struct LayeredEnv {
    file_values: BTreeMap<String, String>,
}

impl LayeredEnv {
    pub fn new(file_values: BTreeMap<String, String>) -> Self {
        Self { file_values }
    }

    /// Names of all variables contributed by dotenv files.
    pub fn file_keys(&self) -> impl Iterator<Item = &str> {
        self.file_values.keys().map(String::as_str)
    }
}

impl EnvSource for LayeredEnv {
    fn raw(&self, name: &str) -> Option<String> {
        env::var(name)
            .ok()
            .or_else(|| self.file_values.get(name).cloned())
    }
}

/// Fixed in-memory variables, used by tests and embedders.
#[derive(Debug, Clone, Default)]
pub struct StaticEnv {
    values: BTreeMap<String, String>,
}

impl StaticEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.values.remove(name);
        self
    }
}

impl EnvSource for StaticEnv {
    fn raw(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}
