//! Configuration providers
//!
//! A provider answers string lookups by key. Typed accessors are layered on
//! top through [`ConfigProviderExt`], so every source parses values the same way.

use std::collections::HashMap;
use std::env;

use crate::duration::parse_duration;
use crate::error::{ConfigError, Result};
use shared_types::SecretHandle;

/// Base trait for configuration sources
pub trait ConfigProvider: Send + Sync {
    /// Get a raw string value. A missing key is `ConfigError::Missing`.
    fn get_string(&self, key: &str) -> Result<String>;
}

/// Typed accessors shared by every provider
pub trait ConfigProviderExt: ConfigProvider {
    fn get_u32(&self, key: &str) -> Result<u32> {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<u32>()
            .map_err(|e| ConfigError::invalid(key, format!("not an unsigned integer: {}", e)))
    }

    fn get_float(&self, key: &str) -> Result<f64> {
        let value = self.get_string(key)?;
        value
            .trim()
            .parse::<f64>()
            .map_err(|e| ConfigError::invalid(key, format!("not a number: {}", e)))
    }

    fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_string(key)?;
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Ok(true),
            "false" | "no" | "0" | "off" => Ok(false),
            _ => Err(ConfigError::invalid(key, format!("not a boolean: {}", value))),
        }
    }

    fn get_duration(&self, key: &str) -> Result<std::time::Duration> {
        let value = self.get_string(key)?;
        parse_duration(&value).map_err(|reason| ConfigError::invalid(key, reason))
    }

    /// Read a credential. Empty values count as missing.
    fn get_secret(&self, key: &str) -> Result<SecretHandle> {
        let secret = SecretHandle::from(self.get_string(key)?);
        if secret.is_empty() {
            return Err(ConfigError::Missing(key.to_string()));
        }
        Ok(secret)
    }

    /// Like `get_string` but a missing key becomes `None`. Parse errors still surface.
    fn get_optional_string(&self, key: &str) -> Result<Option<String>> {
        optional(self.get_string(key))
    }

    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }
}

impl<T: ConfigProvider + ?Sized> ConfigProviderExt for T {}

/// Turn `Missing` into `None`, keeping every other error.
pub fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::Missing(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Environment variable based provider
#[derive(Debug, Clone, Default)]
pub struct EnvConfigProvider {
    prefix: Option<String>,
}

impl EnvConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix prepended to every key, e.g. `AUTOFIX` turns `poll_interval`
    /// into `AUTOFIX_POLL_INTERVAL`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    fn format_key(&self, key: &str) -> String {
        let mut env_key = String::new();
        if let Some(ref prefix) = self.prefix {
            env_key.push_str(prefix.trim_end_matches('_'));
            env_key.push('_');
        }
        env_key.push_str(
            &key.to_uppercase()
                .replace(|c: char| !c.is_ascii_alphanumeric(), "_"),
        );
        env_key
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        let env_key = self.format_key(key);
        env::var(&env_key).map_err(|e| match e {
            env::VarError::NotPresent => ConfigError::Missing(env_key),
            env::VarError::NotUnicode(_) => {
                ConfigError::invalid(env_key, "environment variable is not valid unicode")
            }
        })
    }
}

/// In-memory provider for tests or static configuration
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigProvider {
    values: HashMap<String, String>,
}

impl MemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: ToString,
    {
        self.values.insert(key.into(), value.to_string());
    }

    pub fn with<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: ToString,
    {
        self.set(key, value);
        self
    }
}

impl ConfigProvider for MemoryConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }
}

/// Tries providers in order; the first one that has the key wins.
#[derive(Default)]
pub struct CompositeConfigProvider {
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl CompositeConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_provider(&mut self, provider: impl ConfigProvider + 'static) {
        self.providers.push(Box::new(provider));
    }

    pub fn with_provider(mut self, provider: impl ConfigProvider + 'static) -> Self {
        self.add_provider(provider);
        self
    }
}

impl ConfigProvider for CompositeConfigProvider {
    fn get_string(&self, key: &str) -> Result<String> {
        for provider in &self.providers {
            match provider.get_string(key) {
                Ok(value) => return Ok(value),
                Err(ConfigError::Missing(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ConfigError::Missing(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_provider_typed_reads() {
        let provider = MemoryConfigProvider::new()
            .with("count", "12")
            .with("ratio", "0.5")
            .with("flag", "Yes")
            .with("interval", "90s");

        assert_eq!(provider.get_u32("count").unwrap(), 12);
        assert_eq!(provider.get_float("ratio").unwrap(), 0.5);
        assert!(provider.get_bool("flag").unwrap());
        assert_eq!(
            provider.get_duration("interval").unwrap(),
            std::time::Duration::from_secs(90)
        );
        assert!(matches!(
            provider.get_string("absent"),
            Err(ConfigError::Missing(_))
        ));
    }

    #[test]
    fn invalid_values_are_not_treated_as_missing() {
        let provider = MemoryConfigProvider::new().with("count", "many");
        let err = optional(provider.get_u32("count")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert_eq!(optional(provider.get_u32("other")).unwrap(), None);
    }

    #[test]
    fn env_key_formatting() {
        let provider = EnvConfigProvider::new().with_prefix("AUTOFIX_");
        assert_eq!(provider.format_key("poll_interval"), "AUTOFIX_POLL_INTERVAL");
        assert_eq!(provider.format_key("base-url"), "AUTOFIX_BASE_URL");
        assert_eq!(EnvConfigProvider::new().format_key("x.y"), "X_Y");
    }

    #[test]
    fn env_provider_reads_process_environment() {
        env::set_var("CFGTEST_PROVIDER_READ_VALUE", "hello");
        let provider = EnvConfigProvider::new().with_prefix("CFGTEST");
        assert_eq!(provider.get_string("provider_read_value").unwrap(), "hello");
        assert!(provider.get_string("provider_read_absent").is_err());
    }

    #[test]
    fn composite_first_hit_wins() {
        let primary = MemoryConfigProvider::new().with("a", "primary");
        let fallback = MemoryConfigProvider::new()
            .with("a", "fallback")
            .with("b", "fallback");

        let provider = CompositeConfigProvider::new()
            .with_provider(primary)
            .with_provider(fallback);

        assert_eq!(provider.get_string("a").unwrap(), "primary");
        assert_eq!(provider.get_string("b").unwrap(), "fallback");
        assert!(provider.get_string("c").is_err());
    }

    #[test]
    fn blank_secret_counts_as_missing() {
        let provider = MemoryConfigProvider::new().with("KEY", "  ");
        assert!(provider.get_secret("KEY").unwrap_err().is_missing());
    }
}
