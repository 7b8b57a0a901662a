//! Typed pipeline settings.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::provider::{
    optional, CompositeConfigProvider, ConfigProvider, ConfigProviderExt, EnvConfigProvider,
};
use crate::provider_kind::ProviderKind;
use shared_types::SecretHandle;

/// Knobs for the resilience wrappers around outbound calls.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewaySettings {
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub failure_threshold: u32,
    pub breaker_cooldown: Duration,
    pub rate_limit_capacity: u32,
    pub rate_limit_refill_interval: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(30),
            failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(60),
            rate_limit_capacity: 10,
            rate_limit_refill_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutofixConfig {
    pub min_coverage_percent: f64,
    pub max_concurrent_fixes: usize,
    pub poll_interval: Duration,
    pub reasoning_provider: ProviderKind,
    pub reasoning_model: Option<String>,
    pub reasoning_base_url: Option<String>,
    pub max_candidates: usize,
    pub parallel_validation: bool,
    pub sandbox_base_image: String,
    pub sandbox_command_timeout: Duration,
    pub local_proxy_url: Option<String>,
    pub gateway: GatewaySettings,
    credentials: HashMap<ProviderKind, SecretHandle>,
}

impl Default for AutofixConfig {
    fn default() -> Self {
        Self {
            min_coverage_percent: 80.0,
            max_concurrent_fixes: 2,
            poll_interval: Duration::from_secs(300),
            reasoning_provider: ProviderKind::Anthropic,
            reasoning_model: None,
            reasoning_base_url: None,
            max_candidates: 3,
            parallel_validation: false,
            sandbox_base_image: "ubuntu:22.04".to_string(),
            sandbox_command_timeout: Duration::from_secs(600),
            local_proxy_url: None,
            gateway: GatewaySettings::default(),
            credentials: HashMap::new(),
        }
    }
}

impl AutofixConfig {
    /// Read `AUTOFIX_`-prefixed variables first, then unprefixed ones.
    /// A `.env` file in the working directory is loaded beforehand.
    pub fn from_env() -> Result<Self> {
        crate::load_dotenv();
        let provider = CompositeConfigProvider::new()
            .with_provider(EnvConfigProvider::new().with_prefix("AUTOFIX"))
            .with_provider(EnvConfigProvider::new());
        Self::from_provider(&provider)
    }

    /// Build and validate a configuration from any provider. Absent keys
    /// take their defaults; malformed values are errors.
    pub fn from_provider<P: ConfigProvider + ?Sized>(provider: &P) -> Result<Self> {
        let defaults = Self::default();
        let gateway_defaults = GatewaySettings::default();

        let reasoning_provider = match optional(provider.get_string("REASONING_PROVIDER"))? {
            Some(raw) => raw.parse()?,
            None => defaults.reasoning_provider,
        };

        let mut credentials = HashMap::new();
        for kind in ProviderKind::ALL {
            if let Some(var) = kind.api_key_var() {
                if let Some(secret) = optional(provider.get_secret(var))? {
                    credentials.insert(kind, secret);
                }
            }
        }

        let gateway = GatewaySettings {
            request_timeout: optional(provider.get_duration("GATEWAY_REQUEST_TIMEOUT"))?
                .unwrap_or(gateway_defaults.request_timeout),
            max_retries: optional(provider.get_u32("GATEWAY_MAX_RETRIES"))?
                .unwrap_or(gateway_defaults.max_retries),
            retry_base_delay: optional(provider.get_duration("GATEWAY_RETRY_BASE_DELAY"))?
                .unwrap_or(gateway_defaults.retry_base_delay),
            retry_max_delay: optional(provider.get_duration("GATEWAY_RETRY_MAX_DELAY"))?
                .unwrap_or(gateway_defaults.retry_max_delay),
            failure_threshold: optional(provider.get_u32("CIRCUIT_FAILURE_THRESHOLD"))?
                .unwrap_or(gateway_defaults.failure_threshold),
            breaker_cooldown: optional(provider.get_duration("CIRCUIT_COOLDOWN"))?
                .unwrap_or(gateway_defaults.breaker_cooldown),
            rate_limit_capacity: optional(provider.get_u32("RATE_LIMIT_CAPACITY"))?
                .unwrap_or(gateway_defaults.rate_limit_capacity),
            rate_limit_refill_interval: optional(provider.get_duration("RATE_LIMIT_REFILL_INTERVAL"))?
                .unwrap_or(gateway_defaults.rate_limit_refill_interval),
        };

        let config = Self {
            min_coverage_percent: optional(provider.get_float("MIN_COVERAGE_PERCENT"))?
                .unwrap_or(defaults.min_coverage_percent),
            max_concurrent_fixes: optional(provider.get_u32("MAX_CONCURRENT_FIXES"))?
                .map(|v| v as usize)
                .unwrap_or(defaults.max_concurrent_fixes),
            poll_interval: optional(provider.get_duration("POLL_INTERVAL"))?
                .unwrap_or(defaults.poll_interval),
            reasoning_provider,
            reasoning_model: provider.get_optional_string("REASONING_MODEL")?,
            reasoning_base_url: provider.get_optional_string("REASONING_BASE_URL")?,
            max_candidates: optional(provider.get_u32("MAX_CANDIDATES"))?
                .map(|v| v as usize)
                .unwrap_or(defaults.max_candidates),
            parallel_validation: optional(provider.get_bool("PARALLEL_VALIDATION"))?
                .unwrap_or(defaults.parallel_validation),
            sandbox_base_image: provider
                .get_string_or("SANDBOX_BASE_IMAGE", &defaults.sandbox_base_image),
            sandbox_command_timeout: optional(provider.get_duration("SANDBOX_COMMAND_TIMEOUT"))?
                .unwrap_or(defaults.sandbox_command_timeout),
            local_proxy_url: provider.get_optional_string("LOCAL_PROXY_URL")?,
            gateway,
            credentials,
        };

        config.validate()?;
        log::info!(
            "Loaded autofix configuration (provider: {}, max concurrent fixes: {}, poll interval: {:?})",
            config.reasoning_provider,
            config.max_concurrent_fixes,
            config.poll_interval
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.min_coverage_percent.is_finite()
            || !(0.0..=100.0).contains(&self.min_coverage_percent)
        {
            return Err(ConfigError::invalid(
                "MIN_COVERAGE_PERCENT",
                format!("{} is outside 0-100", self.min_coverage_percent),
            ));
        }
        if self.max_concurrent_fixes == 0 {
            return Err(ConfigError::invalid("MAX_CONCURRENT_FIXES", "must be greater than 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid("POLL_INTERVAL", "must be greater than 0"));
        }
        if self.max_candidates == 0 {
            return Err(ConfigError::invalid("MAX_CANDIDATES", "must be greater than 0"));
        }
        if self.sandbox_base_image.trim().is_empty() {
            return Err(ConfigError::invalid("SANDBOX_BASE_IMAGE", "must not be empty"));
        }
        if self.gateway.failure_threshold == 0 {
            return Err(ConfigError::invalid("CIRCUIT_FAILURE_THRESHOLD", "must be greater than 0"));
        }
        if self.gateway.rate_limit_capacity == 0 {
            return Err(ConfigError::invalid("RATE_LIMIT_CAPACITY", "must be greater than 0"));
        }
        if self.gateway.rate_limit_refill_interval.is_zero() {
            return Err(ConfigError::invalid("RATE_LIMIT_REFILL_INTERVAL", "must be greater than 0"));
        }
        if let Some(url) = &self.local_proxy_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::invalid("LOCAL_PROXY_URL", "must be an http(s) URL"));
            }
        }
        if let Some(var) = self.reasoning_provider.api_key_var() {
            if !self.credentials.contains_key(&self.reasoning_provider) {
                return Err(ConfigError::Missing(var.to_string()));
            }
        }
        Ok(())
    }

    pub fn credential(&self, kind: ProviderKind) -> Option<&SecretHandle> {
        self.credentials.get(&kind)
    }

    pub fn with_credential(mut self, kind: ProviderKind, secret: SecretHandle) -> Self {
        self.credentials.insert(kind, secret);
        self
    }

    /// Base URL for the selected provider: explicit override, then the local
    /// proxy URL in proxy mode, then the provider default.
    pub fn reasoning_endpoint(&self) -> String {
        if let Some(url) = &self.reasoning_base_url {
            return url.clone();
        }
        if self.reasoning_provider == ProviderKind::LocalProxy {
            if let Some(url) = &self.local_proxy_url {
                return url.clone();
            }
        }
        self.reasoning_provider.default_base_url().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryConfigProvider;

    fn base() -> MemoryConfigProvider {
        MemoryConfigProvider::new().with("ANTHROPIC_API_KEY", "sk-ant-test")
    }

    #[test]
    fn defaults_apply_when_keys_are_absent() {
        let config = AutofixConfig::from_provider(&base()).unwrap();
        assert_eq!(config.min_coverage_percent, 80.0);
        assert_eq!(config.max_concurrent_fixes, 2);
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert_eq!(config.reasoning_provider, ProviderKind::Anthropic);
        assert_eq!(config.max_candidates, 3);
        assert!(!config.parallel_validation);
        assert_eq!(config.sandbox_base_image, "ubuntu:22.04");
        assert_eq!(config.gateway.failure_threshold, 5);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let provider = base()
            .with("MIN_COVERAGE_PERCENT", "85")
            .with("MAX_CONCURRENT_FIXES", "3")
            .with("POLL_INTERVAL", "30s")
            .with("PARALLEL_VALIDATION", "true")
            .with("GATEWAY_MAX_RETRIES", "5");
        let config = AutofixConfig::from_provider(&provider).unwrap();
        assert_eq!(config.min_coverage_percent, 85.0);
        assert_eq!(config.max_concurrent_fixes, 3);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert!(config.parallel_validation);
        assert_eq!(config.gateway.max_retries, 5);
    }

    #[test]
    fn out_of_range_values_are_invalid() {
        for (key, value) in [
            ("MIN_COVERAGE_PERCENT", "101"),
            ("MIN_COVERAGE_PERCENT", "-1"),
            ("MAX_CONCURRENT_FIXES", "0"),
            ("POLL_INTERVAL", "0s"),
            ("MAX_CANDIDATES", "0"),
        ] {
            let err = AutofixConfig::from_provider(&base().with(key, value)).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { .. }),
                "{}={} gave {:?}",
                key,
                value,
                err
            );
        }
    }

    #[test]
    fn selected_provider_requires_credential() {
        let provider = MemoryConfigProvider::new().with("REASONING_PROVIDER", "openai");
        let err = AutofixConfig::from_provider(&provider).unwrap_err();
        assert_eq!(err, ConfigError::Missing("OPENAI_API_KEY".to_string()));
    }

    #[test]
    fn local_providers_need_no_credential() {
        let provider = MemoryConfigProvider::new()
            .with("REASONING_PROVIDER", "local")
            .with("LOCAL_PROXY_URL", "http://127.0.0.1:9000/v1");
        let config = AutofixConfig::from_provider(&provider).unwrap();
        assert_eq!(config.reasoning_provider, ProviderKind::LocalProxy);
        assert_eq!(config.reasoning_endpoint(), "http://127.0.0.1:9000/v1");
    }

    #[test]
    fn credentials_never_appear_in_debug_output() {
        let config = AutofixConfig::from_provider(&base()).unwrap();
        assert!(config.credential(ProviderKind::Anthropic).is_some());
        assert!(!format!("{:?}", config).contains("sk-ant-test"));
    }
}
