//! config-rs/lib.rs
//! Configuration loading for the autofix pipeline.
//! Values come from environment variables (optionally seeded from a `.env`
//! file), in-memory maps for tests, or a composite of both.

pub mod duration;
pub mod error;
pub mod provider;
pub mod provider_kind;
pub mod settings;

use std::env;
use std::str::FromStr;

use once_cell::sync::Lazy;

pub use duration::parse_duration;
pub use error::{ConfigError, Result};
pub use provider::{
    CompositeConfigProvider, ConfigProvider, ConfigProviderExt, EnvConfigProvider,
    MemoryConfigProvider,
};
pub use provider_kind::ProviderKind;
pub use settings::{AutofixConfig, GatewaySettings};

static DOTENV_LOADED: Lazy<bool> = Lazy::new(|| match dotenv::dotenv() {
    Ok(path) => {
        log::debug!("Loaded environment from {}", path.display());
        true
    }
    Err(_) => false,
});

/// Load variables from a `.env` file in the working directory, if there is one.
/// The file is read at most once per process; returns whether it was found.
pub fn load_dotenv() -> bool {
    *DOTENV_LOADED
}

/// Read a typed environment variable, falling back to `default` when it is
/// absent or unparsable.
pub fn env_or<T: FromStr + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            log::warn!("Invalid value in {}, using default {}", name, default);
            default
        }),
        Err(_) => default,
    }
}
