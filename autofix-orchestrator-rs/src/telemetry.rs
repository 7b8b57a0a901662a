//! # Tracing initialisation
//!
//! Installs a global `tracing` subscriber for processes embedding the
//! orchestrator. `log` records from the resilience layer are bridged into
//! the same subscriber.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use shared_types::AutofixError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    pub service_name: String,
    pub json_format: bool,
    pub with_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "autofix-orchestrator".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

/// Install the subscriber. Returns `Ok(false)` when tracing was already
/// initialised by an earlier call.
pub fn init_tracing(config: TracingConfig) -> Result<bool, AutofixError> {
    if TRACING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(false);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let json_layer = config.json_format.then(|| {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(config.with_target)
    });
    let text_layer = (!config.json_format).then(|| fmt::layer().with_target(config.with_target));

    let installed = Registry::default()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init();

    if let Err(err) = installed {
        TRACING_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(AutofixError::Configuration(format!(
            "failed to install tracing subscriber: {}",
            err
        )));
    }

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = config.json_format,
        "tracing initialized"
    );
    Ok(true)
}
