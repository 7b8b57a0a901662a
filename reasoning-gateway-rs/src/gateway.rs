//! The reasoning gateway
//!
//! `ProviderGateway` resolves the provider for a request, applies the
//! provider defaults, and sends the call through that provider's own
//! `Resilience` entry (`reasoning:<provider>`), so a failing provider opens
//! only its own breaker. Optional fallback providers are tried in order when
//! the selected one is unavailable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config_rs::{AutofixConfig, ProviderKind};
use metrics::increment_counter;
use shared_types::SecretHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, ServiceError};
use crate::models::{ReasoningRequest, ReasoningResponse};
use crate::providers::{adapter_for, resolve};
use crate::resilience::{ResilienceConfig, ResilienceRegistry};
use crate::transport::{HttpRequest, HttpTransport, Transport};

#[async_trait]
pub trait ReasoningGateway: Send + Sync {
    /// Send one request and return the normalized response. Transient
    /// failures are retried behind the provider's resilience wrapper before
    /// an error is returned.
    async fn send(&self, request: &ReasoningRequest, cancel: &CancellationToken) -> Result<ReasoningResponse>;
}

/// Where and how to reach one provider.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub credential: Option<SecretHandle>,
    /// Model used when the request does not name one
    pub model: Option<String>,
}

impl ProviderEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credential: None,
            model: None,
        }
    }

    pub fn default_for(kind: ProviderKind) -> Self {
        Self::new(kind.default_base_url())
    }

    pub fn credential(mut self, credential: SecretHandle) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

pub fn resilience_key(kind: ProviderKind) -> String {
    format!("reasoning:{}", kind)
}

pub struct ProviderGateway {
    default_provider: ProviderKind,
    endpoints: HashMap<ProviderKind, ProviderEndpoint>,
    fallbacks: Vec<ProviderKind>,
    transport: Arc<dyn Transport>,
    resilience: ResilienceRegistry,
}

impl std::fmt::Debug for ProviderGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut providers: Vec<&str> = self.endpoints.keys().map(|k| k.as_str()).collect();
        providers.sort_unstable();
        f.debug_struct("ProviderGateway")
            .field("default_provider", &self.default_provider)
            .field("providers", &providers)
            .field("fallbacks", &self.fallbacks)
            .finish()
    }
}

impl ProviderGateway {
    pub fn builder(default_provider: ProviderKind) -> ProviderGatewayBuilder {
        ProviderGatewayBuilder::new(default_provider)
    }

    /// Gateway for the configured provider. Every other provider whose
    /// credential is present (or that needs none) is registered too, so
    /// requests may name it explicitly.
    pub fn from_config(config: &AutofixConfig) -> Result<Self> {
        let selected = config.reasoning_provider;
        let mut builder = Self::builder(selected)
            .resilience(ResilienceRegistry::new(ResilienceConfig::from(&config.gateway)))
            .transport(Arc::new(HttpTransport::new(config.gateway.request_timeout)?));

        for kind in ProviderKind::ALL {
            let credential = config.credential(kind).cloned();
            if kind != selected && kind.requires_api_key() && credential.is_none() {
                continue;
            }

            let mut endpoint = if kind == selected {
                ProviderEndpoint::new(config.reasoning_endpoint())
            } else if kind == ProviderKind::LocalProxy {
                ProviderEndpoint::new(
                    config
                        .local_proxy_url
                        .clone()
                        .unwrap_or_else(|| kind.default_base_url().to_string()),
                )
            } else {
                ProviderEndpoint::default_for(kind)
            };
            endpoint.credential = credential;
            if kind == selected {
                endpoint.model = config.reasoning_model.clone();
            }
            builder = builder.endpoint(kind, endpoint);
        }

        builder.build()
    }

    pub fn default_provider(&self) -> ProviderKind {
        self.default_provider
    }

    pub fn resilience(&self) -> &ResilienceRegistry {
        &self.resilience
    }

    pub fn providers(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.endpoints.keys().copied()
    }

    fn candidates(&self, request: &ReasoningRequest) -> Vec<ProviderKind> {
        let primary = request.provider.unwrap_or(self.default_provider);
        let mut chain = vec![primary];
        for kind in &self.fallbacks {
            if !chain.contains(kind) {
                chain.push(*kind);
            }
        }
        chain
    }

    async fn send_to(
        &self,
        kind: ProviderKind,
        request: &ReasoningRequest,
        cancel: &CancellationToken,
    ) -> Result<ReasoningResponse> {
        let endpoint = self.endpoints.get(&kind).ok_or_else(|| {
            ServiceError::configuration(format!("reasoning provider '{}' is not configured", kind))
        })?;
        if kind.requires_api_key() && endpoint.credential.as_ref().map_or(true, SecretHandle::is_empty) {
            return Err(ServiceError::configuration(format!(
                "no credential configured for reasoning provider '{}'",
                kind
            )));
        }

        let adapter = adapter_for(kind);
        let options = resolve(kind, request, endpoint.model.as_deref());
        let http_request = HttpRequest {
            service: kind.to_string(),
            url: adapter.endpoint(&endpoint.base_url, &options.model),
            headers: adapter.headers(endpoint.credential.as_ref()),
            body: adapter.build_body(request, &options),
            timeout: options.timeout,
        };

        debug!(provider = %kind, model = %options.model, tools = request.tools.len(), "sending reasoning request");

        let resilience = self.resilience.get(&resilience_key(kind));
        let adapter = adapter.as_ref();
        let model = options.model.as_str();
        resilience
            .execute_retrying_on(options.max_retries, cancel, retry_reply, || {
                let transport = Arc::clone(&self.transport);
                let http_request = http_request.clone();
                async move {
                    let reply = transport.post_json(http_request).await?;
                    adapter.parse_response(&reply, model)
                }
            })
            .await
    }
}

/// A reply the adapter cannot read is asked for again, like a transient failure.
fn retry_reply(err: &ServiceError) -> bool {
    err.is_retryable() || matches!(err.root(), ServiceError::Parsing(_))
}

/// Failures after which the next provider in the chain is worth trying.
fn should_fail_over(err: &ServiceError) -> bool {
    err.is_retryable()
        || err.is_circuit_broken()
        || matches!(err.root(), ServiceError::RateLimited(_))
}

#[async_trait]
impl ReasoningGateway for ProviderGateway {
    #[instrument(skip(self, request, cancel), fields(provider = tracing::field::Empty, prompt_bytes = request.prompt.len()))]
    async fn send(&self, request: &ReasoningRequest, cancel: &CancellationToken) -> Result<ReasoningResponse> {
        let chain = self.candidates(request);
        let mut last_error = None;

        for (position, kind) in chain.iter().copied().enumerate() {
            tracing::Span::current().record("provider", kind.as_str());
            match self.send_to(kind, request, cancel).await {
                Ok(response) => {
                    increment_counter!(
                        "reasoning_gateway_requests_total",
                        "provider" => kind.as_str(),
                        "outcome" => "ok"
                    );
                    if position > 0 {
                        info!(provider = %kind, "reasoning request served by fallback provider");
                    }
                    return Ok(response);
                }
                Err(err) => {
                    increment_counter!(
                        "reasoning_gateway_requests_total",
                        "provider" => kind.as_str(),
                        "outcome" => "error"
                    );
                    if err.is_cancelled() || !should_fail_over(&err) {
                        return Err(err);
                    }
                    if position + 1 < chain.len() {
                        warn!(provider = %kind, error = %err, "reasoning provider unavailable, failing over");
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ServiceError::configuration("no reasoning provider configured")))
    }
}

pub struct ProviderGatewayBuilder {
    default_provider: ProviderKind,
    endpoints: HashMap<ProviderKind, ProviderEndpoint>,
    fallbacks: Vec<ProviderKind>,
    transport: Option<Arc<dyn Transport>>,
    resilience: Option<ResilienceRegistry>,
}

impl ProviderGatewayBuilder {
    pub fn new(default_provider: ProviderKind) -> Self {
        Self {
            default_provider,
            endpoints: HashMap::new(),
            fallbacks: Vec::new(),
            transport: None,
            resilience: None,
        }
    }

    pub fn endpoint(mut self, kind: ProviderKind, endpoint: ProviderEndpoint) -> Self {
        self.endpoints.insert(kind, endpoint);
        self
    }

    /// Try `kind` when the providers before it are unavailable.
    pub fn fallback(mut self, kind: ProviderKind) -> Self {
        self.fallbacks.push(kind);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn resilience(mut self, registry: ResilienceRegistry) -> Self {
        self.resilience = Some(registry);
        self
    }

    pub fn build(self) -> Result<ProviderGateway> {
        if !self.endpoints.contains_key(&self.default_provider) {
            return Err(ServiceError::configuration(format!(
                "default reasoning provider '{}' has no endpoint",
                self.default_provider
            )));
        }
        if let Some(kind) = self.fallbacks.iter().find(|k| !self.endpoints.contains_key(k)) {
            return Err(ServiceError::configuration(format!(
                "fallback reasoning provider '{}' has no endpoint",
                kind
            )));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(Duration::from_secs(60))?),
        };

        Ok(ProviderGateway {
            default_provider: self.default_provider,
            endpoints: self.endpoints,
            fallbacks: self.fallbacks,
            transport,
            resilience: self.resilience.unwrap_or_default(),
        })
    }
}
