//! Shared application state.

use axum::http::header::HOST;
use axum::http::HeaderMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::catalog::FlavorCatalog;
use crate::clock::{Clock, SystemClock};
use crate::config::{CounterBackend, ScoopConfig};
use crate::error::Result;
use crate::flags::{FileFlagEvaluator, FlagClient, FlagEvaluator, WriteGate};
use crate::ratelimit::{CounterStore, MemoryCounterStore, RateLimiter, RedisCounterStore};

/// Everything a request handler needs.
pub struct AppState {
    /// Per-minute request limiter
    pub limiter: RateLimiter,
    /// Write permission gate
    pub gate: WriteGate,
    /// The flavor collection
    pub catalog: FlavorCatalog,
    /// Source of unix time for bucket selection
    pub clock: Arc<dyn Clock>,
    /// Configured external base URL
    pub public_url: Option<String>,
    /// Local listen address, the last resort for item URIs
    pub listen_addr: SocketAddr,
}

impl AppState {
    pub fn new(
        limiter: RateLimiter,
        gate: WriteGate,
        catalog: FlavorCatalog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter,
            gate,
            catalog,
            clock,
            public_url: None,
            listen_addr: ScoopConfig::default().server.listen_addr,
        }
    }

    /// Build the state described by `config`.
    ///
    /// Spawns the background tasks the chosen backends need: the in-memory
    /// counter sweep and the flag file reload.
    pub async fn from_config(config: &ScoopConfig) -> Result<Self> {
        let store = counter_store(config).await?;
        let evaluator = flag_evaluator(config)?;
        let flags = FlagClient::new(evaluator, config.flags.timeout());

        let limiter = RateLimiter::new(
            store,
            flags.clone(),
            &config.flags.rate_limit_flag,
            &config.rate_limiting.key_prefix,
            config.rate_limiting.store_timeout(),
        );
        let gate = WriteGate::new(flags, &config.flags.write_permission_flag);

        let catalog = if config.catalog.seed_defaults {
            FlavorCatalog::with_defaults()
        } else {
            FlavorCatalog::new()
        };
        info!(flavors = catalog.len(), "Flavor catalog initialized");

        Ok(Self {
            limiter,
            gate,
            catalog,
            clock: Arc::new(SystemClock),
            public_url: config.server.public_url.clone(),
            listen_addr: config.server.listen_addr,
        })
    }

    /// Base URL for item URIs: configured URL, else the request's Host, else the listen address.
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.public_url {
            return url.trim_end_matches('/').to_string();
        }

        headers
            .get(HOST)
            .and_then(|host| host.to_str().ok())
            .map(|host| format!("http://{}", host))
            .unwrap_or_else(|| format!("http://{}", self.listen_addr))
    }
}

async fn counter_store(config: &ScoopConfig) -> Result<Arc<dyn CounterStore>> {
    let settings = &config.rate_limiting;
    match settings.backend {
        CounterBackend::Memory => {
            let store = Arc::new(MemoryCounterStore::new());
            if settings.sweep_interval_secs > 0 {
                store.spawn_sweeper(Duration::from_secs(settings.sweep_interval_secs));
            }
            info!("Using in-memory counter store");
            Ok(store)
        }
        CounterBackend::Redis => {
            let store = RedisCounterStore::connect(&settings.redis_url).await?;
            Ok(Arc::new(store))
        }
    }
}

fn flag_evaluator(config: &ScoopConfig) -> Result<Arc<dyn FlagEvaluator>> {
    let Some(path) = &config.flags.path else {
        warn!("No flag definitions configured, every request will be denied");
        return Ok(Arc::new(FileFlagEvaluator::empty()));
    };

    let evaluator = Arc::new(FileFlagEvaluator::from_file(path)?);
    if config.flags.reload_interval_secs > 0 {
        evaluator.spawn_reload(Duration::from_secs(config.flags.reload_interval_secs));
    }
    Ok(evaluator)
}
