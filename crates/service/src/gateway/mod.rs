use std::sync::Arc;

use freescan_core::criteria::{FilterCriteria, SortField};

use crate::catalog::cache::{CatalogCache, CatalogSelection};

#[path = "core/runtime_config.rs"]
mod runtime_config;
#[path = "routing/health.rs"]
mod health;
#[path = "routing/selection.rs"]
mod selection;
mod error_envelope;
mod http_bridge;
mod request_entry;
mod upstream;

pub use health::HealthTracker;
pub(crate) use request_entry::handle_gateway_request;
pub(crate) use runtime_config::{
    fresh_upstream_client, max_request_body_bytes, resolve_upstream_base_url, upstream_client,
};
pub use runtime_config::DEFAULT_ERROR_THRESHOLD;
use runtime_config::RouterConfig;

/// How the proxy's candidate list is assembled and when a model is pulled
/// from rotation. The criteria half mirrors the scanner's flags.
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub criteria: FilterCriteria,
    pub sort_field: SortField,
    pub reverse: bool,
    pub error_threshold: u32,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            criteria: FilterCriteria::default(),
            // The original rotation preference: biggest context first.
            sort_field: SortField::ContextLength,
            reverse: true,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }
}

/// Everything a request handler needs, shared across worker threads. The
/// health tracker and catalog cache are owned here (not module statics) so
/// tests can build isolated gateways.
pub struct GatewayState {
    pub(crate) config: RouterConfig,
    pub(crate) health: HealthTracker,
    pub(crate) catalog: CatalogCache,
}

impl GatewayState {
    /// Builds the gateway and loads the initial candidate list. A failed or
    /// empty initial load is an error: starting a proxy with nothing to
    /// route to only defers the failure to the first client request.
    pub fn bootstrap(options: ProxyOptions) -> Result<Self, String> {
        let config = RouterConfig::from_env(options.error_threshold);
        let state = Self {
            health: HealthTracker::new(config.error_threshold),
            catalog: CatalogCache::new(CatalogSelection {
                criteria: options.criteria,
                sort_field: options.sort_field,
                reverse: options.reverse,
            }),
            config,
        };
        let count = state
            .catalog
            .refresh(upstream_client(), &state.config.upstream_base_url)?;
        if count == 0 {
            return Err("no models match the specified criteria".to_string());
        }
        Ok(state)
    }

    pub fn candidates(&self) -> Arc<Vec<freescan_core::catalog::ModelDescriptor>> {
        self.catalog.current()
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }
}
