use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use freescan_core::catalog::ModelDescriptor;
use freescan_core::criteria::{select_candidates, FilterCriteria, SortField};

use crate::lock_utils::{read_recover, write_recover};

const DEFAULT_REFRESH_SECS: u64 = 900;
const ENV_REFRESH_SECS: &str = "FREESCAN_CATALOG_REFRESH_SECS";
const SCHEDULER_TICK: Duration = Duration::from_secs(1);

/// The filter/sort criteria a catalog fetch is narrowed by; fixed for the
/// lifetime of the cache so every refresh publishes a comparable list.
#[derive(Debug, Clone)]
pub struct CatalogSelection {
    pub criteria: FilterCriteria,
    pub sort_field: SortField,
    pub reverse: bool,
}

/// Holds the published candidate list. Readers clone an `Arc` under a short
/// read lock; refresh builds the new list off-lock and swaps it in whole, so
/// a reader never observes a partially-updated list.
pub struct CatalogCache {
    selection: CatalogSelection,
    published: RwLock<Arc<Vec<ModelDescriptor>>>,
}

impl CatalogCache {
    pub fn new(selection: CatalogSelection) -> Self {
        Self {
            selection,
            published: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn current(&self) -> Arc<Vec<ModelDescriptor>> {
        Arc::clone(&read_recover(&self.published, "catalog_published"))
    }

    /// Fetches and republishes the candidate list. On any failure the
    /// previously published list stays in effect and the error is returned
    /// to the caller; in-flight routing is never affected.
    pub fn refresh(
        &self,
        client: &reqwest::blocking::Client,
        base_url: &str,
    ) -> Result<usize, String> {
        let fetched = super::fetch::fetch_free_models(client, base_url)?;
        let candidates = select_candidates(
            fetched,
            &self.selection.criteria,
            self.selection.sort_field,
            self.selection.reverse,
        );
        let count = candidates.len();
        let mut published = write_recover(&self.published, "catalog_published");
        *published = Arc::new(candidates);
        Ok(count)
    }
}

fn refresh_interval() -> Option<Duration> {
    let secs = std::env::var(ENV_REFRESH_SECS)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_REFRESH_SECS);
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Periodic catalog refresh. Sleeps in short ticks so the thread notices the
/// process shutdown flag promptly instead of holding the interval out.
pub(crate) fn spawn_refresh_scheduler(state: Arc<crate::gateway::GatewayState>) {
    let Some(interval) = refresh_interval() else {
        return;
    };
    let _ = thread::spawn(move || {
        let mut next_refresh = Instant::now() + interval;
        loop {
            if crate::shutdown_requested() {
                return;
            }
            if Instant::now() < next_refresh {
                thread::sleep(SCHEDULER_TICK);
                continue;
            }
            next_refresh = Instant::now() + interval;
            let base_url = state.config.upstream_base_url.clone();
            match state.catalog.refresh(crate::gateway::upstream_client(), &base_url) {
                Ok(count) => log::info!("catalog refreshed: {count} candidate models"),
                Err(err) => log::warn!("catalog refresh failed, keeping last-good list: {err}"),
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use freescan_core::catalog::ModelPricing;

    fn selection() -> CatalogSelection {
        CatalogSelection {
            criteria: FilterCriteria::default(),
            sort_field: SortField::Name,
            reverse: false,
        }
    }

    fn model(id: &str) -> ModelDescriptor {
        ModelDescriptor {
            id: id.to_string(),
            name: id.to_string(),
            context_length: 0,
            pricing: ModelPricing::default(),
            supported_parameters: Vec::new(),
        }
    }

    #[test]
    fn failed_refresh_keeps_previously_published_list() {
        let cache = CatalogCache::new(selection());
        {
            let mut published = cache.published.write().expect("publish seed");
            *published = Arc::new(vec![model("seed/model")]);
        }

        // Loopback port 9 refuses connections, so the fetch fails fast.
        let client = reqwest::blocking::Client::new();
        let err = cache.refresh(&client, "http://127.0.0.1:9").expect_err("refresh must fail");
        assert!(err.contains("catalog request failed"));

        let current = cache.current();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, "seed/model");
    }

    #[test]
    fn empty_cache_publishes_empty_list() {
        let cache = CatalogCache::new(selection());
        assert!(cache.current().is_empty());
    }
}
