use std::path::Path;
use std::sync::Arc;

use crate::cache::{CacheOptions, QuoteCache};
use crate::config::{load_watchlist_descriptor, load_watchlist_descriptors, WatchlistDescriptor};
use crate::error::{AppError, Result};
use crate::fetch::build_fetcher;
use crate::quote::Snapshot;
use crate::storage::{JsonFileStore, SnapshotStore};

/// Lightweight summary used by `list`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchlistSummary {
    pub code: String,
    pub name: String,
    pub provider: &'static str,
    pub symbols: usize,
}

impl From<&WatchlistDescriptor> for WatchlistSummary {
    fn from(descriptor: &WatchlistDescriptor) -> Self {
        Self {
            code: descriptor.code.clone(),
            name: descriptor.name.clone(),
            provider: descriptor.provider.label(),
            symbols: descriptor.symbols.len(),
        }
    }
}

pub fn available_watchlists(root: &Path) -> Result<Vec<WatchlistSummary>> {
    let descriptors = load_watchlist_descriptors(root)?;
    if descriptors.is_empty() {
        return Err(AppError::message(
            "No watchlist descriptors found under assets/configs",
        ));
    }
    Ok(descriptors.iter().map(WatchlistSummary::from).collect())
}

pub fn ensure_watchlist(root: &Path, code: &str) -> Result<WatchlistDescriptor> {
    load_watchlist_descriptor(root, &code.to_lowercase()).map_err(|err| {
        AppError::message(format!(
            "Watchlist `{code}` could not be loaded. Run `list` to see available codes.\n{err}"
        ))
    })
}

pub fn open_store(descriptor: &WatchlistDescriptor) -> JsonFileStore {
    JsonFileStore::new(&descriptor.storage_dir)
}

/// Wire the provider adapter and the JSON store into a cache for `descriptor`.
pub fn build_cache(descriptor: &WatchlistDescriptor) -> Result<QuoteCache> {
    let fetcher = build_fetcher(&descriptor.provider)?;
    let store: Arc<dyn SnapshotStore> = Arc::new(open_store(descriptor));
    Ok(QuoteCache::new(
        CacheOptions::from(descriptor),
        fetcher,
        store,
    ))
}

/// Read the persisted snapshot without touching the network.
pub fn load_persisted_snapshot(descriptor: &WatchlistDescriptor) -> Result<Option<Snapshot>> {
    let store = open_store(descriptor);
    Ok(store
        .load(&descriptor.cache.store_key)?
        .map(|persisted| persisted.into_snapshot()))
}
