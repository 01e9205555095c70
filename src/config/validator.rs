use std::collections::HashSet;
use std::time::Duration;

use crate::error::{AppError, Result};

use super::{CacheSettings, ProviderConfig, WatchItem, WatchlistDescriptor};

/// Validate a watchlist descriptor, reporting every problem at once.
pub fn validate_watchlist_descriptor(descriptor: &WatchlistDescriptor) -> Result<()> {
    let mut issues = Vec::new();

    validate_symbols(&descriptor.symbols, &mut issues);
    validate_cache(&descriptor.cache, &mut issues);
    validate_provider(&descriptor.provider, &mut issues);

    if issues.is_empty() {
        Ok(())
    } else {
        Err(AppError::message(format!(
            "watchlist `{}` config invalid:\n  - {}",
            descriptor.code,
            issues.join("\n  - ")
        )))
    }
}

fn validate_symbols(symbols: &[WatchItem], issues: &mut Vec<String>) {
    if symbols.is_empty() {
        issues.push("symbols must list at least one entry".to_string());
        return;
    }

    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for item in symbols {
        if item.id.is_empty() {
            issues.push("symbols contains a blank id".to_string());
            continue;
        }
        if !seen.insert(item.id.as_str()) {
            duplicates.push(item.id.clone());
        }
    }

    if !duplicates.is_empty() {
        issues.push(format!(
            "symbols contains duplicate ids: {}",
            duplicates.join(", ")
        ));
    }
}

fn validate_cache(cache: &CacheSettings, issues: &mut Vec<String>) {
    if cache.store_key.trim().is_empty() {
        issues.push("cache.store_key must not be empty".to_string());
    }
    if cache.ttl == Duration::ZERO {
        issues.push("cache.ttl_secs must be greater than zero".to_string());
    }
    if cache.refresh_interval == Duration::ZERO {
        issues.push("cache.refresh_interval_secs must be greater than zero".to_string());
    }
    if cache.cold_start_delay >= cache.warm_start_delay {
        issues.push(format!(
            "cache.cold_start_delay_ms ({}) must be shorter than cache.warm_start_delay_ms ({})",
            cache.cold_start_delay.as_millis(),
            cache.warm_start_delay.as_millis()
        ));
    }
}

fn validate_provider(provider: &ProviderConfig, issues: &mut Vec<String>) {
    match provider {
        ProviderConfig::Finnhub(cfg) => {
            if cfg.base_url.trim().is_empty() {
                issues.push("provider.base_url must not be empty".to_string());
            }
            if cfg.api_key.trim().is_empty() {
                issues.push("provider.api_key is required for finnhub".to_string());
            }
        }
        ProviderConfig::CoinGecko(cfg) => {
            if cfg.base_url.trim().is_empty() {
                issues.push("provider.base_url must not be empty".to_string());
            }
            if cfg.vs_currency.trim().is_empty() {
                issues.push("provider.vs_currency must not be empty".to_string());
            }
        }
    }
}
