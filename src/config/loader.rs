use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::{AppError, Context, Result};
use crate::utils::list_json_files;

use super::{
    validator, CacheSettings, CoinGeckoConfig, FinnhubConfig, ProviderConfig, WatchItem,
    WatchlistDescriptor, COINGECKO_BASE_URL, DEFAULT_REQUEST_TIMEOUT, FINNHUB_BASE_URL,
};

/// Directory, relative to the assets root, holding watchlist JSON files.
pub fn configs_dir(root: &Path) -> PathBuf {
    root.join("assets").join("configs")
}

/// Load `assets/configs/<slug>.json` and validate it.
pub fn load_watchlist_descriptor(root: &Path, slug: &str) -> Result<WatchlistDescriptor> {
    let json_path = configs_dir(root).join(format!("{slug}.json"));

    let json = fs::read_to_string(&json_path).with_context(|| {
        format!(
            "failed to read watchlist config JSON at {}",
            json_path.display()
        )
    })?;

    let descriptor = parse_watchlist_descriptor(root, &json, &json_path)?;
    ensure_code(&descriptor.code, slug, &json_path)?;
    Ok(descriptor)
}

/// Discover and load every watchlist under `assets/configs`, sorted by code.
pub fn load_watchlist_descriptors(root: &Path) -> Result<Vec<WatchlistDescriptor>> {
    let mut descriptors = Vec::new();
    for path in list_json_files(configs_dir(root)) {
        let Some(slug) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        descriptors.push(load_watchlist_descriptor(root, slug)?);
    }

    descriptors.sort_by(|a, b| a.code.cmp(&b.code));
    Ok(descriptors)
}

/// Parse and validate a watchlist definition; `source` only labels error messages.
pub fn parse_watchlist_descriptor(
    root: &Path,
    json: &str,
    source: &Path,
) -> Result<WatchlistDescriptor> {
    let raw: RawWatchlistConfig = serde_json::from_str(json).with_context(|| {
        format!(
            "failed to parse watchlist config JSON at {}",
            source.display()
        )
    })?;

    let cache = raw.cache.into_settings(&raw.code);
    let descriptor = WatchlistDescriptor {
        provider: raw.provider.into_provider_config(),
        symbols: raw.symbols.into_iter().map(RawWatchItem::into_item).collect(),
        storage_dir: raw.storage.into_dir(root),
        cache,
        code: raw.code,
        name: raw.name,
    };

    validator::validate_watchlist_descriptor(&descriptor)?;
    Ok(descriptor)
}

fn ensure_code(actual: &str, expected_slug: &str, source: &Path) -> Result<()> {
    if actual.eq_ignore_ascii_case(expected_slug) {
        Ok(())
    } else {
        Err(AppError::message(format!(
            "watchlist code mismatch in {}: expected `{}`, found `{}`",
            source.display(),
            expected_slug.to_lowercase(),
            actual
        )))
    }
}

#[derive(Debug, Deserialize)]
struct RawWatchlistConfig {
    code: String,
    name: String,
    provider: RawProviderConfig,
    #[serde(default)]
    symbols: Vec<RawWatchItem>,
    #[serde(default)]
    cache: RawCacheConfig,
    #[serde(default)]
    storage: RawStorageConfig,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawWatchItem {
    Id(String),
    Detailed {
        id: String,
        #[serde(default)]
        name: Option<String>,
    },
}

impl RawWatchItem {
    fn into_item(self) -> WatchItem {
        match self {
            RawWatchItem::Id(id) => WatchItem {
                id: id.trim().to_string(),
                name: None,
            },
            RawWatchItem::Detailed { id, name } => WatchItem {
                id: id.trim().to_string(),
                name: name.filter(|name| !name.trim().is_empty()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawProviderConfig {
    Finnhub {
        #[serde(default)]
        base_url: Option<String>,
        api_key: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    CoinGecko {
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        vs_currency: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl RawProviderConfig {
    fn into_provider_config(self) -> ProviderConfig {
        match self {
            RawProviderConfig::Finnhub {
                base_url,
                api_key,
                timeout_secs,
            } => ProviderConfig::Finnhub(FinnhubConfig {
                base_url: base_url.unwrap_or_else(|| FINNHUB_BASE_URL.to_string()),
                api_key,
                timeout: timeout(timeout_secs),
            }),
            RawProviderConfig::CoinGecko {
                base_url,
                api_key,
                vs_currency,
                timeout_secs,
            } => ProviderConfig::CoinGecko(CoinGeckoConfig {
                base_url: base_url.unwrap_or_else(|| COINGECKO_BASE_URL.to_string()),
                api_key: api_key.filter(|key| !key.trim().is_empty()),
                vs_currency: vs_currency.unwrap_or_else(|| "usd".to_string()),
                timeout: timeout(timeout_secs),
            }),
        }
    }
}

fn timeout(secs: Option<u64>) -> Duration {
    secs.map(Duration::from_secs)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT)
}

#[derive(Debug, Deserialize, Default)]
struct RawCacheConfig {
    store_key: Option<String>,
    ttl_secs: Option<u64>,
    inter_request_delay_ms: Option<u64>,
    refresh_interval_secs: Option<u64>,
    warm_start_delay_ms: Option<u64>,
    cold_start_delay_ms: Option<u64>,
}

impl RawCacheConfig {
    fn into_settings(self, code: &str) -> CacheSettings {
        let mut settings =
            CacheSettings::with_store_key(self.store_key.unwrap_or_else(|| code.to_string()));

        if let Some(ttl) = self.ttl_secs {
            settings.ttl = Duration::from_secs(ttl);
        }
        // The refresh period follows the ttl unless set explicitly.
        settings.refresh_interval = self
            .refresh_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(settings.ttl);
        if let Some(delay) = self.inter_request_delay_ms {
            settings.inter_request_delay = Duration::from_millis(delay);
        }
        if let Some(delay) = self.warm_start_delay_ms {
            settings.warm_start_delay = Duration::from_millis(delay);
        }
        if let Some(delay) = self.cold_start_delay_ms {
            settings.cold_start_delay = Duration::from_millis(delay);
        }
        settings
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawStorageConfig {
    dir: Option<String>,
}

impl RawStorageConfig {
    fn into_dir(self, root: &Path) -> PathBuf {
        let dir = self
            .dir
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| "assets/cache".to_string());
        normalize_path(root, dir)
    }
}

fn normalize_path(root: &Path, value: String) -> PathBuf {
    let path = PathBuf::from(&value);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}
