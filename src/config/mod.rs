use std::path::PathBuf;
use std::time::Duration;

pub mod loader;
pub mod validator;

pub use loader::{load_watchlist_descriptor, load_watchlist_descriptors};

pub const FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";
pub const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
/// Finnhub's free tier allows 30 calls a minute; 2.5s keeps a margin under it.
pub const DEFAULT_INTER_REQUEST_DELAY: Duration = Duration::from_millis(2_500);
pub const DEFAULT_WARM_START_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_COLD_START_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One tracked symbol plus the label shown next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchItem {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Finnhub(FinnhubConfig),
    CoinGecko(CoinGeckoConfig),
}

impl ProviderConfig {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderConfig::Finnhub(_) => "finnhub",
            ProviderConfig::CoinGecko(_) => "coingecko",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FinnhubConfig {
    pub base_url: String,
    /// May contain `${NAME}` placeholders, expanded when the fetcher is built.
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CoinGeckoConfig {
    pub base_url: String,
    /// Demo-plan key; placeholders are expanded when the fetcher is built.
    pub api_key: Option<String>,
    pub vs_currency: String,
    pub timeout: Duration,
}

/// Timing and persistence knobs for one quote cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub store_key: String,
    pub ttl: Duration,
    pub inter_request_delay: Duration,
    pub refresh_interval: Duration,
    pub warm_start_delay: Duration,
    pub cold_start_delay: Duration,
}

impl CacheSettings {
    pub fn with_store_key(store_key: impl Into<String>) -> Self {
        Self {
            store_key: store_key.into(),
            ttl: DEFAULT_TTL,
            inter_request_delay: DEFAULT_INTER_REQUEST_DELAY,
            refresh_interval: DEFAULT_TTL,
            warm_start_delay: DEFAULT_WARM_START_DELAY,
            cold_start_delay: DEFAULT_COLD_START_DELAY,
        }
    }
}

/// Fully loaded watchlist definition.
#[derive(Debug, Clone)]
pub struct WatchlistDescriptor {
    pub code: String,
    pub name: String,
    pub provider: ProviderConfig,
    pub symbols: Vec<WatchItem>,
    pub cache: CacheSettings,
    pub storage_dir: PathBuf,
}

impl WatchlistDescriptor {
    pub fn symbol_ids(&self) -> Vec<String> {
        self.symbols.iter().map(|item| item.id.clone()).collect()
    }
}
