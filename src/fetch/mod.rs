use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::quote::Quote;

pub mod coingecko;
pub mod finnhub;
pub mod request;

pub use coingecko::CoinGeckoFetcher;
pub use finnhub::FinnhubFetcher;

/// Failure classes a quote provider may report for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FetchErrorKind {
    RateLimited,
    InvalidCredential,
    NotFound,
    Network,
}

impl FetchErrorKind {
    /// Fatal kinds end the whole refresh cycle; the rest only skip the symbol.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            FetchErrorKind::RateLimited | FetchErrorKind::InvalidCredential
        )
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FetchErrorKind::RateLimited => "rate limited",
            FetchErrorKind::InvalidCredential => "invalid credential",
            FetchErrorKind::NotFound => "not found",
            FetchErrorKind::Network => "network error",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} for {symbol}: {detail}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub symbol: String,
    pub detail: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, symbol: &str, detail: impl Into<String>) -> Self {
        Self {
            kind,
            symbol: symbol.to_string(),
            detail: detail.into(),
        }
    }

    pub fn not_found(symbol: &str, detail: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::NotFound, symbol, detail)
    }

    pub fn network(symbol: &str, detail: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, symbol, detail)
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Boxed future returned by [`QuoteFetcher::fetch_quote`].
pub type QuoteFuture<'a> = BoxFuture<'a, FetchResult<Quote>>;

/// Source of single-symbol quotes. Implementations normalise their provider's
/// payload into [`Quote`] and classify every failure into a [`FetchErrorKind`].
pub trait QuoteFetcher: Send + Sync {
    fn fetch_quote<'a>(&'a self, symbol: &'a str) -> QuoteFuture<'a>;
}

/// Build the fetcher described by a provider configuration.
pub fn build_fetcher(provider: &ProviderConfig) -> Result<Arc<dyn QuoteFetcher>> {
    match provider {
        ProviderConfig::Finnhub(cfg) => Ok(Arc::new(FinnhubFetcher::new(cfg)?)),
        ProviderConfig::CoinGecko(cfg) => Ok(Arc::new(CoinGeckoFetcher::new(cfg)?)),
    }
}
