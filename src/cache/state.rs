use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::fetch::FetchErrorKind;
use crate::quote::Snapshot;

use super::CacheOptions;

/// Condition reported to consumers through [`CacheState::last_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimited,
    InvalidCredential,
    NotFound,
    Network,
    /// A cycle ended without any quote and there was nothing cached to fall back on.
    NoDataAvailable,
}

impl ErrorKind {
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorKind::RateLimited => {
                "Provider rate limit reached. Data might be stale; wait a minute before refreshing."
            }
            ErrorKind::InvalidCredential => "Provider rejected the API key. Check your credentials.",
            ErrorKind::NotFound => "Symbol not found at the provider.",
            ErrorKind::Network => "Network error while contacting the provider.",
            ErrorKind::NoDataAvailable => {
                "Failed to load any quote data. Check the API key and the logs for details."
            }
        }
    }
}

impl From<FetchErrorKind> for ErrorKind {
    fn from(kind: FetchErrorKind) -> Self {
        match kind {
            FetchErrorKind::RateLimited => ErrorKind::RateLimited,
            FetchErrorKind::InvalidCredential => ErrorKind::InvalidCredential,
            FetchErrorKind::NotFound => ErrorKind::NotFound,
            FetchErrorKind::Network => ErrorKind::Network,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_message())
    }
}

/// What a consumer sees. Replaced wholesale on every mutation.
#[derive(Debug, Clone, Default)]
pub struct CacheState {
    pub snapshot: Option<Arc<Snapshot>>,
    pub is_refreshing: bool,
    pub last_error: Option<ErrorKind>,
    /// Set when the last cycle produced nothing and no earlier snapshot exists.
    pub no_data: bool,
}

impl CacheState {
    /// Nothing to show yet and nothing has gone wrong.
    pub fn is_loading(&self) -> bool {
        self.snapshot.is_none() && self.last_error.is_none() && !self.no_data
    }
}

/// How `initialize` found the persisted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Fresh snapshot served immediately.
    CacheHit,
    /// Snapshot present but older than the ttl; not served.
    Stale,
    /// Nothing usable in the store.
    Miss,
}

impl Startup {
    pub fn first_refresh_delay(self, options: &CacheOptions) -> Duration {
        match self {
            Startup::CacheHit => options.warm_start_delay,
            Startup::Stale | Startup::Miss => options.cold_start_delay,
        }
    }
}

/// Result of one call to `refresh_cycle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new snapshot replaced the old one; `persisted` is false when the store write failed.
    Committed { entries: usize, persisted: bool },
    /// A fatal fetch error stopped the cycle after `fetched` quotes.
    Aborted { kind: FetchErrorKind, fetched: usize },
    /// Every symbol failed without a fatal error.
    Empty,
    /// Another cycle was already running.
    Skipped,
    /// The cache was disposed before the cycle started.
    Disposed,
    /// The cache was disposed while the cycle ran; its results were dropped.
    Discarded,
}
