use log::debug;
use reqwest::Client;
use serde::{Deserialize, Deserializer};

use crate::config::FinnhubConfig;
use crate::error::Result;
use crate::quote::Quote;

use super::request::{
    build_client, build_headers, classify_status, describe_transport_error, excerpt,
    expand_env_vars,
};
use super::{FetchError, FetchErrorKind, FetchResult, QuoteFetcher, QuoteFuture};

const LIMIT_MARKER: &str = "API limit reached";
const INVALID_KEY_MARKER: &str = "Invalid API key";

/// Equity quotes from Finnhub's `/quote` endpoint.
pub struct FinnhubFetcher {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    #[serde(rename = "c")]
    current: Option<f64>,
    /// Outer `None` when the field is absent, inner `None` when it is `null`.
    #[serde(rename = "pc", default, deserialize_with = "present")]
    previous_close: Option<Option<f64>>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(Some)
}

impl FinnhubFetcher {
    pub fn new(cfg: &FinnhubConfig) -> Result<Self> {
        let api_key = expand_env_vars(&cfg.api_key)?;
        let headers = build_headers(&[("Accept", "application/json".to_string())])?;
        Ok(Self {
            client: build_client(cfg.timeout, headers)?,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn fetch(&self, symbol: &str) -> FetchResult<Quote> {
        let url = format!("{}/quote", self.base_url);
        debug!("Requesting Finnhub quote for {}", symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("token", self.api_key.as_str())])
            .send()
            .await
            .map_err(|err| FetchError::network(symbol, describe_transport_error(err)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| FetchError::network(symbol, describe_transport_error(err)))?;

        if let Some(kind) = classify_status(status) {
            let kind = classify_message(&body).unwrap_or(kind);
            return Err(FetchError::new(
                kind,
                symbol,
                format!("status {}: {}", status, excerpt(&body)),
            ));
        }

        parse_finnhub_quote(symbol, &body)
    }
}

impl QuoteFetcher for FinnhubFetcher {
    fn fetch_quote<'a>(&'a self, symbol: &'a str) -> QuoteFuture<'a> {
        Box::pin(self.fetch(symbol))
    }
}

/// Finnhub sometimes reports quota and key problems in the body rather than the status.
fn classify_message(body: &str) -> Option<FetchErrorKind> {
    if body.contains(LIMIT_MARKER) {
        Some(FetchErrorKind::RateLimited)
    } else if body.contains(INVALID_KEY_MARKER) {
        Some(FetchErrorKind::InvalidCredential)
    } else {
        None
    }
}

/// Decode a successful `/quote` body.
pub fn parse_finnhub_quote(symbol: &str, body: &str) -> FetchResult<Quote> {
    if let Some(kind) = classify_message(body) {
        return Err(FetchError::new(kind, symbol, excerpt(body)));
    }

    let payload: FinnhubQuote = serde_json::from_str(body).map_err(|err| {
        FetchError::network(symbol, format!("undecodable quote payload: {err}"))
    })?;

    let Some(current) = payload.current.filter(|value| value.is_finite()) else {
        return Err(FetchError::not_found(symbol, "quote carries no current price"));
    };

    let Some(previous_close) = payload.previous_close else {
        return Err(FetchError::not_found(symbol, "quote carries no previous close"));
    };

    // Unknown tickers come back as an all-zero quote instead of an error.
    if current == 0.0 && previous_close.unwrap_or(0.0) == 0.0 {
        return Err(FetchError::not_found(symbol, "provider returned an empty quote"));
    }

    Ok(Quote::new(symbol, current, previous_close))
}
