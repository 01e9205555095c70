use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::config::CoinGeckoConfig;
use crate::error::Result;
use crate::quote::Quote;

use super::request::{
    build_client, build_headers, classify_status, describe_transport_error, excerpt,
    expand_optional_env_vars,
};
use super::{FetchError, FetchResult, QuoteFetcher, QuoteFuture};

const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// Crypto quotes from CoinGecko's `/coins/markets` endpoint, one coin id per call.
pub struct CoinGeckoFetcher {
    client: Client,
    base_url: String,
    vs_currency: String,
}

#[derive(Debug, Deserialize)]
struct MarketRow {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    price_change_24h: Option<f64>,
    #[serde(default)]
    total_volume: Option<f64>,
}

impl CoinGeckoFetcher {
    pub fn new(cfg: &CoinGeckoConfig) -> Result<Self> {
        let mut headers = vec![("accept", "application/json".to_string())];
        if let Some(key) = &cfg.api_key {
            // The public endpoints work without a key.
            match expand_optional_env_vars(key)? {
                Some(key) => headers.push((API_KEY_HEADER, key)),
                None => warn!("CoinGecko API key variable is not set; calling without a key"),
            }
        }

        Ok(Self {
            client: build_client(cfg.timeout, build_headers(&headers)?)?,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            vs_currency: cfg.vs_currency.clone(),
        })
    }

    async fn fetch(&self, coin_id: &str) -> FetchResult<Quote> {
        let url = format!("{}/coins/markets", self.base_url);
        debug!("Requesting CoinGecko market row for {}", coin_id);

        let response = self
            .client
            .get(&url)
            .query(&[("vs_currency", self.vs_currency.as_str()), ("ids", coin_id)])
            .send()
            .await
            .map_err(|err| FetchError::network(coin_id, describe_transport_error(err)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| FetchError::network(coin_id, describe_transport_error(err)))?;

        if let Some(kind) = classify_status(status) {
            return Err(FetchError::new(
                kind,
                coin_id,
                format!("status {}: {}", status, excerpt(&body)),
            ));
        }

        parse_market_rows(coin_id, &body)
    }
}

impl QuoteFetcher for CoinGeckoFetcher {
    fn fetch_quote<'a>(&'a self, symbol: &'a str) -> QuoteFuture<'a> {
        Box::pin(self.fetch(symbol))
    }
}

/// Pick the row for `coin_id` out of a `/coins/markets` array.
pub fn parse_market_rows(coin_id: &str, body: &str) -> FetchResult<Quote> {
    let rows: Vec<MarketRow> = serde_json::from_str(body).map_err(|err| {
        FetchError::network(coin_id, format!("undecodable market payload: {err}"))
    })?;

    let row = rows
        .into_iter()
        .find(|row| row.id == coin_id)
        .ok_or_else(|| FetchError::not_found(coin_id, "no market row for coin id"))?;

    let Some(current) = row.current_price.filter(|value| value.is_finite()) else {
        return Err(FetchError::not_found(coin_id, "market row carries no price"));
    };

    let previous = row.price_change_24h.map(|change| current - change);
    let mut quote = Quote::new(coin_id, current, previous).with_volume(row.total_volume);
    if let Some(name) = row.name {
        quote = quote.with_name(name);
    }
    Ok(quote)
}
