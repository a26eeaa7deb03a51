//! EUR exchange rates, cached per local day.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::cache::RetryGatedCache;
use crate::calendar::{Calendar, LocalDay};
use crate::error::{FetchError, FetchResult};
use crate::fetcher::Fetcher;

#[derive(Debug, Deserialize)]
struct RatesResponse {
    base: String,
    rates: HashMap<String, f64>,
}

pub struct CurrencyService {
    calendar: Calendar,
    fetcher: Arc<dyn Fetcher>,
    cache: RetryGatedCache<LocalDay, f64>,
    symbol: String,
}

impl CurrencyService {
    pub fn new(calendar: Calendar, fetcher: Arc<dyn Fetcher>, symbol: String) -> Self {
        CurrencyService {
            calendar,
            fetcher,
            cache: RetryGatedCache::new(),
            symbol,
        }
    }

    /// EUR rate for `day`, from cache or fetched.
    pub async fn exchange_rate(&self, day: LocalDay) -> FetchResult<f64> {
        let fetcher = Arc::clone(&self.fetcher);
        let symbol = self.symbol.clone();
        let rate = self
            .cache
            .get(day, move |day| async move {
                let body = fetcher.fetch_exchange_rate(day).await?;
                parse_rate(&body, &symbol)
            })
            .await?;
        info!(%day, rate, symbol = %self.symbol, "exchange rate");
        Ok(rate)
    }

    /// EUR rate for the current local day.
    pub async fn current_exchange_rate(&self) -> FetchResult<f64> {
        let today = self.calendar.local_day(self.calendar.now());
        self.exchange_rate(today).await
    }

    pub async fn has_day(&self, day: &LocalDay) -> bool {
        self.cache.has(day).await
    }
}

fn parse_rate(body: &str, symbol: &str) -> FetchResult<f64> {
    let response: RatesResponse = serde_json::from_str(body)
        .map_err(|err| FetchError::MalformedPayload(err.to_string()))?;
    if response.base != "EUR" {
        return Err(FetchError::MalformedPayload(format!(
            "unexpected base currency {}",
            response.base
        )));
    }
    response
        .rates
        .get(symbol)
        .copied()
        .ok_or_else(|| FetchError::MalformedPayload(format!("no rate for {symbol}")))
}
