//! Outbound HTTP transport.
//!
//! The fetcher returns raw payload bytes; parsing belongs to the services.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::calendar::{Calendar, LocalDay};
use crate::config::AppConfig;
use crate::error::{FetchError, FetchResult};

/// Transport for the two upstream providers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Raw ENTSO-E day-ahead XML for one bidding zone.
    async fn fetch_spot_curve(&self, zone_code: &str, day: LocalDay) -> FetchResult<String>;

    /// Raw exchangeratesapi.io JSON for the given day.
    async fn fetch_exchange_rate(&self, day: LocalDay) -> FetchResult<String>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    calendar: Calendar,
    entsoe_base_url: String,
    entsoe_token: String,
    rates_base_url: String,
    rates_token: String,
    symbol: String,
}

impl HttpFetcher {
    pub fn new(calendar: Calendar, config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("elspot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpFetcher {
            client,
            calendar,
            entsoe_base_url: config.entsoe.base_url.clone(),
            entsoe_token: config.entsoe.token.clone(),
            rates_base_url: config.exchangerates.base_url.clone(),
            rates_token: config.exchangerates.token.clone(),
            symbol: config.currency.clone(),
        })
    }

    async fn get_text(&self, url: &str, accept: &str) -> FetchResult<String> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Transport(format!("HTTP {status}")));
        }
        response
            .text()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_spot_curve(&self, zone_code: &str, day: LocalDay) -> FetchResult<String> {
        // Asking for a single mid-day hour returns the entire day.
        let url = format!(
            "{}/api?securityToken={}&documentType=A44&in_Domain={}&out_Domain={}&periodStart={:08}1200&periodEnd={:08}1300",
            self.entsoe_base_url,
            self.entsoe_token,
            zone_code,
            zone_code,
            day.key(),
            day.key()
        );
        debug!(zone = zone_code, %day, "requesting day-ahead prices");
        self.get_text(&url, "application/xml").await
    }

    async fn fetch_exchange_rate(&self, day: LocalDay) -> FetchResult<String> {
        let today = self.calendar.local_day(self.calendar.now());
        let url = if day < today {
            format!(
                "{}/v1/{:04}-{:02}-{:02}?access_key={}&base=EUR&symbols={}",
                self.rates_base_url,
                day.year(),
                day.month(),
                day.day(),
                self.rates_token,
                self.symbol
            )
        } else {
            format!(
                "{}/v1/latest?access_key={}&base=EUR&symbols={}",
                self.rates_base_url, self.rates_token, self.symbol
            )
        };
        debug!(%day, "requesting exchange rate");
        self.get_text(&url, "application/json").await
    }
}
