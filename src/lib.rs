pub mod cache;
pub mod calendar;
pub mod config;
pub mod currency;
pub mod curve;
pub mod error;
pub mod fetcher;
pub mod log;
pub mod publish;
pub mod render;
pub mod scheduler;
pub mod spotprice;

use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::calendar::Calendar;
use crate::currency::CurrencyService;
use crate::fetcher::HttpFetcher;
use crate::publish::MqttPublisher;
use crate::render::SvgRenderer;
use crate::scheduler::Scheduler;
use crate::spotprice::SpotPriceService;

pub async fn run(config_path: Option<&str>) -> Result<()> {
    info!("Elspot starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let calendar = Calendar::new(config.time_rule()?);
    let fetcher = Arc::new(HttpFetcher::new(calendar, &config)?);

    let spotprice = Arc::new(SpotPriceService::new(calendar, fetcher.clone()));
    let currency = Arc::new(CurrencyService::new(
        calendar,
        fetcher,
        config.currency.clone(),
    ));
    let publisher = Arc::new(MqttPublisher::connect(&config.mqtt));
    let renderer = Arc::new(SvgRenderer::new(
        config.svg.output_dir.clone(),
        config.svg.template_file.clone(),
        config.currency.clone(),
    ));

    let cancel = CancellationToken::new();
    let scheduler = Arc::new(Scheduler::new(
        calendar,
        spotprice,
        currency,
        publisher,
        renderer,
        cancel.clone(),
    ));

    let acquisition = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run_acquisition().await })
    };
    let hourly = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run_hourly_publish().await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    cancel.cancel();

    acquisition.await?;
    hourly.await?;
    Ok(())
}
