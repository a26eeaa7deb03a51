//! MQTT publication of price curves.
//!
//! Topic layout, with `<day>` either `today` or `tomorrow` and `<zone>` a
//! bidding-zone id such as `NO-1`:
//!
//! ```text
//! /nordpool/<day>/exchangerate      rate used for EUR conversion
//! /nordpool/<day>/<zone>/eurNN      EUR price for hour NN
//! /nordpool/<day>/<zone>/nokNN      converted price for hour NN
//! /nordpool/<day>/<zone>/orderNN    rank of hour NN, 0 = most expensive
//! /nordpool/<day>/<zone>/sortedN    hour holding rank N
//! /nordpool/today/<zone>/eur        EUR price for the current hour
//! /nordpool/today/<zone>/nok        converted price for the current hour
//! /nordpool/today/<zone>/order      rank of the current hour
//! ```
//!
//! All messages are retained so subscribers pick up the last state on
//! connect.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{debug, warn};

use crate::config::MqttConfig;
use crate::curve::{DayRateCurve, HOURS_PER_DAY};
use crate::spotprice::{ZONES, ZoneRateSet};

/// Which local day a publication describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaySlot {
    Today,
    Tomorrow,
}

impl DaySlot {
    pub fn topic_segment(&self) -> &'static str {
        match self {
            DaySlot::Today => "today",
            DaySlot::Tomorrow => "tomorrow",
        }
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes the full curve of every zone plus the exchange rate.
    async fn publish_day(
        &self,
        slot: DaySlot,
        rates: &ZoneRateSet,
        exchange_rate: f64,
    ) -> Result<()>;

    /// Publishes the current-hour price and rank for every zone.
    async fn publish_current(&self, hour: u32, rates: &ZoneRateSet, exchange_rate: f64)
    -> Result<()>;
}

pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(20));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        tokio::spawn(async move {
            loop {
                if let Err(err) = eventloop.poll().await {
                    warn!(error = %err, "mqtt connection error");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        });
        MqttPublisher { client }
    }

    async fn publish(&self, topic: String, payload: String) -> Result<()> {
        debug!(%topic, %payload, "publish");
        self.client
            .publish(topic, QoS::AtMostOnce, true, payload)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish_day(
        &self,
        slot: DaySlot,
        rates: &ZoneRateSet,
        exchange_rate: f64,
    ) -> Result<()> {
        let day = slot.topic_segment();
        self.publish(
            format!("/nordpool/{day}/exchangerate"),
            format_price(exchange_rate),
        )
        .await?;

        for (zone, curve) in ZONES.iter().zip(rates) {
            let sorted = sorted_hours(curve);
            for (hour, price) in curve.iter().enumerate() {
                let prefix = format!("/nordpool/{day}/{}", zone.id);
                self.publish(
                    format!("{prefix}/nok{hour:02}"),
                    format_price(price * exchange_rate),
                )
                .await?;
                self.publish(format!("{prefix}/eur{hour:02}"), format_price(*price))
                    .await?;
                self.publish(
                    format!("{prefix}/order{hour:02}"),
                    format!("{}", price_rank(curve, *price)),
                )
                .await?;
                self.publish(
                    format!("{prefix}/sorted{hour}"),
                    format!("{:02}", sorted[hour]),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn publish_current(
        &self,
        hour: u32,
        rates: &ZoneRateSet,
        exchange_rate: f64,
    ) -> Result<()> {
        for (zone, curve) in ZONES.iter().zip(rates) {
            let price = curve[hour as usize];
            let prefix = format!("/nordpool/today/{}", zone.id);
            self.publish(format!("{prefix}/nok"), format_price(price * exchange_rate))
                .await?;
            self.publish(format!("{prefix}/eur"), format_price(price))
                .await?;
            self.publish(
                format!("{prefix}/order"),
                format!("{}", price_rank(curve, price)),
            )
            .await?;
        }
        Ok(())
    }
}

fn format_price(price: f64) -> String {
    format!("{price:.2}")
}

/// Hours of the day ordered from most to least expensive.
fn sorted_hours(curve: &DayRateCurve) -> [usize; HOURS_PER_DAY] {
    let mut hours = [0usize; HOURS_PER_DAY];
    for (slot, hour) in hours.iter_mut().zip(0..HOURS_PER_DAY) {
        *slot = hour;
    }
    hours.sort_by(|a, b| curve[*b].total_cmp(&curve[*a]));
    hours
}

/// Rank of `price` in `curve`, 0 = most expensive.
fn price_rank(curve: &DayRateCurve, price: f64) -> usize {
    let mut sorted = *curve;
    sorted.sort_by(|a, b| b.total_cmp(a));
    sorted
        .iter()
        .position(|p| *p <= price)
        .unwrap_or(HOURS_PER_DAY - 1)
}
