//! Acquisition and publication loops.
//!
//! Two long-running loops share the caches: the acquisition scheduler keeps
//! today's and tomorrow's prices cached and published, and an hourly cron
//! republishes the current-hour topics. Day-ahead prices for tomorrow are
//! expected from local noon, so before noon the scheduler just sleeps; after
//! it, it polls at 20-minute boundaries until tomorrow arrives, then sleeps
//! to local midnight. Neither loop ever terminates on error.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::calendar::{Calendar, LocalDay, UtcTime};
use crate::currency::CurrencyService;
use crate::publish::{DaySlot, Publisher};
use crate::render::Renderer;
use crate::spotprice::{SpotPriceService, ZoneRateSet};

/// Pause after any failed acquisition or publication attempt.
const FAILURE_PAUSE: Duration = Duration::from_secs(5 * 60);
/// Local hour after which tomorrow's prices are expected upstream.
const GATE_HOUR: u32 = 12;
/// Poll boundary spacing once past the gate, seconds.
const POLL_INTERVAL: i64 = 20 * 60;
/// Retries of the hourly current-price publication.
const HOURLY_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WaitForToday,
    PollBeforeGate,
    PollAfterGate,
    IdleUntilMidnight,
}

pub struct Scheduler {
    calendar: Calendar,
    spotprice: Arc<SpotPriceService>,
    currency: Arc<CurrencyService>,
    publisher: Arc<dyn Publisher>,
    renderer: Arc<dyn Renderer>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        calendar: Calendar,
        spotprice: Arc<SpotPriceService>,
        currency: Arc<CurrencyService>,
        publisher: Arc<dyn Publisher>,
        renderer: Arc<dyn Renderer>,
        cancel: CancellationToken,
    ) -> Self {
        Scheduler {
            calendar,
            spotprice,
            currency,
            publisher,
            renderer,
            cancel,
        }
    }

    /// Keeps today and tomorrow acquired and published. Runs until the
    /// cancellation token fires.
    pub async fn run_acquisition(&self) {
        let mut failed = false;
        // Sentinel trackers; the first iteration always acquires today.
        let mut done_today = LocalDay::EPOCH;
        let mut done_tomorrow = LocalDay::EPOCH;

        while !self.cancel.is_cancelled() {
            if failed {
                debug!("pausing after failure");
                self.sleep_for(FAILURE_PAUSE).await;
                failed = false;
                continue;
            }

            let now = self.calendar.now();
            let today = self.calendar.local_day(now);
            let tomorrow = self.calendar.local_day(self.calendar.add_local_days(now, 1));

            if done_today != today {
                self.enter(Phase::WaitForToday, today);
                if self.acquire_and_publish(today, DaySlot::Today).await {
                    done_today = today;
                } else {
                    failed = true;
                }
                continue;
            }

            let gate = self.calendar.instant_at(today, GATE_HOUR, 0, 0);
            if done_tomorrow != tomorrow && now < gate {
                self.enter(Phase::PollBeforeGate, tomorrow);
                self.sleep_until(gate).await;
                continue;
            }

            if done_tomorrow == tomorrow {
                self.enter(Phase::IdleUntilMidnight, today);
                // exact even across a DST change before midnight
                self.sleep_until(self.calendar.instant_at(tomorrow, 0, 0, 0))
                    .await;
                continue;
            }

            self.enter(Phase::PollAfterGate, tomorrow);
            self.sleep_until(UtcTime::from_unix(next_poll_boundary(now.unix())))
                .await;
            if self.cancel.is_cancelled() {
                break;
            }
            // The poll may have slept across local midnight; restart with
            // the new "today" rather than acquiring a stale day.
            if self.calendar.local_day(self.calendar.now()) != today {
                continue;
            }
            if self.acquire_and_publish(tomorrow, DaySlot::Tomorrow).await {
                done_tomorrow = tomorrow;
            } else {
                failed = true;
            }
        }
        info!("acquisition loop stopped");
    }

    /// Republishes the current-hour topics at every whole hour, retrying a
    /// bounded number of times on failure.
    pub async fn run_hourly_publish(&self) {
        while !self.cancel.is_cancelled() {
            let now = self.calendar.now();
            let next_hour = UtcTime::from_unix((now.unix() / 3600 + 1) * 3600);
            self.sleep_until(next_hour).await;
            if self.cancel.is_cancelled() {
                break;
            }

            for attempt in 1..=HOURLY_ATTEMPTS {
                if self.publish_current().await {
                    break;
                }
                warn!(attempt, "current-price publication failed");
                self.sleep_for(FAILURE_PAUSE).await;
                if self.cancel.is_cancelled() {
                    break;
                }
            }
        }
        info!("hourly publication loop stopped");
    }

    /// Fetches, publishes and renders one day. Every failure collapses to
    /// `false`; the caller owns the retry policy.
    async fn acquire_and_publish(&self, day: LocalDay, slot: DaySlot) -> bool {
        let rates = match self.spotprice.eur_rates(day).await {
            Ok(rates) => rates,
            Err(err) => {
                warn!(%day, error = %err, "spot price acquisition failed");
                return false;
            }
        };
        let exchange_rate = match self.currency.exchange_rate(day).await {
            Ok(rate) => rate,
            Err(err) => {
                warn!(%day, error = %err, "exchange rate acquisition failed");
                return false;
            }
        };

        if let Err(err) = self.publisher.publish_day(slot, &rates, exchange_rate).await {
            warn!(%day, error = %err, "day publication failed");
            return false;
        }
        if slot == DaySlot::Today {
            let hour = self.calendar.local_time(self.calendar.now()).hour();
            if !self.publish_rates(hour, &rates, exchange_rate).await {
                return false;
            }
        }
        if let Err(err) = self.renderer.render(day, slot, &rates, Some(exchange_rate)) {
            warn!(%day, error = %err, "graph rendering failed");
            return false;
        }
        info!(%day, slot = slot.topic_segment(), "published day-ahead prices");
        true
    }

    async fn publish_current(&self) -> bool {
        let local = self.calendar.local_time(self.calendar.now());
        let today = local.day();
        let rates = match self.spotprice.eur_rates(today).await {
            Ok(rates) => rates,
            Err(err) => {
                warn!(day = %today, error = %err, "no prices for the current hour");
                return false;
            }
        };
        let exchange_rate = match self.currency.exchange_rate(today).await {
            Ok(rate) => rate,
            Err(err) => {
                warn!(day = %today, error = %err, "no exchange rate for the current hour");
                return false;
            }
        };
        self.publish_rates(local.hour(), &rates, exchange_rate).await
    }

    async fn publish_rates(&self, hour: u32, rates: &ZoneRateSet, exchange_rate: f64) -> bool {
        match self.publisher.publish_current(hour, rates, exchange_rate).await {
            Ok(()) => true,
            Err(err) => {
                warn!(hour, error = %err, "current-price publication failed");
                false
            }
        }
    }

    fn enter(&self, phase: Phase, day: LocalDay) {
        debug!(?phase, %day, "scheduler phase");
    }

    async fn sleep_for(&self, duration: Duration) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }

    async fn sleep_until(&self, instant: UtcTime) {
        let seconds = (instant.unix() - self.calendar.now().unix()).max(0);
        self.sleep_for(Duration::from_secs(seconds as u64)).await;
    }
}

/// Next `:00`/`:20`/`:40` wall-clock boundary strictly after `unix`.
fn next_poll_boundary(unix: i64) -> i64 {
    (unix / POLL_INTERVAL + 1) * POLL_INTERVAL
}
