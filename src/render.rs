//! SVG price graphs, rendered from a user-supplied template.
//!
//! The template carries placeholders that are textually substituted:
//! `{day}`, `{currency}`, `{zone-id}`, `{zone-description}`, `{date}`,
//! `{hour0}`..`{hour23}` for the zone's prices, `{y0}`..`{y6}` for the
//! grid labels, `{current}` for the zone's price line and
//! `{other1}`..`{other4}` for the remaining zones.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::calendar::LocalDay;
use crate::curve::HOURS_PER_DAY;
use crate::publish::DaySlot;
use crate::spotprice::{ZONE_COUNT, ZONES, ZoneRateSet};

pub trait Renderer: Send + Sync {
    /// Renders one graph per zone and currency for the given day.
    fn render(
        &self,
        day: LocalDay,
        slot: DaySlot,
        rates: &ZoneRateSet,
        exchange_rate: Option<f64>,
    ) -> Result<()>;
}

pub struct SvgRenderer {
    output_dir: PathBuf,
    template_path: PathBuf,
    symbol: String,
}

const FLOAT_MARGIN_OF_ERROR: f64 = 0.0001;
const GRID_STEPS: usize = 6;

impl SvgRenderer {
    pub fn new(output_dir: PathBuf, template_path: PathBuf, symbol: String) -> Self {
        SvgRenderer {
            output_dir,
            template_path,
            symbol,
        }
    }

    fn render_one(
        &self,
        template: &str,
        day: LocalDay,
        slot: DaySlot,
        currency: &str,
        exchange_rate: f64,
        rates: &ZoneRateSet,
        zone_index: usize,
    ) -> Result<()> {
        let mut svg = template.to_string();
        svg = svg.replace("{day}", &day.key().to_string());
        svg = svg.replace("{currency}", currency);
        svg = svg.replace("{zone-id}", ZONES[zone_index].id);
        svg = svg.replace("{zone-description}", ZONES[zone_index].name);
        svg = svg.replace("{date}", &day.to_string());

        // Min starts at zero so the axis always includes the origin even
        // when every price is positive.
        let mut min_rate = 0.0f64;
        let mut max_rate = f64::MIN;
        for (index, curve) in rates.iter().enumerate() {
            for (hour, price) in curve.iter().enumerate() {
                let rate = price * exchange_rate;
                min_rate = min_rate.min(rate);
                max_rate = max_rate.max(rate);
                if index == zone_index {
                    svg = svg.replace(&format!("{{hour{hour}}}"), &format!("{rate:.2}"));
                }
            }
        }

        let delta = max_rate - min_rate;
        let precision = if delta == 0.0 {
            3
        } else {
            3 - delta.log10() as i32
        };
        let decimals = precision.max(0) as usize;
        let ygrid_max = dceil(max_rate, precision - 1);
        let ygrid_min = dfloor(min_rate, precision - 1);
        for ygrid in 0..=GRID_STEPS {
            let label = ygrid_min + ygrid as f64 * (ygrid_max - ygrid_min) / GRID_STEPS as f64;
            svg = svg.replace(&format!("{{y{ygrid}}}"), &format!("{label:.decimals$}"));
        }

        let mut other_index = 0;
        for (index, curve) in rates.iter().enumerate() {
            let mut path = String::new();
            let mut previous = curve[0] * exchange_rate;
            path.push_str(&format!("M50 {:.2}", rate_to_y(previous, min_rate, max_rate)));
            for price in curve.iter().take(HOURS_PER_DAY) {
                let rate = price * exchange_rate;
                if (rate - previous).abs() > FLOAT_MARGIN_OF_ERROR {
                    path.push_str(&format!(" V{:.2}", rate_to_y(rate, min_rate, max_rate)));
                }
                path.push_str(" h25");
                previous = rate;
            }
            if index == zone_index {
                svg = svg.replace("{current}", &path);
            } else {
                other_index += 1;
                svg = svg.replace(&format!("{{other{other_index}}}"), &path);
            }
        }

        let filename = self.output_dir.join(format!(
            "{}-{}-{}.svg",
            slot.topic_segment(),
            ZONES[zone_index].id,
            currency
        ));
        fs::write(&filename, svg)
            .with_context(|| format!("Failed to write {}", filename.display()))?;
        info!(file = %filename.display(), "wrote price graph");
        Ok(())
    }
}

impl Renderer for SvgRenderer {
    fn render(
        &self,
        day: LocalDay,
        slot: DaySlot,
        rates: &ZoneRateSet,
        exchange_rate: Option<f64>,
    ) -> Result<()> {
        let template = fs::read_to_string(&self.template_path).with_context(|| {
            format!(
                "Failed to read SVG template: {}",
                self.template_path.display()
            )
        })?;

        for zone_index in 0..ZONE_COUNT {
            self.render_one(&template, day, slot, "EUR", 1.0, rates, zone_index)?;
            if let Some(rate) = exchange_rate {
                self.render_one(&template, day, slot, &self.symbol, rate, rates, zone_index)?;
            }
        }
        Ok(())
    }
}

fn dceil(value: f64, precision: i32) -> f64 {
    let factor = 10f64.powi(precision);
    (value * factor).ceil() / factor
}

fn dfloor(value: f64, precision: i32) -> f64 {
    let factor = 10f64.powi(precision);
    (value * factor).floor() / factor
}

/// Maps a price onto the template's y axis; larger prices sit higher on the
/// canvas, which means a smaller y coordinate.
fn rate_to_y(rate: f64, min_rate: f64, max_rate: f64) -> f64 {
    const MAX_Y: f64 = 100.0;
    const MIN_Y: f64 = 380.0;
    if min_rate >= max_rate {
        return MIN_Y;
    }
    MIN_Y + (MAX_Y - MIN_Y) * ((rate - min_rate) / (max_rate - min_rate))
}
