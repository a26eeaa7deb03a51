//! Normalization of fetched hourly price curves.
//!
//! A day-ahead document carries one price per wall-clock hour, so transition
//! days arrive with 23 or 25 points instead of 24. Normalization maps the
//! samples onto a fixed 24-slot per-hour array aligned to the local day, and
//! fails rather than guess when the input cannot fill every hour.

use crate::calendar::{Calendar, LocalDay, UtcTime};
use crate::error::{FetchError, FetchResult};

pub const HOURS_PER_DAY: usize = 24;

/// Price per local hour-of-day for one zone, EUR/MWh.
pub type DayRateCurve = [f64; HOURS_PER_DAY];

/// One sample from a day-ahead document. Positions are 1-based and strictly
/// ascending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPoint {
    pub position: usize,
    pub price: f64,
}

/// An ordered hourly curve as fetched, before alignment to local hours.
#[derive(Debug, Clone, Default)]
pub struct RawCurve {
    /// Start of the declared period, when the document carries one.
    pub start: Option<UtcTime>,
    /// End of the declared period.
    pub end: Option<UtcTime>,
    pub points: Vec<RawPoint>,
}

/// Maps `curve` onto the 24 local hours of `day`.
///
/// With an explicit start instant each position is placed at the local hour
/// of `start + (position-1)h`, which handles transition days without any
/// special casing. Without one, positions are assumed to run 1..N and the
/// 23-point spring-forward day needs an inferred shift.
pub fn normalize(calendar: &Calendar, day: LocalDay, curve: &RawCurve) -> FetchResult<DayRateCurve> {
    match curve.start {
        Some(start) => normalize_aligned(calendar, day, start, curve),
        None => normalize_inferred(curve),
    }
}

fn normalize_aligned(
    calendar: &Calendar,
    day: LocalDay,
    start: UtcTime,
    curve: &RawCurve,
) -> FetchResult<DayRateCurve> {
    let hour_count = match curve.end {
        Some(end) if end > start => ((end.unix() - start.unix()) / 3600) as usize,
        _ => curve.points.last().map_or(0, |point| point.position),
    };
    if !(23..=25).contains(&hour_count) {
        return Err(FetchError::OutOfRangeSampleCount(hour_count));
    }

    let mut slots = [None; HOURS_PER_DAY];
    let mut points = curve.points.iter().peekable();
    let mut price = None;
    for position in 1..=hour_count {
        if let Some(point) = points.peek() {
            if point.position == position {
                price = Some(point.price);
                points.next();
            }
        }
        // Omitted positions repeat the previous price (curve type A03).
        let Some(price) = price else {
            return Err(FetchError::MalformedPayload(
                "curve does not start at position 1".into(),
            ));
        };
        let local = calendar.local_time(start.plus_hours(position as i64 - 1));
        if local.day() == day {
            slots[local.hour() as usize] = Some(price);
        }
    }

    // The spring transition skips one wall-clock hour; carry the neighbour
    // into the gap. Only a genuine 23-hour day gets this treatment, so a
    // short document on a normal day still fails instead of inventing a
    // trailing hour.
    if wall_clock_hours(calendar, day) == 23 {
        for hour in 1..HOURS_PER_DAY {
            if slots[hour].is_none() {
                slots[hour] = slots[hour - 1];
            }
        }
    }

    finalize(&slots)
}

fn normalize_inferred(curve: &RawCurve) -> FetchResult<DayRateCurve> {
    let count = curve.points.len();
    if !(23..=25).contains(&count) {
        return Err(FetchError::OutOfRangeSampleCount(count));
    }

    let mut slots = [None; HOURS_PER_DAY];
    for point in &curve.points {
        let Some(index) = point.position.checked_sub(1) else {
            return Err(FetchError::MalformedPayload("position 0 in curve".into()));
        };
        let hour = if count == 23 && index > 1 {
            // Spring-forward day lost 02:00; later samples shift forward.
            index + 1
        } else {
            index
        };
        // On the 25-point fall-back day position 25 repeats an offset, not
        // an hour index, and falls off the end.
        if hour < HOURS_PER_DAY {
            slots[hour] = Some(point.price);
        }
        if count == 23 && index == 1 {
            slots[index + 1] = Some(point.price);
        }
    }

    finalize(&slots)
}

/// Number of wall-clock hours in `day`: 24 normally, 23/25 on DST days.
fn wall_clock_hours(calendar: &Calendar, day: LocalDay) -> i64 {
    let start = calendar.instant_at(day, 0, 0, 0);
    let next = calendar.add_local_days(start, 1);
    (next.unix() - start.unix()) / 3600
}

fn finalize(slots: &[Option<f64>; HOURS_PER_DAY]) -> FetchResult<DayRateCurve> {
    let mut curve = [0.0; HOURS_PER_DAY];
    for (hour, slot) in slots.iter().enumerate() {
        curve[hour] = slot.ok_or_else(|| {
            FetchError::MalformedPayload(format!("hour {hour} missing from curve"))
        })?;
    }
    Ok(curve)
}
