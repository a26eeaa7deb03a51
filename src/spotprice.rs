//! Day-ahead spot prices for the Norwegian bidding zones.
//!
//! Fetches the ENTSO-E `Publication_MarketDocument` for every zone, parses
//! the hourly points and caches the normalized per-day result. A day is
//! cached only when all five zones normalized; partial data is never kept.

use std::sync::Arc;

use chrono::NaiveDateTime;
use futures::future::try_join_all;
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::info;

use crate::cache::RetryGatedCache;
use crate::calendar::{Calendar, LocalDay, UtcTime};
use crate::curve::{self, DayRateCurve, HOURS_PER_DAY, RawCurve, RawPoint};
use crate::error::{FetchError, FetchResult};
use crate::fetcher::Fetcher;

/// A Nord Pool bidding zone: stable identifier, ENTSO-E EIC code and
/// display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    pub id: &'static str,
    pub code: &'static str,
    pub name: &'static str,
}

pub const ZONE_COUNT: usize = 5;

pub const ZONES: [Zone; ZONE_COUNT] = [
    Zone {
        id: "NO-1",
        code: "10YNO-1--------2",
        name: "Oslo",
    },
    Zone {
        id: "NO-2",
        code: "10YNO-2--------T",
        name: "Kristiansand",
    },
    Zone {
        id: "NO-3",
        code: "10YNO-3--------J",
        name: "Trondheim",
    },
    Zone {
        id: "NO-4",
        code: "10YNO-4--------9",
        name: "Tromsø",
    },
    Zone {
        id: "NO-5",
        code: "10Y1001A1001A48H",
        name: "Bergen",
    },
];

/// One normalized price curve per zone for a single local day, EUR/MWh.
pub type ZoneRateSet = [DayRateCurve; ZONE_COUNT];

pub struct SpotPriceService {
    calendar: Calendar,
    fetcher: Arc<dyn Fetcher>,
    cache: RetryGatedCache<LocalDay, ZoneRateSet>,
}

impl SpotPriceService {
    pub fn new(calendar: Calendar, fetcher: Arc<dyn Fetcher>) -> Self {
        SpotPriceService {
            calendar,
            fetcher,
            cache: RetryGatedCache::new(),
        }
    }

    /// EUR curves for all zones on `day`, from cache or fetched atomically.
    pub async fn eur_rates(&self, day: LocalDay) -> FetchResult<ZoneRateSet> {
        let calendar = self.calendar;
        let fetcher = Arc::clone(&self.fetcher);
        self.cache
            .get(day, move |day| async move {
                fetch_all_zones(&calendar, fetcher.as_ref(), day).await
            })
            .await
    }

    /// Ensures `day` is cached, discarding the value.
    pub async fn cache_day(&self, day: LocalDay) -> bool {
        self.eur_rates(day).await.is_ok()
    }

    pub async fn has_day(&self, day: &LocalDay) -> bool {
        self.cache.has(day).await
    }
}

async fn fetch_all_zones(
    calendar: &Calendar,
    fetcher: &dyn Fetcher,
    day: LocalDay,
) -> FetchResult<ZoneRateSet> {
    let curves = try_join_all(ZONES.iter().map(|zone| async move {
        let xml = fetcher.fetch_spot_curve(zone.code, day).await?;
        let raw = parse_day_ahead_document(&xml)?;
        curve::normalize(calendar, day, &raw)
    }))
    .await?;

    let mut rates = [[0.0; HOURS_PER_DAY]; ZONE_COUNT];
    for (slot, curve) in rates.iter_mut().zip(curves) {
        *slot = curve;
    }
    info!(%day, "got day-ahead prices for all zones");
    Ok(rates)
}

/// Extracts the first period of a `Publication_MarketDocument`: the declared
/// time interval plus the ordered `(position, price.amount)` points.
pub fn parse_day_ahead_document(xml: &str) -> FetchResult<RawCurve> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut curve = RawCurve::default();
    let mut element = String::new();
    let mut in_period = false;
    let mut position: Option<usize> = None;
    let mut price: Option<f64> = None;

    loop {
        match reader.read_event() {
            Err(err) => return Err(FetchError::MalformedPayload(err.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(tag)) => {
                element = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
                match element.as_str() {
                    "Period" => in_period = true,
                    "Point" => {
                        position = None;
                        price = None;
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(text)) if in_period => {
                let value = text
                    .unescape()
                    .map_err(|err| FetchError::MalformedPayload(err.to_string()))?;
                let value = value.trim();
                match element.as_str() {
                    "start" => curve.start = Some(parse_interval_instant(value)?),
                    "end" => curve.end = Some(parse_interval_instant(value)?),
                    "position" => {
                        position = Some(value.parse().map_err(|_| {
                            FetchError::MalformedPayload(format!("bad position {value}"))
                        })?);
                    }
                    "price.amount" => {
                        price = Some(value.parse().map_err(|_| {
                            FetchError::MalformedPayload(format!("bad price {value}"))
                        })?);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(tag)) => {
                match tag.name().as_ref() {
                    b"Point" if in_period => {
                        if let (Some(position), Some(price)) = (position, price) {
                            curve.points.push(RawPoint { position, price });
                        }
                    }
                    b"Period" => {
                        if !curve.points.is_empty() {
                            break;
                        }
                        in_period = false;
                        curve = RawCurve::default();
                    }
                    _ => {}
                }
                element.clear();
            }
            Ok(_) => {}
        }
    }

    if curve.points.is_empty() {
        return Err(FetchError::MalformedPayload(
            "no Point elements in document".into(),
        ));
    }
    for window in curve.points.windows(2) {
        if window[1].position <= window[0].position {
            return Err(FetchError::MalformedPayload(format!(
                "positions not ascending at {}",
                window[1].position
            )));
        }
    }
    Ok(curve)
}

fn parse_interval_instant(value: &str) -> FetchResult<UtcTime> {
    // ENTSO-E intervals look like "2022-03-26T23:00Z".
    let trimmed = value.trim_end_matches('Z');
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M"))
        .map_err(|err| {
            FetchError::MalformedPayload(format!("bad interval instant {value}: {err}"))
        })?;
    Ok(UtcTime::from_unix(naive.and_utc().timestamp()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Publication_MarketDocument xmlns="urn:iec62325.351:tc57wg16:451-3:publicationdocument:7:0">
  <mRID>fd665b9c9e9e4a58a8c1bbf1e964a4a7</mRID>
  <type>A44</type>
  <period.timeInterval>
    <start>2022-12-16T23:00Z</start>
    <end>2022-12-17T23:00Z</end>
  </period.timeInterval>
  <TimeSeries>
    <mRID>1</mRID>
    <currency_Unit.name>EUR</currency_Unit.name>
    <Period>
      <timeInterval>
        <start>2022-12-16T23:00Z</start>
        <end>2022-12-17T23:00Z</end>
      </timeInterval>
      <resolution>PT60M</resolution>
      <Point>
        <position>1</position>
        <price.amount>194.84</price.amount>
      </Point>
      <Point>
        <position>2</position>
        <price.amount>186.23</price.amount>
      </Point>
      <Point>
        <position>3</position>
        <price.amount>181.10</price.amount>
      </Point>
    </Period>
  </TimeSeries>
</Publication_MarketDocument>"#;

    #[test]
    fn test_parse_extracts_interval_and_points() {
        let curve = parse_day_ahead_document(SAMPLE_DOCUMENT).unwrap();
        // 2022-12-16 23:00 UTC
        assert_eq!(curve.start, Some(UtcTime::from_unix(1_671_231_600)));
        assert_eq!(curve.end, Some(UtcTime::from_unix(1_671_231_600 + 24 * 3600)));
        assert_eq!(curve.points.len(), 3);
        assert_eq!(
            curve.points[0],
            RawPoint {
                position: 1,
                price: 194.84
            }
        );
        assert_eq!(curve.points[2].position, 3);
        assert_eq!(curve.points[2].price, 181.10);
    }

    #[test]
    fn test_parse_rejects_invalid_xml() {
        assert!(matches!(
            parse_day_ahead_document("This is invalid XML"),
            Err(FetchError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_day_ahead_document("<xml>Valid XML, with no rates</xml>"),
            Err(FetchError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_ascending_positions() {
        let doc = r#"<doc><Period>
            <Point><position>1</position><price.amount>1.0</price.amount></Point>
            <Point><position>1</position><price.amount>2.0</price.amount></Point>
        </Period></doc>"#;
        assert!(matches!(
            parse_day_ahead_document(doc),
            Err(FetchError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_zone_table() {
        assert_eq!(ZONES.len(), ZONE_COUNT);
        assert_eq!(ZONES[0].id, "NO-1");
        assert_eq!(ZONES[0].name, "Oslo");
        assert_eq!(ZONES[4].code, "10Y1001A1001A48H");
    }
}
