use std::sync::Arc;

use elspot::calendar::{Calendar, LocalDay, TimeRule};
use elspot::config::AppConfig;
use elspot::currency::CurrencyService;
use elspot::error::FetchError;
use elspot::fetcher::HttpFetcher;
use elspot::spotprice::SpotPriceService;
use tracing::info;

mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Renders an ENTSO-E `Publication_MarketDocument` with the given period
    /// interval and `(position, price)` points.
    pub fn day_ahead_document(start: &str, end: &str, points: &[(usize, f64)]) -> String {
        let mut body = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Publication_MarketDocument xmlns="urn:iec62325.351:tc57wg16:451-3:publicationdocument:7:0">
  <type>A44</type>
  <TimeSeries>
    <currency_Unit.name>EUR</currency_Unit.name>
    <Period>
      <timeInterval>
        <start>{start}</start>
        <end>{end}</end>
      </timeInterval>
      <resolution>PT60M</resolution>
"#
        );
        for (position, price) in points {
            body.push_str(&format!(
                "      <Point><position>{position}</position><price.amount>{price}</price.amount></Point>\n"
            ));
        }
        body.push_str("    </Period>\n  </TimeSeries>\n</Publication_MarketDocument>");
        body
    }

    /// Mock server answering every zone's day-ahead query with `document`.
    pub async fn create_entsoe_mock_server(document: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_string(document))
            .mount(&mock_server)
            .await;

        mock_server
    }

    pub async fn create_rates_mock_server(date: &str, mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("/v1/{date}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }
}

fn test_config(entsoe_url: &str, rates_url: &str) -> AppConfig {
    let yaml = format!(
        r#"
entsoe:
  base_url: {entsoe_url}
  token: "test-token"
exchangerates:
  base_url: {rates_url}
  token: "test-token"
mqtt:
  host: "localhost"
svg:
  output_dir: "/tmp"
  template_file: "/tmp/template.svg"
"#
    );
    serde_yaml::from_str(&yaml).expect("Failed to build test config")
}

fn spot_service(config: &AppConfig) -> SpotPriceService {
    let calendar = Calendar::new(TimeRule::FixedCet);
    let fetcher = Arc::new(HttpFetcher::new(calendar, config).expect("Failed to build fetcher"));
    SpotPriceService::new(calendar, fetcher)
}

#[test_log::test(tokio::test)]
async fn test_spring_forward_day_normalizes_to_24_hours() {
    // 2022-03-27 has 23 wall-clock hours; the document starts at local
    // midnight and carries 23 points.
    let mut points: Vec<(usize, f64)> = (1..=23)
        .map(|position| (position, 150.0 + position as f64))
        .collect();
    points[0].1 = 194.84;
    let document = test_utils::day_ahead_document(
        "2022-03-26T23:00Z",
        "2022-03-27T22:00Z",
        &points,
    );
    let mock_server = test_utils::create_entsoe_mock_server(&document).await;
    let config = test_config(&mock_server.uri(), &mock_server.uri());

    let service = spot_service(&config);
    let day = LocalDay::new(2022, 3, 27);
    let rates = service.eur_rates(day).await.expect("acquisition failed");
    info!(hour0 = rates[0][0], "normalized spring-forward day");

    assert_eq!(rates[0][0], 194.84);
    // the skipped 02:00 repeats its neighbour
    assert_eq!(rates[0][1], rates[0][2]);
    assert_eq!(rates[0][23], 173.0);
    // every zone was normalized from the same document
    assert_eq!(rates[4], rates[0]);
    assert!(service.has_day(&day).await);
}

#[test_log::test(tokio::test)]
async fn test_fall_back_day_normalizes_to_24_hours() {
    // 2022-10-30 has 25 wall-clock hours; position 9 is 06:00 UTC, which is
    // 07:00 local after the transition.
    let mut points: Vec<(usize, f64)> = (1..=25)
        .map(|position| (position, 90.0 + position as f64))
        .collect();
    points[8].1 = 106.63;
    let document = test_utils::day_ahead_document(
        "2022-10-29T22:00Z",
        "2022-10-30T23:00Z",
        &points,
    );
    let mock_server = test_utils::create_entsoe_mock_server(&document).await;
    let config = test_config(&mock_server.uri(), &mock_server.uri());

    let service = spot_service(&config);
    let rates = service
        .eur_rates(LocalDay::new(2022, 10, 30))
        .await
        .expect("acquisition failed");

    assert_eq!(rates[0][7], 106.63);
    // 02:00 occurs twice; the later sample wins
    assert_eq!(rates[0][2], 94.0);
    assert_eq!(rates[0][23], 115.0);
}

#[test_log::test(tokio::test)]
async fn test_malformed_document_fails_and_gates_retries() {
    let mock_server = test_utils::create_entsoe_mock_server("This is not XML at all").await;
    let config = test_config(&mock_server.uri(), &mock_server.uri());

    let service = spot_service(&config);
    let day = LocalDay::new(2022, 12, 17);

    let first = service.eur_rates(day).await;
    assert!(matches!(first, Err(FetchError::MalformedPayload(_))));
    assert!(!service.has_day(&day).await);

    // let requests cancelled by the first failing zone drain
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let requests_after_first = mock_server.received_requests().await.unwrap().len();
    assert!(requests_after_first >= 1);

    // within the cooldown no further requests are made
    let second = service.eur_rates(day).await;
    assert!(matches!(second, Err(FetchError::NotAvailable)));
    let requests_after_second = mock_server.received_requests().await.unwrap().len();
    assert_eq!(requests_after_first, requests_after_second);
}

#[test_log::test(tokio::test)]
async fn test_exchange_rate_for_past_day_uses_dated_endpoint() {
    let mock_response = r#"{
        "success": true,
        "timestamp": 1671321599,
        "base": "EUR",
        "date": "2022-12-17",
        "rates": { "NOK": 10.514277 }
    }"#;
    let mock_server = test_utils::create_rates_mock_server("2022-12-17", mock_response).await;
    let config = test_config(&mock_server.uri(), &mock_server.uri());

    let calendar = Calendar::new(TimeRule::FixedCet);
    let fetcher = Arc::new(HttpFetcher::new(calendar, &config).expect("Failed to build fetcher"));
    let service = CurrencyService::new(calendar, fetcher, "NOK".to_string());

    let day = LocalDay::new(2022, 12, 17);
    let rate = service.exchange_rate(day).await.expect("rate fetch failed");
    assert_eq!(rate, 10.514277);
    assert!(service.has_day(&day).await);

    // second call is a cache hit
    service.exchange_rate(day).await.expect("cache hit failed");
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 1);
}
