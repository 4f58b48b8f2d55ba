//! Integration tests for WeatherProvider against a fake weather endpoint.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use chrono::Utc;
use glance_weather::{
    Coordinate, CoordinateSource, FetchErrorKind, MetricValue, ProviderSettings, WeatherFetcher,
    WeatherProvider,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(base_url: &str) -> WeatherProvider {
    WeatherProvider::new(ProviderSettings {
        base_url: base_url.to_string(),
        connect_timeout: Duration::from_millis(300),
        read_timeout: Duration::from_millis(300),
        product_name: "Empowering Weather".to_string(),
    })
    .unwrap()
}

fn london() -> Coordinate {
    Coordinate::new(51.5, -0.12, Utc::now(), CoordinateSource::ExplicitUserSet)
}

#[tokio::test]
async fn test_fetch_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .and(query_param("lat", "51.5"))
        .and(query_param("lon", "-0.12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "weather_quip": "Grey. Again.",
            "weather": {
                "current": {
                    "temp_c": 14,
                    "humidity": 81,
                    "uv": 2,
                    "precip_mm": 10
                }
            }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let snapshot = provider(&mock_server.uri()).fetch(&london()).await.unwrap();

    assert_eq!(snapshot.quip, "Grey. Again.");
    assert_eq!(snapshot.temperature_label, "14°C");
    assert_eq!(snapshot.humidity.display_text, "81%");
    assert_eq!(snapshot.uv_index.display_text, "2");
    assert_eq!(snapshot.precipitation.display_text, "10 mm");
    assert_eq!(snapshot.precipitation.normalized, MetricValue::Known(0.2));
}

#[tokio::test]
async fn test_fetch_tolerates_trailing_slash_in_base_url() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&mock_server)
        .await;

    let base = format!("{}/", mock_server.uri());
    let snapshot = provider(&base).fetch(&london()).await.unwrap();
    assert_eq!(snapshot.quip, "Empowering Weather");
    assert_eq!(snapshot.temperature_label, "--°C");
}

#[tokio::test]
async fn test_non_success_status_is_http_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down for maintenance"))
        .mount(&mock_server)
        .await;

    let err = provider(&mock_server.uri())
        .fetch(&london())
        .await
        .unwrap_err();
    assert_eq!(err, FetchErrorKind::HttpStatus(503));
}

#[tokio::test]
async fn test_non_object_body_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let err = provider(&mock_server.uri())
        .fetch(&london())
        .await
        .unwrap_err();
    assert_eq!(err, FetchErrorKind::MalformedBody);
}

#[tokio::test]
async fn test_json_array_body_is_malformed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .mount(&mock_server)
        .await;

    let err = provider(&mock_server.uri())
        .fetch(&london())
        .await
        .unwrap_err();
    assert_eq!(err, FetchErrorKind::MalformedBody);
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let err = provider(&mock_server.uri())
        .fetch(&london())
        .await
        .unwrap_err();
    assert_eq!(err, FetchErrorKind::Timeout);
}

#[tokio::test]
async fn test_unreachable_host_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = provider(&format!("http://127.0.0.1:{port}"))
        .fetch(&london())
        .await
        .unwrap_err();
    assert_eq!(err, FetchErrorKind::Transport);
}
