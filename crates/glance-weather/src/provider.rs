//! Remote fetch client: one bounded HTTP round trip per call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{Map, Value};

use crate::clock::{Clock, SystemClock};
use crate::types::{Coordinate, FetchErrorKind, MetricField, Snapshot, WeatherError};

pub const DEFAULT_BASE_URL: &str = "https://weather.oreostack.uk";
pub const DEFAULT_PRODUCT_NAME: &str = "Empowering Weather";
pub const TEMPERATURE_PLACEHOLDER: &str = "--°C";

/// Percent-chance keys, tried in order. Providers disagree on the name.
pub const RAIN_CHANCE_KEYS: [&str; 5] = [
    "daily_chance_of_rain",
    "chance_of_rain",
    "chanceofrain",
    "pop",
    "will_it_rain",
];

/// Rainfall that saturates the precipitation color band
pub const PRECIP_SATURATION_MM: f64 = 50.0;

/// Top of the UV index scale
pub const UV_SCALE_MAX: f64 = 11.0;

/// Anything that can turn a coordinate into a snapshot.
#[async_trait]
pub trait WeatherFetcher: Send + Sync {
    async fn fetch(&self, coordinate: &Coordinate) -> Result<Snapshot, FetchErrorKind>;
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Quip shown when the upstream sends none
    pub product_name: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(4),
            read_timeout: Duration::from_secs(4),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
        }
    }
}

/// HTTP client for the `/api?lat=&lon=` weather endpoint
#[derive(Clone)]
pub struct WeatherProvider {
    client: Arc<Client>,
    endpoint: String,
    product_name: String,
    clock: Arc<dyn Clock>,
}

impl WeatherProvider {
    pub fn new(settings: ProviderSettings) -> Result<Self, WeatherError> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        settings: ProviderSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .timeout(settings.connect_timeout + settings.read_timeout)
            .build()?;

        let endpoint = format!("{}/api", settings.base_url.trim_end_matches('/'));

        Ok(Self {
            client: Arc::new(client),
            endpoint,
            product_name: settings.product_name,
            clock,
        })
    }

    async fn request(&self, coordinate: &Coordinate) -> Result<Value, FetchErrorKind> {
        tracing::debug!(
            "Fetching weather for ({}, {})",
            coordinate.latitude,
            coordinate.longitude
        );

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("lat", coordinate.latitude), ("lon", coordinate.longitude)])
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchErrorKind::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await.map_err(classify)?;
        let payload: Value =
            serde_json::from_slice(&body).map_err(|_| FetchErrorKind::MalformedBody)?;

        if !payload.is_object() {
            return Err(FetchErrorKind::MalformedBody);
        }
        Ok(payload)
    }
}

#[async_trait]
impl WeatherFetcher for WeatherProvider {
    async fn fetch(&self, coordinate: &Coordinate) -> Result<Snapshot, FetchErrorKind> {
        let payload = self.request(coordinate).await?;
        let snapshot = parse_payload(&payload, &self.product_name, self.clock.now());
        tracing::info!("Fetched weather: {}", snapshot.temperature_label);
        Ok(snapshot)
    }
}

fn classify(err: reqwest::Error) -> FetchErrorKind {
    if err.is_timeout() {
        FetchErrorKind::Timeout
    } else if let Some(status) = err.status() {
        FetchErrorKind::HttpStatus(status.as_u16())
    } else {
        FetchErrorKind::Transport
    }
}

/// Map a decoded payload into a snapshot.
///
/// Each field is extracted on its own; a missing or mistyped field becomes
/// unknown without affecting the others.
pub fn parse_payload(payload: &Value, product_name: &str, fetched_at: DateTime<Utc>) -> Snapshot {
    let quip = payload
        .get("weather_quip")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(product_name)
        .to_string();

    let current = payload
        .get("weather")
        .and_then(|w| w.get("current"))
        .and_then(Value::as_object);

    if current.is_none() {
        tracing::debug!("Payload has no weather.current object");
    }

    let temperature_label = current
        .and_then(|c| field(c, "temp_c"))
        .and_then(number_of)
        .map(|t| format!("{t}°C"))
        .unwrap_or_else(|| TEMPERATURE_PLACEHOLDER.to_string());

    Snapshot {
        quip,
        temperature_label,
        precipitation: current.map(precipitation).unwrap_or_else(MetricField::unknown),
        humidity: current.map(humidity).unwrap_or_else(MetricField::unknown),
        uv_index: current.map(uv_index).unwrap_or_else(MetricField::unknown),
        fetched_at,
    }
}

fn precipitation(current: &Map<String, Value>) -> MetricField {
    for key in RAIN_CHANCE_KEYS {
        let Some(value) = field(current, key) else {
            continue;
        };
        let percent = match value {
            Value::Bool(rain) => Some(if *rain { 100.0 } else { 0.0 }),
            other if key == "will_it_rain" => {
                number_of(other).map(|n| if n != 0.0 { 100.0 } else { 0.0 })
            }
            other => number_of(other),
        };
        match percent {
            Some(percent) => return percent_field(percent),
            None => tracing::debug!("Ignoring undecodable rain chance '{key}': {value}"),
        }
    }

    match field(current, "precip_mm").map(|v| (v, number_of(v))) {
        Some((_, Some(mm))) => {
            MetricField::known(format!("{mm} mm"), mm / PRECIP_SATURATION_MM, mm)
        }
        Some((raw, None)) => {
            tracing::debug!("Ignoring undecodable precip_mm: {raw}");
            MetricField::unknown()
        }
        None => MetricField::unknown(),
    }
}

fn humidity(current: &Map<String, Value>) -> MetricField {
    match field(current, "humidity").map(|v| (v, number_of(v))) {
        Some((_, Some(percent))) => percent_field(percent),
        Some((raw, None)) => {
            tracing::debug!("Ignoring undecodable humidity: {raw}");
            MetricField::unknown()
        }
        None => MetricField::unknown(),
    }
}

fn uv_index(current: &Map<String, Value>) -> MetricField {
    match field(current, "uv").map(|v| (v, number_of(v))) {
        Some((_, Some(uv))) => MetricField::known(uv.to_string(), uv / UV_SCALE_MAX, uv),
        Some((raw, None)) => {
            tracing::debug!("Ignoring undecodable uv: {raw}");
            MetricField::unknown()
        }
        None => MetricField::unknown(),
    }
}

fn percent_field(percent: f64) -> MetricField {
    // Shown in the same [0, 100] range the normalized value is clamped to.
    let shown = percent.clamp(0.0, 100.0).round() as u32;
    MetricField::known(format!("{shown}%"), percent / 100.0, percent)
}

/// A present, non-null field
fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|v| !v.is_null())
}

/// Numbers, or strings holding a number with an optional trailing `%`.
fn number_of(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::types::MetricValue;
    use serde_json::json;

    fn parse(payload: Value) -> Snapshot {
        parse_payload(&payload, DEFAULT_PRODUCT_NAME, Utc::now())
    }

    fn current(fields: Value) -> Value {
        json!({ "weather_quip": "Bring a coat", "weather": { "current": fields } })
    }

    #[test]
    fn test_full_payload() {
        let snapshot = parse(current(json!({
            "temp_c": 21.5,
            "humidity": 63,
            "uv": 6.5,
            "chance_of_rain": 42
        })));

        assert_eq!(snapshot.quip, "Bring a coat");
        assert_eq!(snapshot.temperature_label, "21.5°C");
        assert_eq!(snapshot.precipitation.display_text, "42%");
        assert_eq!(snapshot.precipitation.normalized, MetricValue::Known(0.42));
        assert_eq!(snapshot.humidity.display_text, "63%");
        assert_eq!(snapshot.humidity.normalized, MetricValue::Known(0.63));
        assert_eq!(snapshot.uv_index.display_text, "6.5");
        assert_eq!(snapshot.uv_index.raw, Some(6.5));
    }

    #[test]
    fn test_percent_string_is_accepted() {
        let snapshot = parse(current(json!({ "daily_chance_of_rain": "42%" })));
        assert_eq!(snapshot.precipitation.normalized, MetricValue::Known(0.42));
        assert_eq!(snapshot.precipitation.display_text, "42%");
    }

    #[test]
    fn test_out_of_range_percent_display_is_clamped() {
        let snapshot = parse(current(json!({ "humidity": -0.3, "chance_of_rain": 104 })));
        assert_eq!(snapshot.humidity.display_text, "0%");
        assert_eq!(snapshot.humidity.normalized, MetricValue::Known(0.0));
        assert_eq!(snapshot.precipitation.display_text, "100%");
        assert_eq!(snapshot.precipitation.normalized, MetricValue::Known(1.0));
    }

    #[test]
    fn test_rain_keys_follow_priority_order() {
        let snapshot = parse(current(json!({ "pop": 80, "chanceofrain": 30 })));
        assert_eq!(snapshot.precipitation.display_text, "30%");
    }

    #[test]
    fn test_will_it_rain_bool_and_number() {
        let yes = parse(current(json!({ "will_it_rain": true })));
        assert_eq!(yes.precipitation.display_text, "100%");
        assert_eq!(yes.precipitation.normalized, MetricValue::Known(1.0));

        let no = parse(current(json!({ "will_it_rain": 0 })));
        assert_eq!(no.precipitation.display_text, "0%");
        assert_eq!(no.precipitation.normalized, MetricValue::Known(0.0));
    }

    #[test]
    fn test_millimeter_fallback() {
        let snapshot = parse(current(json!({ "precip_mm": 10 })));
        assert_eq!(snapshot.precipitation.display_text, "10 mm");
        assert_eq!(snapshot.precipitation.normalized, MetricValue::Known(0.2));
    }

    #[test]
    fn test_heavy_rain_saturates() {
        let snapshot = parse(current(json!({ "precip_mm": 120.0 })));
        assert_eq!(snapshot.precipitation.normalized, MetricValue::Known(1.0));
    }

    #[test]
    fn test_missing_precipitation_is_unknown() {
        let snapshot = parse(current(json!({ "temp_c": 10 })));
        assert_eq!(snapshot.precipitation.display_text, "--");
        assert_eq!(snapshot.precipitation.normalized, MetricValue::Unknown);
    }

    #[test]
    fn test_bad_field_degrades_only_that_field() {
        let snapshot = parse(current(json!({
            "temp_c": 12,
            "humidity": "soggy",
            "uv": [1, 2],
            "chance_of_rain": null,
            "pop": { "nested": true },
            "precip_mm": 2.5
        })));

        assert_eq!(snapshot.temperature_label, "12°C");
        assert!(snapshot.humidity.is_unknown());
        assert!(snapshot.uv_index.is_unknown());
        assert_eq!(snapshot.precipitation.display_text, "2.5 mm");
    }

    #[test]
    fn test_empty_quip_falls_back_to_product_name() {
        let snapshot = parse(json!({ "weather_quip": "  ", "weather": {} }));
        assert_eq!(snapshot.quip, DEFAULT_PRODUCT_NAME);

        let snapshot = parse(json!({}));
        assert_eq!(snapshot.quip, DEFAULT_PRODUCT_NAME);
        assert_eq!(snapshot.temperature_label, TEMPERATURE_PLACEHOLDER);
        assert!(snapshot.humidity.is_unknown());
    }

    #[test]
    fn test_uv_normalization_uses_scale_top() {
        let snapshot = parse(current(json!({ "uv": 11 })));
        assert_eq!(snapshot.uv_index.normalized, MetricValue::Known(1.0));
        assert_eq!(snapshot.uv_index.display_text, "11");
    }
}
