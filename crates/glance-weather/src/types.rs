use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Display text for any metric the upstream did not provide
pub const UNKNOWN_TEXT: &str = "--";

/// Where a coordinate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSource {
    /// Saved by the permission-gated acquisition flow
    ExplicitUserSet,
    /// Last fix reported by a device location provider
    DeviceLastKnown,
    #[default]
    None,
}

impl CoordinateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExplicitUserSet => "explicit_user_set",
            Self::DeviceLastKnown => "device_last_known",
            Self::None => "none",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "explicit_user_set" => Self::ExplicitUserSet,
            "device_last_known" => Self::DeviceLastKnown,
            _ => Self::None,
        }
    }
}

/// A single geographic fix.
///
/// (0, 0) is the "no fix" sentinel: see [`Coordinate::is_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
    pub source: CoordinateSource,
}

impl Coordinate {
    pub fn new(
        latitude: f64,
        longitude: f64,
        observed_at: DateTime<Utc>,
        source: CoordinateSource,
    ) -> Self {
        Self {
            latitude,
            longitude,
            observed_at,
            source,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }

    /// Age of the fix at `now`; fixes from the future count as brand new.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.observed_at).max(Duration::zero())
    }

    /// True when either axis differs from `other` by more than `degrees`.
    pub fn is_far_from(&self, other: &Coordinate, degrees: f64) -> bool {
        (self.latitude - other.latitude).abs() > degrees
            || (self.longitude - other.longitude).abs() > degrees
    }
}

/// A metric rescaled to [0, 1], or unknown when the upstream omitted it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Known(f64),
    Unknown,
}

impl MetricValue {
    pub fn known(&self) -> Option<f64> {
        match self {
            Self::Known(v) => Some(*v),
            Self::Unknown => None,
        }
    }
}

/// One display metric: its text, normalized value and the raw upstream number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricField {
    pub display_text: String,
    pub normalized: MetricValue,
    /// Upstream value before normalization (percent, millimeters or UV index)
    pub raw: Option<f64>,
}

impl MetricField {
    pub fn unknown() -> Self {
        Self {
            display_text: UNKNOWN_TEXT.to_string(),
            normalized: MetricValue::Unknown,
            raw: None,
        }
    }

    /// Build a known field; `normalized` is clamped into [0, 1].
    pub fn known(display_text: impl Into<String>, normalized: f64, raw: f64) -> Self {
        Self {
            display_text: display_text.into(),
            normalized: MetricValue::Known(normalized.clamp(0.0, 1.0)),
            raw: Some(raw),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.normalized, MetricValue::Unknown)
    }
}

/// Immutable result of one successful fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub quip: String,
    pub temperature_label: String,
    pub precipitation: MetricField,
    pub humidity: MetricField,
    pub uv_index: MetricField,
    pub fetched_at: DateTime<Utc>,
}

/// Why a fetch attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "code", rename_all = "snake_case")]
pub enum FetchErrorKind {
    #[error("upstream returned HTTP {0}")]
    HttpStatus(u16),
    #[error("network unreachable")]
    Transport,
    #[error("request timed out")]
    Timeout,
    #[error("response body is not a JSON object")]
    MalformedBody,
}

/// Stored state of the snapshot cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum CacheStatus {
    #[default]
    Empty,
    /// Never stored; derived for display once a fresh record ages out
    Stale,
    Fresh,
    Error(FetchErrorKind),
}

/// The last good snapshot plus the outcome of the most recent fetch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CacheRecord {
    pub snapshot: Option<Snapshot>,
    pub status: CacheStatus,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl CacheRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fresh(snapshot: Snapshot, fetched_at: DateTime<Utc>) -> Self {
        Self {
            snapshot: Some(snapshot),
            status: CacheStatus::Fresh,
            fetched_at: Some(fetched_at),
        }
    }

    /// Status as it should be worded on the display.
    ///
    /// A `Fresh` record older than `threshold` reads as `Stale`; the data stays.
    pub fn display_status(&self, age: Option<Duration>, threshold: Duration) -> CacheStatus {
        match (self.status, age) {
            (CacheStatus::Fresh, Some(age)) if age > threshold => CacheStatus::Stale,
            (status, _) => status,
        }
    }
}

/// Snapshot cache and storage errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_zero_zero_is_absent() {
        let c = Coordinate::new(0.0, 0.0, at(0), CoordinateSource::DeviceLastKnown);
        assert!(c.is_absent());
    }

    #[test]
    fn test_single_zero_axis_is_present() {
        assert!(!Coordinate::new(0.0, 12.5, at(0), CoordinateSource::None).is_absent());
        assert!(!Coordinate::new(51.5, 0.0, at(0), CoordinateSource::None).is_absent());
    }

    #[test]
    fn test_is_far_from_uses_either_axis() {
        let a = Coordinate::new(51.5, -0.1, at(0), CoordinateSource::ExplicitUserSet);
        let near = Coordinate::new(51.9, 0.5, at(0), CoordinateSource::ExplicitUserSet);
        let far = Coordinate::new(51.5, 1.2, at(0), CoordinateSource::ExplicitUserSet);
        assert!(!a.is_far_from(&near, 1.0));
        assert!(a.is_far_from(&far, 1.0));
    }

    #[test]
    fn test_known_metric_is_clamped() {
        let field = MetricField::known("140%", 1.4, 140.0);
        assert_eq!(field.normalized, MetricValue::Known(1.0));
        assert_eq!(field.raw, Some(140.0));
    }

    #[test]
    fn test_unknown_metric_text() {
        let field = MetricField::unknown();
        assert_eq!(field.display_text, "--");
        assert!(field.is_unknown());
        assert_eq!(field.normalized.known(), None);
    }

    #[test]
    fn test_fresh_record_reads_stale_after_threshold() {
        let record = CacheRecord {
            snapshot: None,
            status: CacheStatus::Fresh,
            fetched_at: Some(at(0)),
        };
        let threshold = Duration::seconds(120);
        assert_eq!(
            record.display_status(Some(Duration::seconds(119)), threshold),
            CacheStatus::Fresh
        );
        assert_eq!(
            record.display_status(Some(Duration::seconds(121)), threshold),
            CacheStatus::Stale
        );
    }

    #[test]
    fn test_error_record_is_not_relabelled_stale() {
        let record = CacheRecord {
            snapshot: None,
            status: CacheStatus::Error(FetchErrorKind::Transport),
            fetched_at: Some(at(0)),
        };
        assert_eq!(
            record.display_status(Some(Duration::hours(3)), Duration::seconds(120)),
            CacheStatus::Error(FetchErrorKind::Transport)
        );
    }

    #[test]
    fn test_source_string_round_trip() {
        for source in [
            CoordinateSource::ExplicitUserSet,
            CoordinateSource::DeviceLastKnown,
            CoordinateSource::None,
        ] {
            assert_eq!(CoordinateSource::parse(source.as_str()), source);
        }
    }
}
