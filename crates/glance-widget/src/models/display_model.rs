//! Presentation mapping: cache record + age -> what the display shows.

use chrono::{DateTime, Duration, Local, Utc};
use glance_weather::provider::{DEFAULT_PRODUCT_NAME, TEMPERATURE_PLACEHOLDER};
use glance_weather::{CacheRecord, CacheStatus, FetchErrorKind, MetricField, UNKNOWN_TEXT};

use crate::colors::{self, Rgb};

pub const STATUS_UPDATING: &str = "Updating…";
pub const STATUS_NEEDS_LOCATION: &str = "Open app to grant location";
pub const STATUS_FRESH: &str = "Tap to refresh";
pub const STATUS_STALE: &str = "Stale · tap to refresh";

/// What tapping the display should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapAction {
    TriggerRefresh,
    OpenAcquisitionFlow,
}

/// Where the coordinator is in a refresh when it publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Immediate publish of cached state while a fetch is queued.
    /// `located` is false when the last resolve found no fix.
    Refreshing { located: bool },
    /// No location source produced a fix
    NeedsLocation,
    /// A fetch attempt finished (successfully or not)
    Published,
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub product_name: String,
    pub staleness: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            staleness: Duration::seconds(glance_weather::cache::STALENESS_SECONDS),
        }
    }
}

/// Everything the display surface needs, fully formatted
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayModel {
    pub quip: String,
    pub temperature_label: String,
    pub precipitation_text: String,
    pub humidity_text: String,
    pub uv_text: String,
    pub status_text: String,
    pub age_label: String,
    pub precip_color: Rgb,
    pub humidity_color: Rgb,
    pub uv_color: Rgb,
    pub precip_text_color: Rgb,
    pub humidity_text_color: Rgb,
    pub uv_text_color: Rgb,
    pub on_tap: TapAction,
}

/// Render a record for display. Pure; `age` comes from the cache.
pub fn render(
    record: &CacheRecord,
    age: Option<Duration>,
    phase: Phase,
    options: &RenderOptions,
) -> DisplayModel {
    let snapshot = record.snapshot.as_ref();

    let text = |field: Option<&MetricField>| {
        field
            .map(|f| f.display_text.clone())
            .unwrap_or_else(|| UNKNOWN_TEXT.to_string())
    };
    let precipitation = snapshot.map(|s| &s.precipitation);
    let humidity = snapshot.map(|s| &s.humidity);
    let uv = snapshot.map(|s| &s.uv_index);

    let precip_color =
        colors::precipitation_color(precipitation.and_then(|f| f.normalized.known()));
    let humidity_color = colors::humidity_color(humidity.and_then(|f| f.normalized.known()));
    let uv_color = colors::uv_color(uv.and_then(|f| f.raw));

    let (status_text, on_tap) = match phase {
        Phase::NeedsLocation => (
            STATUS_NEEDS_LOCATION.to_string(),
            TapAction::OpenAcquisitionFlow,
        ),
        Phase::Refreshing { located: true } => {
            (STATUS_UPDATING.to_string(), TapAction::TriggerRefresh)
        }
        Phase::Refreshing { located: false } => {
            (STATUS_UPDATING.to_string(), TapAction::OpenAcquisitionFlow)
        }
        Phase::Published => (
            status_line(record.display_status(age, options.staleness)),
            TapAction::TriggerRefresh,
        ),
    };

    let age_label = match (snapshot, record.fetched_at, age) {
        (Some(_), Some(fetched_at), Some(age)) => age_label(fetched_at, age),
        _ => String::new(),
    };

    DisplayModel {
        quip: snapshot
            .map(|s| s.quip.clone())
            .unwrap_or_else(|| options.product_name.clone()),
        temperature_label: snapshot
            .map(|s| s.temperature_label.clone())
            .unwrap_or_else(|| TEMPERATURE_PLACEHOLDER.to_string()),
        precipitation_text: text(precipitation),
        humidity_text: text(humidity),
        uv_text: text(uv),
        status_text,
        age_label,
        precip_color,
        humidity_color,
        uv_color,
        precip_text_color: precip_color.text_color(),
        humidity_text_color: humidity_color.text_color(),
        uv_text_color: uv_color.text_color(),
        on_tap,
    }
}

pub fn status_line(status: CacheStatus) -> String {
    match status {
        CacheStatus::Empty | CacheStatus::Fresh => STATUS_FRESH.to_string(),
        CacheStatus::Stale => STATUS_STALE.to_string(),
        CacheStatus::Error(FetchErrorKind::Transport) => "Offline · tap to retry".to_string(),
        CacheStatus::Error(FetchErrorKind::Timeout) => {
            "Offline (timed out) · tap to retry".to_string()
        }
        CacheStatus::Error(FetchErrorKind::HttpStatus(code)) => {
            format!("Error {code} · tap to retry")
        }
        CacheStatus::Error(FetchErrorKind::MalformedBody) => {
            "Bad response · tap to retry".to_string()
        }
    }
}

/// "42s ago" while fresh, then the local fetch time plus a coarse age.
pub fn age_label(fetched_at: DateTime<Utc>, age: Duration) -> String {
    let seconds = age.num_seconds().max(0);
    if seconds < 60 {
        return format!("{seconds}s ago");
    }
    let clock = fetched_at.with_timezone(&Local).format("%H:%M");
    format!("{clock} · {} ago", humanize_age(age))
}

/// Largest whole unit: `45s`, `2m`, `3h`, `4d`.
pub fn humanize_age(age: Duration) -> String {
    let s = age.num_seconds().max(0);
    if s < 60 {
        return format!("{s}s");
    }
    let m = s / 60;
    if m < 60 {
        return format!("{m}m");
    }
    let h = m / 60;
    if h < 24 {
        return format!("{h}h");
    }
    format!("{}d", h / 24)
}
