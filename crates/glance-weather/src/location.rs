//! Location resolution: pick the best available fix from ranked sources.
//!
//! Precedence, highest first:
//! 1. An explicitly saved coordinate younger than the fix validity window.
//! 2. The more recent of the device's high- and low-accuracy last-known fixes
//!    (ties go to high accuracy).
//! 3. Nothing; the caller must start the acquisition flow.
//!
//! Resolution only reads its sources.

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::types::{Coordinate, CoordinateSource};

/// How long an explicitly saved fix stays authoritative
pub const FIX_VALIDITY_MINUTES: i64 = 15;

/// Accuracy class of a device location provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    /// e.g. satellite positioning
    High,
    /// e.g. network/cell positioning
    Low,
}

/// Read access to the coordinate saved by the acquisition flow.
pub trait SavedCoordinateSource: Send + Sync {
    fn saved_coordinate(&self) -> Option<Coordinate>;
}

/// Read access to the device's cached last-known fixes.
///
/// Implementations must answer from what the platform already has and never
/// start a fresh location request.
pub trait DeviceLocator: Send + Sync {
    fn last_known(&self, accuracy: Accuracy) -> Option<Coordinate>;
}

/// A device without location providers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDeviceLocator;

impl DeviceLocator for NoDeviceLocator {
    fn last_known(&self, _accuracy: Accuracy) -> Option<Coordinate> {
        None
    }
}

/// Device locator with fixed answers per accuracy class.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceLocator {
    pub high: Option<Coordinate>,
    pub low: Option<Coordinate>,
}

impl DeviceLocator for StaticDeviceLocator {
    fn last_known(&self, accuracy: Accuracy) -> Option<Coordinate> {
        match accuracy {
            Accuracy::High => self.high,
            Accuracy::Low => self.low,
        }
    }
}

pub struct LocationResolver {
    saved: Arc<dyn SavedCoordinateSource>,
    device: Arc<dyn DeviceLocator>,
    clock: Arc<dyn Clock>,
    validity: Duration,
}

impl LocationResolver {
    pub fn new(
        saved: Arc<dyn SavedCoordinateSource>,
        device: Arc<dyn DeviceLocator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            saved,
            device,
            clock,
            validity: Duration::minutes(FIX_VALIDITY_MINUTES),
        }
    }

    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Resolve the best fix, or `None` when no source has one.
    pub fn resolve(&self) -> Option<Coordinate> {
        let now = self.clock.now();

        if let Some(saved) = self.saved.saved_coordinate().filter(|c| !c.is_absent()) {
            if saved.age_at(now) < self.validity {
                tracing::debug!("Using saved coordinate ({:?})", saved.source);
                return Some(Coordinate {
                    source: CoordinateSource::ExplicitUserSet,
                    ..saved
                });
            }
            tracing::debug!("Saved coordinate expired, falling back to device fixes");
        }

        let high = self.device_fix(Accuracy::High);
        let low = self.device_fix(Accuracy::Low);

        let best = match (high, low) {
            (Some(h), Some(l)) if l.observed_at > h.observed_at => Some(l),
            (Some(h), _) => Some(h),
            (None, l) => l,
        };

        if best.is_none() {
            tracing::debug!("No location source produced a fix");
        }
        best
    }

    fn device_fix(&self, accuracy: Accuracy) -> Option<Coordinate> {
        self.device
            .last_known(accuracy)
            .filter(|c| !c.is_absent())
            .map(|c| Coordinate {
                source: CoordinateSource::DeviceLastKnown,
                ..c
            })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{DateTime, Utc};

    struct Saved(Option<Coordinate>);

    impl SavedCoordinateSource for Saved {
        fn saved_coordinate(&self) -> Option<Coordinate> {
            self.0
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    fn fix(lat: f64, lon: f64, minutes_ago: i64, source: CoordinateSource) -> Coordinate {
        Coordinate::new(lat, lon, t0() - Duration::minutes(minutes_ago), source)
    }

    fn resolver(saved: Option<Coordinate>, device: StaticDeviceLocator) -> LocationResolver {
        LocationResolver::new(
            Arc::new(Saved(saved)),
            Arc::new(device),
            Arc::new(ManualClock::new(t0())),
        )
    }

    #[test]
    fn test_fresh_explicit_fix_outranks_newer_device_fix() {
        let saved = fix(51.5, -0.12, 14, CoordinateSource::ExplicitUserSet);
        let device = StaticDeviceLocator {
            high: Some(fix(48.8, 2.35, 0, CoordinateSource::None)),
            low: None,
        };

        let resolved = resolver(Some(saved), device).resolve().unwrap();
        assert_eq!(resolved.latitude, 51.5);
        assert_eq!(resolved.source, CoordinateSource::ExplicitUserSet);
    }

    #[test]
    fn test_expired_explicit_fix_falls_back_to_device() {
        let saved = fix(51.5, -0.12, 15, CoordinateSource::ExplicitUserSet);
        let device = StaticDeviceLocator {
            high: Some(fix(48.8, 2.35, 30, CoordinateSource::None)),
            low: None,
        };

        let resolved = resolver(Some(saved), device).resolve().unwrap();
        assert_eq!(resolved.latitude, 48.8);
        assert_eq!(resolved.source, CoordinateSource::DeviceLastKnown);
    }

    #[test]
    fn test_more_recent_device_fix_wins_regardless_of_accuracy() {
        let device = StaticDeviceLocator {
            high: Some(fix(10.0, 10.0, 20, CoordinateSource::None)),
            low: Some(fix(20.0, 20.0, 5, CoordinateSource::None)),
        };
        assert_eq!(resolver(None, device).resolve().unwrap().latitude, 20.0);

        let device = StaticDeviceLocator {
            high: Some(fix(10.0, 10.0, 5, CoordinateSource::None)),
            low: Some(fix(20.0, 20.0, 20, CoordinateSource::None)),
        };
        assert_eq!(resolver(None, device).resolve().unwrap().latitude, 10.0);
    }

    #[test]
    fn test_tie_goes_to_high_accuracy() {
        let device = StaticDeviceLocator {
            high: Some(fix(10.0, 10.0, 5, CoordinateSource::None)),
            low: Some(fix(20.0, 20.0, 5, CoordinateSource::None)),
        };
        assert_eq!(resolver(None, device).resolve().unwrap().latitude, 10.0);
    }

    #[test]
    fn test_zero_zero_fixes_are_ignored() {
        let saved = fix(0.0, 0.0, 1, CoordinateSource::ExplicitUserSet);
        let device = StaticDeviceLocator {
            high: Some(fix(0.0, 0.0, 1, CoordinateSource::None)),
            low: Some(fix(33.0, 44.0, 50, CoordinateSource::None)),
        };
        let resolved = resolver(Some(saved), device).resolve().unwrap();
        assert_eq!(resolved.latitude, 33.0);
    }

    #[test]
    fn test_no_sources_is_absent() {
        assert!(resolver(None, StaticDeviceLocator::default())
            .resolve()
            .is_none());

        let expired = fix(51.5, -0.12, 60, CoordinateSource::ExplicitUserSet);
        assert!(resolver(Some(expired), StaticDeviceLocator::default())
            .resolve()
            .is_none());
    }

    #[test]
    fn test_custom_validity_window() {
        let saved = fix(51.5, -0.12, 20, CoordinateSource::ExplicitUserSet);
        let resolved = resolver(Some(saved), StaticDeviceLocator::default())
            .with_validity(Duration::minutes(30))
            .resolve();
        assert!(resolved.is_some());
    }
}
