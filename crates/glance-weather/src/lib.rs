//! Weather domain for the Glance widget
//!
//! Resolves a location fix, fetches a snapshot from the weather endpoint and
//! keeps the last good snapshot in a persistent cache.

pub mod cache;
pub mod clock;
pub mod location;
pub mod provider;
pub mod types;

pub use cache::{CacheStorage, MemoryStorage, SqliteStorage, WeatherCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use location::{
    Accuracy, DeviceLocator, LocationResolver, NoDeviceLocator, SavedCoordinateSource,
    StaticDeviceLocator,
};
pub use provider::{ProviderSettings, WeatherFetcher, WeatherProvider};
pub use types::*;
