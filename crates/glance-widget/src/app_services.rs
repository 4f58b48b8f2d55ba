//! Service container for the widget backend.
//!
//! Owns the tokio runtime the refresh worker runs on and wires the cache,
//! resolver, fetch client and coordinator together from the loaded config.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::runtime::{Handle, Runtime};

use glance_core::{AppError, CacheBackend, Config};
use glance_weather::{
    CacheStorage, Clock, DeviceLocator, LocationResolver, MemoryStorage, ProviderSettings,
    SqliteStorage, SystemClock, WeatherCache, WeatherFetcher, WeatherProvider,
};

use crate::models::RenderOptions;
use crate::services::{
    AcquisitionFlow, CoordinatorDeps, DisplayPublisher, RefreshCoordinator, RefreshError,
};

/// Collaborators supplied by the host
pub struct Host {
    pub publisher: Arc<dyn DisplayPublisher>,
    pub acquisition: Arc<dyn AcquisitionFlow>,
    pub device: Arc<dyn DeviceLocator>,
}

pub struct WidgetServices {
    runtime: Runtime,
    cache: Arc<WeatherCache>,
    coordinator: Arc<RefreshCoordinator>,
}

impl WidgetServices {
    /// Build every service from `config` and start the refresh worker.
    ///
    /// # Errors
    /// Fails when the runtime, the cache storage or the HTTP client cannot be created.
    pub fn init(config: &Config, host: Host) -> Result<Self, AppError> {
        Self::init_with_clock(config, host, Arc::new(SystemClock))
    }

    /// Like [`WidgetServices::init`] with an explicit clock.
    ///
    /// # Errors
    /// Same as [`WidgetServices::init`].
    pub fn init_with_clock(
        config: &Config,
        host: Host,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .thread_name("glance-worker")
            .build()?;

        let storage = open_storage(config)?;
        let staleness = seconds(config.weather.staleness_seconds);
        let cache = Arc::new(WeatherCache::new(storage, clock.clone()).with_staleness(staleness));

        let resolver = Arc::new(
            LocationResolver::new(cache.clone(), host.device, clock.clone())
                .with_validity(Duration::minutes(i64::from(config.weather.fix_validity_minutes))),
        );

        let settings = ProviderSettings {
            base_url: config.weather.base_url.clone(),
            connect_timeout: StdDuration::from_secs(config.weather.connect_timeout_secs),
            read_timeout: StdDuration::from_secs(config.weather.read_timeout_secs),
            product_name: config.weather.product_name.clone(),
        };
        let fetcher: Arc<dyn WeatherFetcher> = Arc::new(
            WeatherProvider::with_clock(settings, clock).map_err(RefreshError::Cache)?,
        );

        let coordinator = Arc::new(RefreshCoordinator::start(
            runtime.handle(),
            CoordinatorDeps {
                cache: cache.clone(),
                resolver,
                fetcher,
                publisher: host.publisher,
                acquisition: host.acquisition,
                render: RenderOptions {
                    product_name: config.weather.product_name.clone(),
                    staleness,
                },
            },
        ));

        tracing::info!("Widget services initialized ({:?} cache)", config.cache.backend);
        Ok(Self {
            runtime,
            cache,
            coordinator,
        })
    }

    /// Get the tokio runtime handle.
    pub fn runtime(&self) -> Handle {
        self.runtime.handle().clone()
    }

    pub fn coordinator(&self) -> Arc<RefreshCoordinator> {
        self.coordinator.clone()
    }

    pub fn cache(&self) -> Arc<WeatherCache> {
        self.cache.clone()
    }

    /// Stop the refresh worker and wait for it. Must not be called from
    /// inside the runtime.
    pub fn shutdown(&self) {
        tracing::info!("Widget services shutdown initiated");
        self.runtime.block_on(self.coordinator.shutdown());
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::from_std(StdDuration::from_secs(secs)).unwrap_or_else(|_| Duration::weeks(52))
}

fn open_storage(config: &Config) -> Result<Box<dyn CacheStorage>, AppError> {
    match config.cache.backend {
        CacheBackend::Memory => Ok(Box::new(MemoryStorage::new())),
        CacheBackend::Sqlite => {
            let path = config.cache_path();
            tracing::debug!("Opening widget cache at {}", path.display());
            let storage = SqliteStorage::new(&path).map_err(RefreshError::Cache)?;
            Ok(Box::new(storage))
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use glance_weather::NoDeviceLocator;

    use crate::services::{ChannelPublisher, InstanceId};

    struct Ignore;

    impl AcquisitionFlow for Ignore {
        fn request_acquisition(&self, _instance: InstanceId) {}
    }

    fn host() -> (Host, tokio::sync::mpsc::UnboundedReceiver<crate::services::WidgetUpdate>) {
        let (publisher, rx) = ChannelPublisher::channel();
        (
            Host {
                publisher: Arc::new(publisher),
                acquisition: Arc::new(Ignore),
                device: Arc::new(NoDeviceLocator),
            },
            rx,
        )
    }

    #[test]
    fn test_sqlite_backend_creates_cache_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            config_dir: dir.path().to_path_buf(),
            ..Config::default()
        };

        let (host, _rx) = host();
        let services = WidgetServices::init(&config, host).unwrap();
        assert!(config.cache_path().exists());
        services.shutdown();
    }

    #[test]
    fn test_refresh_without_location_publishes_prompt() {
        let mut config = Config::default();
        config.cache.backend = CacheBackend::Memory;

        let (host, mut rx) = host();
        let services = WidgetServices::init(&config, host).unwrap();
        let coordinator = services.coordinator();

        assert!(coordinator.request_refresh(InstanceId(7)));

        let deadline = std::time::Instant::now() + StdDuration::from_secs(5);
        while !coordinator.is_idle() && std::time::Instant::now() < deadline {
            std::thread::sleep(StdDuration::from_millis(5));
        }
        services.shutdown();

        let mut statuses = Vec::new();
        while let Ok(update) = rx.try_recv() {
            assert_eq!(update.instance, InstanceId(7));
            statuses.push(update.model.status_text);
        }
        assert_eq!(statuses, vec!["Updating…", "Open app to grant location"]);
    }
}
