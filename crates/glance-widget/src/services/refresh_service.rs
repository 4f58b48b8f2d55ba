//! Refresh coordinator: single-flight refreshes on one background worker.
//!
//! `request_refresh` never waits on the network. It publishes whatever the
//! cache holds, takes a ticket for the instance and queues it. A single
//! worker drains the queue in order: resolve location, fetch, update the
//! cache, publish. A ticket is retired when its job ends, however it ends.
//!
//! Relocations go through the same queue, so every cache write happens on
//! the worker and a fetch for the old position always lands before the
//! clear that drops it.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use glance_core::AppError;
use glance_weather::{
    CacheRecord, CacheStatus, Coordinate, CoordinateSource, FetchErrorKind, LocationResolver,
    SavedCoordinateSource, WeatherCache, WeatherError, WeatherFetcher,
};

use crate::models::{render, DisplayModel, Phase, RenderOptions};

/// Coordinates further apart than this (on either axis) invalidate the cache
pub const RELOCATION_DEGREES: f64 = 1.0;

/// Identity of one display instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Error type for refresh operations
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("no location fix available")]
    NoCoordinate,
    #[error("fetch failed: {0}")]
    Fetch(FetchErrorKind),
    #[error("cache error: {0}")]
    Cache(#[from] WeatherError),
    #[error("refresh worker stopped")]
    Stopped,
}

/// Where rendered models go.
pub trait DisplayPublisher: Send + Sync {
    fn publish(&self, instance: InstanceId, model: DisplayModel);
}

/// The permission-gated flow that obtains a coordinate from the user.
///
/// Once it has one it should call [`WidgetController::on_coordinate_acquired`]
/// and then [`WidgetController::refresh_all`].
pub trait AcquisitionFlow: Send + Sync {
    fn request_acquisition(&self, instance: InstanceId);
}

/// What trigger sources and acquisition flows may call.
pub trait WidgetController: Send + Sync {
    /// Returns false when the trigger was coalesced into an in-flight refresh.
    fn request_refresh(&self, instance: InstanceId) -> bool;

    /// Refresh every instance seen so far; returns how many were queued.
    fn refresh_all(&self) -> usize;

    fn on_coordinate_acquired(&self, coordinate: Coordinate) -> Result<(), RefreshError>;
}

/// A rendered model for one instance
#[derive(Debug, Clone)]
pub struct WidgetUpdate {
    pub instance: InstanceId,
    pub model: DisplayModel,
}

/// Publishes onto an mpsc channel for a display loop to consume.
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<WidgetUpdate>,
}

impl ChannelPublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WidgetUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DisplayPublisher for ChannelPublisher {
    fn publish(&self, instance: InstanceId, model: DisplayModel) {
        if self.tx.send(WidgetUpdate { instance, model }).is_err() {
            tracing::debug!("Display for {} is gone; dropping update", instance);
        }
    }
}

/// Everything the coordinator drives
pub struct CoordinatorDeps {
    pub cache: Arc<WeatherCache>,
    pub resolver: Arc<LocationResolver>,
    pub fetcher: Arc<dyn WeatherFetcher>,
    pub publisher: Arc<dyn DisplayPublisher>,
    pub acquisition: Arc<dyn AcquisitionFlow>,
    pub render: RenderOptions,
}

/// Work for the single worker, run in queue order.
#[derive(Debug, Clone, Copy)]
enum Job {
    Refresh(InstanceId),
    Relocate(Coordinate),
    ForgetLocation,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Refresh(instance) => write!(f, "refresh for {instance}"),
            Job::Relocate(_) => f.write_str("relocation"),
            Job::ForgetLocation => f.write_str("forced relocation"),
        }
    }
}

struct Shared {
    deps: CoordinatorDeps,
    tickets: Mutex<HashSet<InstanceId>>,
    known: Mutex<BTreeSet<InstanceId>>,
    /// Jobs sent to the worker and not yet finished
    pending: AtomicUsize,
    /// Outcome of the last location lookup, for the tap action of immediate publishes
    located: AtomicBool,
}

impl Shared {
    fn publish(&self, instance: InstanceId, record: &CacheRecord, phase: Phase) {
        let age = self.deps.cache.age_of(record);
        let model = render(record, age, phase, &self.deps.render);
        self.deps.publisher.publish(instance, model);
    }

    fn retire(&self, instance: InstanceId) {
        self.tickets.lock().remove(&instance);
    }

    fn finish(&self, job: Job) {
        if let Job::Refresh(instance) = job {
            self.retire(instance);
        }
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Retires its ticket on drop.
struct TicketGuard {
    shared: Arc<Shared>,
    instance: InstanceId,
}

impl Drop for TicketGuard {
    fn drop(&mut self) {
        self.shared.retire(self.instance);
    }
}

pub struct RefreshCoordinator {
    shared: Arc<Shared>,
    queue: mpsc::UnboundedSender<Job>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshCoordinator {
    /// Spawn the worker on `handle` and return the coordinator.
    pub fn start(handle: &Handle, deps: CoordinatorDeps) -> Self {
        let located = deps.cache.saved_coordinate().is_some();
        let shared = Arc::new(Shared {
            deps,
            tickets: Mutex::new(HashSet::new()),
            known: Mutex::new(BTreeSet::new()),
            pending: AtomicUsize::new(0),
            located: AtomicBool::new(located),
        });
        let (queue, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let worker = handle.spawn(run_worker(shared.clone(), rx, cancel.clone()));
        tracing::info!("Refresh worker started");

        Self {
            shared,
            queue,
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Publish cached state now and queue a refresh, unless one is in flight.
    pub fn request_refresh(&self, instance: InstanceId) -> bool {
        if self.cancel.is_cancelled() {
            tracing::warn!("Refresh worker stopped; ignoring refresh for {}", instance);
            return false;
        }
        self.shared.known.lock().insert(instance);

        if !self.shared.tickets.lock().insert(instance) {
            tracing::debug!("Refresh for {} already in flight; coalesced", instance);
            return false;
        }

        let record = self.shared.deps.cache.load();
        let located = self.shared.located.load(Ordering::SeqCst);
        self.shared.publish(instance, &record, Phase::Refreshing { located });

        if !self.submit(Job::Refresh(instance)) {
            tracing::warn!("Refresh worker stopped; dropping refresh for {}", instance);
            self.shared.retire(instance);
            return false;
        }
        true
    }

    fn submit(&self, job: Job) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if self.queue.send(job).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub fn refresh_all(&self) -> usize {
        let instances: Vec<InstanceId> = self.shared.known.lock().iter().copied().collect();
        instances
            .into_iter()
            .filter(|&instance| self.request_refresh(instance))
            .count()
    }

    /// Queue saving a coordinate obtained by the acquisition flow.
    ///
    /// The save runs on the worker after any refresh already queued. Moving
    /// more than [`RELOCATION_DEGREES`] from the saved coordinate drops the
    /// cached snapshot first.
    pub fn on_coordinate_acquired(&self, coordinate: Coordinate) -> Result<(), RefreshError> {
        if coordinate.is_absent() {
            return Err(RefreshError::NoCoordinate);
        }
        let coordinate = Coordinate {
            source: CoordinateSource::ExplicitUserSet,
            ..coordinate
        };

        if !self.submit(Job::Relocate(coordinate)) {
            return Err(RefreshError::Stopped);
        }
        Ok(())
    }

    /// Queue forgetting the saved coordinate and its snapshot.
    pub fn force_relocate(&self) -> Result<(), RefreshError> {
        if !self.submit(Job::ForgetLocation) {
            return Err(RefreshError::Stopped);
        }
        Ok(())
    }

    pub fn in_flight(&self, instance: InstanceId) -> bool {
        self.shared.tickets.lock().contains(&instance)
    }

    /// No refresh in flight and no relocation waiting.
    pub fn is_idle(&self) -> bool {
        self.shared.pending.load(Ordering::SeqCst) == 0 && self.shared.tickets.lock().is_empty()
    }

    pub fn known_instances(&self) -> Vec<InstanceId> {
        self.shared.known.lock().iter().copied().collect()
    }

    /// Stop the worker. A job already running finishes; queued ones are dropped.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!("Refresh worker ended abnormally: {}", e);
            }
        }
        tracing::info!("Refresh worker stopped");
    }
}

impl WidgetController for RefreshCoordinator {
    fn request_refresh(&self, instance: InstanceId) -> bool {
        RefreshCoordinator::request_refresh(self, instance)
    }

    fn refresh_all(&self) -> usize {
        RefreshCoordinator::refresh_all(self)
    }

    fn on_coordinate_acquired(&self, coordinate: Coordinate) -> Result<(), RefreshError> {
        RefreshCoordinator::on_coordinate_acquired(self, coordinate)
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Job>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(job) => job,
                None => break,
            },
        };

        let ticket = match job {
            Job::Refresh(instance) => Some(TicketGuard {
                shared: shared.clone(),
                instance,
            }),
            Job::Relocate(_) | Job::ForgetLocation => None,
        };

        // Run each job as its own task so a panic ends the job, not the worker.
        let task = tokio::spawn(run_job(shared.clone(), job));
        if let Err(e) = task.await {
            tracing::error!("{} aborted: {}", job, e);
        }
        drop(ticket);
        shared.pending.fetch_sub(1, Ordering::SeqCst);
    }

    rx.close();
    while let Ok(job) = rx.try_recv() {
        tracing::debug!("Dropping queued {}", job);
        shared.finish(job);
    }
}

async fn run_job(shared: Arc<Shared>, job: Job) {
    match job {
        Job::Refresh(instance) => process(shared, instance).await,
        Job::Relocate(coordinate) => relocate(&shared, coordinate),
        Job::ForgetLocation => forget_location(&shared),
    }
}

fn relocate(shared: &Shared, coordinate: Coordinate) {
    let cache = &shared.deps.cache;
    if let Some(previous) = cache.saved_coordinate() {
        if previous.is_far_from(&coordinate, RELOCATION_DEGREES) {
            tracing::info!("Location moved; dropping snapshot for the old position");
            if let Err(e) = cache.clear() {
                tracing::warn!(
                    "Failed to clear cache before relocating: {}",
                    AppError::from(RefreshError::Cache(e))
                );
                return;
            }
        }
    }

    match cache.save_coordinate(&coordinate) {
        Ok(()) => {
            shared.located.store(true, Ordering::SeqCst);
            tracing::info!(
                "Saved coordinate ({}, {})",
                coordinate.latitude,
                coordinate.longitude
            );
        }
        Err(e) => tracing::warn!(
            "Failed to save coordinate: {}",
            AppError::from(RefreshError::Cache(e))
        ),
    }
}

fn forget_location(shared: &Shared) {
    match shared.deps.cache.clear() {
        Ok(()) => {
            shared.located.store(false, Ordering::SeqCst);
            tracing::info!("Forgot saved location and snapshot");
        }
        Err(e) => tracing::warn!(
            "Failed to forget saved location: {}",
            AppError::from(RefreshError::Cache(e))
        ),
    }
}

async fn process(shared: Arc<Shared>, instance: InstanceId) {
    let deps = &shared.deps;

    let resolved = deps.resolver.resolve();
    shared.located.store(resolved.is_some(), Ordering::SeqCst);
    let Some(coordinate) = resolved else {
        tracing::info!("{}: no location fix; asking for one", instance);
        shared.publish(instance, &deps.cache.load(), Phase::NeedsLocation);
        deps.acquisition.request_acquisition(instance);
        return;
    };

    match deps.fetcher.fetch(&coordinate).await {
        Ok(snapshot) => {
            let record = match deps.cache.store(&snapshot) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(
                        "{}: failed to cache snapshot: {}",
                        instance,
                        AppError::from(RefreshError::Cache(e))
                    );
                    let fetched_at = snapshot.fetched_at;
                    CacheRecord::fresh(snapshot, fetched_at)
                }
            };
            shared.publish(instance, &record, Phase::Published);
        }
        Err(kind) => {
            let err = AppError::from(RefreshError::Fetch(kind));
            tracing::warn!("{}: refresh failed: {} ({})", instance, err, err.user_message());

            if let Err(e) = deps.cache.mark_error(kind) {
                tracing::warn!("{}: failed to record fetch error: {}", instance, e);
            }
            let mut record = deps.cache.load();
            record.status = CacheStatus::Error(kind);
            shared.publish(instance, &record, Phase::Published);
        }
    }
}
