//! `glance`: drive the widget backend from a terminal.
//!
//! Plays every host role at once: trigger source (startup and `--watch`
//! ticks), acquisition flow (`--lat/--lon`) and display surface (stdout).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;

use glance_core::{Config, ConfigError};
use glance_weather::{Coordinate, CoordinateSource, NoDeviceLocator};
use glance_widget::{
    AcquisitionFlow, DisplayModel, DisplayPublisher, Host, InstanceId, TapAction, WidgetServices,
};

#[derive(Debug, Parser)]
#[command(name = "glance", version, about = "Glanceable weather widget backend")]
struct Cli {
    /// Display instance to refresh; repeat for several.
    #[arg(long = "instance", value_name = "ID", default_value = "1")]
    instances: Vec<u32>,

    /// Latitude of an explicitly chosen location.
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    /// Longitude of an explicitly chosen location.
    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,

    /// Keep running and refresh every `weather.refresh_minutes`.
    #[arg(long)]
    watch: bool,

    /// Forget the saved location and cached snapshot first.
    #[arg(long)]
    relocate: bool,

    /// Config file to use instead of the default location.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Prints every published model.
struct StdoutDisplay;

impl DisplayPublisher for StdoutDisplay {
    fn publish(&self, instance: InstanceId, model: DisplayModel) {
        let tap = match model.on_tap {
            TapAction::TriggerRefresh => "refresh",
            TapAction::OpenAcquisitionFlow => "set location",
        };
        let age = if model.age_label.is_empty() {
            String::new()
        } else {
            format!(" · {}", model.age_label)
        };

        println!("[{instance}] {} | {}", model.quip, model.temperature_label);
        println!(
            "     Prec {} ({}) | Hum {} ({}) | UV {} ({})",
            model.precipitation_text,
            model.precip_color,
            model.humidity_text,
            model.humidity_color,
            model.uv_text,
            model.uv_color,
        );
        println!("     {}{} [tap: {tap}]", model.status_text, age);
    }
}

/// Without a GUI the only way to grant a location is the command line.
struct CommandLineAcquisition;

impl AcquisitionFlow for CommandLineAcquisition {
    fn request_acquisition(&self, instance: InstanceId) {
        tracing::warn!(
            "{}: no location available; rerun with --lat <LAT> --lon <LON>",
            instance
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    glance_core::init()?;

    let loaded = match &cli.config {
        Some(path) => Config::load_validated_from(path),
        None => Config::load_validated(),
    };
    let (config, _warnings) = loaded.inspect_err(|e| {
        if let Some(config_error) = e.downcast_ref::<ConfigError>() {
            tracing::error!("{}", config_error.user_message());
        }
    })?;

    let services = WidgetServices::init(
        &config,
        Host {
            publisher: Arc::new(StdoutDisplay),
            acquisition: Arc::new(CommandLineAcquisition),
            device: Arc::new(NoDeviceLocator),
        },
    )
    .context("Failed to start widget services")?;
    let coordinator = services.coordinator();

    if cli.relocate {
        coordinator
            .force_relocate()
            .context("Failed to clear saved location")?;
    }

    if let (Some(lat), Some(lon)) = (cli.lat, cli.lon) {
        let coordinate = Coordinate::new(lat, lon, Utc::now(), CoordinateSource::ExplicitUserSet);
        coordinator
            .on_coordinate_acquired(coordinate)
            .context("Failed to save location")?;
    }

    for id in &cli.instances {
        coordinator.request_refresh(InstanceId(*id));
    }

    let handle = services.runtime();
    let refresh_minutes = config.weather.refresh_minutes;

    if cli.watch && refresh_minutes > 0 {
        let period = Duration::from_secs(u64::from(refresh_minutes) * 60);
        tracing::info!("Refreshing every {} minutes; Ctrl-C to stop", refresh_minutes);

        handle.block_on(async {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately; startup already refreshed.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    _ = ticker.tick() => {
                        let queued = coordinator.refresh_all();
                        tracing::debug!("Periodic tick queued {} refreshes", queued);
                    }
                }
            }
        });
    } else {
        if cli.watch {
            tracing::warn!("Periodic refresh is disabled (weather.refresh_minutes = 0)");
        }
        handle.block_on(async {
            while !coordinator.is_idle() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });
    }

    services.shutdown();
    Ok(())
}
