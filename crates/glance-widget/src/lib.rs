//! Widget backend: refresh coordination and display mapping for Glance.

pub mod app_services;
pub mod colors;
mod error_mapping;
pub mod models;
pub mod services;

pub use app_services::{Host, WidgetServices};
pub use colors::Rgb;
pub use models::{render, DisplayModel, Phase, RenderOptions, TapAction};
pub use services::{
    AcquisitionFlow, ChannelPublisher, CoordinatorDeps, DisplayPublisher, InstanceId,
    RefreshCoordinator, RefreshError, WidgetController, WidgetUpdate,
};
