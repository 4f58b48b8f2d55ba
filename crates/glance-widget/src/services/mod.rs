pub mod refresh_service;

pub use refresh_service::{
    AcquisitionFlow, ChannelPublisher, CoordinatorDeps, DisplayPublisher, InstanceId,
    RefreshCoordinator, RefreshError, WidgetController, WidgetUpdate,
};
