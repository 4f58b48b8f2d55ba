//! Maps widget-side errors to glance_core::AppError for consistent user-facing messages.

mod weather;
