pub mod display_model;

pub use display_model::{render, DisplayModel, Phase, RenderOptions, TapAction};
