use std::sync::Arc;

use image::RgbaImage;

use crate::processing::composite::RenderOutcome;
use crate::tasks::surface::SurfaceGeometry;

/// The observed element may have changed size. Carries no payload; the
/// surface manager measures the viewport itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resized;

/// Emitted by the loader once a frame's fetch has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSettled {
    pub index: usize,
    pub loaded: bool,
}

/// Published by the render loop after every render attempt.
#[derive(Debug, Clone)]
pub struct RenderReport {
    /// Increments on every attempt, skipped or not.
    pub generation: u64,
    /// Frame index the scroll position mapped to.
    pub requested: usize,
    pub outcome: RenderOutcome,
    pub geometry: SurfaceGeometry,
    /// Surface contents after the attempt.
    pub surface: Arc<RgbaImage>,
}
