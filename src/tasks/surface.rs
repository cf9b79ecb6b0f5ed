use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::{mpsc::Receiver, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::Resized;

/// On-screen size of the observed element plus the display density.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementMetrics {
    pub css_width: f32,
    pub css_height: f32,
    pub device_pixel_ratio: f32,
}

/// Layout size and the matching native-density backing resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SurfaceGeometry {
    pub css_width: f32,
    pub css_height: f32,
    pub device_pixel_ratio: f32,
    pub backing_width: u32,
    pub backing_height: u32,
}

impl SurfaceGeometry {
    /// Backing size is `css * ratio`, rounded to whole pixels. Unusable ratios
    /// fall back to 1.0 and unusable sizes to 0.
    pub fn from_metrics(metrics: ElementMetrics) -> Self {
        let ratio = if metrics.device_pixel_ratio.is_finite() && metrics.device_pixel_ratio > 0.0 {
            metrics.device_pixel_ratio
        } else {
            1.0
        };
        let css_width = sanitize_extent(metrics.css_width);
        let css_height = sanitize_extent(metrics.css_height);
        Self {
            css_width,
            css_height,
            device_pixel_ratio: ratio,
            backing_width: (css_width * ratio).round() as u32,
            backing_height: (css_height * ratio).round() as u32,
        }
    }

    pub fn is_drawable(&self) -> bool {
        self.backing_width > 0 && self.backing_height > 0
    }
}

fn sanitize_extent(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Reads the observed element's current metrics.
pub trait Viewport: Send + Sync + 'static {
    /// `None` when the size cannot be determined right now.
    fn measure(&self) -> Option<ElementMetrics>;
}

/// Viewport whose metrics are pushed in by the host.
#[derive(Debug, Clone, Default)]
pub struct SharedViewport {
    metrics: Arc<Mutex<Option<ElementMetrics>>>,
}

impl SharedViewport {
    pub fn new(metrics: Option<ElementMetrics>) -> Self {
        Self {
            metrics: Arc::new(Mutex::new(metrics)),
        }
    }

    pub fn set(&self, metrics: Option<ElementMetrics>) {
        *self.metrics.lock().unwrap_or_else(PoisonError::into_inner) = metrics;
    }
}

impl Viewport for SharedViewport {
    fn measure(&self) -> Option<ElementMetrics> {
        *self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps the published geometry in step with the viewport.
///
/// Measures on start, on every resize notice, and once more after each of
/// those, delayed by the current value of `settle`. Every successful
/// measurement is published, which makes the renderer redraw at the current
/// frame.
pub async fn run(
    viewport: Arc<dyn Viewport>,
    mut resize_rx: Receiver<Resized>,
    geometry_tx: watch::Sender<SurfaceGeometry>,
    cancel: CancellationToken,
    settle: watch::Receiver<Duration>,
) -> Result<()> {
    measure_and_publish(viewport.as_ref(), &geometry_tx);
    let mut settle_at = Some(Instant::now() + *settle.borrow());
    let mut notices_open = true;

    loop {
        let deadline = settle_at.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
        select! {
            _ = cancel.cancelled() => break,

            notice = resize_rx.recv(), if notices_open => {
                match notice {
                    Some(Resized) => {
                        measure_and_publish(viewport.as_ref(), &geometry_tx);
                        settle_at = Some(Instant::now() + *settle.borrow());
                    }
                    None => {
                        debug!("resize notices closed");
                        notices_open = false;
                    }
                }
            }

            _ = sleep_until(deadline), if settle_at.is_some() => {
                settle_at = None;
                measure_and_publish(viewport.as_ref(), &geometry_tx);
            }
        }
    }
    Ok(())
}

fn measure_and_publish(viewport: &dyn Viewport, geometry_tx: &watch::Sender<SurfaceGeometry>) {
    let Some(metrics) = viewport.measure() else {
        warn!("element size unavailable; keeping current surface geometry");
        return;
    };
    let geometry = SurfaceGeometry::from_metrics(metrics);
    let previous = geometry_tx.send_replace(geometry);
    if previous.backing_width != geometry.backing_width
        || previous.backing_height != geometry.backing_height
    {
        info!(
            css_width = geometry.css_width,
            css_height = geometry.css_height,
            ratio = geometry.device_pixel_ratio,
            width = geometry.backing_width,
            height = geometry.backing_height,
            "surface resized",
        );
    }
    if !geometry.is_drawable() {
        debug!("surface has zero area; renders will be skipped");
    }
}
