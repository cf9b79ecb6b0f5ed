use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::{mpsc::Receiver, watch};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::events::{FrameSettled, RenderReport};
use crate::frames::FrameSet;
use crate::processing::composite::{
    Compositor, CompositorSettings, RenderOutcome, SkipReason, Surface,
};
use crate::processing::mapping::map_progress_to_frame;
use crate::tasks::surface::SurfaceGeometry;

/// What gets drawn: the current catalog, how to composite it and how often.
/// Swapped as a whole when the sequence is reconfigured.
#[derive(Debug, Clone)]
pub struct Scene {
    pub frames: FrameSet,
    pub settings: CompositorSettings,
    pub paint_interval: Duration,
}

/// Inputs of the render loop.
pub struct RenderInputs {
    pub scene: watch::Receiver<Scene>,
    pub progress: watch::Receiver<f32>,
    pub geometry: watch::Receiver<SurfaceGeometry>,
    pub settled: Receiver<FrameSettled>,
}

/// Single render entry point for the sequence.
///
/// Scroll, geometry and scene changes only mark the state dirty; at most one
/// render happens per paint tick and it always reads the newest progress and
/// geometry, so a superseded index is never drawn. A frame finishing its load
/// marks the state dirty only when it is the frame currently requested.
pub async fn run(
    inputs: RenderInputs,
    reports_tx: watch::Sender<Option<RenderReport>>,
    cancel: CancellationToken,
) -> Result<()> {
    let RenderInputs {
        mut scene,
        mut progress,
        mut geometry,
        mut settled,
    } = inputs;

    let (settings, mut paint_interval) = {
        let current = scene.borrow();
        (current.settings, current.paint_interval)
    };
    let mut compositor = Compositor::new(settings);
    let mut surface = Surface::default();
    let mut ticker = paint_ticker(paint_interval);

    let mut dirty = true;
    let mut generation: u64 = 0;
    let (mut progress_open, mut geometry_open, mut scene_open, mut settled_open) =
        (true, true, true, true);

    loop {
        select! {
            _ = cancel.cancelled() => break,

            changed = progress.changed(), if progress_open => {
                if changed.is_ok() {
                    dirty = true;
                } else {
                    debug!("scroll source closed");
                    progress_open = false;
                }
            }

            changed = geometry.changed(), if geometry_open => {
                if changed.is_ok() {
                    dirty = true;
                } else {
                    geometry_open = false;
                }
            }

            changed = scene.changed(), if scene_open => {
                if changed.is_ok() {
                    let (settings, next_interval) = {
                        let current = scene.borrow_and_update();
                        (current.settings, current.paint_interval)
                    };
                    compositor.set_settings(settings);
                    if next_interval != paint_interval {
                        debug!(
                            from = %humantime::format_duration(paint_interval),
                            to = %humantime::format_duration(next_interval),
                            "paint interval changed"
                        );
                        paint_interval = next_interval;
                        ticker = paint_ticker(paint_interval);
                    }
                    dirty = true;
                } else {
                    scene_open = false;
                }
            }

            ev = settled.recv(), if settled_open => {
                match ev {
                    Some(FrameSettled { index, loaded: true }) => {
                        let frame_count = scene.borrow().frames.len();
                        if index == map_progress_to_frame(*progress.borrow(), frame_count) {
                            trace!(index, "requested frame arrived");
                            dirty = true;
                        }
                    }
                    Some(_) => {}
                    None => settled_open = false,
                }
            }

            _ = ticker.tick(), if dirty => {
                dirty = false;
                generation += 1;
                let report = render_once(
                    &mut compositor,
                    &mut surface,
                    &scene,
                    &progress,
                    &geometry,
                    generation,
                );
                reports_tx.send_replace(Some(report));
            }
        }
    }
    Ok(())
}

fn paint_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

fn render_once(
    compositor: &mut Compositor,
    surface: &mut Surface,
    scene: &watch::Receiver<Scene>,
    progress: &watch::Receiver<f32>,
    geometry: &watch::Receiver<SurfaceGeometry>,
    generation: u64,
) -> RenderReport {
    let frames = scene.borrow().frames.clone();
    let geometry = *geometry.borrow();
    let requested = map_progress_to_frame(*progress.borrow(), frames.len());

    let outcome = match compositor.render(requested, &frames, &geometry, surface) {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!(index = requested, "render skipped: {err}");
            RenderOutcome::Skipped(SkipReason::PixelAccess)
        }
    };
    trace!(generation, requested, ?outcome, "render pass");

    RenderReport {
        generation,
        requested,
        outcome,
        geometry,
        surface: surface.snapshot(),
    }
}
