//! Mount/teardown of a scroll-linked frame sequence.
//!
//! Three tasks run per mounted sequence: the loader (one per catalog), the
//! surface manager, and the render loop. They share nothing but channels and
//! the lock-free frame descriptors.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Configuration;
use crate::events::{FrameSettled, RenderReport, Resized};
use crate::frames::{CatalogSpec, FrameSet, Readiness};
use crate::tasks::loader::{self, FrameSource};
use crate::tasks::renderer::{self, RenderInputs, Scene};
use crate::tasks::surface::{self, SurfaceGeometry, Viewport};

const RESIZE_QUEUE: usize = 8;

struct LoaderRun {
    cancel: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

impl LoaderRun {
    async fn stop(self) {
        self.cancel.cancel();
        match self.handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("loader error: {e:?}"),
            Err(e) => error!("loader join error: {e}"),
        }
    }
}

/// A mounted sequence. Dropping it without [`ScrollSequence::teardown`]
/// leaves the tasks running until the runtime shuts down.
pub struct ScrollSequence {
    cfg: Configuration,
    source: Arc<dyn FrameSource>,
    cancel: CancellationToken,
    tasks: JoinSet<Result<()>>,
    loader: Option<LoaderRun>,
    scene_tx: watch::Sender<Scene>,
    settled_tx: mpsc::Sender<FrameSettled>,
    readiness_tx: watch::Sender<Readiness>,
    reports_rx: watch::Receiver<Option<RenderReport>>,
    geometry_rx: watch::Receiver<SurfaceGeometry>,
    resize_tx: mpsc::Sender<Resized>,
    settle_tx: watch::Sender<Duration>,
}

impl ScrollSequence {
    /// Builds the catalog and starts preloading, surface tracking and
    /// rendering. Must be called from within a tokio runtime.
    pub fn mount(
        cfg: Configuration,
        source: Arc<dyn FrameSource>,
        viewport: Arc<dyn Viewport>,
        progress: watch::Receiver<f32>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let frames = FrameSet::catalog(&cfg.catalog());

        let (scene_tx, scene_rx) = watch::channel(Scene {
            frames: frames.clone(),
            settings: cfg.compositor(),
            paint_interval: cfg.paint_interval,
        });
        let (settled_tx, settled_rx) = mpsc::channel::<FrameSettled>(frames.len().max(1)); // Loader -> Renderer
        let (readiness_tx, _) = watch::channel(frames.readiness()); // Loader -> host
        let (geometry_tx, geometry_rx) = watch::channel(SurfaceGeometry::default()); // Surface -> Renderer
        let (reports_tx, reports_rx) = watch::channel(None); // Renderer -> host
        let (resize_tx, resize_rx) = mpsc::channel::<Resized>(RESIZE_QUEUE); // host -> Surface
        let (settle_tx, settle_rx) = watch::channel(cfg.resize_settle); // host -> Surface

        let mut tasks = JoinSet::new();

        // Surface manager
        tasks.spawn({
            let cancel = cancel.clone();
            async move {
                surface::run(viewport, resize_rx, geometry_tx, cancel, settle_rx)
                    .await
                    .context("surface task failed")
            }
        });

        // Render loop
        tasks.spawn({
            let inputs = RenderInputs {
                scene: scene_rx,
                progress,
                geometry: geometry_rx.clone(),
                settled: settled_rx,
            };
            let cancel = cancel.clone();
            async move {
                renderer::run(inputs, reports_tx, cancel)
                    .await
                    .context("render task failed")
            }
        });

        let mut sequence = Self {
            cfg,
            source,
            cancel,
            tasks,
            loader: None,
            scene_tx,
            settled_tx,
            readiness_tx,
            reports_rx,
            geometry_rx,
            resize_tx,
            settle_tx,
        };
        sequence.loader = Some(sequence.spawn_loader(frames));
        info!(
            frames = sequence.cfg.frame_count,
            path = %sequence.cfg.path,
            "sequence mounted"
        );
        sequence
    }

    fn spawn_loader(&self, frames: FrameSet) -> LoaderRun {
        let cancel = self.cancel.child_token();
        let handle = tokio::spawn({
            let source = Arc::clone(&self.source);
            let settled_tx = self.settled_tx.clone();
            let readiness_tx = self.readiness_tx.clone();
            let cancel = cancel.clone();
            let max_in_flight = self.cfg.loader_max_concurrent_decodes;
            async move {
                loader::run(
                    frames,
                    source,
                    settled_tx,
                    readiness_tx,
                    cancel,
                    max_in_flight,
                )
                .await
                .context("loader task failed")
            }
        });
        LoaderRun { cancel, handle }
    }

    pub fn config(&self) -> &Configuration {
        &self.cfg
    }

    /// Current frame catalog.
    pub fn frames(&self) -> FrameSet {
        self.scene_tx.borrow().frames.clone()
    }

    /// Preload progress; `is_ready()` flips once every frame has settled.
    pub fn readiness(&self) -> watch::Receiver<Readiness> {
        self.readiness_tx.subscribe()
    }

    /// Resolves once every frame of the current catalog has settled,
    /// immediately if that has already happened.
    pub async fn wait_ready(&self) -> Readiness {
        let total = self.frames().len();
        let mut rx = self.readiness_tx.subscribe();
        let settled = rx
            .wait_for(|r| r.total == total && r.is_ready())
            .await
            .map(|r| *r);
        settled.unwrap_or_else(|_| *rx.borrow())
    }

    /// One report per render attempt, newest only.
    pub fn reports(&self) -> watch::Receiver<Option<RenderReport>> {
        self.reports_rx.clone()
    }

    pub fn geometry(&self) -> watch::Receiver<SurfaceGeometry> {
        self.geometry_rx.clone()
    }

    /// Tells the surface manager the element may have changed size. Notices
    /// beyond a small backlog are dropped; one pending measurement covers them.
    pub fn notify_resize(&self) {
        if self.resize_tx.try_send(Resized).is_err() {
            debug!("resize notice dropped; measurement already queued");
        }
    }

    /// Applies a new configuration. Returns whether the catalog was rebuilt.
    ///
    /// A changed catalog (count, path, extension, digits, stride) discards
    /// the current frames and preloads a fresh set; otherwise the loaded
    /// frames are kept. Compositor settings, paint interval and resize settle
    /// delay reach the running tasks either way. The decode limit only applies
    /// to the next preload.
    pub async fn reconfigure(&mut self, cfg: Configuration) -> bool {
        let rebuild = catalog_changed(&self.cfg.catalog(), &cfg.catalog());
        let decodes_changed =
            self.cfg.loader_max_concurrent_decodes != cfg.loader_max_concurrent_decodes;
        self.cfg = cfg;
        self.settle_tx.send_replace(self.cfg.resize_settle);

        if rebuild {
            if let Some(run) = self.loader.take() {
                run.stop().await;
            }
            let frames = FrameSet::catalog(&self.cfg.catalog());
            self.readiness_tx.send_replace(frames.readiness());
            self.scene_tx.send_replace(Scene {
                frames: frames.clone(),
                settings: self.cfg.compositor(),
                paint_interval: self.cfg.paint_interval,
            });
            self.loader = Some(self.spawn_loader(frames));
            info!(frames = self.cfg.frame_count, "frame catalog rebuilt");
        } else {
            let settings = self.cfg.compositor();
            let paint_interval = self.cfg.paint_interval;
            self.scene_tx.send_modify(|scene| {
                scene.settings = settings;
                scene.paint_interval = paint_interval;
            });
            if decodes_changed && !self.readiness_tx.borrow().is_ready() {
                warn!(
                    max_in_flight = self.cfg.loader_max_concurrent_decodes,
                    "decode limit applies from the next preload; the running one keeps its limit"
                );
            }
            debug!(?settings, "sequence settings updated");
        }
        rebuild
    }

    /// Stops reacting to loads, resizes and scroll updates and waits for the
    /// tasks to wind down. In-flight decodes are not aborted.
    pub async fn teardown(mut self) {
        self.cancel.cancel();
        if let Some(run) = self.loader.take() {
            run.stop().await;
        }
        while let Some(res) = self.tasks.join_next().await {
            match res {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("task error: {e:?}"),
                Err(e) => error!("join error: {e}"),
            }
        }
        debug!("sequence torn down");
    }
}

fn catalog_changed(current: &CatalogSpec, next: &CatalogSpec) -> bool {
    current != next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_catalog_fields_force_a_rebuild() {
        let base = Configuration::default();

        let mut zoomed = base.clone();
        zoomed.zoom = 1.3;
        zoomed.chroma_threshold = 10;
        zoomed.paint_interval = Duration::from_millis(33);
        assert!(!catalog_changed(&base.catalog(), &zoomed.catalog()));

        let edits: [fn(&mut Configuration); 5] = [
            |c| c.frame_count += 1,
            |c| c.path.push('x'),
            |c| c.extension = ".png".into(),
            |c| c.digits += 1,
            |c| c.frame_stride = 2,
        ];
        for edit in edits {
            let mut next = base.clone();
            edit(&mut next);
            assert!(catalog_changed(&base.catalog(), &next.catalog()));
        }
    }
}
