use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use image::{ImageReader, RgbaImage};
use tokio::select;
use tokio::sync::{Semaphore, mpsc::Sender, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LoadError;
use crate::events::FrameSettled;
use crate::frames::{FrameSet, Readiness};

/// Turns a frame URI into a decoded raster. Called from the blocking pool.
pub trait FrameSource: Send + Sync + 'static {
    fn fetch(&self, uri: &str) -> Result<RgbaImage, LoadError>;
}

/// Reads frames from the local filesystem. URIs are paths, optionally with a
/// `file://` prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFrameSource;

impl FrameSource for FsFrameSource {
    fn fetch(&self, uri: &str) -> Result<RgbaImage, LoadError> {
        let path = Path::new(uri.strip_prefix("file://").unwrap_or(uri));
        let io_err = |source| LoadError::Io {
            uri: uri.to_owned(),
            source,
        };
        let img = ImageReader::open(path)
            .map_err(io_err)?
            .with_guessed_format() // sniff based on content, not extension
            .map_err(io_err)?
            .decode()
            .map_err(|source| LoadError::Decode {
                uri: uri.to_owned(),
                source,
            })?
            .to_rgba8();
        if img.width() == 0 || img.height() == 0 {
            return Err(LoadError::Empty {
                uri: uri.to_owned(),
            });
        }
        Ok(img)
    }
}

/// Preloads every frame of `frames`.
///
/// All fetches are issued at once; `max_in_flight` only bounds how many
/// decodes occupy the blocking pool. Completions settle their own descriptor
/// in arrival order, notify the renderer and republish readiness. Failures
/// are final. On cancel the task stops listening; in-flight decodes are left
/// to finish on their own.
pub async fn run(
    frames: FrameSet,
    source: Arc<dyn FrameSource>,
    settled_tx: Sender<FrameSettled>,
    readiness_tx: watch::Sender<Readiness>,
    cancel: CancellationToken,
    max_in_flight: usize,
) -> Result<()> {
    let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let mut tasks: JoinSet<(usize, Result<RgbaImage, LoadError>)> = JoinSet::new();

    for frame in frames.iter() {
        let index = frame.index();
        let uri = frame.uri().to_owned();
        let source = Arc::clone(&source);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let res = tokio::task::spawn_blocking(move || source.fetch(&uri)).await;
            let res = res.unwrap_or_else(|err| {
                Err(LoadError::Join {
                    index,
                    reason: err.to_string(),
                })
            });
            (index, res)
        });
    }
    readiness_tx.send_replace(frames.readiness());
    debug!(frames = frames.len(), max_in_flight, "frame preload started");

    loop {
        select! {
            _ = cancel.cancelled() => {
                debug!(pending = frames.readiness().pending(), "loader cancelled");
                tasks.detach_all();
                break;
            },

            joined = tasks.join_next() => {
                let Some(joined) = joined else {
                    break;
                };
                match joined {
                    Ok((index, res)) => settle(&frames, index, res, &settled_tx, &readiness_tx).await,
                    Err(err) => warn!("frame task failed: {err}"),
                }
            }
        }
    }

    let readiness = frames.readiness();
    if readiness.is_ready() {
        if readiness.is_offline() {
            warn!(
                total = readiness.total,
                "failed to load every frame; surface will stay blank"
            );
        } else {
            info!(
                loaded = readiness.loaded,
                failed = readiness.failed,
                total = readiness.total,
                "frame preload complete"
            );
        }
    }
    Ok(())
}

async fn settle(
    frames: &FrameSet,
    index: usize,
    res: Result<RgbaImage, LoadError>,
    settled_tx: &Sender<FrameSettled>,
    readiness_tx: &watch::Sender<Readiness>,
) {
    let Some(frame) = frames.get(index) else {
        warn!(index, "settled frame is not in the catalog");
        return;
    };
    let loaded = match res {
        Ok(image) => {
            debug!(index, width = image.width(), height = image.height(), "loaded frame");
            frame.settle_loaded(image)
        }
        Err(err) => {
            warn!(index, uri = frame.uri(), "frame failed to load: {err:#}");
            frame.settle_failed();
            false
        }
    };
    readiness_tx.send_replace(frames.readiness());
    let _ = settled_tx.send(FrameSettled { index, loaded }).await;
}
