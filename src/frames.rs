//! Frame catalog: one descriptor per frame of the sequence, each settled
//! exactly once by the loader and read lock-free by the compositor.

use std::sync::{Arc, OnceLock};

use image::RgbaImage;

/// What the catalog is built from. Two sequences with equal specs share the
/// same frames; any difference means the catalog is rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSpec {
    pub frame_count: usize,
    pub path: String,
    pub extension: String,
    pub digits: usize,
    pub stride: usize,
}

impl CatalogSpec {
    /// 1-based number used in the file name of frame `index`.
    pub fn file_number(&self, index: usize) -> usize {
        1 + index * self.stride.max(1)
    }

    pub fn uri_for(&self, index: usize) -> String {
        frame_uri(
            &self.path,
            self.file_number(index),
            self.digits,
            &self.extension,
        )
    }
}

/// `path + zero_pad(number, digits) + extension`. Numbers wider than
/// `digits` are kept whole.
pub fn frame_uri(path: &str, number: usize, digits: usize, extension: &str) -> String {
    format!("{path}{number:0digits$}{extension}")
}

#[derive(Debug, Clone)]
pub enum FrameState {
    Pending,
    Loaded(Arc<RgbaImage>),
    Failed,
}

impl FrameState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, FrameState::Pending)
    }
}

#[derive(Debug, Clone)]
enum Settled {
    Loaded(Arc<RgbaImage>),
    Failed,
}

#[derive(Debug)]
pub struct FrameDescriptor {
    index: usize,
    uri: String,
    settled: OnceLock<Settled>,
}

impl FrameDescriptor {
    fn new(index: usize, uri: String) -> Self {
        Self {
            index,
            uri,
            settled: OnceLock::new(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> FrameState {
        match self.settled.get() {
            None => FrameState::Pending,
            Some(Settled::Loaded(image)) => FrameState::Loaded(Arc::clone(image)),
            Some(Settled::Failed) => FrameState::Failed,
        }
    }

    /// Records a decoded raster. Returns `false` if the frame had already
    /// settled, in which case nothing changes.
    pub fn settle_loaded(&self, image: RgbaImage) -> bool {
        self.settled.set(Settled::Loaded(Arc::new(image))).is_ok()
    }

    /// Records a load failure. Returns `false` if the frame had already settled.
    pub fn settle_failed(&self) -> bool {
        self.settled.set(Settled::Failed).is_ok()
    }
}

/// Preload progress, derived from descriptor states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub total: usize,
    pub loaded: usize,
    pub failed: usize,
}

impl Readiness {
    /// Every frame has either loaded or definitively failed. This is a
    /// counting condition only; a sequence where every frame failed is ready.
    pub fn is_ready(&self) -> bool {
        self.loaded + self.failed == self.total
    }

    pub fn error_count(&self) -> usize {
        self.failed
    }

    pub fn pending(&self) -> usize {
        self.total.saturating_sub(self.loaded + self.failed)
    }

    /// Ready, but not a single frame is drawable.
    pub fn is_offline(&self) -> bool {
        self.is_ready() && self.loaded == 0
    }
}

/// Ordered, fixed-length set of frame descriptors. Cloning shares the
/// descriptors.
#[derive(Debug, Clone)]
pub struct FrameSet {
    frames: Arc<[FrameDescriptor]>,
}

impl FrameSet {
    pub fn catalog(spec: &CatalogSpec) -> Self {
        let frames: Vec<FrameDescriptor> = (0..spec.frame_count)
            .map(|index| FrameDescriptor::new(index, spec.uri_for(index)))
            .collect();
        Self {
            frames: frames.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FrameDescriptor> {
        self.frames.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameDescriptor> {
        self.frames.iter()
    }

    pub fn readiness(&self) -> Readiness {
        let mut readiness = Readiness {
            total: self.frames.len(),
            ..Readiness::default()
        };
        for frame in self.frames.iter() {
            match frame.settled.get() {
                Some(Settled::Loaded(_)) => readiness.loaded += 1,
                Some(Settled::Failed) => readiness.failed += 1,
                None => {}
            }
        }
        readiness
    }

    /// Both handles point at the same descriptors.
    pub fn same_catalog(&self, other: &FrameSet) -> bool {
        Arc::ptr_eq(&self.frames, &other.frames)
    }
}
