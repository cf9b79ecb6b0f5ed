use std::sync::Arc;

use fast_image_resize as fir;
use image::{RgbaImage, imageops};
use tracing::trace;

use crate::config::Configuration;
use crate::error::RenderError;
use crate::frames::{FrameSet, FrameState};
use crate::processing::chroma::ChromaKey;
use crate::processing::layout::{VisibleRegion, cover_placement};
use crate::tasks::surface::SurfaceGeometry;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositorSettings {
    /// Overscan applied on top of cover scaling.
    pub zoom: f32,
    /// `None` disables the transparency pass.
    pub chroma: Option<ChromaKey>,
}

impl CompositorSettings {
    pub const DEFAULT_ZOOM: f32 = 1.1;

    pub fn from_config(cfg: &Configuration) -> Self {
        Self {
            zoom: cfg.zoom,
            chroma: cfg.chroma_key.then_some(ChromaKey {
                threshold: cfg.chroma_threshold,
                fade_width: cfg.chroma_fade_width,
            }),
        }
    }
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            zoom: Self::DEFAULT_ZOOM,
            chroma: Some(ChromaKey::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The frame has not settled yet.
    Pending,
    /// The frame failed to load.
    Failed,
    /// The index is past the end of the frame set.
    OutOfRange,
    /// The surface has zero width or height.
    DegenerateGeometry,
    /// Scaling or pixel access failed mid-render.
    PixelAccess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Drawn { index: usize },
    Skipped(SkipReason),
}

/// The drawable RGBA8 buffer at backing resolution.
///
/// Contents are only replaced by a fully finished render, so a skipped or
/// failed render leaves the previous pixels in place. Resizing clears.
#[derive(Debug, Clone)]
pub struct Surface {
    pixels: Arc<RgbaImage>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: Arc::new(RgbaImage::new(width, height)),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Reallocates (and clears) when the backing size differs. Returns whether
    /// it did.
    pub fn ensure_size(&mut self, width: u32, height: u32) -> bool {
        if self.width() == width && self.height() == height {
            return false;
        }
        self.pixels = Arc::new(RgbaImage::new(width, height));
        true
    }

    /// Cheap shared handle to the current contents.
    pub fn snapshot(&self) -> Arc<RgbaImage> {
        Arc::clone(&self.pixels)
    }

    fn present(&mut self, canvas: RgbaImage) {
        self.pixels = Arc::new(canvas);
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Last resampled window, keyed on frame, source raster and crop.
#[derive(Debug)]
struct ScaledFrame {
    index: usize,
    source: Arc<RgbaImage>,
    region: VisibleRegion,
    image: RgbaImage,
}

impl ScaledFrame {
    fn matches(&self, index: usize, source: &Arc<RgbaImage>, region: &VisibleRegion) -> bool {
        self.index == index && Arc::ptr_eq(&self.source, source) && self.region == *region
    }
}

/// Draws frames onto a [`Surface`] with cover placement and the chroma pass.
#[derive(Debug, Default)]
pub struct Compositor {
    settings: CompositorSettings,
    scaled: Option<ScaledFrame>,
}

impl Compositor {
    pub fn new(settings: CompositorSettings) -> Self {
        Self {
            settings,
            scaled: None,
        }
    }

    pub fn settings(&self) -> CompositorSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: CompositorSettings) {
        if self.settings != settings {
            self.settings = settings;
            self.scaled = None;
        }
    }

    /// Renders frame `index` onto `surface`.
    ///
    /// The surface is first brought to the geometry's backing size. Frames
    /// that are pending, failed or out of range are skipped and the surface
    /// keeps what it showed. Identical inputs always produce identical pixels.
    pub fn render(
        &mut self,
        index: usize,
        frames: &FrameSet,
        geometry: &SurfaceGeometry,
        surface: &mut Surface,
    ) -> Result<RenderOutcome, RenderError> {
        if !geometry.is_drawable() {
            return Ok(RenderOutcome::Skipped(SkipReason::DegenerateGeometry));
        }
        let (width, height) = (geometry.backing_width, geometry.backing_height);
        surface.ensure_size(width, height);

        let Some(descriptor) = frames.get(index) else {
            return Ok(RenderOutcome::Skipped(SkipReason::OutOfRange));
        };
        let source = match descriptor.state() {
            FrameState::Loaded(image) => image,
            FrameState::Pending => return Ok(RenderOutcome::Skipped(SkipReason::Pending)),
            FrameState::Failed => return Ok(RenderOutcome::Skipped(SkipReason::Failed)),
        };

        let placement = cover_placement(
            width,
            height,
            source.width(),
            source.height(),
            self.settings.zoom,
        );
        let mut canvas = RgbaImage::new(width, height);
        if let Some(region) = placement.visible_region(width, height, source.width(), source.height())
        {
            let scaled = self.scaled_frame(index, &source, &region)?;
            imageops::overlay(
                &mut canvas,
                scaled,
                i64::from(region.dst_x),
                i64::from(region.dst_y),
            );
            trace!(
                index,
                src_left = region.src_left,
                src_top = region.src_top,
                dst_width = region.dst_width,
                dst_height = region.dst_height,
                "frame composited"
            );
        }

        if let Some(key) = self.settings.chroma {
            key.apply(&mut canvas)?;
        }

        surface.present(canvas);
        Ok(RenderOutcome::Drawn { index })
    }

    fn scaled_frame(
        &mut self,
        index: usize,
        source: &Arc<RgbaImage>,
        region: &VisibleRegion,
    ) -> Result<&RgbaImage, RenderError> {
        let cached = match self.scaled.take() {
            Some(cached) if cached.matches(index, source, region) => cached,
            _ => {
                let image = resize_region(source, region).map_err(|reason| RenderError::Scale {
                    index,
                    width: region.dst_width,
                    height: region.dst_height,
                    reason,
                })?;
                ScaledFrame {
                    index,
                    source: Arc::clone(source),
                    region: *region,
                    image,
                }
            }
        };
        Ok(&self.scaled.insert(cached).image)
    }
}

/// Resamples only the source window of `region` straight to its canvas size.
fn resize_region(source: &RgbaImage, region: &VisibleRegion) -> Result<RgbaImage, String> {
    let (target_w, target_h) = (region.dst_width, region.dst_height);
    if target_w == 0 || target_h == 0 {
        return Err("resize dimensions must be positive".into());
    }
    if region.is_identity(source.width(), source.height()) {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .map_err(|err| format!("invalid source view: {err}"))?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .crop(
            region.src_left,
            region.src_top,
            region.src_width,
            region.src_height,
        )
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .map_err(|err| err.to_string())?;
    let buffer = dst_image.into_vec();
    RgbaImage::from_raw(target_w, target_h, buffer)
        .ok_or_else(|| "resized buffer has the wrong length".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::CatalogSpec;
    use crate::tasks::surface::ElementMetrics;
    use image::Rgba;

    fn frames(count: usize) -> FrameSet {
        FrameSet::catalog(&CatalogSpec {
            frame_count: count,
            path: "mem:".into(),
            extension: ".png".into(),
            digits: 2,
            stride: 1,
        })
    }

    fn geometry(w: f32, h: f32) -> SurfaceGeometry {
        SurfaceGeometry::from_metrics(ElementMetrics {
            css_width: w,
            css_height: h,
            device_pixel_ratio: 1.0,
        })
    }

    fn solid(w: u32, h: u32, value: u8) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([value, value, value, 255]))
    }

    #[test]
    fn draws_loaded_frame_and_keys_out_black() {
        let set = frames(2);
        // left half black backdrop, right half bright subject
        let mut img = solid(20, 20, 0);
        for y in 0..20 {
            for x in 10..20 {
                img.put_pixel(x, y, Rgba([220, 220, 220, 255]));
            }
        }
        set.get(0).unwrap().settle_loaded(img);

        let mut compositor = Compositor::new(CompositorSettings {
            zoom: 1.0,
            chroma: Some(ChromaKey::default()),
        });
        let mut surface = Surface::default();
        let outcome = compositor
            .render(0, &set, &geometry(20.0, 20.0), &mut surface)
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Drawn { index: 0 });

        let pixels = surface.snapshot();
        assert_eq!(pixels.dimensions(), (20, 20));
        assert_eq!(pixels.get_pixel(2, 10)[3], 0);
        assert_eq!(pixels.get_pixel(17, 10).0, [220, 220, 220, 255]);
    }

    #[test]
    fn render_is_idempotent() {
        let set = frames(1);
        let mut img = solid(37, 23, 10);
        for (x, y, px) in img.enumerate_pixels_mut() {
            let v = ((x * 7 + y * 11) % 256) as u8;
            *px = Rgba([v, 255 - v, v / 2, 255]);
        }
        set.get(0).unwrap().settle_loaded(img);
        let g = geometry(30.0, 50.0);

        let mut compositor = Compositor::new(CompositorSettings::default());
        let mut surface = Surface::default();
        compositor.render(0, &set, &g, &mut surface).unwrap();
        let first = surface.snapshot();
        compositor.render(0, &set, &g, &mut surface).unwrap();
        let second = surface.snapshot();
        assert_eq!(first.as_raw(), second.as_raw());

        let mut fresh = Compositor::new(CompositorSettings::default());
        let mut other = Surface::default();
        fresh.render(0, &set, &g, &mut other).unwrap();
        assert_eq!(first.as_raw(), other.snapshot().as_raw());
    }

    #[test]
    fn pending_and_failed_frames_keep_previous_pixels() {
        let set = frames(3);
        set.get(0).unwrap().settle_loaded(solid(8, 8, 200));
        set.get(1).unwrap().settle_failed();
        let g = geometry(8.0, 8.0);

        let mut compositor = Compositor::new(CompositorSettings::default());
        let mut surface = Surface::default();
        compositor.render(0, &set, &g, &mut surface).unwrap();
        let before = surface.snapshot();

        assert_eq!(
            compositor.render(1, &set, &g, &mut surface).unwrap(),
            RenderOutcome::Skipped(SkipReason::Failed)
        );
        assert_eq!(
            compositor.render(2, &set, &g, &mut surface).unwrap(),
            RenderOutcome::Skipped(SkipReason::Pending)
        );
        assert_eq!(
            compositor.render(9, &set, &g, &mut surface).unwrap(),
            RenderOutcome::Skipped(SkipReason::OutOfRange)
        );
        assert!(Arc::ptr_eq(&before, &surface.snapshot()));
    }

    #[test]
    fn zero_geometry_is_skipped_without_touching_pixels() {
        let set = frames(1);
        set.get(0).unwrap().settle_loaded(solid(4, 4, 200));
        let mut compositor = Compositor::default();
        let mut surface = Surface::new(3, 3);
        let outcome = compositor
            .render(0, &set, &geometry(0.0, 0.0), &mut surface)
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Skipped(SkipReason::DegenerateGeometry));
        assert_eq!((surface.width(), surface.height()), (3, 3));
    }

    #[test]
    fn resize_clears_stale_content_even_when_skipping() {
        let set = frames(2);
        set.get(0).unwrap().settle_loaded(solid(8, 8, 200));
        let mut compositor = Compositor::default();
        let mut surface = Surface::default();
        compositor
            .render(0, &set, &geometry(8.0, 8.0), &mut surface)
            .unwrap();

        let outcome = compositor
            .render(1, &set, &geometry(16.0, 4.0), &mut surface)
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Skipped(SkipReason::Pending));
        let pixels = surface.snapshot();
        assert_eq!(pixels.dimensions(), (16, 4));
        assert!(pixels.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn zoom_crops_symmetrically() {
        let set = frames(1);
        // 1px red border around a green interior, same aspect as the surface
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([0, 200, 0, 255]));
        for i in 0..100 {
            for (x, y) in [(i, 0), (i, 99), (0, i), (99, i)] {
                img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        set.get(0).unwrap().settle_loaded(img);
        let mut compositor = Compositor::new(CompositorSettings {
            zoom: 1.1,
            chroma: None,
        });
        let mut surface = Surface::default();
        compositor
            .render(0, &set, &geometry(100.0, 100.0), &mut surface)
            .unwrap();
        let pixels = surface.snapshot();
        for (x, y) in [(0, 0), (99, 0), (0, 99), (99, 99), (50, 0), (0, 50)] {
            let p = pixels.get_pixel(x, y);
            assert!(p[1] > 150 && p[0] < 60, "border visible at ({x},{y}): {p:?}");
        }
    }

    #[test]
    fn extreme_aspect_resamples_only_the_visible_window() {
        let set = frames(1);
        set.get(0).unwrap().settle_loaded(solid(10, 2000, 180));
        let mut compositor = Compositor::new(CompositorSettings {
            zoom: 1.1,
            chroma: None,
        });
        let mut surface = Surface::default();
        let outcome = compositor
            .render(0, &set, &geometry(2000.0, 100.0), &mut surface)
            .unwrap();
        assert_eq!(outcome, RenderOutcome::Drawn { index: 0 });

        let scaled = compositor.scaled.as_ref().expect("scaled frame cached");
        assert!(scaled.image.width() <= 2000 && scaled.image.height() <= 100);
        let pixels = surface.snapshot();
        assert_eq!(pixels.dimensions(), (2000, 100));
        for (x, y) in [(0, 0), (1999, 99), (1000, 50)] {
            assert_eq!(pixels.get_pixel(x, y).0, [180, 180, 180, 255]);
        }
    }

    #[test]
    fn landscape_frame_on_portrait_surface_stays_surface_sized() {
        let set = frames(1);
        set.get(0).unwrap().settle_loaded(solid(192, 108, 90));
        let mut compositor = Compositor::new(CompositorSettings::default());
        let mut surface = Surface::default();
        let g = SurfaceGeometry::from_metrics(ElementMetrics {
            css_width: 39.0,
            css_height: 84.0,
            device_pixel_ratio: 3.0,
        });
        compositor.render(0, &set, &g, &mut surface).unwrap();

        let scaled = compositor.scaled.as_ref().expect("scaled frame cached");
        assert_eq!(scaled.image.dimensions(), (117, 252));
        assert_eq!(surface.snapshot().get_pixel(58, 126).0, [90, 90, 90, 255]);

        // same geometry: the cached window is reused
        let before = scaled.image.as_ptr();
        compositor.render(0, &set, &g, &mut surface).unwrap();
        assert_eq!(compositor.scaled.as_ref().unwrap().image.as_ptr(), before);
    }

    #[test]
    fn settings_change_drops_scaled_cache() {
        let set = frames(1);
        set.get(0).unwrap().settle_loaded(solid(10, 10, 30));
        let g = geometry(10.0, 10.0);
        let mut compositor = Compositor::new(CompositorSettings {
            zoom: 1.0,
            chroma: Some(ChromaKey::default()),
        });
        let mut surface = Surface::default();
        compositor.render(0, &set, &g, &mut surface).unwrap();
        // luma 30 is below the default threshold
        assert_eq!(surface.snapshot().get_pixel(5, 5)[3], 0);

        compositor.set_settings(CompositorSettings {
            zoom: 1.0,
            chroma: None,
        });
        compositor.render(0, &set, &g, &mut surface).unwrap();
        assert_eq!(surface.snapshot().get_pixel(5, 5).0, [30, 30, 30, 255]);
    }
}
