use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::frames::CatalogSpec;
use crate::processing::chroma::ChromaKey;
use crate::processing::composite::CompositorSettings;
use crate::tasks::surface::ElementMetrics;

const MAX_ZOOM: f32 = 4.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Number of frames in the sequence.
    pub frame_count: usize,
    /// URI prefix for frame files; plain path or `file://` URI.
    pub path: String,
    /// Suffix appended after the zero-padded frame number.
    pub extension: String,
    /// Zero-padding width of the 1-based frame number.
    pub digits: usize,
    /// Step between file numbers of consecutive frames.
    pub frame_stride: usize,
    /// Overscan factor on top of cover scaling.
    pub zoom: f32,
    /// Enables the luminance transparency pass.
    pub chroma_key: bool,
    /// Luma below which pixels become fully transparent.
    pub chroma_threshold: u8,
    /// Width of the soft edge above the threshold.
    pub chroma_fade_width: u8,
    /// Upper bound on simultaneous CPU decodes.
    pub loader_max_concurrent_decodes: usize,
    /// Render cadence; scroll bursts are coalesced to one render per tick.
    #[serde(with = "humantime_serde")]
    pub paint_interval: Duration,
    /// Delay before the follow-up measurement after mount or resize.
    #[serde(with = "humantime_serde")]
    pub resize_settle: Duration,
    /// Initial element size used by the headless driver.
    pub surface: SurfaceOptions,
    /// Display-side tone filter applied to exported snapshots.
    pub presentation: PresentationOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&s)?)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(self.frame_count >= 1, "frame-count must be at least 1");
        ensure!(self.digits >= 1, "digits must be at least 1");
        ensure!(self.frame_stride >= 1, "frame-stride must be at least 1");
        ensure!(
            self.zoom.is_finite() && self.zoom > 0.0 && self.zoom <= MAX_ZOOM,
            "zoom must be in (0, {MAX_ZOOM}]"
        );
        ensure!(
            self.loader_max_concurrent_decodes > 0,
            "loader-max-concurrent-decodes must be greater than zero"
        );
        ensure!(
            !self.paint_interval.is_zero(),
            "paint-interval must be positive"
        );
        self.surface
            .validate()
            .context("invalid surface configuration")?;
        self.presentation
            .validate()
            .context("invalid presentation configuration")?;
        Ok(self)
    }

    /// Everything that determines which frames get loaded.
    pub fn catalog(&self) -> CatalogSpec {
        CatalogSpec {
            frame_count: self.frame_count,
            path: self.path.clone(),
            extension: self.extension.clone(),
            digits: self.digits,
            stride: self.frame_stride,
        }
    }

    pub fn compositor(&self) -> CompositorSettings {
        CompositorSettings::from_config(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            frame_count: 40,
            path: "frames/frame-".into(),
            extension: ".jpg".into(),
            digits: 3,
            frame_stride: 1,
            zoom: CompositorSettings::DEFAULT_ZOOM,
            chroma_key: true,
            chroma_threshold: ChromaKey::DEFAULT_THRESHOLD,
            chroma_fade_width: ChromaKey::DEFAULT_FADE_WIDTH,
            loader_max_concurrent_decodes: 8,
            paint_interval: Duration::from_millis(16),
            resize_settle: Duration::from_millis(100),
            surface: SurfaceOptions::default(),
            presentation: PresentationOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SurfaceOptions {
    pub width: f32,
    pub height: f32,
    pub device_pixel_ratio: f32,
}

impl SurfaceOptions {
    pub fn metrics(&self) -> ElementMetrics {
        ElementMetrics {
            css_width: self.width,
            css_height: self.height,
            device_pixel_ratio: self.device_pixel_ratio,
        }
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.width.is_finite() && self.width >= 0.0,
            "surface.width must be a non-negative number"
        );
        ensure!(
            self.height.is_finite() && self.height >= 0.0,
            "surface.height must be a non-negative number"
        );
        ensure!(
            self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0,
            "surface.device-pixel-ratio must be positive"
        );
        Ok(())
    }
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            width: 300.0,
            height: 500.0,
            device_pixel_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PresentationOptions {
    pub contrast: f32,
    pub brightness: f32,
}

impl PresentationOptions {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.contrast.is_finite() && self.contrast >= 0.0,
            "presentation.contrast must be non-negative"
        );
        ensure!(
            self.brightness.is_finite() && self.brightness >= 0.0,
            "presentation.brightness must be non-negative"
        );
        Ok(())
    }
}

impl Default for PresentationOptions {
    fn default() -> Self {
        Self {
            contrast: 1.0,
            brightness: 1.0,
        }
    }
}
