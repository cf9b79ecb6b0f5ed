use crate::error::RenderError;

/// Luminance key that strips a dark backdrop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromaKey {
    /// Luma below this is fully transparent.
    pub threshold: u8,
    /// Width of the linear alpha ramp above `threshold`.
    pub fade_width: u8,
}

impl ChromaKey {
    pub const DEFAULT_THRESHOLD: u8 = 40;
    pub const DEFAULT_FADE_WIDTH: u8 = 20;

    /// Alpha for a pixel of the given luma, or `None` when the pixel is left
    /// untouched.
    pub fn alpha_for(&self, luma: f32) -> Option<u8> {
        let threshold = f32::from(self.threshold);
        let fade = f32::from(self.fade_width);
        if luma < threshold {
            Some(0)
        } else if self.fade_width > 0 && luma < threshold + fade {
            let alpha = 255.0 * (luma - threshold) / fade;
            Some(alpha.round().clamp(0.0, 255.0) as u8)
        } else {
            None
        }
    }

    pub fn apply(&self, pixels: &mut [u8]) -> Result<(), RenderError> {
        chroma_key(pixels, self.threshold, self.fade_width)
    }
}

impl Default for ChromaKey {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            fade_width: Self::DEFAULT_FADE_WIDTH,
        }
    }
}

/// Makes near-black pixels of an RGBA8 buffer transparent in place.
///
/// `luma = (r + g + b) / 3`. Below `threshold` alpha becomes 0, inside
/// `[threshold, threshold + fade_width)` alpha ramps linearly up to 255, and
/// at or above the end of the ramp the pixel keeps its alpha. A zero
/// `fade_width` degenerates to a hard cut.
pub fn chroma_key(pixels: &mut [u8], threshold: u8, fade_width: u8) -> Result<(), RenderError> {
    if pixels.len() % 4 != 0 {
        return Err(RenderError::PixelBuffer { len: pixels.len() });
    }
    let key = ChromaKey {
        threshold,
        fade_width,
    };
    for px in pixels.chunks_exact_mut(4) {
        let luma = (u16::from(px[0]) + u16::from(px[1]) + u16::from(px[2])) as f32 / 3.0;
        if let Some(alpha) = key.alpha_for(luma) {
            px[3] = alpha;
        }
    }
    Ok(())
}
