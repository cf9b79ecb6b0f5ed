use image::RgbaImage;

/// Display-side tone filter with CSS `contrast()` then `brightness()`
/// semantics. Alpha is never modified.
pub fn apply_contrast_brightness(img: &mut RgbaImage, contrast: f32, brightness: f32) {
    if (contrast - 1.0).abs() <= f32::EPSILON && (brightness - 1.0).abs() <= f32::EPSILON {
        return;
    }
    let lut = tone_table(contrast, brightness);
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            pixel[c] = lut[pixel[c] as usize];
        }
    }
}

fn tone_table(contrast: f32, brightness: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let v = value as f32 / 255.0;
        let v = ((v - 0.5) * contrast + 0.5).clamp(0.0, 1.0);
        let v = (v * brightness).clamp(0.0, 1.0);
        *slot = (v * 255.0).round() as u8;
    }
    lut
}
