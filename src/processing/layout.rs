/// Where a frame lands on the backing surface, in backing pixels. Offsets go
/// negative when the frame overhangs the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverPlacement {
    pub draw_width: f32,
    pub draw_height: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl CoverPlacement {
    /// The part of the placed frame that lands on the canvas, both in canvas
    /// pixels and as the matching rectangle of the source image. `None` when
    /// nothing of the frame is visible.
    pub fn visible_region(
        &self,
        canvas_w: u32,
        canvas_h: u32,
        image_w: u32,
        image_h: u32,
    ) -> Option<VisibleRegion> {
        let (dst_x, dst_width) = visible_span(self.offset_x, self.draw_width, canvas_w)?;
        let (dst_y, dst_height) = visible_span(self.offset_y, self.draw_height, canvas_h)?;

        let image_w = f64::from(image_w.max(1));
        let image_h = f64::from(image_h.max(1));
        let scale_x = f64::from(self.draw_width) / image_w;
        let scale_y = f64::from(self.draw_height) / image_h;
        if !(scale_x > 0.0 && scale_y > 0.0) {
            return None;
        }

        let (src_left, src_width) = source_span(
            dst_x,
            dst_width,
            f64::from(self.offset_x),
            scale_x,
            image_w,
        );
        let (src_top, src_height) = source_span(
            dst_y,
            dst_height,
            f64::from(self.offset_y),
            scale_y,
            image_h,
        );
        Some(VisibleRegion {
            dst_x,
            dst_y,
            dst_width,
            dst_height,
            src_left,
            src_top,
            src_width,
            src_height,
        })
    }
}

/// Visible window of a placed frame. Resampling `src_*` to
/// `dst_width x dst_height` and writing it at `(dst_x, dst_y)` gives the same
/// picture as scaling the whole frame and clipping it to the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleRegion {
    pub dst_x: u32,
    pub dst_y: u32,
    pub dst_width: u32,
    pub dst_height: u32,
    pub src_left: f64,
    pub src_top: f64,
    pub src_width: f64,
    pub src_height: f64,
}

impl VisibleRegion {
    /// True when the window is the whole source at its native size.
    pub fn is_identity(&self, image_w: u32, image_h: u32) -> bool {
        self.src_left == 0.0
            && self.src_top == 0.0
            && self.src_width == f64::from(image_w)
            && self.src_height == f64::from(image_h)
            && self.dst_width == image_w
            && self.dst_height == image_h
    }
}

/// Clips `[offset, offset + extent)` to `[0, canvas)` on whole pixels.
fn visible_span(offset: f32, extent: f32, canvas: u32) -> Option<(u32, u32)> {
    let start = offset.round().max(0.0);
    let end = (offset + extent).round().min(canvas as f32);
    if !(end > start) {
        return None;
    }
    Some((start as u32, (end - start) as u32))
}

fn source_span(dst_start: u32, dst_len: u32, offset: f64, scale: f64, image: f64) -> (f64, f64) {
    let left = ((f64::from(dst_start) - offset) / scale).clamp(0.0, image);
    let right = ((f64::from(dst_start + dst_len) - offset) / scale).clamp(left, image);
    (left, right - left)
}

/// Scales an image so it covers the whole canvas, over-scaled by `zoom`, and
/// centres it.
///
/// When the canvas is relatively wider than the image the width drives the
/// scale; otherwise the height does. Zero-sized images are treated as 1x1.
pub fn cover_placement(
    canvas_w: u32,
    canvas_h: u32,
    image_w: u32,
    image_h: u32,
    zoom: f32,
) -> CoverPlacement {
    let cw = canvas_w as f32;
    let ch = canvas_h.max(1) as f32;
    let image_ratio = image_w.max(1) as f32 / image_h.max(1) as f32;
    let canvas_ratio = cw / ch;

    let (draw_width, draw_height) = if canvas_ratio > image_ratio {
        let w = cw * zoom;
        (w, w / image_ratio)
    } else {
        let h = canvas_h as f32 * zoom;
        (h * image_ratio, h)
    };

    let (offset_x, offset_y) = center_offset(draw_width, draw_height, cw, canvas_h as f32);
    CoverPlacement {
        draw_width,
        draw_height,
        offset_x,
        offset_y,
    }
}

pub fn center_offset(inner_w: f32, inner_h: f32, outer_w: f32, outer_h: f32) -> (f32, f32) {
    ((outer_w - inner_w) / 2.0, (outer_h - inner_h) / 2.0)
}
