/// Maps a normalized scroll position onto a frame index.
///
/// The position is clamped to `[0, 1]` before scaling so overscroll never
/// produces an out-of-range intermediate; NaN counts as the top of the region.
pub fn map_progress_to_frame(progress: f32, frame_count: usize) -> usize {
    if frame_count <= 1 {
        return 0;
    }
    let progress = if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    };
    let last = frame_count - 1;
    let index = (f64::from(progress) * last as f64).round() as usize;
    index.min(last)
}
