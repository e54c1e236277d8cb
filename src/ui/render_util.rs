use super::{Arc, ImageBuffer, ImageFrame, RenderImage, Rgba};
use crate::{pipeline::RgbaSurface, types::Frame};

/// Video frame with the current overlay blended on top, ready for `img()`.
pub(super) fn composite_image(frame: &Frame, overlay: Option<&RgbaSurface>) -> Option<Arc<RenderImage>> {
    bgra_to_image(composite_bgra(frame, overlay), frame.width, frame.height)
}

fn composite_bgra(frame: &Frame, overlay: Option<&RgbaSurface>) -> Vec<u8> {
    let mut pixels = overlay
        .and_then(|surface| surface.composite_over(frame))
        .unwrap_or_else(|| frame.rgba.clone());
    // GPUI expects BGRA; convert in place to avoid the async asset pipeline and flicker.
    for px in pixels.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    pixels
}

fn bgra_to_image(bgra: Vec<u8>, width: u32, height: u32) -> Option<Arc<RenderImage>> {
    let buffer = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(width, height, bgra)?;
    Some(Arc::new(RenderImage::new(vec![ImageFrame::new(buffer)])))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::OverlayStyle,
        pipeline::{DrawingSurface, overlay::draw_result, topology::hand_connections},
        types::{HandLandmarkSet, InferenceResult, LANDMARKS_PER_HAND, Landmark},
    };

    #[test]
    fn rejects_short_buffers() {
        assert!(bgra_to_image(vec![0; 7], 2, 1).is_none());
        assert!(bgra_to_image(vec![0; 8], 2, 1).is_some());
    }

    #[test]
    fn detected_hand_shows_in_overlay_colors() {
        let frame = Frame {
            rgba: vec![10, 20, 30, 255].repeat(20 * 20),
            width: 20,
            height: 20,
            timestamp: Duration::ZERO,
        };
        let hand = HandLandmarkSet::new([Landmark::new(0.5, 0.5, 0.0); LANDMARKS_PER_HAND], 0.9);
        let result = InferenceResult { hands: vec![hand] };
        let mut surface = RgbaSurface::new();
        surface.resize(20, 20).expect("resize");
        draw_result(&mut surface, &result, hand_connections(), &OverlayStyle::default());

        let bgra = composite_bgra(&frame, Some(&surface));
        let at = |x: usize, y: usize| bgra[(y * 20 + x) * 4..(y * 20 + x) * 4 + 4].to_vec();
        // Red landmark marker, in BGRA order.
        assert_eq!(at(10, 10), vec![0, 0, 255, 255]);
        // Untouched video corner.
        assert_eq!(at(0, 0), vec![30, 20, 10, 255]);
    }

    #[test]
    fn falls_back_to_bare_video_without_overlay() {
        let frame = Frame {
            rgba: vec![1, 2, 3, 255],
            width: 1,
            height: 1,
            timestamp: Duration::ZERO,
        };
        assert!(composite_image(&frame, None).is_some());
        // Overlay not yet sized to the video.
        assert!(composite_image(&frame, Some(&RgbaSurface::new())).is_some());
    }
}
