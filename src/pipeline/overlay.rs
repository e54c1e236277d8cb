use crate::{
    config::{ConnectorStyle, LandmarkStyle, OverlayStyle},
    error::PipelineError,
    types::{Frame, HandLandmarkSet, InferenceResult, Rgba},
};

use super::topology::Connection;

/// Largest overlay edge the raster surface will allocate.
pub const MAX_SURFACE_EDGE: u32 = 8192;

/// A 2D drawing target whose pixel size tracks the video.
pub trait DrawingSurface {
    fn size(&self) -> (u32, u32);
    fn resize(&mut self, width: u32, height: u32) -> Result<(), PipelineError>;
    fn clear(&mut self);
    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgba, width: f32);
    fn fill_point(&mut self, center: (f32, f32), radius: f32, color: Rgba);
}

pub fn draw_connections<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    hand: &HandLandmarkSet,
    connections: &[Connection],
    style: &ConnectorStyle,
) {
    let (width, height) = surface.size();
    for connection in connections {
        let (Some(start), Some(end)) = (
            hand.landmarks.get(connection.start),
            hand.landmarks.get(connection.end),
        ) else {
            continue;
        };
        surface.stroke_line(
            start.to_pixel(width, height),
            end.to_pixel(width, height),
            style.color,
            style.line_width,
        );
    }
}

pub fn draw_points<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    hand: &HandLandmarkSet,
    style: &LandmarkStyle,
) {
    let (width, height) = surface.size();
    for landmark in hand.points() {
        surface.fill_point(landmark.to_pixel(width, height), style.radius, style.color);
    }
}

/// Draws every hand of `result`, connectors first so joints stay on top.
pub fn draw_result<S: DrawingSurface + ?Sized>(
    surface: &mut S,
    result: &InferenceResult,
    connections: &[Connection],
    style: &OverlayStyle,
) {
    for hand in &result.hands {
        draw_connections(surface, hand, connections, &style.connector);
        draw_points(surface, hand, &style.landmark);
    }
}

/// Transparent RGBA raster the overlay is drawn into.
#[derive(Debug, Default)]
pub struct RgbaSurface {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl RgbaSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) as usize) * 4;
        self.pixels
            .get(idx..idx + 4)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }

    /// Alpha-blends the overlay onto a copy of `frame`. Returns `None` when the
    /// overlay does not match the frame size yet.
    pub fn composite_over(&self, frame: &Frame) -> Option<Vec<u8>> {
        if frame.width != self.width || frame.height != self.height {
            return None;
        }
        let mut out = frame.rgba.clone();
        for (dst, src) in out.chunks_exact_mut(4).zip(self.pixels.chunks_exact(4)) {
            let alpha = src[3] as u32;
            if alpha == 0 {
                continue;
            }
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * (255 - alpha)) / 255) as u8;
            }
            dst[3] = 255;
        }
        Some(out)
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: Rgba) {
        if x < 0 || y < 0 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        if ux >= self.width || uy >= self.height {
            return;
        }
        let idx = ((uy * self.width + ux) as usize) * 4;
        if let Some(px) = self.pixels.get_mut(idx..idx + 4) {
            px.copy_from_slice(&color.0);
        }
    }

    fn fill_disc(&mut self, center: (i32, i32), radius: i32, color: Rgba) {
        let (cx, cy) = center;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }
}

impl DrawingSurface for RgbaSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), PipelineError> {
        if width == 0 || height == 0 || width > MAX_SURFACE_EDGE || height > MAX_SURFACE_EDGE {
            return Err(PipelineError::RenderContextUnavailable(format!(
                "cannot allocate a {width}x{height} overlay"
            )));
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0u8; width as usize * height as usize * 4];
        Ok(())
    }

    fn clear(&mut self) {
        self.pixels.fill(0);
    }

    // Bresenham with a diamond brush for thickness.
    fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgba, width: f32) {
        let (mut x0, mut y0) = (from.0 as i32, from.1 as i32);
        let (x1, y1) = (to.0 as i32, to.1 as i32);
        let dx = (x1 - x0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let dy = -(y1 - y0).abs();
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let radius = ((width.round() as i32).max(1) - 1) / 2;

        loop {
            self.put_pixel(x0, y0, color);
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                        self.put_pixel(x0 + ox, y0 + oy, color);
                    }
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn fill_point(&mut self, center: (f32, f32), radius: f32, color: Rgba) {
        self.fill_disc(
            (center.0 as i32, center.1 as i32),
            radius.round() as i32,
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        pipeline::topology::hand_connections,
        types::{LANDMARKS_PER_HAND, Landmark},
    };

    #[derive(Debug, PartialEq)]
    enum Op {
        Line((f32, f32), (f32, f32)),
        Point((f32, f32)),
    }

    struct Recorder {
        size: (u32, u32),
        ops: Vec<Op>,
    }

    impl DrawingSurface for Recorder {
        fn size(&self) -> (u32, u32) {
            self.size
        }
        fn resize(&mut self, width: u32, height: u32) -> Result<(), PipelineError> {
            self.size = (width, height);
            Ok(())
        }
        fn clear(&mut self) {
            self.ops.clear();
        }
        fn stroke_line(&mut self, from: (f32, f32), to: (f32, f32), _: Rgba, _: f32) {
            self.ops.push(Op::Line(from, to));
        }
        fn fill_point(&mut self, center: (f32, f32), _: f32, _: Rgba) {
            self.ops.push(Op::Point(center));
        }
    }

    fn diagonal_hand() -> HandLandmarkSet {
        let mut landmarks = [Landmark::default(); LANDMARKS_PER_HAND];
        for (i, l) in landmarks.iter_mut().enumerate() {
            let t = i as f32 / 20.0;
            *l = Landmark::new(t, t, 0.0);
        }
        HandLandmarkSet::new(landmarks, 1.0)
    }

    #[test]
    fn scales_connections_to_surface_pixels() {
        let mut surface = Recorder {
            size: (200, 100),
            ops: Vec::new(),
        };
        let hand = diagonal_hand();
        draw_connections(
            &mut surface,
            &hand,
            hand_connections(),
            &OverlayStyle::default().connector,
        );

        assert_eq!(surface.ops.len(), 20);
        // (0, 1): wrist at the origin to landmark 1 at 1/20 of the way.
        assert_eq!(surface.ops[0], Op::Line((0.0, 0.0), (10.0, 5.0)));
    }

    #[test]
    fn draws_one_marker_per_landmark() {
        let mut surface = Recorder {
            size: (100, 100),
            ops: Vec::new(),
        };
        draw_points(
            &mut surface,
            &diagonal_hand(),
            &OverlayStyle::default().landmark,
        );
        assert_eq!(surface.ops.len(), 21);
        assert_eq!(surface.ops[20], Op::Point((100.0, 100.0)));
    }

    #[test]
    fn raster_resize_rejects_degenerate_sizes() {
        let mut surface = RgbaSurface::new();
        assert!(matches!(
            surface.resize(0, 480),
            Err(PipelineError::RenderContextUnavailable(_))
        ));
        assert!(surface.resize(MAX_SURFACE_EDGE + 1, 10).is_err());
        assert!(surface.resize(64, 48).is_ok());
        assert_eq!(surface.size(), (64, 48));
        assert_eq!(surface.pixels().len(), 64 * 48 * 4);
    }

    #[test]
    fn raster_line_and_clear() {
        let mut surface = RgbaSurface::new();
        surface.resize(10, 10).expect("resize");
        let green = Rgba::rgb(0, 255, 0);
        surface.stroke_line((0.0, 5.0), (9.0, 5.0), green, 1.0);
        for x in 0..10 {
            assert_eq!(surface.pixel(x, 5), Some(green.0));
        }
        assert_eq!(surface.pixel(0, 0), Some([0, 0, 0, 0]));

        surface.clear();
        assert!(surface.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn points_outside_the_surface_are_clipped() {
        let mut surface = RgbaSurface::new();
        surface.resize(4, 4).expect("resize");
        surface.fill_point((-10.0, -10.0), 2.0, Rgba::rgb(255, 0, 0));
        assert!(surface.pixels().iter().all(|&b| b == 0));
        surface.fill_point((3.0, 3.0), 1.0, Rgba::rgb(255, 0, 0));
        assert_eq!(surface.pixel(3, 3), Some([255, 0, 0, 255]));
    }

    #[test]
    fn composite_keeps_video_under_transparent_pixels() {
        let mut surface = RgbaSurface::new();
        surface.resize(2, 1).expect("resize");
        surface.fill_point((1.0, 0.0), 0.0, Rgba::rgb(255, 0, 0));
        let frame = Frame {
            rgba: vec![10, 20, 30, 255, 10, 20, 30, 255],
            width: 2,
            height: 1,
            timestamp: Duration::ZERO,
        };
        let out = surface.composite_over(&frame).expect("sizes match");
        assert_eq!(&out[..4], &[10, 20, 30, 255]);
        assert_eq!(&out[4..], &[255, 0, 0, 255]);

        let other = Frame {
            width: 3,
            ..frame
        };
        assert!(surface.composite_over(&other).is_none());
    }
}
