use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, LANDMARKS_PER_HAND, Landmark};

/// Side of the square crop the landmark model consumes.
pub const LANDMARK_INPUT_SIZE: u32 = 224;
/// Side of the letterboxed image the palm detector consumes.
pub const PALM_INPUT_SIZE: u32 = 192;

/// How a frame was scaled and padded into a square model input.
#[derive(Clone, Debug)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// Maps landmark-model coordinates from a rotated square crop back to the frame.
#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

fn check_buffer(frame: &Frame) -> Result<()> {
    let expected = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {expected}",
            frame.rgba.len()
        ));
    }
    Ok(())
}

/// Resizes `frame` to fit a `target` square, pads the rest with black and
/// returns an NHWC tensor in `[0, 1]`.
pub fn letterbox_tensor(frame: &Frame, target: u32) -> Result<(Array4<f32>, Letterbox)> {
    check_buffer(frame)?;

    let scale = target as f32 / frame.width.max(frame.height) as f32;
    let new_w = (frame.width as f32 * scale).round().clamp(1.0, target as f32) as u32;
    let new_h = (frame.height as f32 * scale).round().clamp(1.0, target as f32) as u32;

    let src = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .context("fast resize failed")?;
    let resized = dst.into_vec();

    let side = target as usize;
    let pad_x = (side - new_w as usize) / 2;
    let pad_y = (side - new_h as usize) / 2;
    let row_len = new_w as usize * 4;
    let mut canvas = vec![0u8; side * side * 4];
    for (row, src_row) in resized.chunks_exact(row_len).enumerate() {
        let offset = ((pad_y + row) * side + pad_x) * 4;
        canvas[offset..offset + row_len].copy_from_slice(src_row);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let tensor = Array4::<f32>::from_shape_vec((1, side, side, 3), normalized)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    Ok((
        tensor,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            orig_w: frame.width,
            orig_h: frame.height,
        },
    ))
}

/// Samples a square of `side` frame pixels around `center`, rotated by
/// `angle`, into an `output_size` NHWC tensor.
pub fn rotated_crop_tensor(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_buffer(frame)?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let n = output_size as usize;
    let data: Vec<f32> = (0..n * n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let (x, y) = ((i % n) as f32 + 0.5, (i / n) as f32 + 0.5);
            let (sx, sy) = transform.to_frame(x, y);
            sample_bilinear(frame, sx, sy)
        })
        .collect();

    let tensor = Array4::<f32>::from_shape_vec((1, n, n, 3), data)
        .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;
    Ok((tensor, transform))
}

impl CropTransform {
    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }

    /// Projects a crop-space point onto the frame, normalized to `[0, 1]`.
    pub fn normalize(&self, x: f32, y: f32, z: f32) -> Landmark {
        let (fx, fy) = self.to_frame(x, y);
        let w = self.orig_w.max(1) as f32;
        let h = self.orig_h.max(1) as f32;
        let depth_scale = self.side / self.output_size as f32 / w;
        Landmark::new(
            (fx / w).clamp(0.0, 1.0),
            (fy / h).clamp(0.0, 1.0),
            z * depth_scale,
        )
    }
}

/// Reads `LANDMARKS_PER_HAND` `(x, y, z)` triples from a flat model output.
pub fn decode_landmarks(flat: &[f32]) -> Result<[[f32; 3]; LANDMARKS_PER_HAND]> {
    if flat.len() < LANDMARKS_PER_HAND * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            LANDMARKS_PER_HAND * 3
        ));
    }

    let mut out = [[0.0; 3]; LANDMARKS_PER_HAND];
    for (slot, chunk) in out.iter_mut().zip(flat.chunks_exact(3)) {
        *slot = [chunk[0], chunk[1], chunk[2]];
    }
    Ok(out)
}

fn sample_bilinear(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if !x.is_finite() || !y.is_finite() {
        return [0.0; 3];
    }
    let x0 = x.floor();
    let y0 = y.floor();

    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let (ix, iy) = (cx as i64, cy as i64);
        if ix < 0 || iy < 0 || ix >= frame.width as i64 || iy >= frame.height as i64 {
            return [0.0; 3];
        }
        let idx = (iy as usize * frame.width as usize + ix as usize) * 4;
        match frame.rgba.get(idx..idx + 3) {
            Some(px) => [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ],
            None => [0.0; 3],
        }
    };

    let (fx, fy) = (x - x0, y - y0);
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        Frame {
            rgba: vec![value; (width * height * 4) as usize],
            width,
            height,
            timestamp: Duration::ZERO,
        }
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let (tensor, letterbox) = letterbox_tensor(&solid(64, 32, 255), 16).expect("letterbox");
        assert_eq!(tensor.shape(), &[1, 16, 16, 3]);
        assert_eq!(letterbox.scale, 0.25);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 4.0);
        // Padding rows stay black, content rows are white.
        assert_eq!(tensor[[0, 0, 8, 0]], 0.0);
        assert!((tensor[[0, 8, 8, 0]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let mut frame = solid(4, 4, 0);
        frame.rgba.pop();
        assert!(letterbox_tensor(&frame, 8).is_err());
        assert!(rotated_crop_tensor(&frame, (2.0, 2.0), 4.0, 0.0, 4).is_err());
    }

    #[test]
    fn unrotated_crop_center_maps_to_crop_center() {
        let frame = solid(100, 50, 128);
        let (tensor, transform) =
            rotated_crop_tensor(&frame, (50.0, 25.0), 20.0, 0.0, 8).expect("crop");
        assert_eq!(tensor.shape(), &[1, 8, 8, 3]);

        let center = transform.normalize(4.0, 4.0, 0.0);
        assert!((center.x - 0.5).abs() < 1e-5);
        assert!((center.y - 0.5).abs() < 1e-5);
    }

    #[test]
    fn normalized_points_are_clamped_to_the_frame() {
        let transform = CropTransform {
            center: (0.0, 0.0),
            side: 100.0,
            angle: 0.0,
            output_size: 10,
            orig_w: 50,
            orig_h: 50,
        };
        let corner = transform.normalize(0.0, 0.0, 0.0);
        assert_eq!((corner.x, corner.y), (0.0, 0.0));
        let far = transform.normalize(10.0, 10.0, 0.0);
        assert_eq!((far.x, far.y), (1.0, 1.0));
    }

    #[test]
    fn decodes_21_triples() {
        let flat: Vec<f32> = (0..63).map(|v| v as f32).collect();
        let points = decode_landmarks(&flat).expect("decode");
        assert_eq!(points[0], [0.0, 1.0, 2.0]);
        assert_eq!(points[20], [60.0, 61.0, 62.0]);
        assert!(decode_landmarks(&flat[..62]).is_err());
    }
}
