use std::convert::TryFrom;

use anyhow::{Result, anyhow};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

/// Pixel layouts a capture device can hand us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Nv12,
    Yuyv,
    Mjpeg,
    Rgb,
    Bgr,
    Gray,
}

#[derive(Debug)]
pub struct DecodedImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Converts one captured buffer into tightly packed RGBA.
pub fn decode_to_rgba(
    format: PixelFormat,
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<DecodedImage> {
    let (rgba, width, height) = match format {
        PixelFormat::Nv12 => (nv12(data, width, height)?, width, height),
        PixelFormat::Yuyv => (yuyv(data, width, height)?, width, height),
        PixelFormat::Mjpeg => mjpeg(data, width, height)?,
        PixelFormat::Rgb => (packed_rgb(data, width, height, false)?, width, height),
        PixelFormat::Bgr => (packed_rgb(data, width, height, true)?, width, height),
        PixelFormat::Gray => (gray(data, width, height)?, width, height),
    };

    Ok(DecodedImage {
        rgba,
        width,
        height,
    })
}

fn ensure_len(kind: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        return Err(anyhow!(
            "{kind} buffer too small: got {}, expected {expected}",
            data.len()
        ));
    }
    Ok(())
}

fn nv12(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_len = width as usize * height as usize;
    let uv_len = y_len / 2;
    ensure_len("NV12", data, y_len + uv_len)?;

    let mut rgba = vec![0u8; y_len * 4];
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_len],
        y_stride: width,
        uv_plane: &data[y_len..y_len + uv_len],
        uv_stride: width,
        width,
        height,
    };

    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    ensure_len("YUYV", data, width as usize * height as usize * 2)?;

    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn mjpeg(data: &[u8], width: u32, height: u32) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    // Trust the bitstream over the negotiated resolution.
    let (width, height) = match decoder.info() {
        Some(info) => (
            u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width does not fit u32"))?,
            u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height does not fit u32"))?,
        ),
        None => (width, height),
    };
    let expected = usize::try_from(u64::from(width) * u64::from(height) * 4)
        .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?;
    if rgba.len() < expected {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {expected}",
            rgba.len()
        ));
    }

    Ok((rgba, width, height))
}

fn packed_rgb(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    ensure_len("RGB", data, width as usize * height as usize * 3)?;

    let mut rgba = vec![0u8; width as usize * height as usize * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            let (r, b) = if swap_rb { (src[2], src[0]) } else { (src[0], src[2]) };
            dst.copy_from_slice(&[r, src[1], b, 255]);
        });

    Ok(rgba)
}

fn gray(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let len = width as usize * height as usize;
    ensure_len("GRAY", data, len)?;

    let mut rgba = vec![0u8; len * 4];
    rgba.par_chunks_mut(4)
        .zip(data[..len].par_iter().copied())
        .for_each(|(dst, value)| dst.copy_from_slice(&[value, value, value, 255]));

    Ok(rgba)
}
