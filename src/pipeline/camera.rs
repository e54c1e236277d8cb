use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Instant,
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::{config::CaptureConfig, error::PipelineError, types::Frame};

/// A playing video stream the render loop can sample once per tick.
pub trait VideoSource: Send {
    /// Latched as soon as the first frame has been buffered.
    fn data_available(&self) -> bool;

    /// The newest buffered frame, or `None` when there is not enough data to
    /// show anything yet.
    fn current_frame(&mut self) -> Option<&Frame>;
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: u32,
    pub label: String,
}

/// Capture thread handle. Dropping it stops the device and joins the thread.
#[derive(Debug)]
pub struct CameraStream {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CameraStream {
    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            log::info!("camera stream released");
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A camera bound to the overlay pipeline: frames arrive from the capture
/// thread and only the newest one is kept.
pub struct CameraSource {
    _stream: CameraStream,
    frame_rx: Receiver<Frame>,
    first_frame: Arc<AtomicBool>,
    latest: Option<Frame>,
}

impl VideoSource for CameraSource {
    fn data_available(&self) -> bool {
        self.first_frame.load(Ordering::Acquire)
    }

    fn current_frame(&mut self) -> Option<&Frame> {
        while let Ok(frame) = self.frame_rx.try_recv() {
            self.latest = Some(frame);
        }
        self.latest.as_ref()
    }
}

/// Hands a frame to the consumer, evicting an unconsumed older one so the
/// loop always sees the freshest image.
fn offer_latest(frame_tx: &Sender<Frame>, stale_rx: &Receiver<Frame>, frame: Frame) {
    match frame_tx.try_send(frame) {
        Ok(()) => {}
        Err(TrySendError::Full(frame)) => {
            let _ = stale_rx.try_recv();
            let _ = frame_tx.try_send(frame);
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// Maps a driver error message onto the capture failure taxonomy.
pub fn classify_capture_error(message: &str) -> PipelineError {
    let lower = message.to_ascii_lowercase();
    let denied = ["permission", "denied", "not authorized", "unauthorized", "not permitted"]
        .iter()
        .any(|needle| lower.contains(needle));
    if denied {
        PipelineError::PermissionDenied(message.to_string())
    } else {
        PipelineError::DeviceUnavailable(message.to_string())
    }
}

#[cfg(feature = "camera-nokhwa")]
pub use native::{acquire, available_cameras};

#[cfg(not(feature = "camera-nokhwa"))]
pub fn available_cameras() -> Result<Vec<CameraDevice>, PipelineError> {
    Ok(Vec::new())
}

#[cfg(not(feature = "camera-nokhwa"))]
pub fn acquire(_config: &CaptureConfig) -> Result<CameraSource, PipelineError> {
    Err(PipelineError::DeviceUnavailable(
        "built without camera support".to_string(),
    ))
}

#[cfg(feature = "camera-nokhwa")]
mod native {
    use anyhow::{Result, anyhow};
    use nokhwa::{
        Buffer, Camera,
        pixel_format::RgbFormat,
        query,
        utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
    };

    use super::*;
    use crate::pipeline::pixel_decode::{PixelFormat, decode_to_rgba};

    // Prefer pixel formats that are widely supported on macOS (the built-in cameras
    // often reject YUYV even though Nokhwa reports it).
    const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
        FrameFormat::RAWRGB,
        FrameFormat::RAWBGR,
        FrameFormat::GRAY,
        FrameFormat::YUYV,
        FrameFormat::NV12,
        FrameFormat::MJPEG,
    ];

    fn requested_formats() -> [RequestedFormat<'static>; 4] {
        [
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestFrameRate,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::with_formats(
                RequestedFormatType::AbsoluteHighestResolution,
                PREFERRED_PIXEL_FORMATS,
            ),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
        ]
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>, PipelineError> {
        let cameras =
            query(ApiBackend::Auto).map_err(|err| classify_capture_error(&err.to_string()))?;
        Ok(cameras
            .into_iter()
            .enumerate()
            .map(|(position, info)| CameraDevice {
                index: match info.index() {
                    CameraIndex::Index(idx) => *idx,
                    CameraIndex::String(_) => position as u32,
                },
                label: info.human_name(),
            })
            .collect())
    }

    fn build_camera(index: CameraIndex) -> Result<Camera> {
        let mut last_err = None;

        for requested in requested_formats() {
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
    }

    fn pixel_format(format: FrameFormat) -> PixelFormat {
        match format {
            FrameFormat::NV12 => PixelFormat::Nv12,
            FrameFormat::YUYV => PixelFormat::Yuyv,
            FrameFormat::MJPEG => PixelFormat::Mjpeg,
            FrameFormat::RAWRGB => PixelFormat::Rgb,
            FrameFormat::RAWBGR => PixelFormat::Bgr,
            FrameFormat::GRAY => PixelFormat::Gray,
        }
    }

    fn decode(buffer: &Buffer) -> Result<crate::pipeline::pixel_decode::DecodedImage> {
        let resolution = buffer.resolution();
        decode_to_rgba(
            pixel_format(buffer.source_frame_format()),
            buffer.buffer(),
            resolution.width_x,
            resolution.height_y,
        )
    }

    /// Opens a video-only capture device and starts streaming frames.
    pub fn acquire(config: &CaptureConfig) -> Result<CameraSource, PipelineError> {
        let cameras = available_cameras()?;
        let found = match config.camera_index {
            Some(idx) => cameras.into_iter().find(|c| c.index == idx),
            None => cameras.into_iter().next(),
        };
        let device = found.ok_or_else(|| match config.camera_index {
            Some(idx) => PipelineError::DeviceUnavailable(format!("camera {idx} not found")),
            None => PipelineError::DeviceUnavailable("no camera detected".to_string()),
        })?;
        log::info!("opening camera {} ({})", device.index, device.label);

        // Fail fast before spawning the capture thread.
        let index = CameraIndex::Index(device.index);
        build_camera(index.clone()).map_err(|err| classify_capture_error(&format!("{err:#}")))?;

        let (frame_tx, frame_rx) = bounded(1);
        let stale_rx = frame_rx.clone();
        let stop = Arc::new(AtomicBool::new(false));
        let first_frame = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let first_frame_flag = first_frame.clone();

        let handle = thread::spawn(move || {
            let mut camera = match build_camera(index) {
                Ok(cam) => cam,
                Err(err) => {
                    log::error!("failed to open camera: {err:?}");
                    return;
                }
            };
            let started = Instant::now();

            while !stop_flag.load(Ordering::Relaxed) {
                let read_start = Instant::now();
                let buffer = match camera.frame() {
                    Ok(buffer) => buffer,
                    Err(err) => {
                        log::warn!(
                            "camera frame read failed (after {:?}): {err:?}",
                            read_start.elapsed()
                        );
                        continue;
                    }
                };

                let decoded = match decode(&buffer) {
                    Ok(decoded) => decoded,
                    Err(err) => {
                        log::warn!("failed to decode camera frame {err:?}");
                        continue;
                    }
                };

                let frame = Frame {
                    rgba: decoded.rgba,
                    width: decoded.width,
                    height: decoded.height,
                    timestamp: started.elapsed(),
                };
                offer_latest(&frame_tx, &stale_rx, frame);

                if !first_frame_flag.swap(true, Ordering::AcqRel) {
                    log::info!("first camera frame buffered");
                }
            }

            if let Err(err) = camera.stop_stream() {
                log::warn!("failed to stop camera stream: {err:?}");
            }
        });

        Ok(CameraSource {
            _stream: CameraStream {
                stop,
                handle: Some(handle),
            },
            frame_rx,
            first_frame,
            latest: None,
        })
    }
}
