use std::{fmt, str::FromStr, time::Duration};

/// Number of joints the landmark model regresses for one hand.
pub const LANDMARKS_PER_HAND: usize = 21;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp relative to the start of the stream.
    pub timestamp: Duration,
}

impl Frame {
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp.as_millis() as u64
    }
}

/// A joint position normalized to the frame: `x` and `y` lie in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Scales the normalized position into a `width` x `height` pixel space.
    pub fn to_pixel(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HandLandmarkSet {
    pub landmarks: [Landmark; LANDMARKS_PER_HAND],
    pub confidence: f32,
}

impl HandLandmarkSet {
    pub fn new(landmarks: [Landmark; LANDMARKS_PER_HAND], confidence: f32) -> Self {
        Self {
            landmarks,
            confidence,
        }
    }

    pub fn points(&self) -> &[Landmark] {
        &self.landmarks
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InferenceResult {
    pub hands: Vec<HandLandmarkSet>,
}

impl InferenceResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }

    /// Drops every hand past `max_hands`, keeping the engine's order.
    pub fn truncate(&mut self, max_hands: usize) {
        if self.hands.len() > max_hands {
            log::debug!(
                "engine returned {} hands, keeping the first {max_hands}",
                self.hands.len()
            );
            self.hands.truncate(max_hands);
        }
    }
}

/// Straight (non-premultiplied) RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b, a] = self.0;
        if a == 255 {
            write!(f, "#{r:02X}{g:02X}{b:02X}")
        } else {
            write!(f, "#{r:02X}{g:02X}{b:02X}{a:02X}")
        }
    }
}

impl FromStr for Rgba {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() || !(hex.len() == 6 || hex.len() == 8) {
            return Err(format!("expected #RRGGBB or #RRGGBBAA, got {s:?}"));
        }

        let channel = |idx: usize| {
            u8::from_str_radix(&hex[idx * 2..idx * 2 + 2], 16)
                .map_err(|err| format!("invalid color {s:?}: {err}"))
        };
        let alpha = if hex.len() == 8 { channel(3)? } else { 255 };
        Ok(Rgba([channel(0)?, channel(1)?, channel(2)?, alpha]))
    }
}
