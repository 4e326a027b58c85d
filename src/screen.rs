//! Screen captures, fingerprints and pixel coordinates.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// A pixel coordinate on the device screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Device window size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenBounds {
    pub width: u32,
    pub height: u32,
}

impl ScreenBounds {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Clamp a point into `[0, width] x [0, height]`
    pub fn clamp(&self, point: Point) -> Point {
        Point {
            x: point.x.min(self.width),
            y: point.y.min(self.height),
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x <= self.width && point.y <= self.height
    }
}

/// A PNG-encoded screen capture
///
/// Screens are only ever compared by [`Fingerprint`], never pixel by pixel.
#[derive(Clone, PartialEq, Eq)]
pub struct Screenshot {
    png: Vec<u8>,
}

impl Screenshot {
    pub fn from_png(png: Vec<u8>) -> Self {
        Self { png }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn len(&self) -> usize {
        self.png.len()
    }

    pub fn is_empty(&self) -> bool {
        self.png.is_empty()
    }

    /// Content fingerprint of the encoded image
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.png)
    }

    /// Decode only the image header to get its pixel dimensions
    pub fn dimensions(&self) -> image::ImageResult<(u32, u32)> {
        image::io::Reader::new(Cursor::new(&self.png))
            .with_guessed_format()
            .map_err(image::ImageError::IoError)?
            .into_dimensions()
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.png)
    }
}

impl fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Screenshot")
            .field("bytes", &self.png.len())
            .field("fingerprint", &self.fingerprint().short())
            .finish()
    }
}

/// BLAKE3 digest of a capture
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// First 8 bytes as hex, for log lines
    pub fn short(&self) -> String {
        self.0[..8].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}
