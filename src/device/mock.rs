//! In-memory device backed by a virtual framebuffer.
//!
//! Every mutating call is recorded and paints a marker onto the framebuffer,
//! so the screen changes once per action and is stable afterwards. This gives
//! dry runs and tests a device whose screenshots settle like a real one.

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{ImageBuffer, RgbImage};
use std::io::Cursor;
use std::time::Duration;

use super::{DeviceDriver, DeviceError, DeviceResult};
use crate::screen::{Point, ScreenBounds, Screenshot};

/// Marker half-size in pixels
const MARKER_RADIUS: u32 = 6;

/// Height of a text line (8px glyph plus spacing)
const LINE_HEIGHT: u32 = 10;

const BACKGROUND: [u8; 3] = [24, 24, 32];
const TAP_COLOR: [u8; 3] = [255, 64, 64];
const SWIPE_COLOR: [u8; 3] = [64, 160, 255];
const TEXT_COLOR: [u8; 3] = [240, 240, 240];
const KEY_BAR_COLOR: [u8; 3] = [80, 80, 96];

/// A call received by a [`MockDevice`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Tap(Point),
    Swipe {
        start: Point,
        end: Point,
        duration: Duration,
    },
    TypeText(String),
    PressKey(u32),
    DismissKeyboard,
    Screenshot,
    WindowSize,
}

impl DeviceCall {
    /// Whether the call changes device state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, DeviceCall::Screenshot | DeviceCall::WindowSize)
    }
}

/// A virtual phone screen
#[derive(Debug, Clone)]
pub struct MockDevice {
    /// Width in pixels
    width: u32,
    /// Height in pixels
    height: u32,
    /// RGB pixel buffer (row-major, 3 bytes per pixel)
    buffer: Vec<u8>,
    /// Every call in arrival order
    calls: Vec<DeviceCall>,
    /// Row where the next typed text is drawn
    text_row: u32,
    /// When set, mutating calls fail with this message
    failure: Option<String>,
}

impl MockDevice {
    /// Create a new device screen with the given dimensions
    pub fn new(width: u32, height: u32) -> Self {
        let mut device = Self {
            width,
            height,
            buffer: vec![0u8; width as usize * height as usize * 3],
            calls: Vec::new(),
            text_row: LINE_HEIGHT * 2,
            failure: None,
        };
        device.fill(BACKGROUND);
        device
    }

    /// Make every following mutating call fail
    pub fn fail_mutations(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Calls received so far
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Mutating calls received so far
    pub fn mutations(&self) -> Vec<&DeviceCall> {
        self.calls.iter().filter(|call| call.is_mutation()).collect()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Fill the entire framebuffer with a color
    pub fn fill(&mut self, color: [u8; 3]) {
        for chunk in self.buffer.chunks_exact_mut(3) {
            chunk.copy_from_slice(&color);
        }
    }

    /// Draw a filled rectangle
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 3]) {
        for py in y..(y + h).min(self.height) {
            for px in x..(x + w).min(self.width) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Draw text using font8x8 glyphs
    ///
    /// Each character is 8x8 pixels. Text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 3], bg: [u8; 3]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.width {
                break;
            }
            self.draw_char(cursor_x, y, ch, fg, bg);
            cursor_x += 8;
        }
    }

    fn draw_char(&mut self, x: u32, y: u32, ch: char, fg: [u8; 3], bg: [u8; 3]) {
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            let py = y + row_idx as u32;
            if py >= self.height {
                break;
            }
            for bit in 0..8 {
                let px = x + bit;
                if px >= self.width {
                    break;
                }
                // font8x8 stores LSB as leftmost pixel
                let color = if (row >> bit) & 1 == 1 { fg } else { bg };
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Get the color of a pixel
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0];
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        [self.buffer[idx], self.buffer[idx + 1], self.buffer[idx + 2]]
    }

    /// Set the color of a pixel
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.buffer[idx..idx + 3].copy_from_slice(&color);
    }

    /// Encode the framebuffer as PNG bytes
    pub fn to_png(&self) -> DeviceResult<Vec<u8>> {
        let img: RgbImage = ImageBuffer::from_raw(self.width, self.height, self.buffer.clone())
            .ok_or_else(|| DeviceError::Image("framebuffer size mismatch".to_string()))?;
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        Ok(bytes)
    }

    fn draw_marker(&mut self, point: Point, color: [u8; 3]) {
        let x = point.x.saturating_sub(MARKER_RADIUS);
        let y = point.y.saturating_sub(MARKER_RADIUS);
        self.draw_rect(x, y, MARKER_RADIUS * 2, MARKER_RADIUS * 2, color);
    }

    fn next_text_row(&mut self) -> u32 {
        let row = self.text_row;
        self.text_row += LINE_HEIGHT;
        if self.text_row + LINE_HEIGHT > self.height {
            self.text_row = LINE_HEIGHT * 2;
        }
        row
    }

    fn mutate(&mut self, call: DeviceCall) -> DeviceResult<()> {
        self.calls.push(call.clone());
        if let Some(message) = &self.failure {
            return Err(DeviceError::command(format!("{:?}", call), message.clone()));
        }
        match call {
            DeviceCall::Tap(point) => self.draw_marker(point, TAP_COLOR),
            DeviceCall::Swipe { start, end, .. } => {
                self.draw_marker(start, SWIPE_COLOR);
                self.draw_marker(end, SWIPE_COLOR);
            }
            DeviceCall::TypeText(text) => {
                let row = self.next_text_row();
                self.draw_text(8, row, &text, TEXT_COLOR, BACKGROUND);
            }
            DeviceCall::PressKey(code) => {
                self.draw_rect(0, 0, self.width, LINE_HEIGHT, KEY_BAR_COLOR);
                self.draw_text(2, 1, &format!("KEY {}", code), TEXT_COLOR, KEY_BAR_COLOR);
            }
            DeviceCall::DismissKeyboard => {
                let band = self.height / 3;
                self.draw_rect(0, self.height - band, self.width, band, BACKGROUND);
                self.draw_text(2, self.height - band, "KEYBOARD HIDDEN", TEXT_COLOR, BACKGROUND);
            }
            DeviceCall::Screenshot | DeviceCall::WindowSize => {}
        }
        Ok(())
    }
}

impl DeviceDriver for MockDevice {
    fn tap(&mut self, point: Point) -> DeviceResult<()> {
        self.mutate(DeviceCall::Tap(point))
    }

    fn swipe(&mut self, start: Point, end: Point, duration: Duration) -> DeviceResult<()> {
        self.mutate(DeviceCall::Swipe {
            start,
            end,
            duration,
        })
    }

    fn type_text(&mut self, text: &str) -> DeviceResult<()> {
        self.mutate(DeviceCall::TypeText(text.to_string()))
    }

    fn press_key(&mut self, code: u32) -> DeviceResult<()> {
        self.mutate(DeviceCall::PressKey(code))
    }

    fn dismiss_keyboard(&mut self) -> DeviceResult<()> {
        self.mutate(DeviceCall::DismissKeyboard)
    }

    fn screenshot(&mut self) -> DeviceResult<Screenshot> {
        self.calls.push(DeviceCall::Screenshot);
        Ok(Screenshot::from_png(self.to_png()?))
    }

    fn window_size(&mut self) -> DeviceResult<ScreenBounds> {
        self.calls.push(DeviceCall::WindowSize);
        Ok(ScreenBounds::new(self.width, self.height))
    }

    fn source_type(&self) -> &str {
        "mock"
    }
}
