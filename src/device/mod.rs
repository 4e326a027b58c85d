//! Device driver abstraction.
//!
//! This module provides a unified interface over the devices a session can
//! drive:
//! - [`AppiumDevice`] for emulators and phones behind an Appium server
//! - [`MockDevice`] for dry runs and tests with an in-memory framebuffer

pub mod appium;
pub mod mock;

pub use appium::{AppiumConfig, AppiumDevice};
pub use mock::{DeviceCall, MockDevice};

use std::time::Duration;
use thiserror::Error;

use crate::screen::{Point, ScreenBounds, Screenshot};

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Errors raised by a device driver
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The driver could not be reached
    #[error("connection failed: {0}")]
    Connection(String),

    /// The driver rejected or failed a command
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },

    /// The driver answered with something unexpected
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Image encoding or decoding failed
    #[error("image error: {0}")]
    Image(String),
}

impl DeviceError {
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        DeviceError::Command {
            command: command.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for DeviceError {
    fn from(err: reqwest::Error) -> Self {
        DeviceError::Connection(err.to_string())
    }
}

impl From<image::ImageError> for DeviceError {
    fn from(err: image::ImageError) -> Self {
        DeviceError::Image(err.to_string())
    }
}

/// Trait for device drivers
///
/// Every call may fail; callers never assume success.
pub trait DeviceDriver {
    /// Tap once at a point
    fn tap(&mut self, point: Point) -> DeviceResult<()>;

    /// Drag from `start` to `end` over `duration`
    fn swipe(&mut self, start: Point, end: Point, duration: Duration) -> DeviceResult<()>;

    /// Send text to the focused input element
    fn type_text(&mut self, text: &str) -> DeviceResult<()>;

    /// Press a hardware or virtual key code
    fn press_key(&mut self, code: u32) -> DeviceResult<()>;

    /// Dismiss the on-screen keyboard
    fn dismiss_keyboard(&mut self) -> DeviceResult<()>;

    /// Capture the current screen
    fn screenshot(&mut self) -> DeviceResult<Screenshot>;

    /// Current window size in pixels
    fn window_size(&mut self) -> DeviceResult<ScreenBounds>;

    /// Source type identifier (e.g., "appium", "mock")
    fn source_type(&self) -> &str;
}
