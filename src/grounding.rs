//! Grounding service: turns an element description into a pixel coordinate.
//!
//! The default implementation talks to a ShowUI-style model that answers
//! with a relative coordinate such as `[0.49, 0.06]`. The fraction is scaled
//! by the screenshot's own pixel size.

use tracing::{debug, warn};

use crate::screen::{Point, Screenshot};
use crate::vlm::{VlmConfig, chat_completion};

/// Instructions given to the grounding model
pub const SYSTEM_PROMPT: &str = "Based on the screenshot of the page, I give a text description \
and you give its corresponding location. The coordinate represents a clickable location [x, y] \
for an element, which is a relative coordinate on the screenshot, scaled from 0 to 1.";

/// Locator of on-screen elements
pub trait GroundingService {
    /// Pixel coordinate of the element matching `query`, or `None` if not found
    fn locate(&mut self, screenshot: &Screenshot, query: &str) -> Option<Point>;
}

/// Grounding service backed by a chat-completions vision model
#[derive(Debug, Clone)]
pub struct VlmGrounder {
    config: VlmConfig,
}

impl VlmGrounder {
    pub fn new(config: VlmConfig) -> Self {
        Self { config }
    }
}

impl Default for VlmGrounder {
    fn default() -> Self {
        Self::new(VlmConfig::grounding())
    }
}

impl GroundingService for VlmGrounder {
    fn locate(&mut self, screenshot: &Screenshot, query: &str) -> Option<Point> {
        let answer = match chat_completion(&self.config, Some(SYSTEM_PROMPT), query, screenshot.as_bytes()) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("[grounding] request for '{}' failed: {}", query, e);
                return None;
            }
        };
        debug!("[grounding] '{}' -> {}", query, answer.trim());

        let Some((fx, fy)) = parse_fractional_point(&answer) else {
            warn!("[grounding] could not parse a coordinate from '{}'", answer.trim());
            return None;
        };
        let (width, height) = match screenshot.dimensions() {
            Ok(dims) => dims,
            Err(e) => {
                warn!("[grounding] could not read screenshot size: {}", e);
                return None;
            }
        };
        Some(to_pixels(fx, fy, width, height))
    }
}

/// First two numbers of the answer, if both are fractions in `[0, 1]`
pub fn parse_fractional_point(answer: &str) -> Option<(f64, f64)> {
    let mut numbers = answer
        .split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok());

    let x = numbers.next()?;
    let y = numbers.next()?;
    let unit = 0.0..=1.0;
    if unit.contains(&x) && unit.contains(&y) {
        Some((x, y))
    } else {
        None
    }
}

/// Scale a relative coordinate to pixels, truncating
pub fn to_pixels(fx: f64, fy: f64, width: u32, height: u32) -> Point {
    Point::new((fx * width as f64) as u32, (fy * height as f64) as u32)
}
