//! Swipe geometry for scroll gestures.
//!
//! A scroll starts at a grounded anchor and travels a third of the relevant
//! screen dimension. Direction names follow the content, not the finger:
//! scrolling "up" drags the finger down the screen.
//!
//! Vertical swipes keep an edge buffer of 30% of the screen height. An anchor
//! inside the buffer next to the edge the finger travels towards is pulled
//! back to the buffer boundary, so the swipe always has room to travel.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::screen::{Point, ScreenBounds};

/// Edge buffer as a fraction of the relevant dimension, in tenths
const EDGE_BUFFER_TENTHS: u32 = 3;

/// Swipe travel as a fraction of the relevant dimension
const TRAVEL_DIVISOR: u32 = 3;

/// Requested scroll direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown scroll direction '{0}' (expected up, down, left or right)")]
pub struct UnknownDirection(pub String);

impl FromStr for ScrollDirection {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(UnknownDirection(s.to_string())),
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        };
        f.write_str(name)
    }
}

/// Start and end of a swipe gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipePath {
    pub start: Point,
    pub end: Point,
}

/// Width of the edge buffer for a dimension
pub fn edge_buffer(dimension: u32) -> u32 {
    dimension / 10 * EDGE_BUFFER_TENTHS + dimension % 10 * EDGE_BUFFER_TENTHS / 10
}

/// Compute the swipe for a scroll starting at `anchor`.
///
/// Both returned points lie within `[0, W] x [0, H]`.
pub fn resolve_swipe(anchor: Point, direction: ScrollDirection, bounds: ScreenBounds) -> SwipePath {
    let anchor = bounds.clamp(anchor);
    let (width, height) = (bounds.width, bounds.height);

    let (start, end) = match direction {
        ScrollDirection::Up => {
            let y = anchor.y.min(height - edge_buffer(height));
            let end_y = y.saturating_add(height / TRAVEL_DIVISOR).min(height);
            (Point::new(anchor.x, y), Point::new(anchor.x, end_y))
        }
        ScrollDirection::Down => {
            let y = anchor.y.max(edge_buffer(height));
            let end_y = y.saturating_sub(height / TRAVEL_DIVISOR);
            (Point::new(anchor.x, y), Point::new(anchor.x, end_y))
        }
        ScrollDirection::Left => {
            let end_x = anchor.x.saturating_add(width / TRAVEL_DIVISOR).min(width);
            (anchor, Point::new(end_x, anchor.y))
        }
        ScrollDirection::Right => {
            let end_x = anchor.x.saturating_sub(width / TRAVEL_DIVISOR);
            (anchor, Point::new(end_x, anchor.y))
        }
    };

    SwipePath { start, end }
}
