//! Action resolution: from a proposed action to concrete device operations.

use thiserror::Error;
use tracing::debug;

use crate::action::{ActionKind, ProposedAction, SystemCommand, UnknownSystemCommand};
use crate::device::{DeviceDriver, DeviceError};
use crate::geometry::{ScrollDirection, SwipePath, UnknownDirection, resolve_swipe};
use crate::grounding::GroundingService;
use crate::screen::{Point, Screenshot};

/// A proposal converted into directly executable terms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedAction {
    Tap {
        point: Point,
    },
    Swipe {
        direction: ScrollDirection,
        anchor: Point,
        path: SwipePath,
    },
    TypeText {
        text: String,
    },
    System {
        command: SystemCommand,
    },
}

impl ResolvedAction {
    /// Coordinates recorded in the step history
    pub fn coordinates(&self) -> Vec<Point> {
        match self {
            Self::Tap { point } => vec![*point],
            Self::Swipe { path, .. } => vec![path.start, path.end],
            Self::TypeText { .. } | Self::System { .. } => Vec::new(),
        }
    }
}

/// Reasons a proposal cannot be turned into device operations
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("grounding found nothing for '{query}'")]
    NotFound { query: String },

    #[error("scroll requires a 'start_from' anchor")]
    MissingAnchor,

    #[error(transparent)]
    UnknownDirection(#[from] UnknownDirection),

    #[error(transparent)]
    UnknownSystemCommand(#[from] UnknownSystemCommand),

    #[error("could not read screen bounds: {0}")]
    Bounds(#[source] DeviceError),

    #[error("'{0}' actions are not executed")]
    NotExecutable(ActionKind),
}

/// Resolve `action` against the current screenshot
///
/// Grounding is queried at most once; nothing is retried.
pub fn resolve_action(
    action: &ProposedAction,
    screenshot: &Screenshot,
    grounding: &mut dyn GroundingService,
    device: &mut dyn DeviceDriver,
) -> Result<ResolvedAction, ResolutionError> {
    match action.kind {
        ActionKind::Click => {
            let point = locate(grounding, screenshot, format!("click on {}", action.desc))?;
            Ok(ResolvedAction::Tap { point })
        }
        ActionKind::Scroll => {
            let anchor_desc = action
                .start_from
                .as_deref()
                .filter(|anchor| !anchor.trim().is_empty())
                .ok_or(ResolutionError::MissingAnchor)?;
            let direction: ScrollDirection = action.desc.parse()?;
            let anchor = locate(grounding, screenshot, format!("find {}", anchor_desc))?;
            let bounds = device.window_size().map_err(ResolutionError::Bounds)?;
            let path = resolve_swipe(anchor, direction, bounds);
            debug!(
                "[resolver] scroll {} from {} on {}x{}: {} -> {}",
                direction, anchor, bounds.width, bounds.height, path.start, path.end
            );
            Ok(ResolvedAction::Swipe { direction, anchor, path })
        }
        ActionKind::Type => Ok(ResolvedAction::TypeText {
            text: action.desc.clone(),
        }),
        ActionKind::System => Ok(ResolvedAction::System {
            command: action.desc.parse()?,
        }),
        ActionKind::Terminate => Err(ResolutionError::NotExecutable(ActionKind::Terminate)),
    }
}

fn locate(
    grounding: &mut dyn GroundingService,
    screenshot: &Screenshot,
    query: String,
) -> Result<Point, ResolutionError> {
    match grounding.locate(screenshot, &query) {
        Some(point) => {
            debug!("[resolver] '{}' -> {}", query, point);
            Ok(point)
        }
        None => Err(ResolutionError::NotFound { query }),
    }
}
