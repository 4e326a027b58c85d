//! Action execution on a device.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::action::ProposedAction;
use crate::config;
use crate::device::{DeviceDriver, DeviceError};
use crate::history::Step;
use crate::resolver::ResolvedAction;
use crate::settle::SettleDetector;

/// A device call failed while performing an action
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{operation} failed: {source}")]
    Device {
        operation: &'static str,
        #[source]
        source: DeviceError,
    },
}

impl ExecutionError {
    fn device(operation: &'static str) -> impl FnOnce(DeviceError) -> Self {
        move |source| ExecutionError::Device { operation, source }
    }
}

/// Performs resolved actions and waits for the screen to settle
#[derive(Debug)]
pub struct ActionExecutor {
    settle: SettleDetector,
    swipe_duration: Duration,
}

impl ActionExecutor {
    pub fn new(settle: SettleDetector, swipe_duration: Duration) -> Self {
        Self { settle, swipe_duration }
    }

    /// Perform `resolved` and return the step to record.
    ///
    /// Taps and swipes wait for the screen to settle; text entry and system
    /// keys do not. A settle timeout still yields a step.
    pub fn execute(
        &self,
        action: &ProposedAction,
        resolved: &ResolvedAction,
        device: &mut dyn DeviceDriver,
    ) -> Result<Step, ExecutionError> {
        let settled = match resolved {
            ResolvedAction::Tap { point } => {
                info!("[executor] tap at {}", point);
                device.tap(*point).map_err(ExecutionError::device("tap"))?;
                Some(self.settle.wait_for_settle(device))
            }
            ResolvedAction::Swipe { direction, path, .. } => {
                info!("[executor] swipe {} from {} to {}", direction, path.start, path.end);
                device
                    .swipe(path.start, path.end, self.swipe_duration)
                    .map_err(ExecutionError::device("swipe"))?;
                Some(self.settle.wait_for_settle(device))
            }
            ResolvedAction::TypeText { text } => {
                info!("[executor] type '{}'", text);
                device.type_text(text).map_err(ExecutionError::device("type_text"))?;
                None
            }
            ResolvedAction::System { command } => {
                info!("[executor] system {}", command);
                match command.key_code() {
                    Some(code) => device.press_key(code).map_err(ExecutionError::device("press_key"))?,
                    None => device
                        .dismiss_keyboard()
                        .map_err(ExecutionError::device("dismiss_keyboard"))?,
                }
                None
            }
        };

        debug!("[executor] {} done (settled: {:?})", action.kind, settled);
        Ok(Step::new(action.clone(), resolved.coordinates(), settled))
    }
}

impl Default for ActionExecutor {
    fn default() -> Self {
        Self::new(SettleDetector::default(), config::get().timing.swipe_duration())
    }
}
