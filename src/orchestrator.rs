//! The session control loop.
//!
//! Each iteration runs screenshot → proposal → approval gate, and on
//! approval resolution → execution → settle → history update. Everything
//! after the approval gate is non-fatal: failures are logged and the loop
//! asks for the next proposal. Only the operator (quit, or approving a
//! terminate action) ends a session.

use std::io;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::action::{ActionKind, feedback_form, parse_proposal, validate_proposal};
use crate::artifacts::{ActionLog, NullActionLog};
use crate::device::{DeviceDriver, DeviceError};
use crate::executor::ActionExecutor;
use crate::grounding::GroundingService;
use crate::operator::{Decision, Operator};
use crate::proposal::ProposalService;
use crate::resolver::resolve_action;
use crate::screen::Screenshot;
use crate::session::{Session, SessionState, TerminationReason};
use crate::vlm::VlmError;

/// A collaborator failure that makes continuing pointless
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("screenshot capture failed: {0}")]
    Capture(#[source] DeviceError),

    #[error("proposal service failed: {0}")]
    Proposal(#[source] VlmError),

    #[error("operator input failed: {0}")]
    Operator(#[source] io::Error),
}

/// Drives one session against borrowed collaborators
pub struct Orchestrator<'a> {
    proposer: &'a mut dyn ProposalService,
    grounding: &'a mut dyn GroundingService,
    device: &'a mut dyn DeviceDriver,
    operator: &'a mut dyn Operator,
    log: Box<dyn ActionLog + 'a>,
    executor: ActionExecutor,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        proposer: &'a mut dyn ProposalService,
        grounding: &'a mut dyn GroundingService,
        device: &'a mut dyn DeviceDriver,
        operator: &'a mut dyn Operator,
    ) -> Self {
        Self {
            proposer,
            grounding,
            device,
            operator,
            log: Box::new(NullActionLog),
            executor: ActionExecutor::default(),
        }
    }

    /// Record the action trail to `log`
    pub fn with_log(mut self, log: &'a mut dyn ActionLog) -> Self {
        self.log = Box::new(log);
        self
    }

    pub fn with_executor(mut self, executor: ActionExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Run a session for `goal` until the operator ends it
    pub fn run(&mut self, goal: &str) -> Result<Session, SessionError> {
        let mut session = Session::new(goal);
        info!("[session] starting session for goal: {}", goal);

        while !session.is_terminated() {
            self.iterate(&mut session)?;
        }

        info!(
            "[session] finished after {} iterations: {} steps, {} feedback entries ({})",
            session.iterations,
            session.history.steps().len(),
            session.history.feedback().len(),
            session.termination.map(|r| r.to_string()).unwrap_or_default(),
        );
        Ok(session)
    }

    fn iterate(&mut self, session: &mut Session) -> Result<(), SessionError> {
        session.iterations += 1;

        let screenshot = self.device.screenshot().map_err(SessionError::Capture)?;
        self.log.save_screenshot(session.iterations, &screenshot);

        let raw = self
            .proposer
            .propose(
                &screenshot,
                &session.goal,
                &session.history.steps_as_text(),
                &session.history.feedback_as_text(),
            )
            .map_err(SessionError::Proposal)?;
        session.transition(SessionState::AwaitingApproval);
        info!("[session] proposal {}: {}", session.iterations, raw.trim());

        if let Err(e) = validate_proposal(&raw) {
            warn!("[session] MalformedProposal: {} (presenting it anyway)", e);
        }

        match self.await_decision(&raw)? {
            None => {
                info!("[session] operator input closed");
                session.terminate(TerminationReason::InputClosed);
            }
            Some(Decision::Quit) => session.terminate(TerminationReason::Quit),
            Some(Decision::Reject) => {
                session.history.add_feedback(feedback_form(&raw), false);
                self.log.record_rejection(&raw);
                session.transition(SessionState::AwaitingProposal);
            }
            Some(Decision::Approve) => {
                session.history.add_feedback(feedback_form(&raw), true);
                self.handle_approved(session, &raw, &screenshot);
            }
        }
        Ok(())
    }

    /// Re-present the same proposal until the operator gives a decision
    fn await_decision(&mut self, raw: &str) -> Result<Option<Decision>, SessionError> {
        loop {
            let Some(response) = self.operator.review(raw).map_err(SessionError::Operator)? else {
                return Ok(None);
            };
            match response.parse::<Decision>() {
                Ok(decision) => return Ok(Some(decision)),
                Err(e) => {
                    warn!("[session] {}", e);
                    self.operator
                        .invalid_response(&response)
                        .map_err(SessionError::Operator)?;
                }
            }
        }
    }

    fn handle_approved(&mut self, session: &mut Session, raw: &str, screenshot: &Screenshot) {
        let action = match parse_proposal(raw) {
            Ok(action) => action,
            Err(e) => {
                warn!("[session] approved proposal not executed: {}", e);
                session.transition(SessionState::AwaitingProposal);
                return;
            }
        };

        if action.kind == ActionKind::Terminate {
            info!("[session] terminate approved: {}", action.desc);
            session.terminate(TerminationReason::Terminated);
            return;
        }

        session.transition(SessionState::Executing);
        match resolve_action(&action, screenshot, &mut *self.grounding, &mut *self.device) {
            Err(e) => warn!("[session] ResolutionFailure: {}", e),
            Ok(resolved) => match self.executor.execute(&action, &resolved, &mut *self.device) {
                Ok(step) => {
                    self.log.record_step(&step);
                    session.history.add_step(step);
                }
                Err(e) => error!("[session] ExecutionFailure: {}", e),
            },
        }
        session.transition(SessionState::AwaitingProposal);
    }
}
