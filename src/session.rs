//! Session state and summary.

use serde::Serialize;
use std::fmt;

use crate::history::History;

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    AwaitingProposal,
    AwaitingApproval,
    Executing,
    Terminated,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (AwaitingProposal, AwaitingApproval)
                | (AwaitingApproval, AwaitingProposal)
                | (AwaitingApproval, Executing)
                | (AwaitingApproval, Terminated)
                | (Executing, AwaitingProposal)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Terminated
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TerminationReason {
    /// The operator answered quit
    Quit,
    /// An approved proposal asked to terminate
    Terminated,
    /// Operator input reached end of file
    InputClosed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Quit => "operator quit",
            Self::Terminated => "terminate action approved",
            Self::InputClosed => "operator input closed",
        };
        f.write_str(text)
    }
}

/// One test session: goal, history and lifecycle state
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub goal: String,
    pub history: History,
    pub state: SessionState,
    pub termination: Option<TerminationReason>,
    /// Proposals requested so far
    pub iterations: usize,
}

impl Session {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            history: History::new(),
            state: SessionState::AwaitingProposal,
            termination: None,
            iterations: 0,
        }
    }

    /// Move to `next`; illegal transitions are a programming error
    pub fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    pub fn terminate(&mut self, reason: TerminationReason) {
        self.transition(SessionState::Terminated);
        self.termination = Some(reason);
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }
}
