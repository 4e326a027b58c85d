//! Append-only action and feedback history of a session.
//!
//! Both sequences render to newline-joined text in insertion order; that text
//! is the context handed to the proposal model on every iteration.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::action::{ActionKind, ProposedAction, single_line};
use crate::screen::Point;

/// One executed action
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// The approved proposal
    pub action: ProposedAction,
    /// Tap point, or swipe start and end
    pub coordinates: Vec<Point>,
    /// Settle outcome for mutating actions, `None` when no wait applies
    pub settled: Option<bool>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub recorded_at: DateTime<Utc>,
}

impl Step {
    pub fn new(action: ProposedAction, coordinates: Vec<Point>, settled: Option<bool>) -> Self {
        Self {
            action,
            coordinates,
            settled,
            recorded_at: Utc::now(),
        }
    }

    /// Past-tense sentence used in the step history
    pub fn describe(&self) -> String {
        let desc = single_line(&self.action.desc);
        match self.action.kind {
            ActionKind::Click => format!("Clicked on {}", desc),
            ActionKind::Scroll => match &self.action.start_from {
                Some(anchor) => format!("Scrolled {} from '{}'", desc, single_line(anchor)),
                None => format!("Scrolled {}", desc),
            },
            ActionKind::Type => format!("Typed '{}'", desc),
            ActionKind::System => format!("Pressed {}", desc),
            ActionKind::Terminate => "Ended the test".to_string(),
        }
    }

    /// Upper-case entry for the human-readable action log
    pub fn log_line(&self) -> String {
        let desc = single_line(&self.action.desc);
        match self.action.kind {
            ActionKind::Scroll => format!(
                "SCROLL {} from {}",
                desc,
                self.action.start_from.as_deref().map(single_line).unwrap_or_default()
            ),
            kind => format!("{} {}", kind.as_str().to_uppercase(), desc),
        }
    }
}

/// Operator verdict on one proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    /// Single-line serialized proposal
    pub action: String,
    pub approved: bool,
}

impl Feedback {
    pub fn describe(&self) -> String {
        let verdict = if self.approved { "approved" } else { "rejected" };
        format!("{}: {}", verdict, self.action)
    }
}

/// Ordered steps and feedback for one session
#[derive(Debug, Clone, Default, Serialize)]
pub struct History {
    steps: Vec<Step>,
    feedback: Vec<Feedback>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn steps_as_text(&self) -> String {
        self.steps
            .iter()
            .map(Step::describe)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn add_feedback(&mut self, serialized_action: impl Into<String>, approved: bool) {
        self.feedback.push(Feedback {
            action: single_line(&serialized_action.into()),
            approved,
        });
    }

    pub fn feedback(&self) -> &[Feedback] {
        &self.feedback
    }

    pub fn feedback_as_text(&self) -> String {
        self.feedback
            .iter()
            .map(Feedback::describe)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
