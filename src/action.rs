//! Proposed actions and their wire format.
//!
//! The proposal model answers with a single JSON object:
//!
//! ```json
//! {"action": "scroll", "desc": "up", "start_from": "product list"}
//! ```
//!
//! [`validate_proposal`] performs the structural check only: the value is an
//! object, `action` and `desc` are present non-empty strings, and
//! `start_from` is a string when present. [`parse_proposal`] additionally
//! maps `action` onto [`ActionKind`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// What a proposed action does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Scroll,
    Type,
    System,
    Terminate,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Scroll => "scroll",
            Self::Type => "type",
            Self::System => "system",
            Self::Terminate => "terminate",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ProposalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "click" => Ok(Self::Click),
            "scroll" => Ok(Self::Scroll),
            "type" => Ok(Self::Type),
            "system" => Ok(Self::System),
            "terminate" => Ok(Self::Terminate),
            _ => Err(ProposalError::UnknownAction(s.to_string())),
        }
    }
}

/// A structurally valid proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedAction {
    #[serde(rename = "action")]
    pub kind: ActionKind,
    /// Element description, literal text, direction or command name, by kind
    pub desc: String,
    /// Scroll anchor description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_from: Option<String>,
}

impl ProposedAction {
    pub fn new(kind: ActionKind, desc: impl Into<String>) -> Self {
        Self {
            kind,
            desc: desc.into(),
            start_from: None,
        }
    }

    pub fn scroll(direction: impl Into<String>, start_from: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Scroll,
            desc: direction.into(),
            start_from: Some(start_from.into()),
        }
    }

    /// Compact single-line JSON in the wire format
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!("{{\"action\":\"{}\",\"desc\":{:?}}}", self.kind, self.desc)
        })
    }
}

/// Malformed proposal errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProposalError {
    #[error("proposal is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("proposal must be a JSON object")]
    NotAnObject,

    #[error("required key '{0}' is missing")]
    MissingField(&'static str),

    #[error("key '{0}' must be a string")]
    WrongType(&'static str),

    #[error("key '{0}' must not be empty")]
    EmptyField(&'static str),

    #[error("unknown action '{0}'")]
    UnknownAction(String),
}

/// Structural check of a raw proposal
pub fn validate_proposal(raw: &str) -> Result<(), ProposalError> {
    structural_fields(raw).map(|_| ())
}

/// Parse a raw proposal into a [`ProposedAction`]
pub fn parse_proposal(raw: &str) -> Result<ProposedAction, ProposalError> {
    let (action, desc, start_from) = structural_fields(raw)?;
    Ok(ProposedAction {
        kind: action.parse()?,
        desc,
        start_from,
    })
}

fn structural_fields(raw: &str) -> Result<(String, String, Option<String>), ProposalError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| ProposalError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or(ProposalError::NotAnObject)?;

    let required = |key: &'static str| -> Result<String, ProposalError> {
        match object.get(key) {
            None => Err(ProposalError::MissingField(key)),
            Some(Value::String(s)) if s.trim().is_empty() => Err(ProposalError::EmptyField(key)),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(ProposalError::WrongType(key)),
        }
    };

    let action = required("action")?;
    let desc = required("desc")?;
    let start_from = match object.get("start_from") {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(ProposalError::WrongType("start_from")),
    };

    Ok((action, desc, start_from))
}

/// Single-line form of a raw proposal for the feedback history
///
/// JSON proposals are re-serialized compactly; anything else has its line
/// breaks folded into spaces.
pub fn feedback_form(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) => value.to_string(),
        Err(_) => single_line(raw.trim()),
    }
}

/// Collapse line breaks so a value fits on one history line
pub fn single_line(text: &str) -> String {
    text.split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// System commands a `system` action may name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemCommand {
    Back,
    Home,
    RecentApps,
    VolumeUp,
    VolumeDown,
    Power,
    HideKeyboard,
}

impl SystemCommand {
    pub const ALL: [SystemCommand; 7] = [
        Self::Back,
        Self::Home,
        Self::RecentApps,
        Self::VolumeUp,
        Self::VolumeDown,
        Self::Power,
        Self::HideKeyboard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Back => "back",
            Self::Home => "home",
            Self::RecentApps => "recent_apps",
            Self::VolumeUp => "volume_up",
            Self::VolumeDown => "volume_down",
            Self::Power => "power",
            Self::HideKeyboard => "hide_keyboard",
        }
    }

    /// Android key code, or `None` for commands without a key
    pub fn key_code(&self) -> Option<u32> {
        match self {
            Self::Back => Some(4),
            Self::Home => Some(3),
            Self::RecentApps => Some(187),
            Self::VolumeUp => Some(24),
            Self::VolumeDown => Some(25),
            Self::Power => Some(26),
            Self::HideKeyboard => None,
        }
    }
}

impl fmt::Display for SystemCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown system command '{0}'")]
pub struct UnknownSystemCommand(pub String);

impl FromStr for SystemCommand {
    type Err = UnknownSystemCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|command| command.as_str() == name)
            .ok_or_else(|| UnknownSystemCommand(s.to_string()))
    }
}
