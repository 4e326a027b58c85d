//! Proposal service: asks a vision model for the next test step.

use tracing::debug;

use crate::screen::Screenshot;
use crate::vlm::{VlmConfig, VlmResult, chat_completion};

/// Number of most recent steps repeated at the end of the prompt
const RECENT_STEPS: usize = 3;

/// Instructions given to the proposal model
pub const SYSTEM_PROMPT: &str = "You are a mobile testing AI. \
You must ONLY output valid JSON in the format:\n\
{\"action\":\"<click|scroll|type|system|terminate>\",\"desc\":\"<3-4 words>\"}.\n\
No code fences or markdown. No extra text.\n\
Supported actions: click, scroll, type, system, terminate.\n\
desc must be 1-4 words max. It can contain any attribute like color, type etc.\n\
For scroll, desc should be 'up', 'down', 'left', or 'right', and a new json key 'start_from' \
should specify the exact element desc of the scroll start position.\n\
In cases of type, the desc should be a mock value based on the field.\n\
For system, desc must be one of: back, home, recent_apps, volume_up, volume_down, power, hide_keyboard.\n\
When the goal has been fully tested, answer with action 'terminate'.\n";

/// Source of next-step proposals
pub trait ProposalService {
    /// Return the raw, untrusted proposal text
    fn propose(
        &mut self,
        screenshot: &Screenshot,
        goal: &str,
        step_history: &str,
        feedback_history: &str,
    ) -> VlmResult<String>;
}

/// Proposal service backed by a chat-completions vision model
#[derive(Debug, Clone)]
pub struct VlmProposer {
    config: VlmConfig,
}

impl VlmProposer {
    pub fn new(config: VlmConfig) -> Self {
        Self { config }
    }
}

impl Default for VlmProposer {
    fn default() -> Self {
        Self::new(VlmConfig::proposal())
    }
}

impl ProposalService for VlmProposer {
    fn propose(
        &mut self,
        screenshot: &Screenshot,
        goal: &str,
        step_history: &str,
        feedback_history: &str,
    ) -> VlmResult<String> {
        let prompt = build_user_prompt(goal, step_history, feedback_history);
        let answer = chat_completion(&self.config, Some(SYSTEM_PROMPT), &prompt, screenshot.as_bytes())?;
        debug!("[proposal] raw answer: {}", answer);
        Ok(answer)
    }
}

/// Build the user prompt: goal, full history, the last few steps, and feedback
pub fn build_user_prompt(goal: &str, step_history: &str, feedback_history: &str) -> String {
    let steps: Vec<&str> = step_history.lines().collect();
    let recent = steps[steps.len().saturating_sub(RECENT_STEPS)..].join("\n");

    format!(
        "Goal: {}\n\
         Previous completed steps on the current device:\n{}\n\
         Last {} actions:\n{}\n\
         User feedback on previous steps:\n{}\n\
         Analyze this image and provide the next important step as minimal JSON.",
        goal,
        or_none(step_history),
        RECENT_STEPS,
        or_none(&recent),
        or_none(feedback_history),
    )
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() { "(none)" } else { text }
}
