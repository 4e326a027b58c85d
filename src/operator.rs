//! The approval gate: showing proposals to a human and reading verdicts.

use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io::{self, BufRead, Write};
use std::str::FromStr;

/// Operator verdict on a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Quit,
}

/// Response text that is not a recognised decision
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid response '{0}' (expected yes, no or quit)")]
pub struct InvalidDecision(pub String);

impl FromStr for Decision {
    type Err = InvalidDecision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yes" | "y" | "approve" => Ok(Decision::Approve),
            "no" | "n" | "reject" => Ok(Decision::Reject),
            "quit" | "q" | "exit" => Ok(Decision::Quit),
            _ => Err(InvalidDecision(s.trim().to_string())),
        }
    }
}

/// Human at the approval gate
pub trait Operator {
    /// Show `proposal` and return one raw response line, `None` at end of input
    fn review(&mut self, proposal: &str) -> io::Result<Option<String>>;

    /// Told when the last response was not a decision
    fn invalid_response(&mut self, _response: &str) -> io::Result<()> {
        Ok(())
    }
}

/// Operator on a terminal
pub struct ConsoleOperator<R, W> {
    input: R,
    output: W,
}

impl ConsoleOperator<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Print `question` and read an answer line
    pub fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        execute!(
            self.output,
            SetForegroundColor(Color::Yellow),
            Print(question),
            ResetColor
        )?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn review(&mut self, proposal: &str) -> io::Result<Option<String>> {
        execute!(
            self.output,
            Print("\n"),
            SetForegroundColor(Color::Cyan),
            Print("Suggested next step: "),
            ResetColor,
            Print(proposal.trim()),
            Print("\n")
        )?;
        self.ask("Approve this step? (yes/no/quit): ")
    }

    fn invalid_response(&mut self, response: &str) -> io::Result<()> {
        execute!(
            self.output,
            SetForegroundColor(Color::Red),
            Print(format!("Unrecognised answer '{}'. Please enter yes, no or quit.\n", response.trim())),
            ResetColor
        )
    }
}
