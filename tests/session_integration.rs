//! End-to-end session tests with scripted collaborators

use pretty_assertions::assert_eq;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mobile_vision::artifacts::{ActionRecorder, ArtifactDir};
use mobile_vision::device::{DeviceCall, DeviceDriver, DeviceError, DeviceResult};
use mobile_vision::executor::ActionExecutor;
use mobile_vision::grounding::GroundingService;
use mobile_vision::operator::Operator;
use mobile_vision::orchestrator::{Orchestrator, SessionError};
use mobile_vision::proposal::ProposalService;
use mobile_vision::screen::{Point, ScreenBounds, Screenshot};
use mobile_vision::session::{Session, SessionState, TerminationReason};
use mobile_vision::settle::SettleDetector;
use mobile_vision::vlm::{VlmError, VlmResult};

const SETTINGS_CLICK: &str = r#"{"action":"click","desc":"settings icon"}"#;

/// Proposal service answering from a script
#[derive(Default)]
struct ScriptedProposer {
    answers: VecDeque<String>,
    /// (step history, feedback history) per call
    prompts: Vec<(String, String)>,
}

impl ScriptedProposer {
    fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            prompts: Vec::new(),
        }
    }
}

impl ProposalService for ScriptedProposer {
    fn propose(
        &mut self,
        _screenshot: &Screenshot,
        goal: &str,
        step_history: &str,
        feedback_history: &str,
    ) -> VlmResult<String> {
        assert!(!goal.is_empty());
        self.prompts.push((step_history.to_string(), feedback_history.to_string()));
        self.answers
            .pop_front()
            .ok_or_else(|| VlmError::InvalidResponse("script exhausted".to_string()))
    }
}

/// Grounding service with a fixed answer table
#[derive(Default)]
struct TableGrounding {
    answers: HashMap<String, Point>,
    queries: Vec<String>,
}

impl TableGrounding {
    fn with(mut self, query: &str, point: Point) -> Self {
        self.answers.insert(query.to_string(), point);
        self
    }
}

impl GroundingService for TableGrounding {
    fn locate(&mut self, _screenshot: &Screenshot, query: &str) -> Option<Point> {
        self.queries.push(query.to_string());
        self.answers.get(query).copied()
    }
}

/// Operator answering from a script, then closing its input
#[derive(Default)]
struct ScriptedOperator {
    responses: VecDeque<String>,
    shown: Vec<String>,
    invalid: Vec<String>,
}

impl ScriptedOperator {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: responses.iter().map(|r| r.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl Operator for ScriptedOperator {
    fn review(&mut self, proposal: &str) -> io::Result<Option<String>> {
        self.shown.push(proposal.to_string());
        Ok(self.responses.pop_front())
    }

    fn invalid_response(&mut self, response: &str) -> io::Result<()> {
        self.invalid.push(response.to_string());
        Ok(())
    }
}

/// Device with a constant screen that records every call
struct FakePhone {
    bounds: ScreenBounds,
    calls: Vec<DeviceCall>,
    fail_mutations: bool,
    fail_screenshots: bool,
    /// Every capture differs from the last
    flicker: bool,
}

impl FakePhone {
    fn new(width: u32, height: u32) -> Self {
        Self {
            bounds: ScreenBounds::new(width, height),
            calls: Vec::new(),
            fail_mutations: false,
            fail_screenshots: false,
            flicker: false,
        }
    }

    fn mutations(&self) -> Vec<DeviceCall> {
        self.calls.iter().filter(|c| c.is_mutation()).cloned().collect()
    }

    fn screenshots(&self) -> usize {
        self.calls.iter().filter(|c| **c == DeviceCall::Screenshot).count()
    }

    fn mutate(&mut self, call: DeviceCall) -> DeviceResult<()> {
        self.calls.push(call);
        if self.fail_mutations {
            return Err(DeviceError::command("action", "instrumentation crashed"));
        }
        Ok(())
    }
}

impl DeviceDriver for FakePhone {
    fn tap(&mut self, point: Point) -> DeviceResult<()> {
        self.mutate(DeviceCall::Tap(point))
    }

    fn swipe(&mut self, start: Point, end: Point, duration: Duration) -> DeviceResult<()> {
        self.mutate(DeviceCall::Swipe { start, end, duration })
    }

    fn type_text(&mut self, text: &str) -> DeviceResult<()> {
        self.mutate(DeviceCall::TypeText(text.to_string()))
    }

    fn press_key(&mut self, code: u32) -> DeviceResult<()> {
        self.mutate(DeviceCall::PressKey(code))
    }

    fn dismiss_keyboard(&mut self) -> DeviceResult<()> {
        self.mutate(DeviceCall::DismissKeyboard)
    }

    fn screenshot(&mut self) -> DeviceResult<Screenshot> {
        self.calls.push(DeviceCall::Screenshot);
        if self.fail_screenshots {
            return Err(DeviceError::Connection("adb offline".to_string()));
        }
        if self.flicker {
            return Ok(Screenshot::from_png(format!("frame {}", self.calls.len()).into_bytes()));
        }
        Ok(Screenshot::from_png(b"static frame".to_vec()))
    }

    fn window_size(&mut self) -> DeviceResult<ScreenBounds> {
        self.calls.push(DeviceCall::WindowSize);
        Ok(self.bounds)
    }

    fn source_type(&self) -> &str {
        "fake"
    }
}

fn fast_executor() -> ActionExecutor {
    ActionExecutor::new(
        SettleDetector::new(Duration::from_secs(2), Duration::ZERO),
        Duration::from_millis(800),
    )
}

fn run_session(
    proposer: &mut ScriptedProposer,
    grounding: &mut TableGrounding,
    device: &mut FakePhone,
    operator: &mut ScriptedOperator,
    goal: &str,
) -> Result<Session, SessionError> {
    Orchestrator::new(proposer, grounding, device, operator)
        .with_executor(fast_executor())
        .run(goal)
}

#[test]
fn test_click_end_to_end() {
    let mut proposer = ScriptedProposer::new(&[SETTINGS_CLICK, r#"{"action":"click","desc":"wifi"}"#]);
    let mut grounding = TableGrounding::default().with("click on settings icon", Point::new(120, 340));
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["yes", "quit"]);

    let session = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "open settings").unwrap();

    assert_eq!(device.mutations(), vec![DeviceCall::Tap(Point::new(120, 340))]);
    // one capture per iteration plus two settle polls
    assert_eq!(device.screenshots(), 4);
    assert_eq!(grounding.queries, vec!["click on settings icon"]);

    let steps = session.history.steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].coordinates, vec![Point::new(120, 340)]);
    assert_eq!(steps[0].settled, Some(true));
    assert_eq!(session.termination, Some(TerminationReason::Quit));
    assert_eq!(session.state, SessionState::Terminated);

    assert_eq!(proposer.prompts[0], (String::new(), String::new()));
    assert_eq!(
        proposer.prompts[1],
        (
            "Clicked on settings icon".to_string(),
            format!("approved: {}", SETTINGS_CLICK)
        )
    );
}

#[test]
fn test_scroll_near_bottom_edge_clamps_start() {
    let mut proposer = ScriptedProposer::new(&[
        r#"{"action":"scroll","desc":"up","start_from":"product list"}"#,
        SETTINGS_CLICK,
    ]);
    let mut grounding = TableGrounding::default().with("find product list", Point::new(200, 1800));
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["y", "q"]);

    let session = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "browse").unwrap();

    assert_eq!(
        device.mutations(),
        vec![DeviceCall::Swipe {
            start: Point::new(200, 1680),
            end: Point::new(200, 2400),
            duration: Duration::from_millis(800),
        }]
    );
    assert_eq!(
        session.history.steps()[0].coordinates,
        vec![Point::new(200, 1680), Point::new(200, 2400)]
    );
    assert_eq!(session.history.steps_as_text(), "Scrolled up from 'product list'");
}

#[test]
fn test_quit_records_no_feedback() {
    let mut proposer = ScriptedProposer::new(&[SETTINGS_CLICK]);
    let mut grounding = TableGrounding::default();
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["quit"]);

    let session = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap();

    assert!(session.history.feedback().is_empty());
    assert!(session.history.steps().is_empty());
    assert!(device.mutations().is_empty());
    assert_eq!(session.termination, Some(TerminationReason::Quit));
}

#[test]
fn test_reject_records_one_feedback_and_never_touches_device() {
    let mut proposer = ScriptedProposer::new(&[SETTINGS_CLICK, SETTINGS_CLICK]);
    let mut grounding = TableGrounding::default().with("click on settings icon", Point::new(1, 1));
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["no", "q"]);

    let session = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap();

    let feedback = session.history.feedback();
    assert_eq!(feedback.len(), 1);
    assert!(!feedback[0].approved);
    assert!(device.mutations().is_empty());
    assert!(grounding.queries.is_empty());
    // a fresh screenshot is taken for the next proposal
    assert_eq!(device.screenshots(), 2);
    assert_eq!(proposer.prompts[1].1, format!("rejected: {}", SETTINGS_CLICK));
}

#[test]
fn test_invalid_input_represents_same_proposal() {
    let mut proposer = ScriptedProposer::new(&[r#"{"action":"type","desc":"hello"}"#, SETTINGS_CLICK]);
    let mut grounding = TableGrounding::default();
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["maybe", "", "yes", "quit"]);

    let session = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap();

    assert_eq!(operator.invalid, vec!["maybe", ""]);
    assert_eq!(operator.shown[0], operator.shown[1]);
    assert_eq!(operator.shown[1], operator.shown[2]);
    assert_eq!(proposer.prompts.len(), 2);
    assert_eq!(session.history.feedback().len(), 1);
    assert_eq!(device.mutations(), vec![DeviceCall::TypeText("hello".to_string())]);
}

#[test]
fn test_approved_terminate_ends_session() {
    let mut proposer = ScriptedProposer::new(&[r#"{"action":"terminate","desc":"goal reached"}"#]);
    let mut grounding = TableGrounding::default();
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["approve"]);

    let session = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap();

    assert_eq!(session.termination, Some(TerminationReason::Terminated));
    assert_eq!(session.history.feedback().len(), 1);
    assert!(session.history.steps().is_empty());
    assert!(device.mutations().is_empty());
}

#[test]
fn test_malformed_proposal_is_presented_and_skipped() {
    let mut proposer = ScriptedProposer::new(&["Sure! Tap the blue button.", SETTINGS_CLICK]);
    let mut grounding = TableGrounding::default();
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["yes", "quit"]);

    let session = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap();

    assert_eq!(operator.shown[0], "Sure! Tap the blue button.");
    assert_eq!(session.history.feedback().len(), 1);
    assert!(session.history.feedback()[0].approved);
    assert!(session.history.steps().is_empty());
    assert!(device.mutations().is_empty());
    assert_eq!(proposer.prompts.len(), 2);
}

#[test]
fn test_failures_after_approval_keep_the_loop_running() {
    let mut proposer = ScriptedProposer::new(&[
        r#"{"action":"click","desc":"missing button"}"#,
        r#"{"action":"scroll","desc":"down"}"#,
        r#"{"action":"system","desc":"reboot"}"#,
        r#"{"action":"system","desc":"BACK"}"#,
        SETTINGS_CLICK,
    ]);
    let mut grounding = TableGrounding::default();
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["yes", "yes", "yes", "yes", "quit"]);

    let session = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap();

    assert_eq!(grounding.queries, vec!["click on missing button"]);
    assert_eq!(device.mutations(), vec![DeviceCall::PressKey(4)]);
    assert_eq!(session.history.steps_as_text(), "Pressed BACK");
    assert_eq!(session.history.feedback().len(), 4);
    assert_eq!(session.iterations, 5);
}

#[test]
fn test_device_error_is_not_recorded_as_step() {
    let mut proposer = ScriptedProposer::new(&[SETTINGS_CLICK, SETTINGS_CLICK]);
    let mut grounding = TableGrounding::default().with("click on settings icon", Point::new(5, 5));
    let mut device = FakePhone::new(1080, 2400);
    device.fail_mutations = true;
    let mut operator = ScriptedOperator::new(&["yes", "quit"]);

    let session = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap();

    assert_eq!(device.mutations(), vec![DeviceCall::Tap(Point::new(5, 5))]);
    assert!(session.history.steps().is_empty());
    assert_eq!(session.termination, Some(TerminationReason::Quit));
}

#[test]
fn test_closed_input_ends_session() {
    let mut proposer = ScriptedProposer::new(&[SETTINGS_CLICK]);
    let mut grounding = TableGrounding::default();
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&[]);

    let session = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap();

    assert_eq!(session.termination, Some(TerminationReason::InputClosed));
    assert!(session.history.feedback().is_empty());
}

#[test]
fn test_collaborator_failures_before_the_gate_are_fatal() {
    let mut proposer = ScriptedProposer::new(&[]);
    let mut grounding = TableGrounding::default();
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["yes"]);

    let err = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap_err();
    assert!(matches!(err, SessionError::Proposal(_)));
    assert!(operator.shown.is_empty());

    let mut proposer = ScriptedProposer::new(&[SETTINGS_CLICK]);
    device.fail_screenshots = true;
    let err = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap_err();
    assert!(matches!(err, SessionError::Capture(_)));
    assert!(proposer.prompts.is_empty());
}

#[test]
fn test_history_counts_after_mixed_verdicts() {
    let typed = |text: &str| format!(r#"{{"action":"type","desc":"{}"}}"#, text);
    let answers = [typed("one"), typed("skip"), typed("two"), typed("skip"), typed("three"), typed("end")];
    let answers: Vec<&str> = answers.iter().map(String::as_str).collect();
    let mut proposer = ScriptedProposer::new(&answers);
    let mut grounding = TableGrounding::default();
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["yes", "no", "yes", "no", "yes", "quit"]);

    let session = run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap();

    assert_eq!(session.history.steps_as_text(), "Typed 'one'\nTyped 'two'\nTyped 'three'");
    assert_eq!(session.history.feedback_as_text().lines().count(), 5);
    assert_eq!(
        session.history.feedback().iter().filter(|f| f.approved).count(),
        3
    );
}

#[test]
fn test_action_recorder_receives_executed_and_rejected_actions() {
    let base = tempfile::tempdir().unwrap();
    let dir = ArtifactDir::in_dir(base.path().join("session"), "open settings");
    let mut recorder = ActionRecorder::create(dir.clone()).unwrap();

    let mut proposer = ScriptedProposer::new(&[r#"{"action":"click","desc":"ads"}"#, SETTINGS_CLICK, SETTINGS_CLICK]);
    let mut grounding = TableGrounding::default().with("click on settings icon", Point::new(120, 340));
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["no", "yes", "quit"]);

    Orchestrator::new(&mut proposer, &mut grounding, &mut device, &mut operator)
        .with_executor(fast_executor())
        .with_log(&mut recorder)
        .run("open settings")
        .unwrap();

    let text = fs::read_to_string(dir.text_log_path()).unwrap();
    assert_eq!(text, "REJECTED {\"action\":\"click\",\"desc\":\"ads\"}\nCLICK settings icon\n");

    let jsonl = fs::read_to_string(dir.json_log_path()).unwrap();
    let outcomes: Vec<String> = jsonl
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["outcome"].to_string())
        .collect();
    assert_eq!(outcomes, vec!["\"rejected\"", "\"executed\""]);
    assert_eq!(dir.list_screenshots().unwrap().len(), 3);
}

#[test]
fn test_settle_timeout_records_step_and_continues() {
    let mut proposer = ScriptedProposer::new(&[SETTINGS_CLICK, SETTINGS_CLICK]);
    let mut grounding = TableGrounding::default().with("click on settings icon", Point::new(120, 340));
    let mut device = FakePhone::new(1080, 2400);
    device.flicker = true;
    let mut operator = ScriptedOperator::new(&["yes", "quit"]);

    let executor = ActionExecutor::new(
        SettleDetector::new(Duration::from_millis(40), Duration::from_millis(5)),
        Duration::from_millis(800),
    );
    let session = Orchestrator::new(&mut proposer, &mut grounding, &mut device, &mut operator)
        .with_executor(executor)
        .run("open settings")
        .unwrap();

    let steps = session.history.steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].settled, Some(false));
    // the next proposal saw the step
    assert_eq!(proposer.prompts.len(), 2);
    assert_eq!(proposer.prompts[1].0, "Clicked on settings icon");
    assert_eq!(operator.shown.len(), 2);
    assert_eq!(session.termination, Some(TerminationReason::Quit));
}

/// Log sink shared with a test subscriber
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_approved_malformed_proposal_is_classified_once() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    let mut proposer = ScriptedProposer::new(&["Sure! Tap the blue button.", SETTINGS_CLICK]);
    let mut grounding = TableGrounding::default();
    let mut device = FakePhone::new(1080, 2400);
    let mut operator = ScriptedOperator::new(&["yes", "quit"]);

    tracing::subscriber::with_default(subscriber, || {
        run_session(&mut proposer, &mut grounding, &mut device, &mut operator, "goal").unwrap();
    });

    let text = logs.text();
    assert_eq!(text.matches("MalformedProposal").count(), 1);
    assert_eq!(text.matches("approved proposal not executed").count(), 1);
}
