//! Mobile Vision - human-supervised exploratory testing of mobile apps.
//!
//! This crate provides:
//! - A session loop that asks a vision model for the next step, waits for an
//!   operator to approve it, and executes it on a device
//! - Grounding of element descriptions into screen coordinates
//! - Scroll geometry and screen settle detection
//! - Appium and in-memory device drivers
//! - Per-session artifact directories with text and JSON-lines action logs
//!
//! # Example
//!
//! ```rust,no_run
//! use mobile_vision::device::MockDevice;
//! use mobile_vision::grounding::VlmGrounder;
//! use mobile_vision::operator::ConsoleOperator;
//! use mobile_vision::orchestrator::Orchestrator;
//! use mobile_vision::proposal::VlmProposer;
//!
//! let mut proposer = VlmProposer::default();
//! let mut grounder = VlmGrounder::default();
//! let mut device = MockDevice::new(1080, 2400);
//! let mut operator = ConsoleOperator::stdio();
//!
//! let session = Orchestrator::new(&mut proposer, &mut grounder, &mut device, &mut operator)
//!     .run("open settings")
//!     .unwrap();
//! println!("{}", session.history.steps_as_text());
//! ```

pub mod action;
pub mod artifacts;
pub mod config;
pub mod device;
pub mod executor;
pub mod geometry;
pub mod grounding;
pub mod history;
pub mod operator;
pub mod orchestrator;
pub mod proposal;
pub mod resolver;
pub mod screen;
pub mod session;
pub mod settle;
pub mod vlm;

// Re-export the session loop
pub use orchestrator::{Orchestrator, SessionError};
pub use session::{Session, SessionState, TerminationReason};

// Re-export action model
pub use action::{ActionKind, ProposalError, ProposedAction, SystemCommand, parse_proposal, validate_proposal};
pub use history::{Feedback, History, Step};

// Re-export resolution and execution
pub use executor::{ActionExecutor, ExecutionError};
pub use geometry::{ScrollDirection, SwipePath, resolve_swipe};
pub use resolver::{ResolutionError, ResolvedAction, resolve_action};
pub use settle::{Clock, SettleDetector, SystemClock};

// Re-export collaborators
pub use device::{DeviceDriver, DeviceError, DeviceResult};
pub use grounding::GroundingService;
pub use operator::{Decision, Operator};
pub use proposal::ProposalService;
pub use screen::{Fingerprint, Point, ScreenBounds, Screenshot};

// Re-export artifact management
pub use artifacts::{ActionLog, ActionRecorder, ArtifactDir, NullActionLog, list_sessions};

// Re-export VLM client
pub use vlm::{VlmConfig, VlmError, VlmResult, chat_completion};
