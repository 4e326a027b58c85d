//! Session artifacts: the per-session directory and its action logs.
//!
//! Every session gets its own directory under the configured base:
//!
//! ```text
//! sessions/open_settings_20261014_093000/
//!   .session.json            metadata (id, goal, created, hostname)
//!   open_settings.txt        human-readable action log
//!   open_settings_action.jsonl  one JSON record per executed or rejected action
//!   screenshot_1.png ...     the screen each proposal was made from
//! ```

use serde_json::json;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::history::Step;
use crate::screen::Screenshot;

/// Longest slug taken from a goal
const MAX_SLUG_LEN: usize = 40;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("could not serialize artifact: {0}")]
    Json(#[from] serde_json::Error),
}

/// Directory holding one session's artifacts
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    /// Directory name, also the session id
    pub id: String,
    pub goal: String,
    /// Root directory for this session
    pub dir: PathBuf,
    slug: String,
}

impl ArtifactDir {
    /// A fresh timestamped directory for `goal` under `base`
    pub fn for_goal(base: impl AsRef<Path>, goal: &str) -> Self {
        let slug = slugify(goal);
        let id = format!("{}_{}", slug, chrono::Local::now().format("%Y%m%d_%H%M%S"));
        let dir = base.as_ref().join(&id);
        Self {
            id,
            goal: goal.to_string(),
            dir,
            slug,
        }
    }

    /// Use an exact directory
    pub fn in_dir(dir: impl Into<PathBuf>, goal: &str) -> Self {
        let dir = dir.into();
        let slug = slugify(goal);
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| slug.clone());
        Self {
            id,
            goal: goal.to_string(),
            dir,
            slug,
        }
    }

    /// Create the directory and write its metadata
    pub fn init(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.dir)?;

        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let metadata = json!({
            "id": self.id,
            "goal": self.goal,
            "created": chrono::Utc::now().to_rfc3339(),
            "hostname": host,
        });
        fs::write(self.metadata_path(), serde_json::to_string_pretty(&metadata)?)?;
        Ok(())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(".session.json")
    }

    pub fn text_log_path(&self) -> PathBuf {
        self.dir.join(format!("{}.txt", self.slug))
    }

    pub fn json_log_path(&self) -> PathBuf {
        self.dir.join(format!("{}_action.jsonl", self.slug))
    }

    pub fn screenshot_path(&self, iteration: usize) -> PathBuf {
        self.dir.join(format!("screenshot_{}.png", iteration))
    }

    /// List all screenshots in the session, in iteration order
    pub fn list_screenshots(&self) -> io::Result<Vec<PathBuf>> {
        let mut shots: Vec<(usize, PathBuf)> = Vec::new();
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let path = entry?.path();
                let index = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .and_then(|name| name.strip_prefix("screenshot_"))
                    .and_then(|rest| rest.strip_suffix(".png"))
                    .and_then(|n| n.parse().ok());
                if let Some(index) = index {
                    shots.push((index, path));
                }
            }
        }
        shots.sort();
        Ok(shots.into_iter().map(|(_, path)| path).collect())
    }
}

/// Turn a goal into a filename-safe slug
pub fn slugify(goal: &str) -> String {
    let mut slug = String::new();
    for c in goal.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "session".to_string()
    } else {
        slug.to_string()
    }
}

/// List session directories under `base`
pub fn list_sessions(base: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let base = base.as_ref();
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in fs::read_dir(base)? {
        let path = entry?.path();
        if path.is_dir() && path.join(".session.json").exists() {
            sessions.push(path);
        }
    }
    sessions.sort();
    Ok(sessions)
}

/// Sink for the session's action trail
///
/// Implementations never fail the session; write problems are theirs to report.
pub trait ActionLog {
    /// An approved action was executed
    fn record_step(&mut self, step: &Step);

    /// The operator rejected a proposal
    fn record_rejection(&mut self, raw_proposal: &str);

    /// The screen a proposal was requested for
    fn save_screenshot(&mut self, iteration: usize, screenshot: &Screenshot);
}

impl<T: ActionLog + ?Sized> ActionLog for &mut T {
    fn record_step(&mut self, step: &Step) {
        (**self).record_step(step)
    }

    fn record_rejection(&mut self, raw_proposal: &str) {
        (**self).record_rejection(raw_proposal)
    }

    fn save_screenshot(&mut self, iteration: usize, screenshot: &Screenshot) {
        (**self).save_screenshot(iteration, screenshot)
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullActionLog;

impl ActionLog for NullActionLog {
    fn record_step(&mut self, _step: &Step) {}
    fn record_rejection(&mut self, _raw_proposal: &str) {}
    fn save_screenshot(&mut self, _iteration: usize, _screenshot: &Screenshot) {}
}

/// Writes the text and JSON-lines logs into an [`ArtifactDir`]
#[derive(Debug)]
pub struct ActionRecorder {
    dir: ArtifactDir,
}

impl ActionRecorder {
    /// Initialise `dir` and truncate both logs
    pub fn create(dir: ArtifactDir) -> Result<Self, ArtifactError> {
        dir.init()?;
        File::create(dir.text_log_path())?;
        File::create(dir.json_log_path())?;
        debug!("[artifacts] logging to {}", dir.dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &ArtifactDir {
        &self.dir
    }

    fn append(&self, path: &Path, line: &str) {
        let result = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = result {
            warn!("[artifacts] could not write {}: {}", path.display(), e);
        }
    }

    fn append_record(&self, record: serde_json::Value) {
        self.append(&self.dir.json_log_path(), &record.to_string());
    }
}

impl ActionLog for ActionRecorder {
    fn record_step(&mut self, step: &Step) {
        self.append(&self.dir.text_log_path(), &step.log_line());
        self.append_record(json!({
            "timestamp": step.recorded_at.to_rfc3339(),
            "outcome": "executed",
            "action": step.action,
            "coordinates": step.coordinates,
            "settled": step.settled,
        }));
    }

    fn record_rejection(&mut self, raw_proposal: &str) {
        let folded = crate::action::feedback_form(raw_proposal);
        self.append(&self.dir.text_log_path(), &format!("REJECTED {}", folded));

        let action = serde_json::from_str::<serde_json::Value>(raw_proposal.trim())
            .unwrap_or_else(|_| serde_json::Value::String(folded));
        self.append_record(json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "outcome": "rejected",
            "action": action,
            "coordinates": [],
        }));
    }

    fn save_screenshot(&mut self, iteration: usize, screenshot: &Screenshot) {
        let path = self.dir.screenshot_path(iteration);
        if let Err(e) = fs::write(&path, screenshot.as_bytes()) {
            warn!("[artifacts] could not save {}: {}", path.display(), e);
        }
    }
}
