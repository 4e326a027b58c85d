//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for Mobile Vision, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults for a local Appium emulator and hosted models
//! - Builder-style overrides from the command line
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `MOBILE_VISION_PROPOSAL_ENDPOINT` | Proposal model chat-completions URL | `https://api.openai.com/v1/chat/completions` |
//! | `MOBILE_VISION_PROPOSAL_MODEL` | Proposal model name | `gpt-4o` |
//! | `OPENAI_API_KEY` | Bearer token for the proposal model | unset |
//! | `MOBILE_VISION_PROPOSAL_MAX_TOKENS` | Max tokens in a proposal | `300` |
//! | `MOBILE_VISION_PROPOSAL_TEMPERATURE` | Proposal sampling temperature | `0.1` |
//! | `MOBILE_VISION_GROUNDING_ENDPOINT` | Grounding model chat-completions URL | `http://127.0.0.1:8000/v1/chat/completions` |
//! | `MOBILE_VISION_GROUNDING_MODEL` | Grounding model name | `showlab/ShowUI-2B` |
//! | `HUGGINGFACE_API_KEY` | Bearer token for the grounding model | unset |
//! | `MOBILE_VISION_HTTP_TIMEOUT` | Model request timeout in seconds | `120` |
//! | `MOBILE_VISION_APPIUM_SERVER` | Appium server URL | `http://127.0.0.1:4723` |
//! | `MOBILE_VISION_PLATFORM` | `platformName` capability | `Android` |
//! | `MOBILE_VISION_DEVICE_NAME` | `appium:deviceName` capability | `emulator-5554` |
//! | `MOBILE_VISION_AUTOMATION_NAME` | `appium:automationName` capability | `UiAutomator2` |
//! | `MOBILE_VISION_NEW_COMMAND_TIMEOUT` | `appium:newCommandTimeout` in seconds | `600` |
//! | `MOBILE_VISION_SETTLE_TIMEOUT_MS` | Max wait for the screen to settle | `10000` |
//! | `MOBILE_VISION_SETTLE_INTERVAL_MS` | Screenshot polling interval | `500` |
//! | `MOBILE_VISION_SWIPE_DURATION_MS` | Duration of a scroll swipe | `800` |
//! | `MOBILE_VISION_TAP_DURATION_MS` | Press duration of a tap | `100` |
//! | `MOBILE_VISION_SESSION_DIR` | Base directory for session artifacts | `./sessions` |
//!
//! # Example
//!
//! ```bash
//! # Ground against a local ShowUI server and test on a physical device
//! export MOBILE_VISION_GROUNDING_ENDPOINT="http://gpu-box:8000/v1/chat/completions"
//! export MOBILE_VISION_DEVICE_NAME="R58M123ABC"
//! ```

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

// ============================================================================
// Default Values
// ============================================================================

/// Default proposal model endpoint
pub const DEFAULT_PROPOSAL_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default proposal model name
pub const DEFAULT_PROPOSAL_MODEL: &str = "gpt-4o";

/// Default max tokens for a proposal
pub const DEFAULT_PROPOSAL_MAX_TOKENS: u32 = 300;

/// Default proposal temperature
pub const DEFAULT_PROPOSAL_TEMPERATURE: f32 = 0.1;

/// Default grounding model endpoint
pub const DEFAULT_GROUNDING_ENDPOINT: &str = "http://127.0.0.1:8000/v1/chat/completions";

/// Default grounding model name
pub const DEFAULT_GROUNDING_MODEL: &str = "showlab/ShowUI-2B";

/// Default max tokens for a grounding answer (a coordinate pair)
pub const DEFAULT_GROUNDING_MAX_TOKENS: u32 = 64;

/// Default model request timeout (seconds)
pub const DEFAULT_HTTP_TIMEOUT: u64 = 120;

/// Default Appium server
pub const DEFAULT_APPIUM_SERVER: &str = "http://127.0.0.1:4723";

/// Default platform capability
pub const DEFAULT_PLATFORM: &str = "Android";

/// Default device name capability
pub const DEFAULT_DEVICE_NAME: &str = "emulator-5554";

/// Default automation driver
pub const DEFAULT_AUTOMATION_NAME: &str = "UiAutomator2";

/// Default Appium idle timeout (seconds)
pub const DEFAULT_NEW_COMMAND_TIMEOUT: u64 = 600;

/// Default settle timeout (milliseconds)
pub const DEFAULT_SETTLE_TIMEOUT_MS: u64 = 10_000;

/// Default settle polling interval (milliseconds)
pub const DEFAULT_SETTLE_INTERVAL_MS: u64 = 500;

/// Default swipe duration (milliseconds)
pub const DEFAULT_SWIPE_DURATION_MS: u64 = 800;

/// Default tap press duration (milliseconds)
pub const DEFAULT_TAP_DURATION_MS: u64 = 100;

/// Largest accepted mock screen side, in pixels
pub const MAX_SCREEN_SIDE: u32 = 8192;

/// Default session base directory
pub const DEFAULT_SESSION_DIR: &str = "./sessions";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_PROPOSAL_ENDPOINT: &str = "MOBILE_VISION_PROPOSAL_ENDPOINT";
pub const ENV_PROPOSAL_MODEL: &str = "MOBILE_VISION_PROPOSAL_MODEL";
pub const ENV_PROPOSAL_API_KEY: &str = "MOBILE_VISION_PROPOSAL_API_KEY";
pub const ENV_PROPOSAL_MAX_TOKENS: &str = "MOBILE_VISION_PROPOSAL_MAX_TOKENS";
pub const ENV_PROPOSAL_TEMPERATURE: &str = "MOBILE_VISION_PROPOSAL_TEMPERATURE";
pub const ENV_GROUNDING_ENDPOINT: &str = "MOBILE_VISION_GROUNDING_ENDPOINT";
pub const ENV_GROUNDING_MODEL: &str = "MOBILE_VISION_GROUNDING_MODEL";
pub const ENV_GROUNDING_API_KEY: &str = "MOBILE_VISION_GROUNDING_API_KEY";
pub const ENV_HTTP_TIMEOUT: &str = "MOBILE_VISION_HTTP_TIMEOUT";
pub const ENV_APPIUM_SERVER: &str = "MOBILE_VISION_APPIUM_SERVER";
pub const ENV_PLATFORM: &str = "MOBILE_VISION_PLATFORM";
pub const ENV_DEVICE_NAME: &str = "MOBILE_VISION_DEVICE_NAME";
pub const ENV_AUTOMATION_NAME: &str = "MOBILE_VISION_AUTOMATION_NAME";
pub const ENV_NEW_COMMAND_TIMEOUT: &str = "MOBILE_VISION_NEW_COMMAND_TIMEOUT";
pub const ENV_SETTLE_TIMEOUT_MS: &str = "MOBILE_VISION_SETTLE_TIMEOUT_MS";
pub const ENV_SETTLE_INTERVAL_MS: &str = "MOBILE_VISION_SETTLE_INTERVAL_MS";
pub const ENV_SWIPE_DURATION_MS: &str = "MOBILE_VISION_SWIPE_DURATION_MS";
pub const ENV_TAP_DURATION_MS: &str = "MOBILE_VISION_TAP_DURATION_MS";
pub const ENV_SESSION_DIR: &str = "MOBILE_VISION_SESSION_DIR";

// ============================================================================
// Provider Environment Variables
// ============================================================================

/// Conventional OpenAI key variable, checked before `MOBILE_VISION_PROPOSAL_API_KEY`
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Conventional Hugging Face token variable, checked before `MOBILE_VISION_GROUNDING_API_KEY`
pub const ENV_HUGGINGFACE_API_KEY: &str = "HUGGINGFACE_API_KEY";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for Mobile Vision
#[derive(Debug, Clone)]
pub struct Config {
    /// Proposal model settings
    pub proposal: VlmSettings,
    /// Grounding model settings
    pub grounding: VlmSettings,
    /// Appium device settings
    pub device: DeviceSettings,
    /// Action timing settings
    pub timing: TimingSettings,
    /// Session artifact settings
    pub session: SessionSettings,
}

/// Settings for one OpenAI-compatible vision model endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct VlmSettings {
    /// Chat-completions endpoint URL
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Bearer token, if the endpoint requires one
    pub api_key: Option<String>,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout (seconds)
    pub timeout: u64,
}

/// Appium connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSettings {
    /// Appium server URL
    pub appium_server: String,
    /// `platformName` capability
    pub platform_name: String,
    /// `appium:deviceName` capability
    pub device_name: String,
    /// `appium:automationName` capability
    pub automation_name: String,
    /// `appium:newCommandTimeout` capability (seconds)
    pub new_command_timeout: u64,
}

/// Timing of device actions
#[derive(Debug, Clone, PartialEq)]
pub struct TimingSettings {
    pub settle_timeout_ms: u64,
    pub settle_interval_ms: u64,
    pub swipe_duration_ms: u64,
    pub tap_duration_ms: u64,
}

/// Session-related settings
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Base directory for session artifacts
    pub base_dir: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            proposal: VlmSettings::proposal_from_env(),
            grounding: VlmSettings::grounding_from_env(),
            device: DeviceSettings::from_env(),
            timing: TimingSettings::from_env(),
            session: SessionSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            proposal: VlmSettings::proposal_defaults(),
            grounding: VlmSettings::grounding_defaults(),
            device: DeviceSettings::defaults(),
            timing: TimingSettings::defaults(),
            session: SessionSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl VlmSettings {
    /// Proposal model settings from environment variables
    pub fn proposal_from_env() -> Self {
        let defaults = Self::proposal_defaults();
        Self {
            endpoint: env_string(ENV_PROPOSAL_ENDPOINT).unwrap_or(defaults.endpoint),
            model: env_string(ENV_PROPOSAL_MODEL).unwrap_or(defaults.model),
            api_key: env_string(ENV_OPENAI_API_KEY).or_else(|| env_string(ENV_PROPOSAL_API_KEY)),
            max_tokens: env_parse(ENV_PROPOSAL_MAX_TOKENS).unwrap_or(defaults.max_tokens),
            temperature: env_parse(ENV_PROPOSAL_TEMPERATURE).unwrap_or(defaults.temperature),
            timeout: env_parse(ENV_HTTP_TIMEOUT).unwrap_or(defaults.timeout),
        }
    }

    /// Proposal model settings with defaults
    pub fn proposal_defaults() -> Self {
        Self {
            endpoint: DEFAULT_PROPOSAL_ENDPOINT.to_string(),
            model: DEFAULT_PROPOSAL_MODEL.to_string(),
            api_key: None,
            max_tokens: DEFAULT_PROPOSAL_MAX_TOKENS,
            temperature: DEFAULT_PROPOSAL_TEMPERATURE,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Grounding model settings from environment variables
    pub fn grounding_from_env() -> Self {
        let defaults = Self::grounding_defaults();
        Self {
            endpoint: env_string(ENV_GROUNDING_ENDPOINT).unwrap_or(defaults.endpoint),
            model: env_string(ENV_GROUNDING_MODEL).unwrap_or(defaults.model),
            api_key: env_string(ENV_HUGGINGFACE_API_KEY)
                .or_else(|| env_string(ENV_GROUNDING_API_KEY)),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
            timeout: env_parse(ENV_HTTP_TIMEOUT).unwrap_or(defaults.timeout),
        }
    }

    /// Grounding model settings with defaults
    pub fn grounding_defaults() -> Self {
        Self {
            endpoint: DEFAULT_GROUNDING_ENDPOINT.to_string(),
            model: DEFAULT_GROUNDING_MODEL.to_string(),
            api_key: None,
            max_tokens: DEFAULT_GROUNDING_MAX_TOKENS,
            temperature: 0.0,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl DeviceSettings {
    /// Create device settings from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::defaults();
        Self {
            appium_server: env_string(ENV_APPIUM_SERVER).unwrap_or(defaults.appium_server),
            platform_name: env_string(ENV_PLATFORM).unwrap_or(defaults.platform_name),
            device_name: env_string(ENV_DEVICE_NAME).unwrap_or(defaults.device_name),
            automation_name: env_string(ENV_AUTOMATION_NAME).unwrap_or(defaults.automation_name),
            new_command_timeout: env_parse(ENV_NEW_COMMAND_TIMEOUT)
                .unwrap_or(defaults.new_command_timeout),
        }
    }

    /// Create device settings with defaults
    pub fn defaults() -> Self {
        Self {
            appium_server: DEFAULT_APPIUM_SERVER.to_string(),
            platform_name: DEFAULT_PLATFORM.to_string(),
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            automation_name: DEFAULT_AUTOMATION_NAME.to_string(),
            new_command_timeout: DEFAULT_NEW_COMMAND_TIMEOUT,
        }
    }
}

impl TimingSettings {
    /// Create timing settings from environment variables
    pub fn from_env() -> Self {
        Self {
            settle_timeout_ms: env_parse(ENV_SETTLE_TIMEOUT_MS).unwrap_or(DEFAULT_SETTLE_TIMEOUT_MS),
            settle_interval_ms: env_parse(ENV_SETTLE_INTERVAL_MS)
                .unwrap_or(DEFAULT_SETTLE_INTERVAL_MS),
            swipe_duration_ms: env_parse(ENV_SWIPE_DURATION_MS)
                .unwrap_or(DEFAULT_SWIPE_DURATION_MS),
            tap_duration_ms: env_parse(ENV_TAP_DURATION_MS).unwrap_or(DEFAULT_TAP_DURATION_MS),
        }
    }

    /// Create timing settings with defaults
    pub fn defaults() -> Self {
        Self {
            settle_timeout_ms: DEFAULT_SETTLE_TIMEOUT_MS,
            settle_interval_ms: DEFAULT_SETTLE_INTERVAL_MS,
            swipe_duration_ms: DEFAULT_SWIPE_DURATION_MS,
            tap_duration_ms: DEFAULT_TAP_DURATION_MS,
        }
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn swipe_duration(&self) -> Duration {
        Duration::from_millis(self.swipe_duration_ms)
    }

    pub fn tap_duration(&self) -> Duration {
        Duration::from_millis(self.tap_duration_ms)
    }
}

impl SessionSettings {
    /// Create session settings from environment variables
    pub fn from_env() -> Self {
        Self {
            base_dir: env_string(ENV_SESSION_DIR).unwrap_or_else(|| DEFAULT_SESSION_DIR.to_string()),
        }
    }

    /// Create session settings with defaults
    pub fn defaults() -> Self {
        Self {
            base_dir: DEFAULT_SESSION_DIR.to_string(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Read a non-empty environment variable
fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Read and parse an environment variable, ignoring unparseable values
fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|value| parse_setting(&value))
}

fn parse_setting<T: FromStr>(value: &str) -> Option<T> {
    value.trim().parse().ok()
}

/// Parse a screen size string such as `1080x2400`
pub fn parse_screen_size(size: &str) -> Option<(u32, u32)> {
    let size = size.trim().to_lowercase();
    let (w, h) = size.split_once('x')?;
    let width: u32 = w.trim().parse().ok()?;
    let height: u32 = h.trim().parse().ok()?;
    if width == 0 || height == 0 || width > MAX_SCREEN_SIDE || height > MAX_SCREEN_SIDE {
        return None;
    }
    Some((width, height))
}

/// Get session base directory (convenience function)
pub fn session_base_dir() -> String {
    get().session.base_dir.clone()
}
