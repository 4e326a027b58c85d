//! Appium device driver over the W3C WebDriver JSON protocol.
//!
//! Taps and swipes are sent as W3C pointer actions, text goes to the element
//! that currently has focus, and system commands use Appium's Android
//! extension endpoints.

use base64::Engine;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{DeviceDriver, DeviceError, DeviceResult};
use crate::config::{self, DeviceSettings};
use crate::screen::{Point, ScreenBounds, Screenshot};

/// W3C element reference key
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// XPath of the input element that currently has focus
const FOCUSED_ELEMENT_XPATH: &str = "//*[@focused=\"true\"]";

/// Configuration for an Appium session
#[derive(Debug, Clone)]
pub struct AppiumConfig {
    /// Appium server URL (e.g., `http://127.0.0.1:4723`)
    pub server_url: String,
    /// Capabilities sent in `alwaysMatch`
    pub capabilities: Map<String, Value>,
    /// Press duration of a tap
    pub tap_duration: Duration,
    /// HTTP timeout per command
    pub timeout: Duration,
}

impl Default for AppiumConfig {
    fn default() -> Self {
        let cfg = config::get();
        Self::from_settings(&cfg.device, cfg.timing.tap_duration())
    }
}

impl AppiumConfig {
    pub fn from_settings(settings: &DeviceSettings, tap_duration: Duration) -> Self {
        let mut capabilities = Map::new();
        capabilities.insert("platformName".into(), json!(settings.platform_name));
        capabilities.insert("appium:deviceName".into(), json!(settings.device_name));
        capabilities.insert("appium:automationName".into(), json!(settings.automation_name));
        capabilities.insert("appium:noReset".into(), json!(true));
        capabilities.insert(
            "appium:newCommandTimeout".into(),
            json!(settings.new_command_timeout),
        );

        Self {
            server_url: settings.appium_server.clone(),
            capabilities,
            tap_duration,
            timeout: Duration::from_secs(config::DEFAULT_HTTP_TIMEOUT),
        }
    }

    pub fn server(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    /// Set or override a capability
    pub fn capability(mut self, name: impl Into<String>, value: Value) -> Self {
        self.capabilities.insert(name.into(), value);
        self
    }

    pub fn tap_duration(mut self, duration: Duration) -> Self {
        self.tap_duration = duration;
        self
    }
}

/// A live Appium session
///
/// The session is deleted on the server when the device is dropped.
pub struct AppiumDevice {
    client: Client,
    base_url: String,
    session_id: String,
    tap_duration: Duration,
}

impl AppiumDevice {
    /// Create a new Appium session
    pub fn connect(config: AppiumConfig) -> DeviceResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let base_url = config.server_url.trim_end_matches('/').to_string();

        let body = json!({
            "capabilities": {
                "alwaysMatch": Value::Object(config.capabilities),
                "firstMatch": [{}]
            }
        });

        info!("[appium] creating session at {}", base_url);
        let value = send(client.post(format!("{}/session", base_url)).json(&body), "new session")?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DeviceError::InvalidResponse("new session response has no sessionId".into()))?
            .to_string();
        info!("[appium] session {} ready", session_id);

        Ok(Self {
            client,
            base_url,
            session_id,
            tap_duration: config.tap_duration,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Query the server's `/status` endpoint without creating a session
    pub fn status(server_url: &str, timeout: Duration) -> DeviceResult<Value> {
        let client = Client::builder().timeout(timeout).build()?;
        let url = format!("{}/status", server_url.trim_end_matches('/'));
        send(client.get(url), "status")
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    fn post(&self, path: &str, body: &Value, command: &str) -> DeviceResult<Value> {
        debug!("[appium] POST {} ({})", path, command);
        send(self.client.post(self.session_url(path)).json(body), command)
    }

    fn get(&self, path: &str, command: &str) -> DeviceResult<Value> {
        debug!("[appium] GET {} ({})", path, command);
        send(self.client.get(self.session_url(path)), command)
    }

    fn perform_touch(&self, steps: Vec<Value>, command: &str) -> DeviceResult<()> {
        self.post("/actions", &touch_actions(steps), command)?;
        Ok(())
    }

    fn focused_element(&self) -> DeviceResult<String> {
        let value = self.post(
            "/element",
            &json!({ "using": "xpath", "value": FOCUSED_ELEMENT_XPATH }),
            "find focused element",
        )?;
        element_id(&value)
            .ok_or_else(|| DeviceError::InvalidResponse("element response has no element id".into()))
    }
}

impl DeviceDriver for AppiumDevice {
    fn tap(&mut self, point: Point) -> DeviceResult<()> {
        self.perform_touch(tap_steps(point, self.tap_duration), "tap")
    }

    fn swipe(&mut self, start: Point, end: Point, duration: Duration) -> DeviceResult<()> {
        self.perform_touch(swipe_steps(start, end, duration), "swipe")
    }

    fn type_text(&mut self, text: &str) -> DeviceResult<()> {
        let element = self.focused_element()?;
        let chars: Vec<String> = text.chars().map(String::from).collect();
        self.post(
            &format!("/element/{}/value", element),
            &json!({ "text": text, "value": chars }),
            "type text",
        )?;
        Ok(())
    }

    fn press_key(&mut self, code: u32) -> DeviceResult<()> {
        self.post(
            "/appium/device/press_keycode",
            &json!({ "keycode": code }),
            "press keycode",
        )?;
        Ok(())
    }

    fn dismiss_keyboard(&mut self) -> DeviceResult<()> {
        self.post("/appium/device/hide_keyboard", &json!({}), "hide keyboard")?;
        Ok(())
    }

    fn screenshot(&mut self) -> DeviceResult<Screenshot> {
        let value = self.get("/screenshot", "screenshot")?;
        let encoded = value
            .as_str()
            .ok_or_else(|| DeviceError::InvalidResponse("screenshot is not a string".into()))?;
        // Some drivers wrap the payload in line breaks
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let png = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| DeviceError::InvalidResponse(format!("screenshot is not base64: {}", e)))?;
        Ok(Screenshot::from_png(png))
    }

    fn window_size(&mut self) -> DeviceResult<ScreenBounds> {
        let value = self.get("/window/rect", "window rect")?;
        window_bounds(&value)
    }

    fn source_type(&self) -> &str {
        "appium"
    }
}

impl Drop for AppiumDevice {
    fn drop(&mut self) {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        match self.client.delete(url).send() {
            Ok(_) => debug!("[appium] session {} deleted", self.session_id),
            Err(e) => warn!("[appium] could not delete session {}: {}", self.session_id, e),
        }
    }
}

/// Send a request and unwrap the W3C `value` envelope
fn send(request: RequestBuilder, command: &str) -> DeviceResult<Value> {
    let response = request.send()?;
    let status = response.status();
    let text = response.text()?;

    if !status.is_success() {
        // Proxies answer with HTML; only the status is kept then
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        return Err(DeviceError::command(command, error_message(&body, status.as_u16())));
    }

    let body: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).map_err(|e| {
            DeviceError::InvalidResponse(format!("{} returned non-JSON body: {}", command, e))
        })?
    };

    match body {
        Value::Object(mut map) => {
            let legacy_session = map.remove("sessionId");
            let mut value = map.remove("value").unwrap_or(Value::Null);
            // Legacy JSONWP servers put the session id beside `value`
            if let (Some(id), Value::Object(inner)) = (legacy_session, &mut value) {
                inner.entry("sessionId").or_insert(id);
            }
            Ok(value)
        }
        other => Ok(other),
    }
}

fn error_message(body: &Value, status: u16) -> String {
    let value = &body["value"];
    match (value["error"].as_str(), value["message"].as_str()) {
        (Some(error), Some(message)) => format!("{} ({}): {}", error, status, message),
        (None, Some(message)) => format!("HTTP {}: {}", status, message),
        (Some(error), None) => format!("{} ({})", error, status),
        (None, None) => format!("HTTP {}", status),
    }
}

fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get("ELEMENT"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn window_bounds(value: &Value) -> DeviceResult<ScreenBounds> {
    let dimension = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_f64)
            .filter(|v| *v >= 0.0)
            .map(|v| v as u32)
            .ok_or_else(|| DeviceError::InvalidResponse(format!("window rect has no {}", key)))
    };
    Ok(ScreenBounds::new(dimension("width")?, dimension("height")?))
}

fn touch_actions(steps: Vec<Value>) -> Value {
    json!({
        "actions": [{
            "type": "pointer",
            "id": "finger1",
            "parameters": { "pointerType": "touch" },
            "actions": steps
        }]
    })
}

fn tap_steps(point: Point, press: Duration) -> Vec<Value> {
    vec![
        json!({ "type": "pointerMove", "duration": 0, "x": point.x, "y": point.y }),
        json!({ "type": "pointerDown", "button": 0 }),
        json!({ "type": "pause", "duration": press.as_millis() as u64 }),
        json!({ "type": "pointerUp", "button": 0 }),
    ]
}

fn swipe_steps(start: Point, end: Point, duration: Duration) -> Vec<Value> {
    vec![
        json!({ "type": "pointerMove", "duration": 0, "x": start.x, "y": start.y }),
        json!({ "type": "pointerDown", "button": 0 }),
        json!({ "type": "pointerMove", "duration": duration.as_millis() as u64, "origin": "viewport", "x": end.x, "y": end.y }),
        json!({ "type": "pointerUp", "button": 0 }),
    ]
}
