//! HTTP client tests against a local mock server

use base64::Engine;
use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;

use mobile_vision::config::DeviceSettings;
use mobile_vision::device::{AppiumConfig, AppiumDevice, DeviceDriver, DeviceError, MockDevice};
use mobile_vision::grounding::{GroundingService, VlmGrounder};
use mobile_vision::proposal::{ProposalService, VlmProposer};
use mobile_vision::screen::{Point, ScreenBounds, Screenshot};
use mobile_vision::vlm::{VlmConfig, VlmError, chat_completion};

const SESSION: &str = "5f3c8d9a";

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    })
}

fn png(width: u32, height: u32) -> Screenshot {
    Screenshot::from_png(MockDevice::new(width, height).to_png().unwrap())
}

#[test]
fn test_chat_completion_sends_bearer_token() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .header("authorization", "Bearer sk-test");
        then.status(200).json_body(completion("hello"));
    });

    let config = VlmConfig::new(server.url("/v1/chat/completions"))
        .api_key("sk-test")
        .timeout(5);
    let answer = chat_completion(&config, Some("system"), "text", &[0, 1, 2]).unwrap();

    assert_eq!(answer, "hello");
    mock.assert();
}

#[test]
fn test_chat_completion_reports_http_errors() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/chat/completions");
        then.status(503).body("model loading");
    });

    let config = VlmConfig::new(server.url("/v1/chat/completions")).timeout(5);
    let err = chat_completion(&config, None, "text", &[]).unwrap_err();
    assert!(matches!(err, VlmError::Status { status: 503, ref body } if body == "model loading"));
}

#[test]
fn test_proposer_returns_raw_answer() {
    let server = MockServer::start();
    let raw = r#"{"action":"click","desc":"settings icon"}"#;
    let mock = server.mock(|when, then| {
        when.method(POST).path("/chat");
        then.status(200).json_body(completion(raw));
    });

    let mut proposer = VlmProposer::new(VlmConfig::new(server.url("/chat")).timeout(5));
    let answer = proposer.propose(&png(8, 8), "open settings", "", "").unwrap();

    assert_eq!(answer, raw);
    mock.assert_hits(1);
}

#[test]
fn test_grounder_scales_fraction_by_screenshot_size() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/ground");
        then.status(200).json_body(completion("[0.5, 0.25]"));
    });

    let mut grounder = VlmGrounder::new(VlmConfig::new(server.url("/ground")).timeout(5));
    let point = grounder.locate(&png(200, 400), "click on settings icon");
    assert_eq!(point, Some(Point::new(100, 100)));
}

#[test]
fn test_grounder_treats_bad_answers_as_not_found() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/ground");
        then.status(200).json_body(completion("I cannot see that element"));
    });
    let mut grounder = VlmGrounder::new(VlmConfig::new(server.url("/ground")).timeout(5));
    assert_eq!(grounder.locate(&png(20, 20), "find list"), None);

    let failing = MockServer::start();
    failing.mock(|when, then| {
        when.method(POST).path("/ground");
        then.status(500);
    });
    let mut grounder = VlmGrounder::new(VlmConfig::new(failing.url("/ground")).timeout(5));
    assert_eq!(grounder.locate(&png(20, 20), "find list"), None);
}

fn appium_config(server: &MockServer) -> AppiumConfig {
    AppiumConfig::from_settings(&DeviceSettings::defaults(), Duration::from_millis(50))
        .server(server.base_url())
}

fn mock_session(server: &MockServer) {
    server.mock(|when, then| {
        when.method(POST).path("/session");
        then.status(200)
            .json_body(json!({ "value": { "sessionId": SESSION, "capabilities": {} } }));
    });
}

#[test]
fn test_appium_session_lifecycle() {
    let server = MockServer::start();
    mock_session(&server);
    let actions = server.mock(|when, then| {
        when.method(POST).path(format!("/session/{}/actions", SESSION));
        then.status(200).json_body(json!({ "value": null }));
    });
    let keycode = server.mock(|when, then| {
        when.method(POST).path(format!("/session/{}/appium/device/press_keycode", SESSION));
        then.status(200).json_body(json!({ "value": null }));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path(format!("/session/{}", SESSION));
        then.status(200).json_body(json!({ "value": null }));
    });

    let mut device = AppiumDevice::connect(appium_config(&server)).unwrap();
    assert_eq!(device.session_id(), SESSION);
    assert_eq!(device.source_type(), "appium");

    device.tap(Point::new(120, 340)).unwrap();
    device
        .swipe(Point::new(200, 1680), Point::new(200, 2400), Duration::from_millis(800))
        .unwrap();
    device.press_key(4).unwrap();
    actions.assert_hits(2);
    keycode.assert_hits(1);

    drop(device);
    delete.assert_hits(1);
}

#[test]
fn test_appium_screenshot_and_window_size() {
    let server = MockServer::start();
    mock_session(&server);
    let expected = MockDevice::new(16, 32).to_png().unwrap();
    let encoded = base64::engine::general_purpose::STANDARD.encode(&expected);
    server.mock(|when, then| {
        when.method(GET).path(format!("/session/{}/screenshot", SESSION));
        then.status(200).json_body(json!({ "value": encoded }));
    });
    server.mock(|when, then| {
        when.method(GET).path(format!("/session/{}/window/rect", SESSION));
        then.status(200)
            .json_body(json!({ "value": { "x": 0, "y": 0, "width": 1080, "height": 2400 } }));
    });

    let mut device = AppiumDevice::connect(appium_config(&server)).unwrap();
    let screenshot = device.screenshot().unwrap();
    assert_eq!(screenshot.as_bytes(), expected.as_slice());
    assert_eq!(screenshot.dimensions().unwrap(), (16, 32));
    assert_eq!(device.window_size().unwrap(), ScreenBounds::new(1080, 2400));
}

#[test]
fn test_appium_types_into_focused_element() {
    let server = MockServer::start();
    mock_session(&server);
    let find = server.mock(|when, then| {
        when.method(POST).path(format!("/session/{}/element", SESSION));
        then.status(200)
            .json_body(json!({ "value": { "element-6066-11e4-a52e-4f735466cecf": "el-7" } }));
    });
    let value = server.mock(|when, then| {
        when.method(POST).path(format!("/session/{}/element/el-7/value", SESSION));
        then.status(200).json_body(json!({ "value": null }));
    });

    let mut device = AppiumDevice::connect(appium_config(&server)).unwrap();
    device.type_text("jane@example.com").unwrap();
    find.assert_hits(1);
    value.assert_hits(1);
}

#[test]
fn test_appium_command_errors_carry_server_message() {
    let server = MockServer::start();
    mock_session(&server);
    server.mock(|when, then| {
        when.method(POST).path(format!("/session/{}/appium/device/hide_keyboard", SESSION));
        then.status(500).json_body(json!({
            "value": { "error": "unknown error", "message": "Soft keyboard not present" }
        }));
    });

    let mut device = AppiumDevice::connect(appium_config(&server)).unwrap();
    let err = device.dismiss_keyboard().unwrap_err();
    match err {
        DeviceError::Command { command, message } => {
            assert_eq!(command, "hide keyboard");
            assert!(message.contains("Soft keyboard not present"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_appium_proxy_error_page_keeps_http_status() {
    let server = MockServer::start();
    mock_session(&server);
    server.mock(|when, then| {
        when.method(POST).path(format!("/session/{}/appium/device/press_keycode", SESSION));
        then.status(502)
            .header("content-type", "text/html")
            .body("<html><body>Bad Gateway</body></html>");
    });

    let mut device = AppiumDevice::connect(appium_config(&server)).unwrap();
    match device.press_key(4).unwrap_err() {
        DeviceError::Command { message, .. } => assert_eq!(message, "HTTP 502"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_appium_status() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/status");
        then.status(200)
            .json_body(json!({ "value": { "ready": true, "message": "The server is ready" } }));
    });

    let status = AppiumDevice::status(&server.base_url(), Duration::from_secs(2)).unwrap();
    assert_eq!(status["ready"], true);
}

#[test]
fn test_appium_connect_fails_without_server() {
    let config = AppiumConfig::from_settings(&DeviceSettings::defaults(), Duration::from_millis(50))
        .server("http://127.0.0.1:9");
    assert!(AppiumDevice::connect(config).is_err());
}
