//! Chat completions endpoint integration tests (non-streaming)

use std::time::Duration;

use axum::http::StatusCode;
use copilot_gateway::runtime::{SessionEvent, SystemMessageMode, ToolRequest};
use serde_json::{json, Value};

use crate::common::{bearer, constants, spawn_app, spawn_default_app};
use crate::mocks::MockFactory;

fn hello_script() -> Vec<SessionEvent> {
    vec![
        SessionEvent::ContentDelta("Hello".to_string()),
        SessionEvent::FinalMessage {
            content: Some("Hello! How can I help?".to_string()),
            tool_requests: vec![],
        },
        SessionEvent::Idle,
    ]
}

fn hi_request() -> Value {
    json!({
        "model": "gpt-4o",
        "messages": [{"role": "user", "content": "hi"}]
    })
}

#[tokio::test]
async fn test_no_credential_anywhere_is_unauthorized() {
    let app = spawn_app(MockFactory::new(hello_script()), None, Duration::from_secs(5)).await;

    let response = app
        .server
        .post("/v1/chat/completions")
        .json(&json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let json: Value = response.json();
    assert_eq!(json["error"]["type"], "authentication_error");
    assert_eq!(json["error"]["message"], "Missing or invalid API key");
}

#[tokio::test]
async fn test_non_streaming_completion() {
    let factory = MockFactory::new(hello_script());
    let probe = factory.probe.clone();
    let app = spawn_default_app(factory).await;

    let response = app.server.post("/v1/chat/completions").json(&hi_request()).await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert!(json["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(json["object"], "chat.completion");
    assert_eq!(json["model"], "gpt-4o");
    assert_eq!(json["choices"][0]["index"], 0);
    assert_eq!(json["choices"][0]["message"]["role"], "assistant");
    assert_eq!(json["choices"][0]["message"]["content"], "Hello! How can I help?");
    assert_eq!(json["choices"][0]["finish_reason"], "stop");
    assert!(json["choices"][0]["message"].get("tool_calls").is_none());

    assert_eq!(probe.last_prompt(), "[User]: hi");
    assert_eq!(probe.destroyed(), 1);
}

#[tokio::test]
async fn test_tool_request_is_reported() {
    let factory = MockFactory::new(vec![
        SessionEvent::FinalMessage {
            content: None,
            tool_requests: vec![ToolRequest {
                tool_call_id: "call_weather_1".to_string(),
                name: "get_weather".to_string(),
                arguments: json!({"city": "Paris"}),
            }],
        },
        SessionEvent::Idle,
    ]);
    let probe = factory.probe.clone();
    let app = spawn_default_app(factory).await;

    let response = app
        .server
        .post("/v1/chat/completions")
        .json(&json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "Weather in Paris?"}],
            "tools": [{"type": "function", "function": {
                "name": "get_weather",
                "description": "Current weather for a city",
                "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
            }}]
        }))
        .await;

    response.assert_status_ok();
    let json: Value = response.json();
    let choice = &json["choices"][0];
    assert_eq!(choice["finish_reason"], "tool_calls");
    let calls = choice["message"]["tool_calls"].as_array().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["id"], "call_weather_1");
    assert_eq!(calls[0]["type"], "function");
    assert_eq!(calls[0]["function"]["name"], "get_weather");
    assert_eq!(calls[0]["function"]["arguments"], r#"{"city":"Paris"}"#);

    let config = probe.last_config();
    assert_eq!(config.tools.len(), 1);
    assert_eq!(config.available_tools, Some(vec!["get_weather".to_string()]));
    assert!(!config.infinite_sessions.enabled);
}

#[tokio::test]
async fn test_system_messages_become_replace_mode_system_message() {
    let factory = MockFactory::new(hello_script());
    let probe = factory.probe.clone();
    let app = spawn_default_app(factory).await;

    app.server
        .post("/v1/chat/completions")
        .json(&json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "again"}
            ]
        }))
        .await
        .assert_status_ok();

    let config = probe.last_config();
    let system = config.system_message.expect("system message set");
    assert_eq!(system.mode, SystemMessageMode::Replace);
    assert_eq!(system.content, "You are terse.");
    assert_eq!(
        probe.last_prompt(),
        "[User]: hi\n\n[Assistant]: hello\n\n[User]: again"
    );
}

#[tokio::test]
async fn test_header_credential_selects_client() {
    let factory = MockFactory::new(hello_script());
    let probe = factory.probe.clone();
    let app = spawn_app(factory, None, Duration::from_secs(5)).await;

    let mut body = hi_request();
    body["api_key"] = json!("body-key");
    let (name, value) = bearer(constants::CALLER_CREDENTIAL);

    app.server
        .post("/v1/chat/completions")
        .add_header(name.clone(), value.clone())
        .json(&body)
        .await
        .assert_status_ok();
    app.server
        .post("/v1/chat/completions")
        .add_header(name, value)
        .json(&body)
        .await
        .assert_status_ok();

    assert_eq!(
        *probe.credentials.lock().unwrap(),
        vec![constants::CALLER_CREDENTIAL.to_string()]
    );
    assert_eq!(app.pool.len(), 1);
}

#[tokio::test]
async fn test_body_api_key_used_without_header() {
    let factory = MockFactory::new(hello_script());
    let probe = factory.probe.clone();
    let app = spawn_app(factory, None, Duration::from_secs(5)).await;

    let mut body = hi_request();
    body["api_key"] = json!("body-key");

    app.server
        .post("/v1/chat/completions")
        .json(&body)
        .await
        .assert_status_ok();

    assert_eq!(*probe.credentials.lock().unwrap(), vec!["body-key".to_string()]);
}

#[tokio::test]
async fn test_rejected_credential_is_unauthorized() {
    let factory = MockFactory::new(hello_script()).rejecting(&[constants::REVOKED_CREDENTIAL]);
    let app = spawn_default_app(factory).await;
    let (name, value) = bearer(constants::REVOKED_CREDENTIAL);

    let response = app
        .server
        .post("/v1/chat/completions")
        .add_header(name, value)
        .json(&hi_request())
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let json: Value = response.json();
    assert_eq!(json["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn test_invalid_body_is_bad_request() {
    let app = spawn_default_app(MockFactory::new(hello_script())).await;

    let response = app
        .server
        .post("/v1/chat/completions")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert_eq!(json["error"]["message"], "Invalid request body");
}

#[tokio::test]
async fn test_missing_model_is_bad_request() {
    let app = spawn_default_app(MockFactory::new(hello_script())).await;

    let response = app
        .server
        .post("/v1/chat/completions")
        .json(&json!({"messages": [{"role": "user", "content": "hi"}]}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["error"]["message"], "Model is required");
}

#[tokio::test]
async fn test_missing_messages_is_bad_request() {
    let app = spawn_default_app(MockFactory::new(hello_script())).await;

    let response = app
        .server
        .post("/v1/chat/completions")
        .json(&json!({"model": "gpt-4o", "messages": []}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["error"]["message"], "Messages are required");
}

#[tokio::test]
async fn test_missing_model_without_credential_is_unauthorized_first() {
    let app = spawn_app(MockFactory::new(hello_script()), None, Duration::from_secs(5)).await;

    let response = app
        .server
        .post("/v1/chat/completions")
        .json(&json!({"messages": []}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_upstream_error_is_classified() {
    let factory = MockFactory::new(vec![SessionEvent::Error {
        message: "Failed to get response. Last error: CAPIError: 400 400 Bad Request".to_string(),
    }]);
    let probe = factory.probe.clone();
    let app = spawn_default_app(factory).await;

    let response = app.server.post("/v1/chat/completions").json(&hi_request()).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let json: Value = response.json();
    assert_eq!(json["error"]["type"], "invalid_request_error");
    assert_eq!(json["error"]["message"], "CAPIError: 400 400 Bad Request");
    assert_eq!(probe.destroyed(), 1);
}

#[tokio::test]
async fn test_unclassified_upstream_error_is_bad_gateway() {
    let app = spawn_default_app(MockFactory::new(vec![SessionEvent::Error {
        message: "something broke".to_string(),
    }]))
    .await;

    let response = app.server.post("/v1/chat/completions").json(&hi_request()).await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let json: Value = response.json();
    assert_eq!(json["error"]["type"], "api_error");
}

#[tokio::test]
async fn test_session_creation_failure_is_internal_error() {
    let app = spawn_default_app(MockFactory::new(hello_script()).failing_sessions()).await;

    let response = app.server.post("/v1/chat/completions").json(&hi_request()).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let json: Value = response.json();
    assert_eq!(json["error"]["message"], "Failed to create session");
    assert_eq!(json["error"]["type"], "api_error");
}

#[tokio::test]
async fn test_timeout_is_gateway_timeout_and_destroys_once() {
    // No idle or error ever arrives
    let factory = MockFactory::new(vec![SessionEvent::ContentDelta("thinking".to_string())]);
    let probe = factory.probe.clone();
    let app = spawn_app(
        factory,
        Some(constants::DEFAULT_CREDENTIAL),
        Duration::from_millis(100),
    )
    .await;

    let response = app.server.post("/v1/chat/completions").json(&hi_request()).await;

    response.assert_status(StatusCode::GATEWAY_TIMEOUT);
    let json: Value = response.json();
    assert_eq!(json["error"]["message"], "Request timed out");
    assert_eq!(json["error"]["type"], "api_error");

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(probe.destroyed(), 1);
}

#[tokio::test]
async fn test_message_without_role_is_skipped() {
    let factory = MockFactory::new(hello_script());
    let probe = factory.probe.clone();
    let app = spawn_default_app(factory).await;

    app.server
        .post("/v1/chat/completions")
        .json(&json!({
            "model": "gpt-4o",
            "messages": [
                {"content": "no role here"},
                {"role": "user", "content": "hi"}
            ]
        }))
        .await
        .assert_status_ok();

    assert_eq!(probe.last_prompt(), "[User]: hi");
}
