//! Integration tests for the chat-completions agent
//!
//! Validates retry and credential handling against a mock model server.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use gymharness::agent::api::ChatMessage;
use gymharness::agent::{Agent, ApiAgent};
use gymharness::conversation::ConversationMessage;
use gymharness::{AgentConfig, HarnessError};

fn agent(server: &MockServer) -> ApiAgent {
    ApiAgent::new(&AgentConfig {
        base_url: format!("{}/v1/", server.uri()),
        model: "test-model".into(),
        api_key: "cpk-test".into(),
        max_retries: 3,
        retry_delay_ms: 10,
        ..AgentConfig::default()
    })
    .unwrap()
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
    })
}

#[tokio::test]
async fn test_generate_sends_conversation_and_returns_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer cpk-test"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "messages": [
                {"role": "user", "content": "Instruction"},
                {"role": "assistant", "content": "OK."},
                {"role": "user", "content": "You see a door."}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Action: toggle")))
        .expect(1)
        .mount(&server)
        .await;

    let conversation = vec![
        ConversationMessage::human("Instruction"),
        ConversationMessage::agent_scaffold("OK."),
        ConversationMessage::human("You see a door."),
    ];
    let action = agent(&server).generate(&conversation).await.unwrap();
    assert_eq!(action, "Action: toggle");
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Action: look")))
        .expect(1)
        .mount(&server)
        .await;

    let completion = agent(&server)
        .chat_completion(&[ChatMessage::user("hi")])
        .await
        .unwrap();
    assert_eq!(completion.content, "Action: look");
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(3)
        .mount(&server)
        .await;

    let err = agent(&server)
        .chat_completion(&[ChatMessage::user("hi")])
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Status { status: 502, .. }));
}

#[tokio::test]
async fn test_rejected_key_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = agent(&server)
        .chat_completion(&[ChatMessage::user("hi")])
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Config(_)));
}

#[tokio::test]
async fn test_validate_key_reflects_models_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("authorization", "Bearer cpk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    assert!(agent(&server).validate_key().await.unwrap());

    let rejecting = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&rejecting)
        .await;
    assert!(!agent(&rejecting).validate_key().await.unwrap());
}
