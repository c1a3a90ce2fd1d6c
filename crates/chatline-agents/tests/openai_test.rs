use chatline_agents::{ChatMessage, LlmProvider, LlmRequest, OpenAiProvider};
use chatline_common::Error;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> LlmRequest {
    LlmRequest {
        model: "gpt-4o-mini".to_string(),
        messages: vec![ChatMessage::user("Hello")],
        system: Some("You are a pen pal.".to_string()),
        max_tokens: Some(64),
        temperature: None,
        json_response: true,
    }
}

#[tokio::test]
async fn test_openai_completion_in_json_mode() {
    let mock_server = MockServer::start().await;

    let response_body = json!({
        "id": "chatcmpl-123",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "{\"reply\": \"Hello there!\"}",
            },
            "finish_reason": "stop"
        }],
        "usage": {
            "prompt_tokens": 9,
            "completion_tokens": 12,
            "total_tokens": 21
        }
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": "You are a pen pal."},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let response = provider.complete(&request()).await.unwrap();

    assert_eq!(response.text, "{\"reply\": \"Hello there!\"}");
    assert_eq!(response.model, "gpt-4o-mini");
    assert_eq!(response.stop_reason.as_deref(), Some("stop"));
    let usage = response.usage.unwrap();
    assert_eq!(usage.input_tokens, 9);
    assert_eq!(usage.output_tokens, 12);
}

#[tokio::test]
async fn test_openai_error_status_is_a_provider_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    let err = provider.complete(&request()).await.unwrap_err();

    match err {
        Error::Provider(msg) => {
            assert!(msg.contains("status=503"), "unexpected message: {msg}");
            assert!(msg.contains("overloaded"));
        }
        other => panic!("expected provider error, got {other}"),
    }
}

#[tokio::test]
async fn test_openai_empty_choices_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"model": "x", "choices": []})),
        )
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    assert!(matches!(
        provider.complete(&request()).await,
        Err(Error::Provider(_))
    ));
}

#[tokio::test]
async fn test_openai_health_check() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&mock_server)
        .await;

    let provider = OpenAiProvider::new("test-key".to_string(), Some(mock_server.uri()));
    assert!(provider.health_check().await.unwrap());

    let unreachable = OpenAiProvider::new(
        "test-key".to_string(),
        Some("http://127.0.0.1:9".to_string()),
    );
    assert!(!unreachable.health_check().await.unwrap());
}
