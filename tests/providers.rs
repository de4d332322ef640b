//! End-to-end adapter behavior against mock backends.

use futures_util::StreamExt;
use llm_relay::{
    collect_stream, CompletionRequest, Error, FinishReason, FunctionDef, LlmClient, Message,
    ProviderConfig, ProxyConfig,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_body(events: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str("data: ");
        body.push_str(&event.to_string());
        body.push_str("\n\n");
    }
    body
}

#[tokio::test]
async fn openai_completion_end_to_end() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4",
            "messages": [
                {"role": "system", "content": "You are terse."},
                {"role": "user", "content": "Hello"}
            ],
            "temperature": 0.7
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hi."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = LlmClient::new().unwrap();
    client.register_provider(ProviderConfig::openai("test-key").with_base_url(server.uri()));

    let request = CompletionRequest::new("gpt-4")
        .message(Message::system("You are terse."))
        .message(Message::user("Hello"))
        .temperature(0.7);

    let completion = client.completion(&request).await.unwrap();
    assert_eq!(completion.id, "chatcmpl-123");
    assert_eq!(completion.content(), Some("Hi."));
    assert_eq!(completion.choices.len(), 1);
    assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(completion.usage.total_tokens, 11);
}

#[tokio::test]
async fn openai_streaming_end_to_end() {
    let server = MockServer::start().await;

    let mut body = sse_body(&[
        json!({"id": "chatcmpl-9", "object": "chat.completion.chunk", "created": 1700000000,
               "model": "gpt-4",
               "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}]}),
        json!({"id": "chatcmpl-9", "object": "chat.completion.chunk", "created": 1700000000,
               "model": "gpt-4",
               "choices": [{"index": 0, "delta": {"content": "Hello"}, "finish_reason": null}]}),
        json!({"id": "chatcmpl-9", "object": "chat.completion.chunk", "created": 1700000000,
               "model": "gpt-4",
               "choices": [{"index": 0, "delta": {"content": " world"}, "finish_reason": null}]}),
        json!({"id": "chatcmpl-9", "object": "chat.completion.chunk", "created": 1700000000,
               "model": "gpt-4",
               "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
    ]);
    body.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut client = LlmClient::new().unwrap();
    client.register_provider(ProviderConfig::openai("test-key").with_base_url(server.uri()));

    let request = CompletionRequest::new("gpt-4").message(Message::user("Hello"));
    let stream = client.stream_completion(&request).await.unwrap();
    let completion = collect_stream(stream).await.unwrap();

    assert_eq!(completion.content(), Some("Hello world"));
    assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Stop));
}

#[tokio::test]
async fn anthropic_completion_translates_both_directions() {
    let server = MockServer::start().await;

    // System messages leave the message list, max_tokens gets the vendor
    // default, and tool turns become content blocks.
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-3-opus",
            "system": "Use the weather tool.",
            "max_tokens": 2048,
            "messages": [
                {"role": "user", "content": "Weather in Paris?"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "get_weather", "name": "get_weather",
                     "input": {"location": "Paris"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "get_weather", "content": "22C"}
                ]}
            ],
            "tools": [{"name": "get_weather", "description": "Look up weather",
                       "input_schema": {"type": "object"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-opus",
            "content": [{"type": "text", "text": "It is 22C in Paris."}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 30, "output_tokens": 9}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = LlmClient::new().unwrap();
    client.register_provider(ProviderConfig::anthropic("test-key").with_base_url(server.uri()));

    let request = CompletionRequest::new("claude-3-opus")
        .message(Message::system("Use the weather tool."))
        .message(Message::user("Weather in Paris?"))
        .message(Message::function_call(
            "get_weather",
            "{\"location\":\"Paris\"}",
        ))
        .message(Message::function_call_result("get_weather", "22C"))
        .functions(vec![FunctionDef {
            name: "get_weather".to_string(),
            description: "Look up weather".to_string(),
            parameters: json!({"type": "object"}),
        }]);

    let completion = client.completion(&request).await.unwrap();
    assert_eq!(completion.id, "msg_01");
    assert_eq!(completion.content(), Some("It is 22C in Paris."));
    assert_eq!(completion.choices[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(completion.usage.prompt_tokens, 30);
    assert_eq!(completion.usage.completion_tokens, 9);
    assert_eq!(completion.usage.total_tokens, 39);
}

#[tokio::test]
async fn anthropic_streaming_translates_event_taxonomy() {
    let server = MockServer::start().await;

    let mut body = sse_body(&[
        json!({"type": "message_start",
               "message": {"id": "msg_02", "model": "claude-3-opus", "content": [],
                            "stop_reason": null, "usage": {"input_tokens": 5}}}),
        json!({"type": "ping"}),
        json!({"type": "content_block_start", "index": 0,
               "content_block": {"type": "text", "text": ""}}),
        json!({"type": "content_block_delta", "index": 0,
               "delta": {"type": "text_delta", "text": "Bon"}}),
        json!({"type": "content_block_delta", "index": 0,
               "delta": {"type": "text_delta", "text": "jour"}}),
        json!({"type": "content_block_stop", "index": 0}),
        json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"},
               "usage": {"output_tokens": 12}}),
        json!({"type": "message_stop"}),
    ]);
    // Anything after the end-of-stream signal must not be emitted.
    body.push_str(&sse_body(&[json!({"type": "content_block_delta", "index": 0,
        "delta": {"type": "text_delta", "text": "IGNORED"}})]));

    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut client = LlmClient::new().unwrap();
    client.register_provider(ProviderConfig::anthropic("test-key").with_base_url(server.uri()));

    let request = CompletionRequest::new("claude-3-opus").message(Message::user("Hello"));
    let stream = client.stream_completion(&request).await.unwrap();
    let chunks: Vec<_> = stream
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, Error>>()
        .unwrap();

    // Structural events are suppressed; the rest arrive in order.
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0].content(), Some("Bon"));
    assert_eq!(chunks[1].content(), Some("jour"));
    assert!(chunks[2].choices[0].delta.is_empty());
    assert_eq!(chunks[3].choices[0].finish_reason, Some(FinishReason::Stop));
    assert_eq!(chunks[3].usage.as_ref().unwrap().completion_tokens, 12);

    // One synthetic envelope id for the whole stream.
    assert!(chunks[0].id.starts_with("chatcmpl-"));
    assert!(chunks.iter().all(|c| c.id == chunks[0].id));
    assert!(chunks.iter().all(|c| c.object == "chat.completion.chunk"));
}

#[tokio::test]
async fn proxy_takes_precedence_and_substitutes_model() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("x-relay-key", "secret"))
        .and(body_partial_json(json!({
            "model": "deepseek-chat",
            "messages": [{"role": "user", "content": "Hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-proxy",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "deepseek-chat",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hi from the proxy."},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = LlmClient::new().unwrap();
    // The provider also claims gpt-* models; the proxy must win.
    client.register_provider(ProviderConfig::openai("test-key").with_base_url(server.uri()));
    client.create_proxy(
        ProxyConfig::new("deepseek", format!("{}/v1/chat/completions", server.uri()))
            .header("x-relay-key", "secret")
            .models(["gpt-4-proxy"])
            .proxy_model("deepseek-chat"),
    );

    let request = CompletionRequest::new("gpt-4-proxy").message(Message::user("Hello"));
    let completion = client.completion(&request).await.unwrap();
    assert_eq!(completion.id, "chatcmpl-proxy");
    assert_eq!(completion.content(), Some("Hi from the proxy."));
}

#[tokio::test]
async fn proxy_streaming_reemits_chunks_verbatim() {
    let server = MockServer::start().await;

    let mut body = sse_body(&[
        json!({"id": "chatcmpl-up", "object": "chat.completion.chunk", "created": 1700000000,
               "model": "deepseek-chat",
               "choices": [{"index": 0, "delta": {"content": "verbatim"}, "finish_reason": null}]}),
        json!({"id": "chatcmpl-up", "object": "chat.completion.chunk", "created": 1700000000,
               "model": "deepseek-chat",
               "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
    ]);
    body.push_str("data: [DONE]\n\n");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true, "model": "gpt-4-proxy"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut client = LlmClient::new().unwrap();
    client.create_proxy(
        ProxyConfig::new("passthrough", format!("{}/v1/chat/completions", server.uri()))
            .models(["gpt-4-proxy"]),
    );

    let request = CompletionRequest::new("gpt-4-proxy").message(Message::user("Hello"));
    let stream = client.stream_completion(&request).await.unwrap();
    let chunks: Vec<_> = stream
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<_, Error>>()
        .unwrap();

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].id, "chatcmpl-up");
    assert_eq!(chunks[0].content(), Some("verbatim"));
    assert_eq!(chunks[1].choices[0].finish_reason, Some(FinishReason::Stop));
}

#[tokio::test]
async fn upstream_error_carries_status_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit reached", "type": "rate_limit_error"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = LlmClient::new().unwrap();
    client.register_provider(ProviderConfig::openai("test-key").with_base_url(server.uri()));

    let request = CompletionRequest::new("gpt-4").message(Message::user("Hello"));
    let error = client.completion(&request).await.unwrap_err();

    match error {
        Error::Upstream { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body["error"]["type"], json!("rate_limit_error"));
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn protocol_error_on_unmappable_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "chat.completion",
            "choices": "not-an-array"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = LlmClient::new().unwrap();
    client.register_provider(ProviderConfig::openai("test-key").with_base_url(server.uri()));

    let request = CompletionRequest::new("gpt-4").message(Message::user("Hello"));
    assert!(matches!(
        client.completion(&request).await.unwrap_err(),
        Error::Protocol(_)
    ));
}
