//! Provider round trips against local stand-ins for both remote APIs.

mod common;

use axum::http::StatusCode;
use futures_util::StreamExt;
use serde_json::json;

use common::{BedrockReply, ChatReply, DEFAULT_MODEL_ID, MockBedrockServer, MockChatServer};
use llm_knife::config::ConfigStore;
use llm_knife::llm::providers::bedrock_anthropic::BedrockAnthropicProvider;
use llm_knife::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use llm_knife::llm::{Backend, GenerateOptions, Generation, LlmProvider, ModelRouter, ProviderError};

fn hello_world() -> ChatReply {
    ChatReply::Fragments(vec!["Hello".into(), " world".into()])
}

fn chat_provider(server: &MockChatServer, api_key: Option<&str>) -> LlmProvider {
    let p = OpenAiCompatibleProvider::new(server.settings(api_key)).unwrap();
    LlmProvider::OpenAiCompatible(p)
}

fn bedrock_provider(server: &MockBedrockServer) -> LlmProvider {
    let p = BedrockAnthropicProvider::with_client(server.client(), server.settings());
    LlmProvider::BedrockAnthropic(p)
}

// ── Chat completion ───────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_single_shot_returns_trimmed_text() {
    let server = MockChatServer::start(hello_world()).await;
    let provider = chat_provider(&server, Some("sk-test"));

    let out = provider
        .generate("Say hello", None, &GenerateOptions::default())
        .await
        .unwrap();
    assert!(!out.is_stream());
    assert_eq!(out.into_text().await.unwrap(), "Hello world");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sk-test"));
    assert_eq!(requests[0].body["model"], "gpt-4");
    assert_eq!(
        requests[0].body["messages"],
        json!([{ "role": "user", "content": "Say hello" }])
    );
    assert!(requests[0].body.get("stream").is_none());
}

#[tokio::test]
async fn chat_context_becomes_system_message() {
    let server = MockChatServer::start(hello_world()).await;
    let provider = chat_provider(&server, None);

    let opts = GenerateOptions::default().with_max_tokens(32).with_temperature(0.2);
    provider.generate("hi", Some("be terse"), &opts).await.unwrap();

    let requests = server.requests();
    let body = &requests[0].body;
    assert_eq!(body["messages"][0], json!({ "role": "system", "content": "be terse" }));
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["max_tokens"], 32);
    assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    // keyless servers get no auth header
    assert!(requests[0].authorization.is_none());
}

#[tokio::test]
async fn chat_stream_concatenates_to_full_reply() {
    let server = MockChatServer::start(hello_world()).await;
    let provider = chat_provider(&server, None);

    let out = provider
        .generate("Say hello", None, &GenerateOptions::streaming())
        .await
        .unwrap();
    let Generation::Stream(mut fragments) = out else {
        panic!("expected a stream");
    };

    let mut collected = Vec::new();
    while let Some(fragment) = fragments.next().await {
        collected.push(fragment.unwrap());
    }
    assert_eq!(collected, vec!["Hello", " world"]);
    assert_eq!(collected.concat(), "Hello world");
    assert_eq!(server.requests()[0].body["stream"], true);
}

#[tokio::test]
async fn chat_http_error_carries_provider_code() {
    let server = MockChatServer::start(ChatReply::Error {
        status: StatusCode::UNAUTHORIZED,
        body: json!({
            "error": {
                "message": "Incorrect API key provided",
                "type": "invalid_request_error",
                "code": "invalid_api_key",
            }
        }),
    })
    .await;
    let provider = chat_provider(&server, Some("sk-wrong"));

    match provider.complete("hi", None).await {
        Err(ProviderError::Api { code, message }) => {
            assert_eq!(code, "invalid_api_key");
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn chat_error_without_code_falls_back_to_status() {
    let server = MockChatServer::start(ChatReply::Error {
        status: StatusCode::TOO_MANY_REQUESTS,
        body: json!({ "error": { "message": "Rate limit reached" } }),
    })
    .await;
    let provider = chat_provider(&server, None);

    let err = provider
        .generate("hi", None, &GenerateOptions::streaming())
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Api { ref code, .. } if code == "429"));
}

#[tokio::test]
async fn chat_connection_refused_is_request_error() {
    // bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let server_settings = llm_knife::config::OpenAiSettings {
        api_base_url: format!("http://{addr}/v1/chat/completions"),
        model: "gpt-4".into(),
        timeout_seconds: 2,
        temperature: None,
        max_tokens: None,
        api_key: None,
    };
    let provider = LlmProvider::OpenAiCompatible(OpenAiCompatibleProvider::new(server_settings).unwrap());
    assert!(matches!(
        provider.complete("hi", None).await,
        Err(ProviderError::Request(_))
    ));
}

// ── Bedrock ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn bedrock_returns_first_text_block() {
    let server = MockBedrockServer::start(BedrockReply::Text("Hello world".into())).await;
    let provider = bedrock_provider(&server);

    let text = provider.complete("Say hello", Some("be terse")).await.unwrap();
    assert_eq!(text, "Hello world");

    let invocations = server.invocations();
    assert_eq!(invocations.len(), 1);
    let (model_id, body) = &invocations[0];
    assert_eq!(model_id, DEFAULT_MODEL_ID);
    assert_eq!(body["anthropic_version"], "bedrock-2023-05-31");
    assert_eq!(body["max_tokens"], 1024);
    assert_eq!(body["system"], "be terse");
    assert_eq!(body["messages"], json!([{ "role": "user", "content": "Say hello" }]));
}

#[tokio::test]
async fn bedrock_streaming_request_still_returns_text() {
    let server = MockBedrockServer::start(BedrockReply::Text("Hello world".into())).await;
    let provider = bedrock_provider(&server);

    let opts = GenerateOptions::streaming().with_max_tokens(16);
    let out = provider.generate("hi", None, &opts).await.unwrap();
    assert!(!out.is_stream());
    assert_eq!(out.into_text().await.unwrap(), "Hello world");
    assert_eq!(server.invocations()[0].1["max_tokens"], 16);
}

#[tokio::test]
async fn bedrock_service_error_keeps_code_and_message() {
    let server = MockBedrockServer::start(BedrockReply::Error {
        status: StatusCode::BAD_REQUEST,
        code: "ValidationException".into(),
        message: "The provided model identifier is invalid.".into(),
    })
    .await;
    let provider = bedrock_provider(&server);

    match provider.complete("hi", None).await {
        Err(ProviderError::Api { code, message }) => {
            assert_eq!(code, "ValidationException");
            assert_eq!(message, "The provided model identifier is invalid.");
        }
        other => panic!("unexpected: {other:?}"),
    }
    // retries are disabled: one call, one request
    assert_eq!(server.invocations().len(), 1);
}

#[tokio::test]
async fn bedrock_throttling_is_not_retried() {
    let server = MockBedrockServer::start(BedrockReply::Error {
        status: StatusCode::TOO_MANY_REQUESTS,
        code: "ThrottlingException".into(),
        message: "Too many requests".into(),
    })
    .await;
    let provider = bedrock_provider(&server);

    let err = provider.complete("hi", None).await.unwrap_err();
    assert!(err.to_string().contains("ThrottlingException"));
    assert_eq!(server.invocations().len(), 1);
}

// ── Router ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn router_builds_chat_provider_against_configured_url() {
    let server = MockChatServer::start(hello_world()).await;
    let mut config = ConfigStore::load_with(|_| None, &[]).unwrap();
    config.set("openai.api_base_url", server.url()).unwrap();
    config.set("openai.model", "gpt-4o-mini").unwrap();

    let router = ModelRouter::new(&config).unwrap();
    let provider = router.resolve("OpenAI-Turbo").await.unwrap();
    assert_eq!(provider.backend(), Backend::OpenAiCompatible);

    assert_eq!(provider.complete("hi", None).await.unwrap(), "Hello world");
    assert_eq!(server.requests()[0].body["model"], "gpt-4o-mini");
}

#[tokio::test]
async fn router_reads_bedrock_settings_from_config() {
    let mut config = ConfigStore::load_with(|_| None, &[]).unwrap();
    config.set("aws.region", "eu-west-1").unwrap();
    config.set("aws.bedrock.anthropic.model_id", "anthropic.claude-3-haiku-20240307-v1:0").unwrap();

    let router = ModelRouter::new(&config).unwrap();
    let provider = router.resolve("Bedrock").await.unwrap();
    assert_eq!(provider.backend(), Backend::BedrockAnthropic);
    assert_eq!(provider.model(), "anthropic.claude-3-haiku-20240307-v1:0");
}

#[tokio::test]
async fn router_rejects_unknown_backend() {
    let config = ConfigStore::load_with(|_| None, &[]).unwrap();
    let router = ModelRouter::new(&config).unwrap();
    match router.resolve("unknown-model").await {
        Err(ProviderError::UnknownProvider(name)) => assert_eq!(name, "unknown-model"),
        other => panic!("unexpected: {other:?}"),
    }
}
