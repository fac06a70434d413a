//! Shared helpers for integration tests: local stand-ins for the chat
//! completion and Bedrock `InvokeModel` APIs, plus canned-response files.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use aws_sdk_bedrockruntime::Client;
use aws_sdk_bedrockruntime::config::retry::RetryConfig;
use aws_sdk_bedrockruntime::config::{BehaviorVersion, Credentials, Region};

use llm_knife::config::{BedrockAnthropicSettings, OpenAiSettings};

pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-sonnet-20240229-v1:0";

/// Bind an ephemeral port and serve `router` in the background.
pub async fn spawn(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

// ── Canned responses ──────────────────────────────────────────────────────────

/// Canned replies keyed by scenario name, stored as a JSON mapping on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MockLlmData(pub BTreeMap<String, Value>);

impl MockLlmData {
    pub fn load(path: &Path) -> MockLlmData {
        let raw = std::fs::read_to_string(path).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    pub fn save(&self, path: &Path) {
        let raw = serde_json::to_string_pretty(self).unwrap();
        std::fs::write(path, raw).unwrap();
    }

    pub fn text(&self, key: &str) -> String {
        self.0
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

// ── Chat completion stand-in ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum ChatReply {
    /// JSON completion (or SSE when the request asks for `stream: true`)
    /// whose fragments concatenate to the given pieces.
    Fragments(Vec<String>),
    /// Non-2xx status with an OpenAI-style error envelope.
    Error { status: StatusCode, body: Value },
}

#[derive(Clone)]
struct ChatState {
    reply: ChatReply,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

pub struct MockChatServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockChatServer {
    pub async fn start(reply: ChatReply) -> MockChatServer {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = ChatState { reply, requests: requests.clone() };
        let router = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .with_state(state);
        let addr = spawn(router).await;
        MockChatServer { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}/v1/chat/completions", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn settings(&self, api_key: Option<&str>) -> OpenAiSettings {
        OpenAiSettings {
            api_base_url: self.url(),
            model: "gpt-4".into(),
            timeout_seconds: 5,
            temperature: None,
            max_tokens: None,
            api_key: api_key.map(str::to_string),
        }
    }
}

async fn chat_completions(
    State(state): State<ChatState>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let stream = body["stream"].as_bool().unwrap_or(false);
    let model = body["model"].as_str().unwrap_or("gpt-4").to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    match state.reply {
        ChatReply::Error { status, body } => (status, Json(body)).into_response(),
        ChatReply::Fragments(pieces) if stream => {
            let mut sse = String::from(": keep-alive\n\n");
            // role-only first delta, as real servers send
            sse.push_str(&format!(
                "data: {}\n\n",
                json!({ "choices": [{ "index": 0, "delta": { "role": "assistant" } }] })
            ));
            for piece in &pieces {
                sse.push_str(&format!(
                    "data: {}\n\n",
                    json!({ "model": model, "choices": [{ "index": 0, "delta": { "content": piece } }] })
                ));
            }
            sse.push_str("data: [DONE]\n\n");
            Response::builder()
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from(sse))
                .unwrap()
        }
        ChatReply::Fragments(pieces) => {
            let text = pieces.concat();
            let words = text.split_whitespace().count();
            Json(json!({
                "id": "mock-response-id",
                "object": "chat.completion",
                "created": 1677858242,
                "model": model,
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": format!("  {text}\n") },
                    "finish_reason": "stop",
                }],
                "usage": {
                    "prompt_tokens": 10,
                    "completion_tokens": words,
                    "total_tokens": 10 + words,
                },
            }))
            .into_response()
        }
    }
}

// ── Bedrock InvokeModel stand-in ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum BedrockReply {
    Text(String),
    /// Service error: status, `x-amzn-ErrorType` code and message.
    Error { status: StatusCode, code: String, message: String },
}

#[derive(Clone)]
struct BedrockState {
    reply: BedrockReply,
    invocations: Arc<Mutex<Vec<(String, Value)>>>,
}

pub struct MockBedrockServer {
    pub addr: SocketAddr,
    invocations: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockBedrockServer {
    pub async fn start(reply: BedrockReply) -> MockBedrockServer {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        let state = BedrockState { reply, invocations: invocations.clone() };
        let router = Router::new()
            .route("/model/{model_id}/invoke", post(invoke_model))
            .with_state(state);
        let addr = spawn(router).await;
        MockBedrockServer { addr, invocations }
    }

    pub fn endpoint_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `(model_id, request body)` per call, in arrival order.
    pub fn invocations(&self) -> Vec<(String, Value)> {
        self.invocations.lock().unwrap().clone()
    }

    /// SDK client pointed at this server, with static credentials and no retries.
    pub fn client(&self) -> Client {
        let conf = aws_sdk_bedrockruntime::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "tests"))
            .endpoint_url(self.endpoint_url())
            .retry_config(RetryConfig::disabled())
            .build();
        Client::from_conf(conf)
    }

    pub fn settings(&self) -> BedrockAnthropicSettings {
        BedrockAnthropicSettings {
            region: "us-east-1".into(),
            model_id: DEFAULT_MODEL_ID.into(),
            max_tokens: 1024,
            temperature: 0.7,
            endpoint_url: Some(self.endpoint_url()),
        }
    }
}

async fn invoke_model(
    State(state): State<BedrockState>,
    UrlPath(model_id): UrlPath<String>,
    body: axum::body::Bytes,
) -> Response {
    let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.invocations.lock().unwrap().push((model_id.clone(), parsed));

    match state.reply {
        BedrockReply::Text(text) => {
            let words = text.split_whitespace().count();
            Json(json!({
                "id": "mock-response-id",
                "type": "message",
                "role": "assistant",
                "model": model_id,
                "content": [{ "type": "text", "text": text }],
                "stop_reason": "end_turn",
                "stop_sequence": null,
                "usage": { "input_tokens": 10, "output_tokens": words },
            }))
            .into_response()
        }
        BedrockReply::Error { status, code, message } => (
            status,
            [("x-amzn-errortype", code)],
            Json(json!({ "message": message })),
        )
            .into_response(),
    }
}
