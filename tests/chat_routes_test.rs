// ABOUTME: Integration tests for the chat route handlers and the streaming pipeline
// ABOUTME: Drives the router end to end against wiremock upstreams and an in-memory database
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use std::sync::Arc;

use axum::body::to_bytes;
use axum::http::StatusCode;
use common::{
    all_test_credentials, create_test_conversation, create_test_server_resources, token_for,
};
use helpers::axum_test::AxumTestRequest;
use serde_json::{json, Value};
use study_chat_server::config::environment::ProviderCredentials;
use study_chat_server::llm::MessageRole;
use study_chat_server::resources::ServerResources;
use study_chat_server::routes::build_router;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER: &str = "student-1";

// ============================================================================
// Test Helpers
// ============================================================================

struct TestEnv {
    server: MockServer,
    resources: Arc<ServerResources>,
    token: String,
}

async fn setup(credentials: ProviderCredentials) -> TestEnv {
    let server = MockServer::start().await;
    let resources = create_test_server_resources(&server.uri(), credentials).await;
    let token = token_for(&resources, USER);
    TestEnv {
        server,
        resources,
        token,
    }
}

impl TestEnv {
    fn router(&self) -> axum::Router {
        build_router(Arc::clone(&self.resources))
    }

    async fn message_count(&self, conversation_id: &str) -> i64 {
        self.resources
            .database
            .chat()
            .get_message_count(conversation_id)
            .await
            .unwrap()
    }
}

fn messages_uri(conversation_id: &str) -> String {
    format!("/api/conversations/{conversation_id}/messages")
}

fn openai_sse_body(deltas: &[&str]) -> String {
    let mut body: String = deltas
        .iter()
        .map(|d| format!("data: {}\n\n", json!({ "choices": [{ "delta": { "content": d } }] })))
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn rewrite_completion(content: &str) -> Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }],
        "model": "llama-3.3-70b-versatile"
    })
}

fn texts(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e.get("text").and_then(Value::as_str))
        .map(ToOwned::to_owned)
        .collect()
}

// ============================================================================
// Streaming Pipeline Tests
// ============================================================================

#[tokio::test]
async fn test_groq_stream_is_word_paced_and_persisted() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, USER, Some("Biology")).await;

    Mock::given(method("POST"))
        .and(path("/groq/chat/completions"))
        .and(header("authorization", "Bearer test-groq-key"))
        .and(body_partial_json(
            json!({ "model": "llama-3.1-8b-instant", "stream": true }),
        ))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(openai_sse_body(&["Cells are ", "tiny."]), "text/event-stream"),
        )
        .expect(1)
        .mount(&env.server)
        .await;

    let response = AxumTestRequest::post(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .json(&json!({ "message": "What is a cell?", "model": "fast" }))
        .send(env.router())
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(
        response.header("content-type").as_deref(),
        Some("text/event-stream")
    );
    assert_eq!(response.header("x-accel-buffering").as_deref(), Some("no"));
    assert_eq!(response.header("cache-control").as_deref(), Some("no-cache"));

    let events = response.sse_events();
    assert_eq!(texts(&events), vec!["Cells ", "are ", "tiny."]);

    let done = events.last().unwrap();
    assert_eq!(done["done"], true);
    assert_eq!(done["userMessage"]["content"], "What is a cell?");
    assert_eq!(done["userMessage"]["role"], "user");
    assert_eq!(done["aiMessage"]["content"], "Cells are tiny.");
    assert_eq!(done["aiMessage"]["role"], "assistant");
    assert_eq!(done["aiMessage"]["conversationId"], conversation.id.as_str());

    let stored = env
        .resources
        .database
        .chat()
        .get_messages(&conversation.id)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].role, MessageRole::User);
    assert_eq!(stored[1].content, "Cells are tiny.");

    let updated = env
        .resources
        .database
        .chat()
        .get_conversation(&conversation.id, USER)
        .await
        .unwrap()
        .unwrap();
    assert!(updated.updated_at >= conversation.updated_at);
}

#[tokio::test]
async fn test_default_selector_streams_from_gemini_without_done_sentinel() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, USER, None).await;

    let frame = json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": "Hello there, student" }] } }] });
    Mock::given(method("POST"))
        .and(path("/gemini/models/gemini-1.5-flash:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .and(query_param("key", "test-gemini-key"))
        .and(body_string_contains("You are StudyBuddy"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(format!("data: {frame}\r\n\r\n"), "text/event-stream"),
        )
        .expect(1)
        .mount(&env.server)
        .await;

    let events = AxumTestRequest::post(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .json(&json!({ "message": "Hi" }))
        .send(env.router())
        .await
        .assert_status(StatusCode::OK)
        .sse_events();

    assert_eq!(texts(&events), vec!["Hello ", "there, ", "student"]);
    assert_eq!(events.last().unwrap()["aiMessage"]["content"], "Hello there, student");
    assert_eq!(env.message_count(&conversation.id).await, 2);
}

#[tokio::test]
async fn test_recent_history_is_sent_as_context() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, USER, None).await;
    let chat = env.resources.database.chat();
    chat.add_message(&conversation.id, MessageRole::User, "What is a cell?")
        .await
        .unwrap();
    chat.add_message(&conversation.id, MessageRole::Assistant, "The unit of life.")
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/groq/chat/completions"))
        .and(body_string_contains("Student: What is a cell?"))
        .and(body_string_contains("Tutor: The unit of life."))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(openai_sse_body(&["Groups of cells."]), "text/event-stream"),
        )
        .expect(1)
        .mount(&env.server)
        .await;

    let events = AxumTestRequest::post(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .json(&json!({ "message": "And a tissue?", "model": "auto" }))
        .send(env.router())
        .await
        .assert_status(StatusCode::OK)
        .sse_events();

    assert_eq!(events.last().unwrap()["done"], true);
    assert_eq!(env.message_count(&conversation.id).await, 4);
}

#[tokio::test]
async fn test_openrouter_sends_attribution_headers() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, USER, None).await;

    Mock::given(method("POST"))
        .and(path("/openrouter/chat/completions"))
        .and(header("authorization", "Bearer test-openrouter-key"))
        .and(header("HTTP-Referer", "https://study.example"))
        .and(header("X-Title", "Study Buddy"))
        .and(body_partial_json(json!({ "model": "moonshotai/kimi-k2:free" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(openai_sse_body(&["Sure."]), "text/event-stream"),
        )
        .expect(1)
        .mount(&env.server)
        .await;

    let events = AxumTestRequest::post(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .json(&json!({ "message": "Explain entropy", "model": "moonshotai/kimi-k2:free" }))
        .send(env.router())
        .await
        .assert_status(StatusCode::OK)
        .sse_events();

    assert_eq!(texts(&events), vec!["Sure."]);
}

// ============================================================================
// Image Generation Tests
// ============================================================================

#[tokio::test]
async fn test_image_request_is_rerouted_to_qwen() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, USER, Some("Biology")).await;

    Mock::given(method("POST"))
        .and(path("/groq/chat/completions"))
        .and(body_partial_json(json!({ "stream": false })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(rewrite_completion("A labeled diagram of a mitochondrion")),
        )
        .mount(&env.server)
        .await;

    Mock::given(method("POST"))
        .and(path(
            "/dashscope/services/aigc/multimodal-generation/generation",
        ))
        .and(header("authorization", "Bearer test-alibaba-key"))
        .and(body_partial_json(json!({ "model": "qwen-image-plus" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": { "choices": [{ "message": { "role": "assistant", "content": [
                { "image": "https://img.example/mito.png" }
            ] } }] }
        })))
        .expect(1)
        .mount(&env.server)
        .await;

    let events = AxumTestRequest::post(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .json(&json!({ "message": "Draw a picture of a mitochondria", "model": "fast" }))
        .send(env.router())
        .await
        .assert_status(StatusCode::OK)
        .sse_events();

    let expected = "Here is the image you requested:\n\n![Generated Image](https://img.example/mito.png)\n\n*Prompt used: A labeled diagram of a mitochondrion*";
    assert_eq!(texts(&events).concat(), expected);
    assert_eq!(events.last().unwrap()["aiMessage"]["content"], expected);
    assert_eq!(env.message_count(&conversation.id).await, 2);
}

#[tokio::test]
async fn test_nvidia_image_without_rewrite_key_uses_fallback_prompt() {
    let mut credentials = ProviderCredentials::default();
    credentials.nvidia_api_key = Some("test-nvidia-key".to_owned());
    let env = setup(credentials).await;
    let conversation = create_test_conversation(&env.resources, USER, None).await;

    Mock::given(method("POST"))
        .and(path("/nvidia/stabilityai/stable-diffusion-3.5-large"))
        .and(header("authorization", "Bearer test-nvidia-key"))
        .and(body_partial_json(json!({ "prompt": "a red apple on a desk" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "artifacts": [{ "base64": "iVBORw0KGgoAAAANSUhEUg", "finishReason": "SUCCESS" }]
        })))
        .expect(1)
        .mount(&env.server)
        .await;

    let events = AxumTestRequest::post(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .json(&json!({ "message": "a red apple on a desk", "model": "nvidia:" }))
        .send(env.router())
        .await
        .assert_status(StatusCode::OK)
        .sse_events();

    let answer = events.last().unwrap()["aiMessage"]["content"]
        .as_str()
        .unwrap()
        .to_owned();
    assert!(answer.contains("![Generated Image](data:image/png;base64,iVBORw0KGgoAAAANSUhEUg)"));
    assert!(answer.ends_with("*Prompt used: a red apple on a desk*"));
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test]
async fn test_missing_provider_key_fails_before_persistence() {
    let env = setup(ProviderCredentials::default()).await;
    let conversation = create_test_conversation(&env.resources, USER, None).await;

    let response = AxumTestRequest::post(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .json(&json!({ "message": "Hello", "model": "auto" }))
        .send(env.router())
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = response.json();
    assert_eq!(body["error"], "GROQ_API_KEY is not set in environment variables");
    assert_eq!(env.message_count(&conversation.id).await, 0);
}

#[tokio::test]
async fn test_upstream_rejection_fails_before_persistence() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, USER, None).await;

    Mock::given(method("POST"))
        .and(path("/groq/chat/completions"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"{"error":{"message":"model not found"}}"#),
        )
        .expect(1)
        .mount(&env.server)
        .await;

    let response = AxumTestRequest::post(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .json(&json!({ "message": "Hello", "model": "groq:no-such-model" }))
        .send(env.router())
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = response.json();
    assert_eq!(body["error"], "Groq: Bad Request");
    assert!(body["details"].as_str().unwrap().contains("model not found"));
    assert_eq!(env.message_count(&conversation.id).await, 0);
}

#[tokio::test]
async fn test_image_failure_ends_stream_without_answer() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, USER, None).await;

    // No rewrite mocks: both rewrite legs fail and the fallback prompt is used
    Mock::given(method("POST"))
        .and(path(
            "/dashscope/services/aigc/multimodal-generation/generation",
        ))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .expect(1)
        .mount(&env.server)
        .await;

    let response = AxumTestRequest::post(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .json(&json!({ "message": "image: a labeled diagram of the heart" }))
        .send_raw(env.router())
        .await;

    // Headers are already sent when the generation runs
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await;
    assert!(body.is_err(), "stream should end with an error, not a done event");

    let stored = env
        .resources
        .database
        .chat()
        .get_messages(&conversation.id)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].role, MessageRole::User);
    assert_eq!(stored[0].content, "image: a labeled diagram of the heart");
}

#[tokio::test]
async fn test_blank_message_is_rejected() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, USER, None).await;

    for body in [json!({ "message": "   " }), json!({ "model": "auto" })] {
        let response = AxumTestRequest::post(&messages_uri(&conversation.id))
            .bearer(&env.token)
            .json(&body)
            .send(env.router())
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        let error: Value = response.json();
        assert_eq!(error["error"], "message is required");
    }
}

#[tokio::test]
async fn test_malformed_body_is_rejected_as_json_error() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, USER, None).await;

    for raw in ["not json", r#"{"message": 5}"#] {
        let response = AxumTestRequest::post(&messages_uri(&conversation.id))
            .bearer(&env.token)
            .raw_json(raw)
            .send(env.router())
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        let error: Value = response.json();
        assert_eq!(error["error"], "Invalid JSON body");
        assert!(error["details"].is_string());
    }

    let response = AxumTestRequest::post("/api/conversations")
        .bearer(&env.token)
        .raw_json(r#"{"subject": ["Biology"]}"#)
        .send(env.router())
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    let error: Value = response.json();
    assert_eq!(error["error"], "Invalid JSON body");
    assert_eq!(env.message_count(&conversation.id).await, 0);
}

#[tokio::test]
async fn test_requests_without_valid_token_are_unauthorized() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, USER, None).await;

    let response = AxumTestRequest::post(&messages_uri(&conversation.id))
        .json(&json!({ "message": "Hello" }))
        .send(env.router())
        .await;
    assert_eq!(response.status(), 401);

    let response = AxumTestRequest::get("/api/conversations")
        .bearer("not-a-token")
        .send(env.router())
        .await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_other_users_conversation_is_not_found() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, "someone-else", None).await;

    let response = AxumTestRequest::post(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .json(&json!({ "message": "Hello" }))
        .send(env.router())
        .await
        .assert_status(StatusCode::NOT_FOUND);
    let error: Value = response.json();
    assert_eq!(error["error"], "Conversation not found");

    AxumTestRequest::get(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .send(env.router())
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// ============================================================================
// Conversation Management Tests
// ============================================================================

#[tokio::test]
async fn test_create_and_list_conversations() {
    let env = setup(all_test_credentials()).await;

    let created: Value = AxumTestRequest::post("/api/conversations")
        .bearer(&env.token)
        .json(&json!({ "subject": "Chemistry", "mode": "Quiz" }))
        .send(env.router())
        .await
        .assert_status(StatusCode::CREATED)
        .json();
    assert_eq!(created["subject"], "Chemistry");
    assert_eq!(created["mode"], "quiz");
    assert_eq!(created["userId"], USER);

    let second: Value = AxumTestRequest::post("/api/conversations")
        .bearer(&env.token)
        .json(&json!({}))
        .send(env.router())
        .await
        .assert_status(StatusCode::CREATED)
        .json();
    assert_eq!(second["mode"], "chat");
    assert!(second["subject"].is_null());

    create_test_conversation(&env.resources, "someone-else", None).await;

    let listed: Value = AxumTestRequest::get("/api/conversations")
        .bearer(&env.token)
        .send(env.router())
        .await
        .assert_status(StatusCode::OK)
        .json();
    let ids: Vec<&str> = listed["conversations"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![second["id"].as_str().unwrap(), created["id"].as_str().unwrap()]
    );
}

#[tokio::test]
async fn test_list_messages_in_order() {
    let env = setup(all_test_credentials()).await;
    let conversation = create_test_conversation(&env.resources, USER, None).await;
    let chat = env.resources.database.chat();
    for (role, content) in [
        (MessageRole::User, "first"),
        (MessageRole::Assistant, "second"),
        (MessageRole::User, "third"),
    ] {
        chat.add_message(&conversation.id, role, content).await.unwrap();
    }

    let listed: Value = AxumTestRequest::get(&messages_uri(&conversation.id))
        .bearer(&env.token)
        .send(env.router())
        .await
        .assert_status(StatusCode::OK)
        .json();
    let contents: Vec<&str> = listed["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
    assert_eq!(listed["messages"][1]["role"], "assistant");
    assert!(listed["messages"][0]["createdAt"].is_string());
}

#[tokio::test]
async fn test_health_check() {
    let env = setup(ProviderCredentials::default()).await;

    let body: Value = AxumTestRequest::get("/health")
        .send(env.router())
        .await
        .assert_status(StatusCode::OK)
        .json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "study-chat-server");
    assert!(body["version"].is_string());
}
