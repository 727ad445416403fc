// ABOUTME: Chat route handlers for study conversations
// ABOUTME: Conversation management plus the SSE endpoint that streams tutor answers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! Chat routes
//!
//! Every handler requires a bearer token; conversations are only visible to
//! the user who created them.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::info;

use crate::auth::AuthUser;
use crate::chat::{ChatOrchestrator, PipelineEvent};
use crate::database::{ChatManager, ConversationRecord, MessageRecord};
use crate::errors::{AppError, AppResult};
use crate::resources::ServerResources;

/// Mode used when a conversation is created without one
const DEFAULT_MODE: &str = "chat";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create a new conversation
#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    /// Free-text subject
    #[serde(default)]
    pub subject: Option<String>,
    /// Instruction key (`chat`, `explain`, `socratic`, `quiz`, ...)
    #[serde(default)]
    pub mode: Option<String>,
}

/// Request to send a message
#[derive(Debug, Default, Deserialize)]
pub struct SendMessageRequest {
    /// The student's message
    #[serde(default)]
    pub message: Option<String>,
    /// Free-form model selector (`auto`, `groq:...`, `qwen-image-plus`, ...)
    #[serde(default)]
    pub model: Option<String>,
}

/// Response for listing conversations
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationListResponse {
    /// Conversations, most recently updated first
    pub conversations: Vec<ConversationRecord>,
}

/// Response for listing messages
#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesListResponse {
    /// Messages in chronological order
    pub messages: Vec<MessageRecord>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ============================================================================
// Chat Routes
// ============================================================================

/// Chat routes handler
pub struct ChatRoutes;

impl ChatRoutes {
    /// Create all chat routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/api/conversations", post(Self::create_conversation))
            .route("/api/conversations", get(Self::list_conversations))
            .route(
                "/api/conversations/:conversation_id/messages",
                get(Self::get_messages),
            )
            .route(
                "/api/conversations/:conversation_id/messages",
                post(Self::send_message_stream),
            )
            .with_state(resources)
    }

    fn chat_manager(resources: &ServerResources) -> ChatManager {
        resources.database.chat()
    }

    /// Load a conversation owned by `user_id`, or 404
    async fn owned_conversation(
        chat: &ChatManager,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<ConversationRecord> {
        chat.get_conversation(conversation_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Conversation"))
    }

    // ========================================================================
    // Conversation Handlers
    // ========================================================================

    /// Create a new conversation
    async fn create_conversation(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
        payload: Result<Json<CreateConversationRequest>, JsonRejection>,
    ) -> Result<Response, AppError> {
        let Json(request) = payload.map_err(Self::invalid_body)?;
        let chat = Self::chat_manager(&resources);
        let mode = non_empty(request.mode.as_deref()).unwrap_or(DEFAULT_MODE);

        let conversation = chat
            .create_conversation(
                &auth.user_id,
                non_empty(request.subject.as_deref()),
                &mode.to_lowercase(),
            )
            .await?;

        info!(
            conversation.id = %conversation.id,
            conversation.mode = %conversation.mode,
            "Conversation created"
        );

        Ok((StatusCode::CREATED, Json(conversation)).into_response())
    }

    /// List the caller's conversations
    async fn list_conversations(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
    ) -> Result<Response, AppError> {
        let conversations = Self::chat_manager(&resources)
            .list_conversations(&auth.user_id)
            .await?;

        Ok((StatusCode::OK, Json(ConversationListResponse { conversations })).into_response())
    }

    // ========================================================================
    // Message Handlers
    // ========================================================================

    /// Get all messages in a conversation
    async fn get_messages(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
        Path(conversation_id): Path<String>,
    ) -> Result<Response, AppError> {
        let chat = Self::chat_manager(&resources);
        Self::owned_conversation(&chat, &conversation_id, &auth.user_id).await?;

        let messages = chat.get_messages(&conversation_id).await?;
        Ok((StatusCode::OK, Json(MessagesListResponse { messages })).into_response())
    }

    /// Send a message and stream the answer via SSE
    async fn send_message_stream(
        State(resources): State<Arc<ServerResources>>,
        auth: AuthUser,
        Path(conversation_id): Path<String>,
        payload: Result<Json<SendMessageRequest>, JsonRejection>,
    ) -> Result<Response, AppError> {
        let Json(request) = payload.map_err(Self::invalid_body)?;
        let message = non_empty(request.message.as_deref())
            .ok_or_else(|| AppError::missing_field("message"))?
            .to_owned();

        let chat = Self::chat_manager(&resources);
        let conversation =
            Self::owned_conversation(&chat, &conversation_id, &auth.user_id).await?;

        let orchestrator = ChatOrchestrator::new(Arc::clone(&resources));
        let pipeline = orchestrator
            .start(conversation, message, request.model.as_deref())
            .await?;

        let events = pipeline.map(|item| item.and_then(|event| Self::to_sse_event(&event)));
        let sse = Sse::new(events).keep_alive(KeepAlive::default());

        Ok((
            [
                (header::CONNECTION, HeaderValue::from_static("keep-alive")),
                (
                    HeaderName::from_static("x-accel-buffering"),
                    HeaderValue::from_static("no"),
                ),
            ],
            sse,
        )
            .into_response())
    }

    /// Render a rejected JSON body as a 400 in the API's error shape
    fn invalid_body(rejection: JsonRejection) -> AppError {
        AppError::invalid_input("Invalid JSON body").with_details(rejection.body_text())
    }

    fn to_sse_event(event: &PipelineEvent) -> AppResult<Event> {
        Event::default()
            .json_data(event)
            .map_err(|e| AppError::internal(format!("Failed to encode SSE event: {e}")))
    }
}
