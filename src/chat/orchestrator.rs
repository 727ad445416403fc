// ABOUTME: Chat pipeline orchestrator: provider selection, dispatch, streaming and persistence
// ABOUTME: Turns one student message into word-paced text events followed by a done event
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! # Provider Orchestrator
//!
//! One request moves through `Idle -> Dispatched -> Streaming | SingleShot ->
//! Finalizing -> Closed`. Everything that can fail cheaply (credentials, the
//! upstream status of a text stream) fails in [`ChatOrchestrator::start`],
//! before the student's message is stored. Once the event stream is returned
//! the message is persisted, and the assistant message follows only if the
//! stream reaches its end.
//!
//! Dropping the returned stream (client disconnect) drops the upstream body,
//! which cancels the upstream call; nothing further is persisted.

use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error};

use super::image_prompt::PromptRewriter;
use super::smoothing::WordSmoother;
use crate::constants::limits;
use crate::database::{ChatManager, ConversationRecord, MessageRecord};
use crate::errors::{AppError, AppResult};
use crate::llm::prompts::{build_combined_prompt, build_system_prompt, build_user_turn};
use crate::llm::{
    classifier, resolver, ChatMessage, ChatRequest, ChatStream, CompletionProvider,
    GeminiProvider, ImageProvider, LlmProvider, MessageRole, NvidiaImageProvider,
    OpenAiCompatibleConfig, OpenAiCompatibleProvider, Provider, ProviderRequest,
    QwenImageProvider,
};
use crate::logging::ChatLogger;
use crate::resources::ServerResources;

/// One event of the outgoing SSE stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PipelineEvent {
    /// A word-paced fragment of the answer
    Text {
        /// Fragment text
        text: String,
    },
    /// Terminal event, sent after both messages are stored
    #[serde(rename_all = "camelCase")]
    Done {
        /// Always `true`
        done: bool,
        /// The stored student message
        user_message: MessageRecord,
        /// The stored assistant message
        ai_message: MessageRecord,
    },
}

impl PipelineEvent {
    fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    fn done(user_message: MessageRecord, ai_message: MessageRecord) -> Self {
        Self::Done {
            done: true,
            user_message,
            ai_message,
        }
    }
}

/// Stream of pipeline events; an `Err` item ends the stream without a done event
pub type PipelineStream = Pin<Box<dyn Stream<Item = AppResult<PipelineEvent>> + Send>>;

/// A dispatched generation, ready to be driven
pub enum Generation {
    /// Text provider whose upstream stream is already open
    Streaming {
        /// Provider producing the stream
        provider: Provider,
        /// Upstream text deltas
        stream: ChatStream,
    },
    /// Image provider; the upstream calls run when the plan is executed
    Image(ImagePlan),
}

impl Generation {
    /// Provider behind this generation
    #[must_use]
    pub fn provider(&self) -> Provider {
        match self {
            Self::Streaming { provider, .. } => *provider,
            Self::Image(plan) => plan.provider.provider(),
        }
    }
}

/// Deferred single-shot image generation
pub struct ImagePlan {
    provider: Box<dyn ImageProvider>,
    rewriter: PromptRewriter,
    message: String,
    history: Vec<ChatMessage>,
}

impl ImagePlan {
    /// Prepare the prompt, generate the image and render the answer as Markdown
    ///
    /// # Errors
    ///
    /// Returns an error if the image provider fails; prompt preparation never does
    pub async fn run(self) -> AppResult<String> {
        let prompt = match self.provider.provider() {
            Provider::Nvidia => {
                self.rewriter
                    .prompt_for_nvidia(&self.message, &self.history)
                    .await
            }
            _ => self.rewriter.prompt_for_qwen(&self.message, &self.history).await,
        };
        debug!(provider = %self.provider.provider(), prompt = %prompt, "Generating image");

        let image = self.provider.generate(&prompt).await?;
        Ok(image_markdown(&image.url, &prompt))
    }
}

/// Markdown answer for a generated image
#[must_use]
pub fn image_markdown(url: &str, prompt: &str) -> String {
    format!(
        "Here is the image you requested:\n\n![Generated Image]({url})\n\n*Prompt used: {prompt}*"
    )
}

/// Resolve the model selector, then let the classifier override it
///
/// Returns the final request and whether the image override fired.
#[must_use]
pub fn select_provider(model: Option<&str>, message: &str) -> (ProviderRequest, bool) {
    let resolved = resolver::resolve(model);
    let selected = classifier::apply_image_override(resolved.clone(), message);
    let forced = classifier::was_overridden(&resolved, &selected);
    (selected, forced)
}

/// System and user turns for a text provider
///
/// Providers without system-turn support get both folded into one user turn.
fn prompt_messages(
    llm: &dyn LlmProvider,
    conversation: &ConversationRecord,
    history: &[ChatMessage],
    message: &str,
) -> Vec<ChatMessage> {
    let subject = conversation.subject.as_deref();
    let mode = conversation.mode.as_str();
    if llm.supports_system_messages() {
        vec![
            ChatMessage::system(build_system_prompt(subject, mode)),
            ChatMessage::user(build_user_turn(history, message)),
        ]
    } else {
        vec![ChatMessage::user(build_combined_prompt(
            subject, mode, history, message,
        ))]
    }
}

/// Per-request accumulation: the raw answer and the pacing buffer
#[derive(Debug, Default)]
struct StreamState {
    full_response: String,
    smoother: WordSmoother,
}

impl StreamState {
    /// Record a raw delta and return the fragments ready to send
    fn accept(&mut self, delta: &str) -> Vec<String> {
        self.full_response.push_str(delta);
        self.smoother.push(delta)
    }
}

/// Drives the chat pipeline for one conversation turn
#[derive(Clone)]
pub struct ChatOrchestrator {
    resources: Arc<ServerResources>,
}

impl ChatOrchestrator {
    /// Create an orchestrator over shared server resources
    #[must_use]
    pub const fn new(resources: Arc<ServerResources>) -> Self {
        Self { resources }
    }

    fn chat_manager(&self) -> ChatManager {
        self.resources.database.chat()
    }

    /// `OpenAI`-compatible client for Groq or `OpenRouter`
    fn openai_compatible(
        &self,
        provider: Provider,
        api_key: &str,
    ) -> Option<OpenAiCompatibleProvider> {
        let config = &self.resources.config;
        let endpoints = &config.endpoints;

        let provider_config = match provider {
            Provider::Groq => OpenAiCompatibleConfig::groq(&endpoints.groq, api_key),
            Provider::OpenRouter => OpenAiCompatibleConfig::openrouter(
                &endpoints.openrouter,
                api_key,
                config.credentials.openrouter_site_url.as_deref(),
                config.credentials.openrouter_app_name.as_deref(),
            ),
            Provider::Gemini | Provider::Nvidia | Provider::Qwen => return None,
        };
        Some(OpenAiCompatibleProvider::new(
            provider_config,
            self.resources.http_client.clone(),
        ))
    }

    /// Streaming text provider for `provider`
    fn text_provider(&self, provider: Provider, api_key: &str) -> AppResult<Box<dyn LlmProvider>> {
        if provider == Provider::Gemini {
            return Ok(Box::new(GeminiProvider::new(
                &self.resources.config.endpoints.gemini,
                api_key,
                self.resources.http_client.clone(),
            )));
        }

        self.openai_compatible(provider, api_key)
            .map(|llm| Box::new(llm) as Box<dyn LlmProvider>)
            .ok_or_else(|| {
                AppError::internal(format!(
                    "{} is not a text provider",
                    provider.display_name()
                ))
            })
    }

    /// Single-shot image provider for `request`
    fn image_provider(
        &self,
        request: &ProviderRequest,
        api_key: &str,
    ) -> AppResult<Box<dyn ImageProvider>> {
        let endpoints = &self.resources.config.endpoints;
        let client = self.resources.http_client.clone();

        let image: Box<dyn ImageProvider> = match request.provider {
            Provider::Nvidia => Box::new(NvidiaImageProvider::new(
                &endpoints.nvidia,
                api_key,
                &request.model_id,
                client,
            )),
            Provider::Qwen => Box::new(QwenImageProvider::new(
                &endpoints.dashscope,
                api_key,
                &request.model_id,
                client,
            )),
            Provider::Gemini | Provider::Groq | Provider::OpenRouter => {
                return Err(AppError::internal(format!(
                    "{} is not an image provider",
                    request.provider.display_name()
                )))
            }
        };
        Ok(image)
    }

    /// Auxiliary rewrite clients for whichever of Groq and `OpenRouter` have keys
    fn prompt_rewriter(&self) -> PromptRewriter {
        let credentials = &self.resources.config.credentials;
        let auxiliary = |provider: Provider| -> Option<Box<dyn CompletionProvider>> {
            let key = credentials.key_for(provider)?;
            let client = self.openai_compatible(provider, key)?;
            Some(Box::new(client))
        };
        PromptRewriter::new(auxiliary(Provider::Groq), auxiliary(Provider::OpenRouter))
    }

    /// Dispatch a resolved request
    ///
    /// Text providers have their upstream stream opened here, so an upstream
    /// rejection surfaces before anything is persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider's API key is missing or the upstream
    /// rejects a streaming request
    pub async fn dispatch(
        &self,
        request: &ProviderRequest,
        conversation: &ConversationRecord,
        history: &[ChatMessage],
        message: &str,
    ) -> AppResult<Generation> {
        let api_key = self.resources.config.credentials.require(request.provider)?;

        if request.provider.is_image() {
            return Ok(Generation::Image(ImagePlan {
                provider: self.image_provider(request, api_key)?,
                rewriter: self.prompt_rewriter(),
                message: message.to_owned(),
                history: history.to_vec(),
            }));
        }

        let llm = self.text_provider(request.provider, api_key)?;
        let chat_request = ChatRequest::new(prompt_messages(
            llm.as_ref(),
            conversation,
            history,
            message,
        ))
        .with_model(&request.model_id);

        let stream = llm.complete_stream(&chat_request).await?;

        Ok(Generation::Streaming {
            provider: request.provider,
            stream,
        })
    }

    /// Run the pipeline for one student message
    ///
    /// The returned stream yields word-paced text events and ends with a done
    /// event carrying both stored messages.
    ///
    /// # Errors
    ///
    /// Returns an error, with nothing persisted, if the provider's API key is
    /// missing, the upstream rejects the request or history cannot be loaded
    pub async fn start(
        &self,
        conversation: ConversationRecord,
        message: String,
        model: Option<&str>,
    ) -> AppResult<PipelineStream> {
        let (request, forced) = select_provider(model, &message);
        ChatLogger::log_dispatch(&conversation.id, request.provider, &request.model_id, forced);

        let chat = self.chat_manager();
        let history: Vec<ChatMessage> = chat
            .get_recent_messages(&conversation.id, limits::HISTORY_CONTEXT_MESSAGES)
            .await?
            .iter()
            .map(ChatMessage::from)
            .collect();

        let generation = self
            .dispatch(&request, &conversation, &history, &message)
            .await?;

        let user_message = chat
            .add_message(&conversation.id, MessageRole::User, &message)
            .await?;

        Ok(Box::pin(drive_generation(
            chat,
            conversation.id,
            generation,
            user_message,
        )))
    }
}

/// Drive a dispatched generation to completion, persisting the answer at the end
fn drive_generation(
    chat: ChatManager,
    conversation_id: String,
    generation: Generation,
    user_message: MessageRecord,
) -> impl Stream<Item = AppResult<PipelineEvent>> + Send {
    async_stream::try_stream! {
        let provider = generation.provider();
        let mut state = StreamState::default();

        match generation {
            Generation::Streaming { mut stream, .. } => {
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.inspect_err(|e| {
                        error!(conversation.id = %conversation_id, llm.provider = %provider, error = %e, "Upstream stream failed");
                    })?;
                    if chunk.is_final {
                        break;
                    }
                    for fragment in state.accept(&chunk.delta) {
                        yield PipelineEvent::text(fragment);
                    }
                }
            }
            Generation::Image(plan) => {
                let markdown = plan.run().await.inspect_err(|e| {
                    error!(conversation.id = %conversation_id, llm.provider = %provider, error = %e, "Image generation failed");
                })?;
                for fragment in state.accept(&markdown) {
                    yield PipelineEvent::text(fragment);
                }
            }
        }

        if let Some(rest) = state.smoother.flush() {
            yield PipelineEvent::text(rest);
        }

        let ai_message = chat
            .add_message(&conversation_id, MessageRole::Assistant, &state.full_response)
            .await?;
        chat.touch_conversation(&conversation_id).await?;
        ChatLogger::log_completed(&conversation_id, provider, state.full_response.chars().count());

        yield PipelineEvent::done(user_message, ai_message);
    }
}
