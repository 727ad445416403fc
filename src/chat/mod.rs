// ABOUTME: Chat pipeline module: orchestration, image prompt preparation and word pacing
// ABOUTME: Sits between the HTTP routes and the LLM provider layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

/// Auxiliary prompt rewriting and fallbacks for image providers
pub mod image_prompt;
/// Provider dispatch, streaming and persistence for one conversation turn
pub mod orchestrator;
/// Word-at-a-time pacing of upstream deltas
pub mod smoothing;

pub use image_prompt::PromptRewriter;
pub use orchestrator::{
    image_markdown, select_provider, ChatOrchestrator, Generation, ImagePlan, PipelineEvent,
    PipelineStream,
};
pub use smoothing::WordSmoother;
