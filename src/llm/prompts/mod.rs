// ABOUTME: Tutor and image prompt-rewrite system prompts loaded at compile time
// ABOUTME: Builds the system/user turns sent upstream from subject, mode and history
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! # System Prompts
//!
//! Prompts are loaded at compile time from markdown files for easy maintenance.
//! Every text provider receives the same content: a system part (tutor
//! persona, subject and mode instructions) and a user part (recent history and
//! the new question). Gemini receives both joined into a single user turn.

use super::{ChatMessage, MessageRole};

/// Tutor persona shared by every text provider
pub const TUTOR_SYSTEM_PROMPT: &str = include_str!("tutor_system.md");

/// Prompt-rewrite instructions for Stable Diffusion
pub const NVIDIA_PROMPT_REWRITE: &str = include_str!("image_prompt_nvidia.md");

/// Prompt-rewrite instructions for Qwen-Image (preserve intent, style and labels)
pub const QWEN_PROMPT_REWRITE: &str = include_str!("image_prompt_qwen.md");

/// Instructions for a conversation mode; unknown modes fall back to plain chat
#[must_use]
pub fn mode_instructions(mode: &str) -> &'static str {
    match mode.trim().to_lowercase().as_str() {
        "explain" => {
            "Mode: explain. Break the topic into small steps, define every new term, \
             and finish with a one-sentence recap."
        }
        "socratic" => {
            "Mode: socratic. Do not give the final answer directly. Ask one guiding \
             question at a time and build on the student's replies."
        }
        "quiz" => {
            "Mode: quiz. Ask the student one question at a time about the topic, wait \
             for their answer, then say whether it was right and why."
        }
        "summarize" => {
            "Mode: summarize. Produce a concise summary with the key points as a \
             bulleted list, followed by the three most important takeaways."
        }
        "homework" => {
            "Mode: homework help. Show the method step by step so the student can \
             solve similar problems on their own."
        }
        _ => "Mode: chat. Answer the student's question directly and helpfully.",
    }
}

/// Instructions for the conversation's subject, if it has one
#[must_use]
pub fn subject_instructions(subject: Option<&str>) -> Option<String> {
    subject
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            format!(
                "Subject: {s}. Keep examples and terminology relevant to {s}, and say so \
                 when a question falls outside it."
            )
        })
}

/// Full system prompt: persona, subject and mode
#[must_use]
pub fn build_system_prompt(subject: Option<&str>, mode: &str) -> String {
    let mut sections = vec![TUTOR_SYSTEM_PROMPT.trim().to_owned()];
    sections.extend(subject_instructions(subject));
    sections.push(mode_instructions(mode).to_owned());
    sections.join("\n\n")
}

const fn speaker(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "System",
        MessageRole::User => "Student",
        MessageRole::Assistant => "Tutor",
    }
}

/// Render prior messages as a transcript, oldest first
#[must_use]
pub fn format_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| format!("{}: {}", speaker(m.role), m.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// User turn: transcript of recent messages plus the new question
#[must_use]
pub fn build_user_turn(history: &[ChatMessage], message: &str) -> String {
    if history.is_empty() {
        return message.to_owned();
    }
    format!(
        "Conversation so far:\n{}\n\nStudent: {message}",
        format_history(history)
    )
}

/// Single combined prompt for providers that take one user turn
#[must_use]
pub fn build_combined_prompt(
    subject: Option<&str>,
    mode: &str,
    history: &[ChatMessage],
    message: &str,
) -> String {
    format!(
        "{}\n\n{}",
        build_system_prompt(subject, mode),
        build_user_turn(history, message)
    )
}

/// User turn for an image prompt-rewrite call
#[must_use]
pub fn build_rewrite_request(history: &[ChatMessage], message: &str) -> String {
    if history.is_empty() {
        return format!("Image request: {message}");
    }
    format!(
        "Conversation so far:\n{}\n\nImage request: {message}",
        format_history(history)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_mode_falls_back_to_chat() {
        assert!(mode_instructions("whatever").starts_with("Mode: chat"));
        assert!(mode_instructions(" QUIZ ").starts_with("Mode: quiz"));
    }

    #[test]
    fn test_system_prompt_includes_subject_and_mode() {
        let prompt = build_system_prompt(Some("Biology"), "explain");
        assert!(prompt.starts_with("You are StudyBuddy"));
        assert!(prompt.contains("Subject: Biology."));
        assert!(prompt.ends_with("one-sentence recap."));

        let without_subject = build_system_prompt(Some("  "), "chat");
        assert!(!without_subject.contains("Subject:"));
    }

    #[test]
    fn test_user_turn_with_history() {
        let history = vec![
            ChatMessage::user("What is a cell?"),
            ChatMessage::assistant("The basic unit of life."),
        ];
        let turn = build_user_turn(&history, "And a tissue?");
        assert_eq!(
            turn,
            "Conversation so far:\nStudent: What is a cell?\nTutor: The basic unit of life.\n\nStudent: And a tissue?"
        );
        assert_eq!(build_user_turn(&[], "Hi"), "Hi");
    }

    #[test]
    fn test_combined_prompt_orders_sections() {
        let prompt = build_combined_prompt(
            Some("Physics"),
            "quiz",
            &[ChatMessage::user("Teach me optics")],
            "Go on",
        );
        let subject = prompt.find("Subject: Physics").unwrap_or(usize::MAX);
        let mode = prompt.find("Mode: quiz").unwrap_or(usize::MAX);
        let history = prompt.find("Student: Teach me optics").unwrap_or(usize::MAX);
        let turn = prompt.rfind("Student: Go on").unwrap_or(usize::MAX);
        assert!(subject < mode && mode < history && history < turn);
    }
}
