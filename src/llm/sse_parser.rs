// ABOUTME: Shared SSE (Server-Sent Events) frame parser for upstream LLM streaming responses
// ABOUTME: Incremental UTF-8 decoding, blank-line framing, data: payloads and [DONE] termination
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! # SSE Stream Parser
//!
//! A shared frame-buffering parser for Server-Sent Events used by every text
//! provider. TCP does not align network chunks with SSE frames, so the parser
//! guarantees that any split of the same byte sequence yields the same events:
//!
//! 1. **Split multi-byte characters**: an incomplete UTF-8 sequence at the end
//!    of a chunk is held back and completed by the next chunk.
//!
//! 2. **Split or batched frames**: frames end at the first blank line
//!    (`\n\n`, with `\r\n` normalized first); anything after it stays buffered.
//!
//! ## Usage
//!
//! Each provider supplies a `parse_data` closure that converts a payload into
//! a `StreamChunk`. The framing is handled once here.
//!
//! ```text
//! let stream = create_sse_stream(
//!     response.bytes_stream(),
//!     |payload| extract_delta(payload).map(|d| Ok(StreamChunk::text(d))),
//!     "Groq",
//! );
//! ```

use std::collections::VecDeque;
use std::mem;
use std::pin::Pin;
use std::str;

use bytes::Bytes;
use futures_util::stream::unfold;
use futures_util::{future, Stream, StreamExt};
use tracing::error;

use super::{ChatStream, StreamChunk};
use crate::errors::AppError;

/// Payload that terminates an `OpenAI`-style stream
const DONE_SENTINEL: &str = "[DONE]";

/// A parsed SSE event from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload (prefix stripped, trimmed)
    Data(String),
    /// The `[DONE]` termination signal
    Done,
}

/// Frame-buffering SSE parser
#[derive(Debug, Default)]
pub struct SseFrameBuffer {
    /// Trailing bytes of an incomplete UTF-8 sequence
    partial_utf8: Vec<u8>,
    /// Decoded text not yet terminated by a blank line
    buffer: String,
    /// Set once `[DONE]` has been seen; later input is ignored
    finished: bool,
}

impl SseFrameBuffer {
    /// Create a new empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `[DONE]` has been received
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed a network chunk, returning the events of every frame it completes
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        if self.finished {
            return Vec::new();
        }

        self.partial_utf8.extend_from_slice(bytes);
        let decoded = self.decode_available();
        self.buffer.push_str(&decoded);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(end) = self.buffer.find("\n\n") {
            let frame: String = self.buffer.drain(..end + 2).collect();
            if self.parse_frame(&frame, &mut events) {
                break;
            }
        }
        events
    }

    /// Parse whatever is left when the byte stream ends without a blank line
    pub fn flush(&mut self) -> Vec<SseEvent> {
        if self.finished {
            return Vec::new();
        }

        let leftover = mem::take(&mut self.partial_utf8);
        self.buffer.push_str(&String::from_utf8_lossy(&leftover));
        let frame = mem::take(&mut self.buffer).replace("\r\n", "\n");

        let mut events = Vec::new();
        self.parse_frame(&frame, &mut events);
        events
    }

    /// Decode as much of `partial_utf8` as forms complete characters
    ///
    /// Invalid sequences become U+FFFD; an incomplete sequence at the very end
    /// is kept for the next chunk.
    fn decode_available(&mut self) -> String {
        let bytes = mem::take(&mut self.partial_utf8);
        let mut decoded = String::with_capacity(bytes.len());
        let mut rest = bytes.as_slice();

        loop {
            match str::from_utf8(rest) {
                Ok(valid) => {
                    decoded.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // `valid_up_to` guarantees this prefix is UTF-8
                    decoded.push_str(&String::from_utf8_lossy(valid));
                    if let Some(invalid_len) = e.error_len() {
                        decoded.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[invalid_len..];
                    } else {
                        self.partial_utf8 = after.to_vec();
                        break;
                    }
                }
            }
        }
        decoded
    }

    /// Extract the `data:` payloads of one frame; returns true on `[DONE]`
    fn parse_frame(&mut self, frame: &str, events: &mut Vec<SseEvent>) -> bool {
        for line in frame.split('\n') {
            // Non-data fields (event:, id:, retry:, comments) are ignored
            let Some(payload) = line.strip_prefix("data:") else {
                continue;
            };
            let payload = payload.trim();

            if payload == DONE_SENTINEL {
                events.push(SseEvent::Done);
                self.finished = true;
                self.buffer.clear();
                self.partial_utf8.clear();
                return true;
            }
            if !payload.is_empty() {
                events.push(SseEvent::Data(payload.to_owned()));
            }
        }
        false
    }
}

/// Create a frame-buffered chat stream from a raw byte stream
///
/// # Arguments
///
/// * `byte_stream` - Raw bytes from `response.bytes_stream()`
/// * `parse_data` - Maps a payload to an optional `StreamChunk`; `None` skips
///   payloads that carry no text (role-only deltas, metadata, bad JSON)
/// * `provider_name` - Provider name for error messages (e.g., "Groq", "Gemini")
///
/// The stream stops reading the upstream body as soon as `[DONE]` arrives.
/// A transport error is yielded as the last item.
pub fn create_sse_stream<S, F>(
    byte_stream: S,
    parse_data: F,
    provider_name: &'static str,
) -> ChatStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    F: Fn(&str) -> Option<Result<StreamChunk, AppError>> + Send + 'static,
{
    let state = SseStreamState {
        parser: SseFrameBuffer::new(),
        pending: VecDeque::new(),
        stream_ended: false,
    };

    let stream = unfold(
        (
            Box::pin(byte_stream)
                as Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
            state,
            parse_data,
            provider_name,
        ),
        |(mut byte_stream, mut state, parse_data, provider_name)| async move {
            loop {
                // Drain pending events first (several frames per TCP chunk)
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, (byte_stream, state, parse_data, provider_name)));
                }

                if state.stream_ended {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        let events = state.parser.feed(&bytes);
                        state.enqueue(events, &parse_data);
                        if state.parser.is_finished() {
                            state.stream_ended = true;
                        }
                    }
                    Some(Err(e)) => {
                        error!(provider = provider_name, error = %e, "Upstream stream read failed");
                        state.stream_ended = true;
                        return Some((
                            Err(AppError::external_service(
                                provider_name,
                                format!("Stream read error: {e}"),
                            )),
                            (byte_stream, state, parse_data, provider_name),
                        ));
                    }
                    None => {
                        state.stream_ended = true;
                        let events = state.parser.flush();
                        state.enqueue(events, &parse_data);
                    }
                }
            }
        },
    );

    // Drop empty deltas unless they mark the end
    let filtered = stream.filter(|result| {
        future::ready(
            result
                .as_ref()
                .map_or(true, |chunk| !chunk.delta.is_empty() || chunk.is_final),
        )
    });

    Box::pin(filtered)
}

/// Internal state for the SSE stream unfold
struct SseStreamState {
    parser: SseFrameBuffer,
    pending: VecDeque<Result<StreamChunk, AppError>>,
    stream_ended: bool,
}

impl SseStreamState {
    fn enqueue<F>(&mut self, events: Vec<SseEvent>, parse_data: &F)
    where
        F: Fn(&str) -> Option<Result<StreamChunk, AppError>>,
    {
        for event in events {
            match event {
                SseEvent::Data(payload) => {
                    if let Some(result) = parse_data(&payload) {
                        self.pending.push_back(result);
                    }
                }
                SseEvent::Done => self.pending.push_back(Ok(StreamChunk::done())),
            }
        }
    }
}
