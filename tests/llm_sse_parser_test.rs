// ABOUTME: Integration tests for the shared SSE frame parser used by all text providers
// ABOUTME: Validates chunking independence, split UTF-8, CRLF framing and stream termination
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use bytes::Bytes;
use futures_util::{stream, StreamExt};
use study_chat_server::errors::AppError;
use study_chat_server::llm::sse_parser::{create_sse_stream, SseEvent, SseFrameBuffer};
use study_chat_server::llm::{extract_delta, StreamChunk};

const TWO_DELTAS: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
                          data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\n\
                          data: [DONE]\n\n";

fn openai_parse(payload: &str) -> Option<Result<StreamChunk, AppError>> {
    extract_delta(payload).map(|d| Ok(StreamChunk::text(d)))
}

/// Feed chunks through a fresh buffer and collect every event, including the flush
fn feed_all(chunks: &[&[u8]]) -> Vec<SseEvent> {
    let mut parser = SseFrameBuffer::new();
    let mut events: Vec<SseEvent> = chunks.iter().flat_map(|c| parser.feed(c)).collect();
    events.extend(parser.flush());
    events
}

/// Helper: create an SSE stream from raw byte chunks and collect all deltas
async fn collect_deltas(chunks: Vec<Vec<u8>>) -> Vec<String> {
    let byte_stream = stream::iter(
        chunks
            .into_iter()
            .map(|b| Ok::<Bytes, reqwest::Error>(Bytes::from(b))),
    );

    let mut sse_stream = create_sse_stream(byte_stream, openai_parse, "Test");

    let mut results = Vec::new();
    while let Some(item) = sse_stream.next().await {
        let chunk = item.expect("SSE stream produced an unexpected error");
        if !chunk.is_final {
            results.push(chunk.delta);
        }
    }
    results
}

#[test]
fn test_single_chunk_yields_data_then_done() {
    let events = feed_all(&[TWO_DELTAS.as_bytes()]);
    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], SseEvent::Data(p) if p.contains("\"Hi\"")));
    assert_eq!(events[2], SseEvent::Done);
}

#[test]
fn test_every_split_point_yields_same_events() {
    let bytes = TWO_DELTAS.as_bytes();
    let expected = feed_all(&[bytes]);

    for split in 0..=bytes.len() {
        let (head, tail) = bytes.split_at(split);
        assert_eq!(feed_all(&[head, tail]), expected, "split at {split}");
    }

    let byte_by_byte: Vec<&[u8]> = bytes.chunks(1).collect();
    assert_eq!(feed_all(&byte_by_byte), expected);
}

#[test]
fn test_multibyte_character_split_across_chunks() {
    let frame = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9} \u{1f9ea}\"}}]}\n\n";
    let bytes = frame.as_bytes();
    let emoji_start = frame.find('\u{1f9ea}').unwrap();

    // Split inside the 4-byte emoji
    let events = feed_all(&[&bytes[..emoji_start + 2], &bytes[emoji_start + 2..]]);
    let SseEvent::Data(payload) = &events[0] else {
        panic!("expected a data event");
    };
    assert_eq!(extract_delta(payload).as_deref(), Some("caf\u{e9} \u{1f9ea}"));
    assert!(!payload.contains('\u{fffd}'));
}

#[test]
fn test_crlf_frames_are_normalized() {
    let events = feed_all(&[b"data: {\"a\":1}\r\n\r\ndata: [DONE]\r\n\r\n"]);
    assert_eq!(
        events,
        vec![SseEvent::Data("{\"a\":1}".to_owned()), SseEvent::Done]
    );
}

#[test]
fn test_trailing_frame_without_blank_line_is_flushed() {
    let mut parser = SseFrameBuffer::new();
    assert!(parser.feed(b"data: {\"a\":1}").is_empty());
    assert_eq!(parser.flush(), vec![SseEvent::Data("{\"a\":1}".to_owned())]);
}

#[test]
fn test_non_data_fields_and_comments_are_ignored() {
    let events = feed_all(&[b": keep-alive\n\nevent: message\nid: 7\ndata: {\"a\":1}\n\n"]);
    assert_eq!(events, vec![SseEvent::Data("{\"a\":1}".to_owned())]);
}

#[test]
fn test_nothing_after_done_is_parsed() {
    let mut parser = SseFrameBuffer::new();
    let events = parser.feed(b"data: [DONE]\n\ndata: {\"late\":true}\n\n");
    assert_eq!(events, vec![SseEvent::Done]);
    assert!(parser.is_finished());
    assert!(parser.feed(b"data: {\"later\":true}\n\n").is_empty());
    assert!(parser.flush().is_empty());
}

#[tokio::test]
async fn test_stream_yields_deltas_regardless_of_chunking() {
    let whole = collect_deltas(vec![TWO_DELTAS.as_bytes().to_vec()]).await;
    assert_eq!(whole, vec!["Hi", " there"]);

    let tiny = collect_deltas(TWO_DELTAS.as_bytes().chunks(3).map(<[u8]>::to_vec).collect()).await;
    assert_eq!(tiny, whole);
}

#[tokio::test]
async fn test_stream_skips_role_only_and_malformed_payloads() {
    let body = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
                data: not json\n\n\
                data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n\
                data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n";
    let deltas = collect_deltas(vec![body.as_bytes().to_vec()]).await;
    assert_eq!(deltas, vec!["ok"]);
}
