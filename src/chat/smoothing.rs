// ABOUTME: Word-smoothing buffer that re-paces arbitrary text deltas one word at a time
// ABOUTME: Emits leading whitespace-terminated words and flushes the remainder at the end
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! Word pacing
//!
//! Upstream deltas arrive at arbitrary boundaries (half words, whole
//! sentences). The smoother only lets complete words through: a fragment is
//! released once it is followed by whitespace, and the trailing partial word
//! waits for the next push or for `flush`. The concatenation of everything
//! emitted always equals the concatenation of everything pushed.

use std::mem;
use std::sync::LazyLock;

use regex::Regex;

/// Optional leading whitespace, one word, and the whitespace that ends it
static LEADING_WORD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*\S+\s+").ok());

/// Per-request word buffer
#[derive(Debug, Default)]
pub struct WordSmoother {
    buffer: String,
}

impl WordSmoother {
    /// Create an empty smoother
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return every complete word now available, in order
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);

        let Some(pattern) = LEADING_WORD.as_ref() else {
            // Without the pattern, pass text through unpaced
            return self.flush().into_iter().collect();
        };

        let mut fragments = Vec::new();
        while let Some(end) = pattern.find(&self.buffer).map(|m| m.end()) {
            fragments.push(self.buffer.drain(..end).collect());
        }
        fragments
    }

    /// Release whatever remains, if anything
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(mem::take(&mut self.buffer))
        }
    }

    /// Whether text is still held back
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
