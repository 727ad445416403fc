// ABOUTME: Best-effort detection of image-generation requests in a user message
// ABOUTME: Forces the Qwen-Image provider when the message asks for a picture
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! Content trigger classifier
//!
//! Fuzzy by nature: false positives and negatives are accepted.

use std::sync::LazyLock;

use regex::Regex;

use super::{Provider, ProviderRequest};
use crate::constants::models;

/// Explicit command prefixes that always request an image
const IMAGE_COMMAND_PREFIXES: &[&str] = &["image:", "/image", "img:", "generate image:"];

/// Verb stems; any inflection matches ("drawing", "created", "makes")
///
/// `genear` catches the common "genearte" typo.
const IMAGE_VERB: &str = r"\b(?:generat|genear|creat|mak|made|draw|drew|show|provid|giv|gave)\w*";

const IMAGE_NOUN: &str = r"\b(?:image|picture|photo|diagram|illustration|img)s?\b";

static VERB_THEN_NOUN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!("{IMAGE_VERB}.*{IMAGE_NOUN}")).ok());

static NOUN_THEN_VERB: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(&format!("{IMAGE_NOUN}.*{IMAGE_VERB}")).ok());

/// Whether a message should be served by the image provider
#[must_use]
pub fn should_force_image(message: &str) -> bool {
    let normalized = message.trim().to_lowercase();

    if IMAGE_COMMAND_PREFIXES
        .iter()
        .any(|prefix| normalized.starts_with(prefix))
    {
        return true;
    }

    [&VERB_THEN_NOUN, &NOUN_THEN_VERB]
        .into_iter()
        .filter_map(|pattern| pattern.as_ref())
        .any(|re| re.is_match(&normalized))
}

/// Override the resolved provider with Qwen-Image when the message asks for an image
///
/// Takes precedence over whatever the resolver produced, except that an
/// explicit Qwen selection keeps its model id.
#[must_use]
pub fn apply_image_override(request: ProviderRequest, message: &str) -> ProviderRequest {
    if request.provider != Provider::Qwen && should_force_image(message) {
        ProviderRequest::new(Provider::Qwen, models::QWEN_IMAGE_DEFAULT)
    } else {
        request
    }
}

/// Whether `apply_image_override` changed the request
#[must_use]
pub fn was_overridden(before: &ProviderRequest, after: &ProviderRequest) -> bool {
    before.provider != after.provider
}
