// ABOUTME: Re-export of the unified error types from the study-core crate
// ABOUTME: Keeps `crate::errors::AppError` as the single import path inside the server
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! Unified error handling
//!
//! `AppError` and `ErrorCode` live in `study-core` so they can be shared with
//! other workspace crates; the server imports them from here.

pub use study_core::errors::{AppError, AppResult, ErrorCode, ErrorResponse};
