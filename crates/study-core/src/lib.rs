// ABOUTME: Core types and constants for the study chat server
// ABOUTME: Foundation crate with error handling and provider/environment constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

#![deny(unsafe_code)]

//! # Study Core
//!
//! Foundation crate providing shared types and constants for the study chat
//! server. This crate is designed to change infrequently, enabling incremental
//! compilation benefits in the workspace.
//!
//! ## Modules
//!
//! - **errors**: Unified error handling with `AppError` and `ErrorCode`
//! - **constants**: Environment variable names, provider defaults and endpoints

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Application constants organized by domain
pub mod constants;
