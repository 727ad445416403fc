// ABOUTME: Bearer-token authentication for the study chat API
// ABOUTME: Verifies HS256 identity-provider tokens and resolves the calling user's id
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! # Authentication
//!
//! Tokens are issued by an external identity provider that shares a secret
//! with this server. The `sub` claim is the student's user id; every
//! conversation lookup is scoped to it.

use std::fmt;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::resources::ServerResources;

/// `JWT` claims carried by identity-provider tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User `ID`
    pub sub: String,
    /// Issued at timestamp
    #[serde(default)]
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// Authentication result with user context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    /// Authenticated user `ID`
    pub user_id: String,
}

/// `JWT` validation error with detailed information
#[derive(Debug, Clone)]
pub enum JwtValidationError {
    /// Token has expired
    TokenExpired {
        /// When the token expired
        expired_at: Option<DateTime<Utc>>,
    },
    /// Token signature is invalid
    TokenInvalid {
        /// Reason for invalidity
        reason: String,
    },
    /// Token is malformed (not proper `JWT` format)
    TokenMalformed {
        /// Details about malformation
        details: String,
    },
}

impl fmt::Display for JwtValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenExpired {
                expired_at: Some(at),
            } => write!(f, "JWT token expired at {}", at.to_rfc3339()),
            Self::TokenExpired { expired_at: None } => write!(f, "JWT token expired"),
            Self::TokenInvalid { reason } => write!(f, "JWT token is invalid: {reason}"),
            Self::TokenMalformed { details } => write!(f, "JWT token is malformed: {details}"),
        }
    }
}

impl std::error::Error for JwtValidationError {}

impl From<JwtValidationError> for AppError {
    fn from(error: JwtValidationError) -> Self {
        Self::auth_invalid(error.to_string())
    }
}

/// Verifies (and, for local tooling, issues) HS256 bearer tokens
#[derive(Clone)]
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthManager {
    /// Create a manager for a shared secret
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Generate a token for a user id
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails
    pub fn generate_token(&self, user_id: &str, expiry_hours: i64) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_owned(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(expiry_hours)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode token: {e}")))
    }

    /// Validate a token and return its claims
    ///
    /// # Errors
    ///
    /// Returns an error if the token is malformed, expired, badly signed or has no subject
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            debug!(error = %e, "JWT validation failed");
            match e.kind() {
                ErrorKind::ExpiredSignature => JwtValidationError::TokenExpired {
                    expired_at: Self::peek_expiry(token),
                },
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => JwtValidationError::TokenMalformed {
                    details: e.to_string(),
                },
                _ => JwtValidationError::TokenInvalid {
                    reason: e.to_string(),
                },
            }
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(JwtValidationError::TokenInvalid {
                reason: "missing subject".to_owned(),
            });
        }

        Ok(data.claims)
    }

    /// Read `exp` from a token that already failed expiry validation
    fn peek_expiry(token: &str) -> Option<DateTime<Utc>> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        // Only used for the error message; the token was already rejected
        validation.insecure_disable_signature_validation();
        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .and_then(|data| DateTime::from_timestamp(data.claims.exp, 0))
    }

    /// Authenticate an `Authorization` header value
    ///
    /// # Errors
    ///
    /// Returns `auth_required` when the header is absent and `auth_invalid`
    /// when it is not a valid bearer token
    pub fn authenticate_request(&self, auth_header: Option<&str>) -> AppResult<AuthResult> {
        let header = auth_header.ok_or_else(AppError::auth_required)?;
        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::auth_invalid("Authorization header must be a Bearer token"))?;

        let claims = self.validate_token(token)?;
        Ok(AuthResult {
            user_id: claims.sub,
        })
    }
}

impl fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Extractor for the authenticated caller; rejects the request with 401 otherwise
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Authenticated user `ID`
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<ServerResources>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        resources: &Arc<ServerResources>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let auth = resources.auth_manager.authenticate_request(header)?;
        Ok(Self {
            user_id: auth.user_id,
        })
    }
}
