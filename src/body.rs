// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Capture-once, replay-many request bodies.
//!
//! The guard has to read the whole body before the GraphQL engine does. The
//! body is drained into memory once and handed back as fresh [`Body`] values
//! as often as needed.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::borrow::Cow;
use thiserror::Error;

/// Failure to capture a request body. Never a validation rejection.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("Request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Unable to read request body: {0}")]
    Unreadable(String),
}

impl BodyError {
    /// Label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::TooLarge { .. } => "too_large",
            Self::Unreadable(_) => "unreadable",
        }
    }
}

/// A fully read request body.
#[derive(Debug, Clone, Default)]
pub struct BufferedBody {
    bytes: Bytes,
}

impl BufferedBody {
    /// Read `body` to the end, failing once more than `limit` bytes arrive.
    pub async fn capture(body: Body, limit: usize) -> Result<Self, BodyError> {
        match Limited::new(body, limit).collect().await {
            Ok(collected) => Ok(Self {
                bytes: collected.to_bytes(),
            }),
            Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
                Err(BodyError::TooLarge { limit })
            }
            Err(err) => Err(BodyError::Unreadable(err.to_string())),
        }
    }

    /// Reject up front when the declared `Content-Length` is over `limit`.
    pub fn check_declared_length(headers: &HeaderMap, limit: usize) -> Result<(), BodyError> {
        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<usize>().ok());

        match declared {
            Some(len) if len > limit => Err(BodyError::TooLarge { limit }),
            _ => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// The body decoded as text. Invalid UTF-8 becomes U+FFFD, which leaves
    /// every ASCII brace and `@` in place.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// A new body over the captured bytes.
    pub fn replay(&self) -> Body {
        Body::from(self.bytes.clone())
    }
}

impl From<Bytes> for BufferedBody {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}
