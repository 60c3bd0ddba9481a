// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! GraphQL Query Guard
//!
//! This crate rejects GraphQL request bodies that could exhaust the execution
//! engine before they reach it:
//!
//! - Runs of 10 or more consecutive `@directive` tokens
//! - Brace nesting deeper than 250 levels
//! - Unmatched braces
//!
//! Rejected queries get `400 Bad Request` with `{"message": "..."}`. Accepted
//! queries are forwarded with their body replayed unchanged.

pub mod body;
pub mod config;
pub mod guard;
pub mod handlers;
pub mod metrics;
pub mod validator;

pub use body::{BodyError, BufferedBody};
pub use config::Config;
pub use guard::QueryGuardLayer;
pub use validator::{validate, QueryValidator, RejectionKind, ValidationError, Verdict};
