// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! GraphQL query body validator.
//!
//! Two structural checks guard the execution engine against complexity abuse:
//! - Directive density: runs of `@directive` tokens with only whitespace
//!   between them
//! - Nesting depth: brace depth with unmatched-brace detection
//!
//! Neither check parses GraphQL. Both are single left-to-right passes over
//! the characters of the body.

use crate::config::GuardConfig;
use thiserror::Error;
use tracing::debug;

/// Nesting ceiling used when no configuration is supplied.
pub const DEFAULT_MAX_DEPTH: usize = 250;

/// Directive run length that triggers rejection when no configuration is supplied.
pub const DEFAULT_DIRECTIVE_RUN_THRESHOLD: usize = 10;

/// Machine-readable rejection category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    DirectiveOverflow,
    DepthExceeded,
    UnbalancedBraces,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectiveOverflow => "directive_overflow",
            Self::DepthExceeded => "depth_exceeded",
            Self::UnbalancedBraces => "unbalanced_braces",
        }
    }
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation error types. `Display` is the message returned to clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("You can only use up to {threshold} consecutive directives")]
    DirectiveOverflow { threshold: usize },

    #[error("Maximum allowed depth exceeded: {limit}")]
    DepthExceeded { limit: usize },

    #[error("Unmatched braces in input string")]
    UnbalancedBraces,
}

impl ValidationError {
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::DirectiveOverflow { .. } => RejectionKind::DirectiveOverflow,
            Self::DepthExceeded { .. } => RejectionKind::DepthExceeded,
            Self::UnbalancedBraces => RejectionKind::UnbalancedBraces,
        }
    }
}

/// Outcome of validating one query body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Query may be forwarded
    Accepted,
    /// Query must not reach the engine
    Rejected(ValidationError),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn error(&self) -> Option<&ValidationError> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected(e) => Some(e),
        }
    }

    pub fn kind(&self) -> Option<RejectionKind> {
        self.error().map(ValidationError::kind)
    }
}

/// Result of the brace nesting scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestingOutcome {
    /// Every brace was matched and depth stayed within the limit
    Balanced {
        /// Deepest level reached
        deepest: usize,
    },
    /// Depth went past `limit`
    DepthExceeded { limit: usize },
    /// A `}` without an open `{`, or unclosed `{` at end of input
    UnbalancedBraces,
}

/// Report whether `text` contains `threshold` or more directive tokens
/// separated only by whitespace.
///
/// A directive token is `@` followed by at least one character that is
/// neither whitespace nor `@`. Adjacent tokens such as `@a@b` count
/// separately. Any other non-whitespace character ends the current run.
pub fn has_directive_overflow(text: &str, threshold: usize) -> bool {
    let mut chars = text.chars().peekable();
    let mut run = 0usize;

    while let Some(c) = chars.next() {
        if c == '@' {
            match chars.peek() {
                Some(&next) if is_token_char(next) => {
                    while chars.peek().is_some_and(|&n| is_token_char(n)) {
                        chars.next();
                    }
                    run += 1;
                    if run >= threshold {
                        return true;
                    }
                }
                // A lone `@` is not a token
                _ => run = 0,
            }
        } else if !c.is_whitespace() {
            run = 0;
        }
    }

    false
}

fn is_token_char(c: char) -> bool {
    c != '@' && !c.is_whitespace()
}

/// Scan the braces of `text`, stopping at the first violation.
///
/// Exactly `max_depth` levels are accepted. Braces inside string literals are
/// counted like any other.
pub fn check_nesting(text: &str, max_depth: usize) -> NestingOutcome {
    let mut depth = 0usize;
    let mut deepest = 0usize;

    for c in text.chars() {
        match c {
            '{' => {
                depth += 1;
                if depth > max_depth {
                    return NestingOutcome::DepthExceeded { limit: max_depth };
                }
                deepest = deepest.max(depth);
            }
            '}' => {
                if depth == 0 {
                    return NestingOutcome::UnbalancedBraces;
                }
                depth -= 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return NestingOutcome::UnbalancedBraces;
    }

    NestingOutcome::Balanced { deepest }
}

/// Validate `text` with the default directive threshold.
pub fn validate(text: &str, max_depth: usize) -> Verdict {
    QueryValidator::with_limits(max_depth, DEFAULT_DIRECTIVE_RUN_THRESHOLD).validate(text)
}

/// Query body validator.
#[derive(Debug, Clone)]
pub struct QueryValidator {
    max_depth: usize,
    directive_run_threshold: usize,
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_DEPTH, DEFAULT_DIRECTIVE_RUN_THRESHOLD)
    }
}

impl QueryValidator {
    /// Create a new validator with the given configuration.
    pub fn new(config: &GuardConfig) -> Self {
        Self::with_limits(config.max_depth, config.directive_run_threshold)
    }

    pub fn with_limits(max_depth: usize, directive_run_threshold: usize) -> Self {
        Self {
            max_depth,
            directive_run_threshold,
        }
    }

    /// Validate a complete query body. The directive check runs first and
    /// wins when both checks would fail.
    pub fn validate(&self, text: &str) -> Verdict {
        if has_directive_overflow(text, self.directive_run_threshold) {
            debug!(threshold = self.directive_run_threshold, "Directive run too long");
            return Verdict::Rejected(ValidationError::DirectiveOverflow {
                threshold: self.directive_run_threshold,
            });
        }

        match check_nesting(text, self.max_depth) {
            NestingOutcome::Balanced { deepest } => {
                debug!(deepest, limit = self.max_depth, "Query structure valid");
                Verdict::Accepted
            }
            NestingOutcome::DepthExceeded { limit } => {
                debug!(limit, "Nesting too deep");
                Verdict::Rejected(ValidationError::DepthExceeded { limit })
            }
            NestingOutcome::UnbalancedBraces => {
                debug!("Unmatched braces");
                Verdict::Rejected(ValidationError::UnbalancedBraces)
            }
        }
    }
}
