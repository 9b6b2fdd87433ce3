// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! Pattern repository error types.

use thiserror::Error;

/// Errors raised by [`crate::PatternRepository`].
#[derive(Debug, Error)]
pub enum PatternError {
    /// The pattern text could not be compiled (empty token, stray dot, etc).
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        /// Why compilation failed.
        reason: String,
    },
}
