// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! Journal error types.

use thiserror::Error;

/// Errors raised by the sequential file factory and timed buffer.
#[derive(Debug, Error)]
pub enum JournalError {
    /// A directory or file operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `stop` was interrupted while awaiting the write executor's
    /// termination.
    #[error("interrupted while waiting for the write executor to stop")]
    Interrupted,

    /// A write was submitted to a file that was never opened through this
    /// factory.
    #[error("no such open file: {0}")]
    UnknownFile(String),
}
