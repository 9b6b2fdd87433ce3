// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! The critical I/O error sink.

use std::path::Path;

/// Receives unrecoverable I/O failures from the storage layer.
///
/// The factory never retries a failed write itself; it notifies this single
/// sink and moves on. Whether a failure is fatal for the broker is entirely
/// the listener's call.
pub trait IoCriticalErrorListener: Send + Sync {
    /// Called once per I/O error encountered while flushing or writing.
    fn on_io_error(&self, error: &std::io::Error, message: &str, file: &Path);
}

impl<F> IoCriticalErrorListener for F
where
    F: Fn(&std::io::Error, &str, &Path) + Send + Sync,
{
    fn on_io_error(&self, error: &std::io::Error, message: &str, file: &Path) {
        self(error, message, file)
    }
}
