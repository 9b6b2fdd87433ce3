// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! Frame decode error types.

use thiserror::Error;

/// Errors raised by [`crate::FrameDecoder::decode`].
///
/// None of these are recoverable for the frame currently in flight: the
/// caller should close the connection. They carry just enough detail for a
/// version-negotiating caller to react (e.g. hand the connection to a
/// different protocol version decoder on [`InvalidEndOfLine10`]).
///
/// [`InvalidEndOfLine10`]: WireError::InvalidEndOfLine10
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    /// The byte(s) at the start of a line did not match any known command.
    #[error("unrecognized command")]
    InvalidCommand,

    /// A line was terminated with `\r\n` rather than a bare `\n`. This
    /// decoder only understands the version 1.0 framing (`\n`-terminated);
    /// the offending byte is carried so a caller can hand the connection
    /// off to a decoder for a later protocol version.
    #[error("end-of-line byte {byte:#04x} is not valid for this decoder")]
    InvalidEndOfLine10 {
        /// The byte that triggered the rejection (always `\r`).
        byte: u8,
    },

    /// A lone `\r` appeared where neither `\n` nor another `\r` followed.
    #[error("carriage return not followed by line feed or another carriage return")]
    BadCarriageReturns,

    /// Two consecutive `\r` bytes appeared before a command.
    #[error("two consecutive carriage returns")]
    TwoCarriageReturns,
}
