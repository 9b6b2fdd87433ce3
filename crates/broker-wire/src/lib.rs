// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! Incremental decoder for a STOMP-like text wire framing protocol.
//!
//! A frame is a command line, zero or more `NAME:VALUE` header lines, a
//! blank line, and a body bounded either by a declared `content-length` or
//! by the first NUL byte. [`FrameDecoder`] consumes chunks of arbitrary
//! size and split point and produces frames one at a time, preserving all
//! partial-parse state between calls so a transport layer can feed it
//! however bytes happen to arrive.
//!
//! This decoder only understands version 1.0 framing (`\n` line endings).
//! A `\r\n` line ending surfaces [`WireError::InvalidEndOfLine10`]
//! carrying the offending byte, which a caller can use as a signal to hand
//! the connection to a decoder for a later protocol version instead of
//! treating it as fatal.

pub mod decoder;
pub mod error;
pub mod frame;

pub use decoder::FrameDecoder;
pub use error::WireError;
pub use frame::{DecodeOutcome, Frame};
