// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 mqcore contributors

//! The resumable byte-by-byte frame state machine.

use std::collections::HashMap;

use crate::error::WireError;
use crate::frame::{DecodeOutcome, Frame};

const INITIAL_CAPACITY: usize = 1024;

/// First byte of each command bucketed together, so commands sharing a
/// prefix (`CONNECT`/`CONNECTED`, `SEND`/`STOMP`/`SUBSCRIBE`, ...) are
/// disambiguated by the first byte at which their spellings actually
/// diverge, rather than a hand-picked offset.
const COMMAND_TABLE: &[(u8, &[&str])] = &[
    (b'A', &["ABORT", "ACK"]),
    (b'B', &["BEGIN"]),
    (b'C', &["COMMIT", "CONNECTED", "CONNECT"]),
    (b'D', &["DISCONNECT"]),
    (b'E', &["ERROR"]),
    (b'M', &["MESSAGE"]),
    (b'R', &["RECEIPT"]),
    (b'S', &["SEND", "STOMP", "SUBSCRIBE"]),
    (b'U', &["UNSUBSCRIBE"]),
];

enum CommandMatch {
    Matched(&'static str, usize),
    Incomplete,
    Invalid,
}

/// Match the longest command in [`COMMAND_TABLE`] that is a prefix of
/// `available`, resolving ties between one command and a longer command it
/// prefixes (`CONNECT` vs `CONNECTED`) by looking one byte past the shorter
/// spelling to see whether it continues.
fn match_command(available: &[u8]) -> CommandMatch {
    let Some((_, candidates)) = COMMAND_TABLE.iter().find(|(first, _)| *first == available[0])
    else {
        return CommandMatch::Invalid;
    };

    let mut live: Vec<&'static str> = candidates.to_vec();
    let mut i = 0usize;
    loop {
        let terminal: Vec<&'static str> = live.iter().copied().filter(|c| c.len() == i).collect();
        let continuing: Vec<&'static str> =
            live.iter().copied().filter(|c| c.len() > i).collect();

        if continuing.is_empty() {
            return match terminal.first() {
                Some(name) => CommandMatch::Matched(name, name.len()),
                None => CommandMatch::Invalid,
            };
        }

        if i >= available.len() {
            return CommandMatch::Incomplete;
        }
        let b = available[i];

        if let Some(name) = terminal.first() {
            let continues = continuing.iter().any(|c| c.as_bytes()[i] == b);
            if !continues {
                return CommandMatch::Matched(name, name.len());
            }
        }

        live = continuing
            .into_iter()
            .filter(|c| c.as_bytes()[i] == b)
            .collect();
        if live.is_empty() {
            return CommandMatch::Invalid;
        }
        i += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectCommand,
    ExpectHeaders,
    ExpectBody,
}

/// Incrementally decodes wire frames from a byte stream.
///
/// One decoder belongs to one connection; `decode` is not safe to call
/// concurrently on the same instance (see the crate-level concurrency
/// notes). Feed it chunks as they arrive — any size, any split point — and
/// each call returns either a completed [`Frame`] or [`DecodeOutcome::Incomplete`]
/// while it waits for more bytes.
pub struct FrameDecoder {
    buf: Vec<u8>,
    pos: usize,
    data_end: usize,
    state: State,

    command: Option<String>,
    headers: HashMap<String, String>,

    line_start: usize,
    name_end: Option<usize>,
    value_start: usize,
    trimming: bool,

    content_length: Option<usize>,
    body_start: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// A fresh decoder expecting the start of a frame.
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; INITIAL_CAPACITY],
            pos: 0,
            data_end: 0,
            state: State::ExpectCommand,
            command: None,
            headers: HashMap::new(),
            line_start: 0,
            name_end: None,
            value_start: 0,
            trimming: false,
            content_length: None,
            body_start: 0,
        }
    }

    /// The decoder's current phase. Test/observability hook only.
    pub fn phase(&self) -> &'static str {
        match self.state {
            State::ExpectCommand => "expect-command",
            State::ExpectHeaders => "expect-headers",
            State::ExpectBody => "expect-body",
        }
    }

    /// Append `chunk` to the working buffer and attempt to produce a
    /// complete frame. Bytes already consumed by a prior call are never
    /// re-scanned; state not consumed into a frame is preserved verbatim
    /// for the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<DecodeOutcome, WireError> {
        self.append(chunk);

        loop {
            match self.state {
                State::ExpectCommand => {
                    if !self.try_parse_command()? {
                        return Ok(DecodeOutcome::Incomplete);
                    }
                    self.state = State::ExpectHeaders;
                }
                State::ExpectHeaders => {
                    if !self.try_parse_headers() {
                        return Ok(DecodeOutcome::Incomplete);
                    }
                    self.state = State::ExpectBody;
                }
                State::ExpectBody => match self.try_parse_body() {
                    Some(frame) => {
                        self.reset_for_next_frame();
                        return Ok(DecodeOutcome::Frame(frame));
                    }
                    None => return Ok(DecodeOutcome::Incomplete),
                },
            }
        }
    }

    fn append(&mut self, chunk: &[u8]) {
        let needed = self.data_end + chunk.len();
        if needed >= self.buf.len() {
            let mut new_cap = self.buf.len().max(INITIAL_CAPACITY);
            while new_cap < needed {
                new_cap *= 2;
            }
            self.buf.resize(new_cap, 0);
        }
        self.buf[self.data_end..self.data_end + chunk.len()].copy_from_slice(chunk);
        self.data_end += chunk.len();
    }

    /// Returns `Ok(true)` once a command has been parsed and `self.pos` sits
    /// just past its terminating `\n`. Returns `Ok(false)` when more bytes
    /// are needed; all partial progress (bytes skipped as leading EOLs) is
    /// retained by advancing `self.pos` as we go.
    fn try_parse_command(&mut self) -> Result<bool, WireError> {
        loop {
            if self.pos >= self.data_end {
                return Ok(false);
            }
            match self.buf[self.pos] {
                b'\n' => {
                    self.pos += 1;
                }
                b'\r' => {
                    if self.pos + 1 >= self.data_end {
                        return Ok(false);
                    }
                    return match self.buf[self.pos + 1] {
                        b'\n' => Err(WireError::InvalidEndOfLine10 { byte: b'\r' }),
                        b'\r' => Err(WireError::TwoCarriageReturns),
                        _ => Err(WireError::BadCarriageReturns),
                    };
                }
                _ => break,
            }
        }

        let available = &self.buf[self.pos..self.data_end];
        if available.len() < 4 {
            return Ok(false);
        }

        match match_command(available) {
            CommandMatch::Incomplete => Ok(false),
            CommandMatch::Invalid => Err(WireError::InvalidCommand),
            CommandMatch::Matched(name, len) => {
                if self.pos + len >= self.data_end {
                    return Ok(false);
                }
                let terminator = self.buf[self.pos + len];
                if terminator != b'\n' {
                    return Err(WireError::InvalidEndOfLine10 { byte: terminator });
                }
                self.command = Some(name.to_string());
                self.pos += len + 1;
                self.line_start = self.pos;
                Ok(true)
            }
        }
    }

    /// Returns `true` once the blank line ending the headers block has been
    /// consumed, `false` when more bytes are needed.
    fn try_parse_headers(&mut self) -> bool {
        while self.pos < self.data_end {
            let b = self.buf[self.pos];
            match b {
                b':' if self.name_end.is_none() => {
                    self.name_end = Some(self.pos);
                    self.value_start = self.pos + 1;
                    self.trimming = true;
                    self.pos += 1;
                }
                b' ' | b'\t' if self.trimming => {
                    self.value_start = self.pos + 1;
                    self.pos += 1;
                }
                b'\n' => {
                    if self.pos == self.line_start {
                        self.pos += 1;
                        self.body_start = self.pos;
                        return true;
                    }
                    if let Some(name_end) = self.name_end {
                        let name =
                            String::from_utf8_lossy(&self.buf[self.line_start..name_end])
                                .into_owned();
                        let value =
                            String::from_utf8_lossy(&self.buf[self.value_start..self.pos])
                                .into_owned();
                        if name.eq_ignore_ascii_case("content-length") {
                            if let Ok(n) = value.trim().parse::<usize>() {
                                self.content_length = Some(n);
                            }
                        }
                        self.headers.insert(name, value);
                    }
                    self.pos += 1;
                    self.line_start = self.pos;
                    self.name_end = None;
                    self.trimming = false;
                }
                _ => {
                    self.trimming = false;
                    self.pos += 1;
                }
            }
        }
        false
    }

    fn try_parse_body(&mut self) -> Option<Frame> {
        let body = match self.content_length {
            Some(n) => {
                if self.data_end - self.body_start < n + 1 {
                    return None;
                }
                let body = self.buf[self.body_start..self.body_start + n].to_vec();
                self.pos = self.body_start + n + 1;
                body
            }
            None => {
                let window = &self.buf[self.body_start..self.data_end];
                let nul = window.iter().position(|&b| b == 0)?;
                let nul_pos = self.body_start + nul;
                let body = self.buf[self.body_start..nul_pos].to_vec();
                self.pos = nul_pos + 1;
                body
            }
        };

        if self.pos < self.data_end && self.buf[self.pos] == b'\n' {
            self.pos += 1;
        }

        Some(Frame {
            command: self.command.take().expect("command set before ExpectBody"),
            headers: std::mem::take(&mut self.headers),
            body,
        })
    }

    fn reset_for_next_frame(&mut self) {
        let remaining = self.data_end - self.pos;
        self.buf.copy_within(self.pos..self.data_end, 0);
        self.data_end = remaining;
        self.pos = 0;
        self.line_start = 0;
        self.name_end = None;
        self.value_start = 0;
        self.trimming = false;
        self.content_length = None;
        self.body_start = 0;
        self.state = State::ExpectCommand;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_with_headers_and_empty_body() {
        let input = b"CONNECT\nlogin:guest\npasscode:pw\n\n\0";
        let mut dec = FrameDecoder::new();
        let DecodeOutcome::Frame(frame) = dec.decode(input).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.command(), "CONNECT");
        assert_eq!(frame.header("login"), Some("guest"));
        assert_eq!(frame.header("passcode"), Some("pw"));
        assert_eq!(frame.body(), b"");
    }

    #[test]
    fn send_with_declared_content_length() {
        let input = b"SEND\ndestination:q\ncontent-length:5\n\nhello\0";
        let mut dec = FrameDecoder::new();
        let DecodeOutcome::Frame(frame) = dec.decode(input).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.command(), "SEND");
        assert_eq!(frame.header("destination"), Some("q"));
        assert_eq!(frame.body(), b"hello");
    }

    #[test]
    fn content_length_body_may_contain_embedded_nul() {
        let input = b"SEND\ndestination:q\ncontent-length:5\n\nhe\0lo\0";
        let mut dec = FrameDecoder::new();
        let DecodeOutcome::Frame(frame) = dec.decode(input).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.body(), b"he\0lo");
    }

    #[test]
    fn nul_terminated_body_stops_at_first_nul_leaving_remainder_buffered() {
        let input = b"SEND\ndestination:q\n\nhel\0lo\0";
        let mut dec = FrameDecoder::new();
        let DecodeOutcome::Frame(frame) = dec.decode(input).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.command(), "SEND");
        assert_eq!(frame.body(), b"hel");

        // remaining buffered bytes "lo\0" are under the 4-byte dispatch gate
        assert_eq!(dec.decode(&[]).unwrap(), DecodeOutcome::Incomplete);

        // a 4th byte lets dispatch proceed, and "lo\0x" does not match any command
        let err = dec.decode(b"x").unwrap_err();
        assert_eq!(err, WireError::InvalidCommand);
    }

    #[test]
    fn split_across_calls_returns_incomplete_then_frame() {
        let mut dec = FrameDecoder::new();
        assert_eq!(dec.decode(b"CONN").unwrap(), DecodeOutcome::Incomplete);
        let frame = dec.decode(b"ECT\n\n\0").unwrap();
        match frame {
            DecodeOutcome::Frame(f) => {
                assert_eq!(f.command(), "CONNECT");
                assert!(f.headers().is_empty());
            }
            DecodeOutcome::Incomplete => panic!("expected a frame on second call"),
        }
    }

    #[test]
    fn leading_crlf_fails_with_v10_marker() {
        let mut dec = FrameDecoder::new();
        let err = dec.decode(b"\r\nCONNECT\n\n\0").unwrap_err();
        assert_eq!(err, WireError::InvalidEndOfLine10 { byte: b'\r' });
    }

    #[test]
    fn two_carriage_returns_is_distinguished_from_crlf() {
        let mut dec = FrameDecoder::new();
        let err = dec.decode(b"\r\rCONNECT\n\n\0").unwrap_err();
        assert_eq!(err, WireError::TwoCarriageReturns);
    }

    #[test]
    fn lone_carriage_return_is_bad_carriage_returns() {
        let mut dec = FrameDecoder::new();
        let err = dec.decode(b"\rXCONNECT\n\n\0").unwrap_err();
        assert_eq!(err, WireError::BadCarriageReturns);
    }

    #[test]
    fn leading_newlines_are_silently_consumed() {
        let mut dec = FrameDecoder::new();
        let frame = dec.decode(b"\n\n\nCONNECT\n\n\0").unwrap();
        assert!(matches!(frame, DecodeOutcome::Frame(_)));
    }

    #[test]
    fn header_value_leading_whitespace_is_trimmed() {
        let mut dec = FrameDecoder::new();
        let DecodeOutcome::Frame(frame) = dec.decode(b"SEND\ndestination:  \t q\n\n\0").unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.header("destination"), Some("q"));
    }

    #[test]
    fn connect_and_connected_are_disambiguated() {
        let mut dec = FrameDecoder::new();
        let DecodeOutcome::Frame(frame) = dec.decode(b"CONNECTED\nversion:1.2\n\n\0").unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.command(), "CONNECTED");
    }

    #[test]
    fn unknown_command_is_rejected() {
        let mut dec = FrameDecoder::new();
        let err = dec.decode(b"ZZZZ\n\n\0").unwrap_err();
        assert_eq!(err, WireError::InvalidCommand);
    }

    #[test]
    fn two_frames_back_to_back_decode_in_order() {
        let mut dec = FrameDecoder::new();
        let f1 = dec.decode(b"CONNECT\n\n\0DISCONNECT\n\n\0").unwrap();
        assert!(matches!(f1, DecodeOutcome::Frame(ref f) if f.command() == "CONNECT"));
        let f2 = dec.decode(&[]).unwrap();
        assert!(matches!(f2, DecodeOutcome::Frame(ref f) if f.command() == "DISCONNECT"));
    }

    #[test]
    fn buffer_grows_past_initial_capacity() {
        let mut dec = FrameDecoder::new();
        let big_value = "x".repeat(2048);
        let input = format!("SEND\ndata:{big_value}\n\n\0");
        let DecodeOutcome::Frame(frame) = dec.decode(input.as_bytes()).unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(frame.header("data"), Some(big_value.as_str()));
    }
}
