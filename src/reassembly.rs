//! Reassembly of the inbound byte stream into protocol units.
//!
//! The stream arrives in arbitrary chunks. In line mode every CRLF terminated
//! line is a unit; in blob mode bytes accumulate until the end-of-data marker
//! (`CRLF . CRLF`) is seen. The unconsumed tail is always kept in the buffer
//! and prefixed to the next chunk.

use serde::Deserialize;

pub const CRLF: &[u8] = b"\r\n";

/// The end-of-data marker terminating a message body.
pub const END_OF_DATA: &[u8] = b"\r\n.\r\n";

/// What to do once an accumulating message exceeds the maximum size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Drop what has accumulated, report the overflow straight away and keep
    /// accumulating afresh.
    #[default]
    Continue,
    /// Drop everything up to the end-of-data marker, then report the overflow
    /// once and leave blob mode.
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Line,
    Blob,
    Discard,
}

/// A complete unit extracted from the stream.
#[derive(Debug, PartialEq, Eq)]
pub enum Unit {
    /// A command line, without its terminator.
    Line(String),
    /// A message body, still dot-stuffed, with the marker stripped. The final
    /// CRLF of the body is retained.
    Blob(Vec<u8>),
    /// The accumulating message exceeded the maximum size and was dropped.
    /// Blob mode is still active.
    Overflow,
    /// An oversized message was discarded up to its end-of-data marker.
    /// Blob mode has ended.
    Rejected,
    /// A command line exceeded the maximum line length and was dropped.
    LineTooLong,
}

#[derive(Debug)]
pub struct Reassembler {
    buffer: Vec<u8>,
    mode: Mode,
    /// Bytes at the front of the buffer already searched for a terminator.
    scanned: usize,
    /// Whether the first buffered byte begins a body line.
    line_start: bool,
    /// Bytes kept from a dropped accumulation so a marker split across the
    /// overflow is still seen. They are not part of the fresh accumulation.
    carried: usize,
    /// Set while the tail of an oversized line is still arriving.
    skipping_line: bool,
    max_message_size: usize,
    max_line_length: usize,
    policy: OverflowPolicy,
}

impl Reassembler {
    /// A `max_message_size` or `max_line_length` of 0 means unlimited.
    pub const fn new(
        max_message_size: usize,
        max_line_length: usize,
        policy: OverflowPolicy,
    ) -> Self {
        Self {
            buffer: Vec::new(),
            mode: Mode::Line,
            scanned: 0,
            line_start: true,
            carried: 0,
            skipping_line: false,
            max_message_size,
            max_line_length,
            policy,
        }
    }

    /// Append the next chunk of the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Switch to blob mode. Anything already buffered becomes message content.
    pub fn begin_blob(&mut self) {
        self.mode = Mode::Blob;
        self.scanned = 0;
        self.line_start = true;
        self.carried = 0;
    }

    /// Whether bytes are currently treated as message content.
    pub fn in_blob(&self) -> bool {
        self.mode != Mode::Line
    }

    /// Drop the unconsumed remainder without changing mode.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.line_start = true;
        self.carried = 0;
        self.skipping_line = false;
    }

    /// The number of bytes held but not yet consumed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Extract the next complete unit, if the buffer holds one.
    ///
    /// Callers should keep calling this until it returns `None`, since a
    /// single chunk may carry several lines, or a body followed by lines.
    pub fn next_unit(&mut self) -> Option<Unit> {
        match self.mode {
            Mode::Line => self.next_line(),
            Mode::Blob => self.next_blob(),
            Mode::Discard => self.discard(),
        }
    }

    fn next_line(&mut self) -> Option<Unit> {
        if self.skipping_line {
            let Some(end) = self.search(CRLF) else {
                self.drop_keeping_cr();
                return None;
            };

            self.buffer.drain(..end + CRLF.len());
            self.skipping_line = false;
        }

        let Some(end) = self.search(CRLF) else {
            if self.max_line_length > 0 && self.buffer.len() > self.max_line_length {
                self.drop_keeping_cr();
                self.skipping_line = true;
                return Some(Unit::LineTooLong);
            }

            return None;
        };

        let line = String::from_utf8_lossy(&self.buffer[..end]).into_owned();
        self.buffer.drain(..end + CRLF.len());

        if self.max_line_length > 0 && end > self.max_line_length {
            return Some(Unit::LineTooLong);
        }

        Some(Unit::Line(line))
    }

    fn next_blob(&mut self) -> Option<Unit> {
        if let Some((body_end, consumed)) = self.find_end_of_data() {
            let body = self.buffer[self.carried.min(body_end)..body_end].to_vec();
            self.leave_blob(consumed);
            return Some(Unit::Blob(body));
        }

        if self.max_message_size == 0 || self.buffer.len() - self.carried <= self.max_message_size
        {
            return None;
        }

        self.keep_marker_prefix();

        match self.policy {
            OverflowPolicy::Continue => {
                self.carried = self.buffer.len();
                Some(Unit::Overflow)
            }
            OverflowPolicy::Reject => {
                self.mode = Mode::Discard;
                self.discard()
            }
        }
    }

    fn discard(&mut self) -> Option<Unit> {
        if let Some((_, consumed)) = self.find_end_of_data() {
            self.leave_blob(consumed);
            return Some(Unit::Rejected);
        }

        self.keep_marker_prefix();
        None
    }

    fn leave_blob(&mut self, consumed: usize) {
        self.buffer.drain(..consumed);
        self.mode = Mode::Line;
        self.scanned = 0;
        self.carried = 0;
    }

    /// Locate the end of a message: `(body length, bytes consumed)`.
    ///
    /// A body may be empty, in which case the buffer begins with `.` CRLF at
    /// the start of a line.
    fn find_end_of_data(&mut self) -> Option<(usize, usize)> {
        if self.line_start && self.buffer.starts_with(&END_OF_DATA[CRLF.len()..]) {
            return Some((0, END_OF_DATA.len() - CRLF.len()));
        }

        self.search(END_OF_DATA)
            .map(|pos| (pos + CRLF.len(), pos + END_OF_DATA.len()))
    }

    /// Find `needle`, resuming where the previous unsuccessful search ended.
    fn search(&mut self, needle: &[u8]) -> Option<usize> {
        let from = self.scanned.saturating_sub(needle.len() - 1);
        let found = find(&self.buffer[from..], needle).map(|pos| from + pos);

        self.scanned = if found.is_some() { 0 } else { self.buffer.len() };
        found
    }

    /// Retain only enough of the tail for a marker split across chunks.
    fn keep_marker_prefix(&mut self) {
        let keep = END_OF_DATA.len() - 1;
        if self.buffer.len() > keep {
            let dropped = self.buffer.len() - keep;
            self.line_start = self.buffer[..dropped].ends_with(CRLF);
            self.buffer.drain(..dropped);
            self.scanned = 0;
        }
    }

    /// Drop an unterminated line, keeping a trailing CR whose LF is still to
    /// come.
    fn drop_keeping_cr(&mut self) {
        let keep = usize::from(self.buffer.last() == Some(&b'\r'));
        self.buffer.drain(..self.buffer.len() - keep);
        self.scanned = 0;
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Undo dot-transparency: a line starting with `..` loses its first `.`.
pub fn unstuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len());
    let mut line_start = true;
    let mut idx = 0;

    while idx < body.len() {
        if line_start && body[idx..].starts_with(b"..") {
            idx += 1;
        }

        let byte = body[idx];
        out.push(byte);
        line_start = byte == b'\n' && out.ends_with(CRLF);
        idx += 1;
    }

    out
}

/// Apply dot-transparency: every line starting with `.` gains another `.`.
pub fn stuff(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 8);
    let mut line_start = true;

    for &byte in body {
        if line_start && byte == b'.' {
            out.push(b'.');
        }

        out.push(byte);
        line_start = byte == b'\n' && out.ends_with(CRLF);
    }

    out
}
