//! Bounded, NUL-terminated message buffer shared by both relay directions.
//!
//! A [`Line`] never holds more than [`MAX_LINE_LEN`] payload bytes and
//! always keeps a NUL right after the payload, so the wireless stack can
//! treat it as a C string without copying.

use core::fmt;

pub use crate::config::MAX_LINE_LEN;

/// Payload plus terminator.
const LINE_BUF_LEN: usize = MAX_LINE_LEN + 1;

#[derive(Clone)]
pub struct Line {
    buf: [u8; LINE_BUF_LEN],
    len: usize,
}

impl Line {
    pub const fn new() -> Self {
        Self {
            buf: [0; LINE_BUF_LEN],
            len: 0,
        }
    }

    /// Split an arbitrary chunk into consecutive bounded lines, in order.
    /// An empty chunk yields nothing.
    pub fn split(chunk: &[u8]) -> impl Iterator<Item = Line> + '_ {
        chunk.chunks(MAX_LINE_LEN).map(|part| {
            let mut line = Self::new();
            line.buf[..part.len()].copy_from_slice(part);
            line.len = part.len();
            line
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Payload without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Payload followed by its NUL terminator.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.buf[..=self.len]
    }

    /// Payload with trailing CR/LF removed, for log output only.
    pub fn trimmed(&self) -> &[u8] {
        let mut end = self.len;
        while end > 0 && matches!(self.buf[end - 1], b'\r' | b'\n') {
            end -= 1;
        }
        &self.buf[..end]
    }

    /// Log-friendly rendering of [`trimmed`](Self::trimmed).
    pub fn display(&self) -> LineDisplay<'_> {
        LineDisplay(self.trimmed())
    }
}

impl Default for Line {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Line {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Line {}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line(\"{}\")", self.as_bytes().escape_ascii())
    }
}

/// Lossy UTF-8 view of a line's trimmed payload.
pub struct LineDisplay<'a>(&'a [u8]);

impl fmt::Display for LineDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.0))
    }
}
