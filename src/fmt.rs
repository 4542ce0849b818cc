//! A plain accumulation buffer for formatted text.

use std::fmt::{self, Write as _};
use std::io;

use crate::error::Error;

/// Capacity given to an empty [`FmtBuffer`] on its first
/// [`read_from`](FmtBuffer::read_from).
const READ_FROM_FLOOR: usize = 64;

/// An append-only byte buffer with text-formatting helpers.
///
/// Where [`IoBuffer`] tracks consumption and recycles its storage,
/// `FmtBuffer` is the simple cousin for building up formatted output
/// (access log lines, header values) that is handed off in one piece:
/// no read offset, no pooling, just an owned growable region.
///
/// [`IoBuffer`]: crate::IoBuffer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FmtBuffer {
    buf: Vec<u8>,
}

impl FmtBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Accumulated bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// The accumulated contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the buffer and hands back the underlying allocation.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Appends raw bytes.
    pub fn put_slice(&mut self, src: &[u8]) {
        self.buf.extend_from_slice(src);
    }

    /// Appends the UTF-8 bytes of `src`.
    pub fn put_str(&mut self, src: &str) {
        self.buf.extend_from_slice(src.as_bytes());
    }

    /// Appends a single byte.
    pub fn put_byte(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    /// Appends the decimal form of `n`.
    pub fn put_int(&mut self, n: i64) {
        let _ = write!(self, "{n}");
    }

    /// Appends the decimal form of `n`.
    pub fn put_uint(&mut self, n: u64) {
        let _ = write!(self, "{n}");
    }

    /// Appends `true` or `false`.
    pub fn put_bool(&mut self, value: bool) {
        let _ = write!(self, "{value}");
    }

    /// Appends the shortest decimal form of `value` that parses back to
    /// the same number, without an exponent.
    pub fn put_f64(&mut self, value: f64) {
        let _ = write!(self, "{value}");
    }

    /// Appends the shortest decimal form of `value` that parses back to
    /// the same number, without an exponent.
    pub fn put_f32(&mut self, value: f32) {
        let _ = write!(self, "{value}");
    }

    /// Replaces the contents with `src`.
    pub fn set(&mut self, src: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(src);
    }

    /// Replaces the contents with the UTF-8 bytes of `src`.
    pub fn set_str(&mut self, src: &str) {
        self.set(src.as_bytes());
    }

    /// Empties the buffer, keeping its capacity.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Drops a single trailing newline byte, if present.
    pub fn trim_newline(&mut self) {
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
    }

    /// Appends everything `src` yields until end of input, doubling the
    /// capacity whenever the buffer fills.
    pub fn read_from<R: io::Read>(&mut self, src: &mut R) -> Result<u64, Error> {
        let mut total = 0u64;
        loop {
            if self.buf.capacity() == 0 {
                self.buf.reserve(READ_FROM_FLOOR);
            } else if self.buf.len() == self.buf.capacity() {
                self.buf.reserve(self.buf.capacity());
            }

            let start = self.buf.len();
            self.buf.resize(self.buf.capacity(), 0);
            let attempt = src.read(&mut self.buf[start..]);
            match attempt {
                Ok(0) => {
                    self.buf.truncate(start);
                    return Ok(total);
                }
                Ok(n) => {
                    self.buf.truncate(start + n);
                    total += n as u64;
                }
                Err(source) => {
                    self.buf.truncate(start);
                    return Err(Error::Io {
                        transferred: total,
                        source,
                    });
                }
            }
        }
    }

    /// Writes the whole contents to `sink` in a single call, leaving
    /// them in place.
    pub fn write_to<W: io::Write>(&self, sink: &mut W) -> Result<u64, Error> {
        match sink.write(&self.buf) {
            Ok(n) => Ok(n as u64),
            Err(source) => Err(Error::Io {
                transferred: 0,
                source,
            }),
        }
    }
}

impl fmt::Write for FmtBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

impl io::Write for FmtBuffer {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        self.put_slice(src);
        Ok(src.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl fmt::Display for FmtBuffer {
    /// Lossy UTF-8 view of the contents; the buffer accumulates text by
    /// convention but nothing enforces it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.buf))
    }
}

impl From<&[u8]> for FmtBuffer {
    fn from(src: &[u8]) -> Self {
        Self { buf: src.to_vec() }
    }
}

impl From<&str> for FmtBuffer {
    fn from(src: &str) -> Self {
        src.as_bytes().into()
    }
}

#[cfg(test)]
mod tests {
    use super::FmtBuffer;

    use std::io::Write;

    #[test]
    fn test_formatting() {
        let mut buf = FmtBuffer::new();

        buf.put_str("n=");
        buf.put_int(-42);
        buf.put_byte(b' ');
        buf.put_uint(7);
        buf.put_byte(b' ');
        buf.put_bool(true);

        assert_eq!(buf.as_bytes(), b"n=-42 7 true");
    }

    #[test]
    fn test_floats_are_fixed_point() {
        let mut buf = FmtBuffer::new();

        buf.put_f64(3.25);
        buf.put_byte(b' ');
        buf.put_f32(0.5);
        buf.put_byte(b' ');
        // Large magnitudes still come out without an exponent.
        buf.put_f64(1e21);

        assert_eq!(buf.to_string(), "3.25 0.5 1000000000000000000000");
    }

    #[test]
    fn test_float_round_trips() {
        let value = 1.0f64 / 3.0;

        let mut buf = FmtBuffer::new();
        buf.put_f64(value);

        let text = buf.to_string();
        assert_eq!(text.parse::<f64>().unwrap(), value);
    }

    #[test]
    fn test_set_replaces_contents() {
        let mut buf = FmtBuffer::from("old contents");

        buf.set_str("new");
        assert_eq!(buf.as_bytes(), b"new");

        buf.reset();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_trim_newline_drops_one() {
        let mut buf = FmtBuffer::from("line\n\n");

        buf.trim_newline();
        assert_eq!(buf.as_bytes(), b"line\n");

        buf.trim_newline();
        buf.trim_newline();
        assert_eq!(buf.as_bytes(), b"line");
    }

    #[test]
    fn test_read_from_appends_everything() {
        let data: Vec<u8> = (0..1000u32).map(|n| n as u8).collect();

        let mut buf = FmtBuffer::from("head:");
        let total = buf.read_from(&mut data.as_slice()).unwrap();

        assert_eq!(total, 1000);
        assert_eq!(buf.len(), 5 + 1000);
        assert_eq!(&buf.as_bytes()[5..], &data[..]);
    }

    #[test]
    fn test_write_to_is_a_single_write() {
        let mut buf = FmtBuffer::new();
        buf.put_str("status=");
        buf.put_uint(200);

        let mut sink = Vec::new();
        let written = buf.write_to(&mut sink).unwrap();

        assert_eq!(written, 10);
        assert_eq!(sink, b"status=200");
        // Contents survive the write.
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_io_write() {
        let mut buf = FmtBuffer::new();

        buf.write_all(b"via io::Write").unwrap();
        assert_eq!(buf.to_string(), "via io::Write");
    }
}
