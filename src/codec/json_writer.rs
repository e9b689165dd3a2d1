//! Bounded-cursor JSON writer.
//!
//! Writes straight into a caller-provided `&mut [u8]` without allocating.
//! Every call checks the remaining capacity first and fails with
//! [`RpcError::Overflow`] rather than emitting a truncated token, so a
//! successful sequence of calls always leaves well-formed JSON behind.
//!
//! Commas and key/value separators are tracked internally; callers only
//! describe structure.
//!
//! # Example
//!
//! ```
//! use presence_ipc::codec::JsonWriter;
//!
//! let mut buf = [0u8; 64];
//! let mut w = JsonWriter::new(&mut buf);
//! w.start_object().unwrap();
//! w.key("v").unwrap();
//! w.int(1).unwrap();
//! w.key("client_id").unwrap();
//! w.string("1234").unwrap();
//! w.end_object().unwrap();
//! assert_eq!(w.as_bytes(), br#"{"v":1,"client_id":"1234"}"#);
//! ```

use crate::error::{Result, RpcError};

/// Deepest container nesting the writer tracks.
const MAX_DEPTH: usize = 16;

/// Longest decimal rendering of a 64-bit integer, sign included.
const MAX_DIGITS: usize = 20;

/// JSON writer over a fixed-size buffer.
#[derive(Debug)]
pub struct JsonWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
    /// For each open container, whether it already holds an element.
    filled: [bool; MAX_DEPTH],
    depth: usize,
    /// A key was just written; the next value needs no comma.
    after_key: bool,
}

impl<'a> JsonWriter<'a> {
    /// Start writing at the beginning of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            filled: [false; MAX_DEPTH],
            depth: 0,
            after_key: false,
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.pos
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// The JSON text written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Open an object (`{`).
    pub fn start_object(&mut self) -> Result<()> {
        self.open(b'{')
    }

    /// Close the innermost container with `}`.
    pub fn end_object(&mut self) -> Result<()> {
        self.close(b'}')
    }

    /// Open an array (`[`).
    pub fn start_array(&mut self) -> Result<()> {
        self.open(b'[')
    }

    /// Close the innermost container with `]`.
    pub fn end_array(&mut self) -> Result<()> {
        self.close(b']')
    }

    /// Write an object key followed by `:`.
    pub fn key(&mut self, key: &str) -> Result<()> {
        let sep = self.separator_len();
        let needed = sep + quoted_len(key) + 1;
        self.ensure(needed)?;
        self.write_separator(sep);
        self.write_quoted(key);
        self.put(b':');
        self.after_key = true;
        Ok(())
    }

    /// Write a string value, escaping quotes, backslashes and control characters.
    pub fn string(&mut self, value: &str) -> Result<()> {
        let sep = self.separator_len();
        self.ensure(sep + quoted_len(value))?;
        self.write_separator(sep);
        self.write_quoted(value);
        Ok(())
    }

    /// Write a signed integer.
    pub fn int(&mut self, value: i64) -> Result<()> {
        let mut digits = [0u8; MAX_DIGITS];
        let text = format_int(value, &mut digits);
        self.raw_value(text)
    }

    /// Write an unsigned integer as a JSON string (`"42"`).
    pub fn uint_string(&mut self, value: u64) -> Result<()> {
        let mut digits = [0u8; MAX_DIGITS];
        let text = format_uint(value, &mut digits);
        let sep = self.separator_len();
        self.ensure(sep + text.len() + 2)?;
        self.write_separator(sep);
        self.put(b'"');
        self.put_slice(text);
        self.put(b'"');
        Ok(())
    }

    /// Write `true` or `false`.
    pub fn bool(&mut self, value: bool) -> Result<()> {
        self.raw_value(if value { b"true" } else { b"false" })
    }

    /// `key` then `string`, skipped entirely when `value` is empty.
    pub fn optional_string(&mut self, key: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        self.key(key)?;
        self.string(value)
    }

    fn open(&mut self, token: u8) -> Result<()> {
        if self.depth == MAX_DEPTH {
            return Err(RpcError::Overflow);
        }
        let sep = self.separator_len();
        self.ensure(sep + 1)?;
        self.write_separator(sep);
        self.put(token);
        self.filled[self.depth] = false;
        self.depth += 1;
        Ok(())
    }

    fn close(&mut self, token: u8) -> Result<()> {
        if self.depth == 0 || self.after_key {
            return Err(RpcError::Overflow);
        }
        self.ensure(1)?;
        self.put(token);
        self.depth -= 1;
        Ok(())
    }

    fn raw_value(&mut self, text: &[u8]) -> Result<()> {
        let sep = self.separator_len();
        self.ensure(sep + text.len())?;
        self.write_separator(sep);
        self.put_slice(text);
        Ok(())
    }

    /// Number of separator bytes the next element needs (0 or 1).
    fn separator_len(&self) -> usize {
        if self.after_key || self.depth == 0 {
            0
        } else {
            usize::from(self.filled[self.depth - 1])
        }
    }

    fn write_separator(&mut self, sep: usize) {
        if sep == 1 {
            self.put(b',');
        }
        if self.after_key {
            self.after_key = false;
        } else if self.depth > 0 {
            self.filled[self.depth - 1] = true;
        }
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.len() - self.pos < needed {
            return Err(RpcError::Overflow);
        }
        Ok(())
    }

    fn put(&mut self, byte: u8) {
        self.buf[self.pos] = byte;
        self.pos += 1;
    }

    fn put_slice(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn write_quoted(&mut self, value: &str) {
        self.put(b'"');
        for &byte in value.as_bytes() {
            match byte {
                b'"' => self.put_slice(b"\\\""),
                b'\\' => self.put_slice(b"\\\\"),
                b'\n' => self.put_slice(b"\\n"),
                b'\r' => self.put_slice(b"\\r"),
                b'\t' => self.put_slice(b"\\t"),
                0x08 => self.put_slice(b"\\b"),
                0x0c => self.put_slice(b"\\f"),
                0x00..=0x1f => {
                    const HEX: &[u8; 16] = b"0123456789abcdef";
                    self.put_slice(b"\\u00");
                    self.put(HEX[usize::from(byte >> 4)]);
                    self.put(HEX[usize::from(byte & 0x0f)]);
                }
                _ => self.put(byte),
            }
        }
        self.put(b'"');
    }
}

/// Encoded size of `value` including the surrounding quotes.
fn quoted_len(value: &str) -> usize {
    2 + value
        .bytes()
        .map(|byte| match byte {
            b'"' | b'\\' | b'\n' | b'\r' | b'\t' | 0x08 | 0x0c => 2,
            0x00..=0x1f => 6,
            _ => 1,
        })
        .sum::<usize>()
}

fn format_uint(mut value: u64, out: &mut [u8; MAX_DIGITS]) -> &[u8] {
    let mut start = MAX_DIGITS;
    loop {
        start -= 1;
        out[start] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    &out[start..]
}

fn format_int(value: i64, out: &mut [u8; MAX_DIGITS]) -> &[u8] {
    let len = format_uint(value.unsigned_abs(), out).len();
    let mut start = MAX_DIGITS - len;
    if value < 0 {
        start -= 1;
        out[start] = b'-';
    }
    &out[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(w: &JsonWriter<'_>) -> Value {
        serde_json::from_slice(w.as_bytes()).unwrap()
    }

    #[test]
    fn test_nested_structure_and_commas() {
        let mut buf = [0u8; 256];
        let mut w = JsonWriter::new(&mut buf);
        w.start_object().unwrap();
        w.key("a").unwrap();
        w.start_array().unwrap();
        w.int(1).unwrap();
        w.int(-2).unwrap();
        w.start_object().unwrap();
        w.end_object().unwrap();
        w.end_array().unwrap();
        w.key("b").unwrap();
        w.bool(false).unwrap();
        w.end_object().unwrap();

        assert_eq!(w.as_bytes(), br#"{"a":[1,-2,{}],"b":false}"#);
    }

    #[test]
    fn test_string_escaping() {
        let mut buf = [0u8; 128];
        let mut w = JsonWriter::new(&mut buf);
        let tricky = "q\"b\\n\nt\tc\u{1}é";
        w.string(tricky).unwrap();

        assert_eq!(w.len(), quoted_len(tricky));
        assert_eq!(parse(&w), Value::String(tricky.to_string()));
    }

    #[test]
    fn test_int_extremes() {
        for value in [0, 7, -7, i64::MAX, i64::MIN] {
            let mut buf = [0u8; 32];
            let mut w = JsonWriter::new(&mut buf);
            w.int(value).unwrap();
            assert_eq!(w.as_bytes(), value.to_string().as_bytes());
        }
    }

    #[test]
    fn test_uint_string() {
        let mut buf = [0u8; 32];
        let mut w = JsonWriter::new(&mut buf);
        w.uint_string(u64::MAX).unwrap();
        assert_eq!(parse(&w), Value::String(u64::MAX.to_string()));
    }

    #[test]
    fn test_optional_string_skips_empty() {
        let mut buf = [0u8; 64];
        let mut w = JsonWriter::new(&mut buf);
        w.start_object().unwrap();
        w.optional_string("x", "").unwrap();
        w.optional_string("y", "1").unwrap();
        w.end_object().unwrap();
        assert_eq!(w.as_bytes(), br#"{"y":"1"}"#);
    }

    #[test]
    fn test_overflow_never_writes_past_capacity() {
        // Every prefix length of the buffer either succeeds or overflows
        // without producing a partial token.
        let full = br#"{"key":"va\"lue","n":12345}"#;
        for cap in 0..=full.len() {
            let mut buf = vec![0u8; cap];
            let mut w = JsonWriter::new(&mut buf);
            let result = (|| {
                w.start_object()?;
                w.key("key")?;
                w.string("va\"lue")?;
                w.key("n")?;
                w.int(12345)?;
                w.end_object()
            })();

            if cap == full.len() {
                assert!(result.is_ok());
                assert_eq!(w.as_bytes(), full);
            } else {
                assert!(matches!(result, Err(RpcError::Overflow)));
                assert!(full.starts_with(w.as_bytes()));
            }
        }
    }

    #[test]
    fn test_unbalanced_close_rejected() {
        let mut buf = [0u8; 8];
        let mut w = JsonWriter::new(&mut buf);
        assert!(w.end_object().is_err());
        assert!(w.is_empty());
    }
}
