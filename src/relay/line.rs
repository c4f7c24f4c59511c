//! Line framing for the client side of the login dialogue
//!
//! Telnet clients send `\r\n`, `\r\0`, bare `\r` or bare `\n` depending on
//! their settings, and a single read may carry half a line or several lines.
//! The buffer hands out one complete raw line at a time and keeps whatever
//! follows for the next call.

use bytes::{Bytes, BytesMut};

/// Accumulates client bytes and splits them into raw lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
    /// The last line ended in a bare `\r`, so a leading `\n` belongs to it
    pending_cr: bool,
}

impl LineBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the client
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Record bytes that went to the backend without passing through the buffer
    pub fn passed_through(&mut self, data: &[u8]) {
        if let Some(&last) = data.last() {
            self.pending_cr = last == b'\r';
        }
    }

    /// Take the next complete line, terminator included
    ///
    /// A `\n` completing a `\r` from the previous line is carried at the
    /// front of the next line rather than read as an empty line of its own.
    pub fn next_line(&mut self) -> Option<Bytes> {
        let start = usize::from(self.pending_cr && self.buf.first() == Some(&b'\n'));
        let pos = self.buf[start..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')?
            + start;

        let mut end = pos + 1;
        if self.buf[pos] == b'\r' {
            match self.buf.get(end) {
                Some(b'\n') | Some(b'\0') => {
                    end += 1;
                    self.pending_cr = false;
                }
                Some(_) => self.pending_cr = false,
                None => self.pending_cr = true,
            }
        } else {
            self.pending_cr = false;
        }

        Some(self.buf.split_to(end).freeze())
    }

    /// Take everything still buffered, complete or not
    pub fn take_remaining(&mut self) -> Bytes {
        if let Some(&last) = self.buf.last() {
            self.pending_cr = last == b'\r';
        }
        self.buf.split().freeze()
    }

    /// Drop everything still buffered
    pub fn clear(&mut self) {
        self.buf.clear();
        self.pending_cr = false;
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Decode a raw line into the text the login check compares
///
/// Invalid UTF-8 and control characters (telnet negotiation debris, NULs)
/// are dropped, then surrounding whitespace is trimmed.
pub fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(buf: &mut LineBuffer) -> Vec<Bytes> {
        std::iter::from_fn(|| buf.next_line()).collect()
    }

    #[test]
    fn test_single_crlf_line() {
        let mut buf = LineBuffer::new();
        buf.extend(b"N0CALL\r\n");
        assert_eq!(lines(&mut buf), vec![Bytes::from_static(b"N0CALL\r\n")]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_line_is_held() {
        let mut buf = LineBuffer::new();
        buf.extend(b"sec");
        assert!(buf.next_line().is_none());
        assert_eq!(buf.len(), 3);

        buf.extend(b"ret1\n");
        assert_eq!(buf.next_line(), Some(Bytes::from_static(b"secret1\n")));
    }

    #[test]
    fn test_multiple_lines_in_one_read() {
        let mut buf = LineBuffer::new();
        buf.extend(b"N0CALL\r\nsecret1\r\nBYE");
        assert_eq!(
            lines(&mut buf),
            vec![
                Bytes::from_static(b"N0CALL\r\n"),
                Bytes::from_static(b"secret1\r\n"),
            ]
        );
        assert_eq!(buf.take_remaining(), Bytes::from_static(b"BYE"));
    }

    #[test]
    fn test_cr_nul_and_bare_cr() {
        let mut buf = LineBuffer::new();
        buf.extend(b"N0CALL\r\0secret1\rnext");
        assert_eq!(
            lines(&mut buf),
            vec![
                Bytes::from_static(b"N0CALL\r\0"),
                Bytes::from_static(b"secret1\r"),
            ]
        );
    }

    #[test]
    fn test_crlf_split_across_reads() {
        let mut buf = LineBuffer::new();
        buf.extend(b"N0CALL\r");
        assert_eq!(buf.next_line(), Some(Bytes::from_static(b"N0CALL\r")));

        // The trailing LF must not count as an empty line
        buf.extend(b"\n");
        assert!(buf.next_line().is_none());

        buf.extend(b"secret1\r\n");
        assert_eq!(buf.next_line(), Some(Bytes::from_static(b"\nsecret1\r\n")));
    }

    #[test]
    fn test_passthrough_resets_pending_cr() {
        let mut buf = LineBuffer::new();
        buf.extend(b"N0CALL\r");
        buf.next_line();
        buf.passed_through(b"\n");

        buf.extend(b"\n");
        assert_eq!(buf.next_line(), Some(Bytes::from_static(b"\n")));
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"  N0CALL \r\n"), "N0CALL");
        assert_eq!(decode_line(b"\xff\xfb\x01N0CALL\r\0"), "N0CALL");
        assert_eq!(decode_line(b"\nsecret1\r\n"), "secret1");
        assert_eq!(decode_line(b"\r\n"), "");
        assert_eq!(decode_line("pässwörd\n".as_bytes()), "pässwörd");
    }
}
