//! Newline framing over a byte stream
//!
//! Transport reads carry no message boundaries: one read may hold half a
//! message or several of them. [`LineFramer`] buffers bytes independently of
//! how they arrived and hands out complete `\n`-terminated lines, enforcing a
//! per-line size limit. [`FrameReader`] drives it from an async reader.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::DecodeError;

/// Bytes requested from the socket per read
const READ_CHUNK: usize = 8 * 1024;

/// Splits a byte stream into lines of at most `max_len` bytes
#[derive(Debug)]
pub struct LineFramer {
    buf: Vec<u8>,
    max_len: usize,
    /// Prefix of `buf` already searched for a newline
    scanned: usize,
    /// Dropping the rest of an over-long line
    discarding: bool,
}

impl LineFramer {
    /// Create a framer that rejects lines longer than `max_len` bytes
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
            scanned: 0,
            discarding: false,
        }
    }

    /// Append freshly received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet returned as a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pop the next complete line, without its terminator
    ///
    /// Returns `None` when more bytes are needed. An over-long line is
    /// reported once as [`DecodeError::TooLarge`]; its remaining bytes are
    /// skipped up to the next newline.
    pub fn next_frame(&mut self) -> Option<Result<Vec<u8>, DecodeError>> {
        loop {
            let newline = self.buf[self.scanned..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|i| i + self.scanned);

            match newline {
                Some(end) if self.discarding => {
                    self.buf.drain(..=end);
                    self.scanned = 0;
                    self.discarding = false;
                }
                Some(end) => {
                    let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                    self.scanned = 0;
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.len() > self.max_len {
                        return Some(Err(DecodeError::TooLarge {
                            len: line.len(),
                            max: self.max_len,
                        }));
                    }
                    return Some(Ok(line));
                }
                None if self.discarding => {
                    self.buf.clear();
                    self.scanned = 0;
                    return None;
                }
                // One extra byte for a pending '\r'
                None if self.buf.len() > self.max_len + 1 => {
                    let len = self.buf.len();
                    self.buf.clear();
                    self.scanned = 0;
                    self.discarding = true;
                    return Some(Err(DecodeError::TooLarge {
                        len,
                        max: self.max_len,
                    }));
                }
                None => {
                    self.scanned = self.buf.len();
                    return None;
                }
            }
        }
    }
}

/// Reads newline-delimited frames from an async byte stream
pub struct FrameReader<R> {
    reader: R,
    framer: LineFramer,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R, max_len: usize) -> Self {
        Self {
            reader,
            framer: LineFramer::new(max_len),
            chunk: vec![0u8; READ_CHUNK],
        }
    }

    /// Wait for the next frame
    ///
    /// `Ok(None)` means end-of-stream; an unterminated trailing line is
    /// dropped. Cancel-safe: bytes are only consumed once a read completes.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Result<Vec<u8>, DecodeError>>> {
        loop {
            if let Some(frame) = self.framer.next_frame() {
                return Ok(Some(frame));
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                if self.framer.buffered() > 0 {
                    debug!(bytes = self.framer.buffered(), "Dropping unterminated line at end of stream");
                }
                return Ok(None);
            }
            self.framer.push(&self.chunk[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(result: Option<Result<Vec<u8>, DecodeError>>) -> String {
        String::from_utf8(result.expect("frame").expect("valid frame")).unwrap()
    }

    #[test]
    fn test_split_across_pushes() {
        let mut framer = LineFramer::new(1024);
        framer.push(b"{\"regis");
        assert!(framer.next_frame().is_none());
        framer.push(b"ter\": 1}");
        assert!(framer.next_frame().is_none());
        framer.push(b"\n");

        assert_eq!(frame(framer.next_frame()), "{\"register\": 1}");
        assert!(framer.next_frame().is_none());
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn test_coalesced_lines() {
        let mut framer = LineFramer::new(1024);
        framer.push(b"one\ntwo\nthr");

        assert_eq!(frame(framer.next_frame()), "one");
        assert_eq!(frame(framer.next_frame()), "two");
        assert!(framer.next_frame().is_none());

        framer.push(b"ee\n");
        assert_eq!(frame(framer.next_frame()), "three");
    }

    #[test]
    fn test_crlf_and_empty_lines() {
        let mut framer = LineFramer::new(1024);
        framer.push(b"a\r\n\nb\n");

        assert_eq!(frame(framer.next_frame()), "a");
        assert_eq!(frame(framer.next_frame()), "");
        assert_eq!(frame(framer.next_frame()), "b");
    }

    #[test]
    fn test_line_at_limit_is_accepted() {
        let mut framer = LineFramer::new(4);
        framer.push(b"abcd\r");
        assert!(framer.next_frame().is_none());
        framer.push(b"\n");
        assert_eq!(frame(framer.next_frame()), "abcd");
    }

    #[test]
    fn test_complete_oversized_line() {
        let mut framer = LineFramer::new(4);
        framer.push(b"abcdef\nok\n");

        assert!(matches!(
            framer.next_frame(),
            Some(Err(DecodeError::TooLarge { len: 6, max: 4 }))
        ));
        assert_eq!(frame(framer.next_frame()), "ok");
    }

    #[test]
    fn test_oversized_partial_line_is_discarded() {
        let mut framer = LineFramer::new(4);
        framer.push(b"0123456789");
        assert!(matches!(
            framer.next_frame(),
            Some(Err(DecodeError::TooLarge { .. }))
        ));
        assert_eq!(framer.buffered(), 0);

        // Rest of the same line is skipped without another error
        framer.push(b"more bytes");
        assert!(framer.next_frame().is_none());
        assert_eq!(framer.buffered(), 0);

        framer.push(b" end\nnext\n");
        assert_eq!(frame(framer.next_frame()), "next");
        assert!(framer.next_frame().is_none());
    }

    #[tokio::test]
    async fn test_reader_reassembles_split_reads() {
        let mock = tokio_test::io::Builder::new()
            .read(b"{\"register\"")
            .read(b": {\"name\": \"A\"}}\n{\"reg")
            .read(b"ister\": 2}\n")
            .build();
        let mut reader = FrameReader::new(mock, 1024);

        assert_eq!(
            frame(reader.next_frame().await.unwrap()),
            "{\"register\": {\"name\": \"A\"}}"
        );
        assert_eq!(frame(reader.next_frame().await.unwrap()), "{\"register\": 2}");
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_drops_unterminated_tail() {
        let mock = tokio_test::io::Builder::new()
            .read(b"complete\nincomplete")
            .build();
        let mut reader = FrameReader::new(mock, 1024);

        assert_eq!(frame(reader.next_frame().await.unwrap()), "complete");
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reader_surfaces_io_errors() {
        let mock = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();
        let mut reader = FrameReader::new(mock, 1024);

        let err = reader.next_frame().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset);
    }
}
