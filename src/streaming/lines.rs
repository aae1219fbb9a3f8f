//! Re-iterable line collections over re-openable byte streams.
//!
//! A [`LineCollection`] never holds more than two lines of its source in
//! memory. Every call to [`LineCollection::cursor`] asks the
//! [`StreamFactory`] for a brand new stream and reads it from the first
//! byte, which is what lets hash construction make several full passes over
//! inputs far larger than RAM.
//!
//! # Buffer reuse
//!
//! A [`LineCursor`] owns two `String` buffers, the current line and the
//! lookahead line, and swaps them on every advance. The `&str` returned by
//! [`LineCursor::next`] borrows the cursor, so it is statically impossible
//! to hold it across the following advance. Callers that need to keep lines
//! use [`OwnedLines`] instead and pay one allocation per line.

use crate::config::Encoding;
use crate::error::{HashError, Result};
use crate::streaming::buffers::{DEFAULT_INPUT_BUFFER, DEFAULT_LINE_BUFFER};
use crate::streaming::decode::{decode_into, read_raw_line, Transcoder};
use std::io::{self, BufReader, Read};
use std::sync::OnceLock;

/// Capability to open a fresh stream over the same content, from the start.
///
/// Every call must yield byte-identical content for the lifetime of a build.
/// Closures returning `io::Result<impl Read>` implement this trait.
pub trait StreamFactory {
    type Stream: Read;

    fn open_stream(&self) -> io::Result<Self::Stream>;
}

impl<F, R> StreamFactory for F
where
    F: Fn() -> io::Result<R>,
    R: Read,
{
    type Stream = R;

    fn open_stream(&self) -> io::Result<R> {
        self()
    }
}

/// The lines of a re-openable source, presented as a repeatable collection.
pub struct LineCollection<F> {
    name: String,
    factory: F,
    encoding: Encoding,
    buffer_capacity: usize,
    size: OnceLock<u64>,
}

impl<F: StreamFactory> LineCollection<F> {
    /// Wrap `factory`; `name` is only used to label errors and logs.
    pub fn new(name: impl Into<String>, factory: F, encoding: Encoding) -> Self {
        Self {
            name: name.into(),
            factory,
            encoding,
            buffer_capacity: DEFAULT_INPUT_BUFFER,
            size: OnceLock::new(),
        }
    }

    /// Set the read buffer capacity used by each cursor.
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Open a new cursor positioned before the first line.
    ///
    /// Each call re-reads the whole source from the beginning.
    pub fn cursor(&self) -> Result<LineCursor<F::Stream>> {
        let stream = self
            .factory
            .open_stream()
            .map_err(|source| HashError::Open {
                name: self.name.clone(),
                source,
            })?;
        Ok(LineCursor::with_capacity(
            self.name.clone(),
            stream,
            self.encoding,
            self.buffer_capacity,
        ))
    }

    /// Number of lines in the source.
    ///
    /// The first call consumes one full cursor; the result is cached and later
    /// calls return it without touching the source.
    pub fn size(&self) -> Result<u64> {
        if let Some(&n) = self.size.get() {
            return Ok(n);
        }
        let mut cursor = self.cursor()?;
        let mut n = 0u64;
        while cursor.has_next()? {
            cursor.next()?;
            n += 1;
        }
        cursor.close();
        Ok(*self.size.get_or_init(|| n))
    }

    /// The cached size, if [`size`](Self::size) already ran.
    pub fn cached_size(&self) -> Option<u64> {
        self.size.get().copied()
    }

    /// Iterate over owned copies of the lines.
    pub fn owned_lines(&self) -> Result<OwnedLines<F::Stream>> {
        Ok(OwnedLines {
            cursor: self.cursor()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    NeedAdvance,
    HaveNext,
    Closed,
}

/// Forward-only cursor over one opened stream, one line of lookahead.
pub struct LineCursor<R: Read> {
    name: String,
    reader: Option<BufReader<Transcoder<R>>>,
    encoding: Encoding,
    state: CursorState,
    raw: Vec<u8>,
    current: String,
    lookahead: String,
    line_number: u64,
}

impl<R: Read> LineCursor<R> {
    /// Create a cursor over `stream` with the default input buffer.
    pub fn new(name: impl Into<String>, stream: R, encoding: Encoding) -> Self {
        Self::with_capacity(name, stream, encoding, DEFAULT_INPUT_BUFFER)
    }

    /// Create a cursor with a custom read buffer capacity.
    pub fn with_capacity(
        name: impl Into<String>,
        stream: R,
        encoding: Encoding,
        capacity: usize,
    ) -> Self {
        Self {
            name: name.into(),
            reader: Some(BufReader::with_capacity(
                capacity,
                Transcoder::new(stream, encoding),
            )),
            encoding,
            state: CursorState::NeedAdvance,
            raw: Vec::with_capacity(DEFAULT_LINE_BUFFER),
            current: String::with_capacity(DEFAULT_LINE_BUFFER),
            lookahead: String::with_capacity(DEFAULT_LINE_BUFFER),
            line_number: 0,
        }
    }

    /// Whether another line exists, reading it into the lookahead buffer if
    /// needed. Repeated calls without [`next`](Self::next) do not advance.
    pub fn has_next(&mut self) -> Result<bool> {
        match self.state {
            CursorState::Closed => Ok(false),
            CursorState::HaveNext => Ok(true),
            CursorState::NeedAdvance => {
                let Some(reader) = self.reader.as_mut() else {
                    self.state = CursorState::Closed;
                    return Ok(false);
                };
                let found = match read_raw_line(reader, &mut self.raw) {
                    Ok(found) => found,
                    Err(source) => {
                        let line = self.line_number + 1;
                        self.close();
                        return Err(HashError::Read {
                            name: self.name.clone(),
                            line,
                            source,
                        });
                    }
                };
                if !found {
                    self.close();
                    return Ok(false);
                }
                self.line_number += 1;
                if !decode_into(&self.raw, self.encoding, &mut self.lookahead) {
                    self.close();
                    return Err(HashError::Decode {
                        name: self.name.clone(),
                        line: self.line_number,
                        encoding: self.encoding.name(),
                    });
                }
                self.state = CursorState::HaveNext;
                Ok(true)
            }
        }
    }

    /// Advance to the next line and return it.
    ///
    /// The returned slice is valid until the next advance. Fails with
    /// [`HashError::EndOfSequence`] when the stream is exhausted.
    pub fn next(&mut self) -> Result<&str> {
        if self.state != CursorState::HaveNext && !self.has_next()? {
            return Err(HashError::EndOfSequence);
        }
        std::mem::swap(&mut self.current, &mut self.lookahead);
        self.state = CursorState::NeedAdvance;
        Ok(&self.current)
    }

    /// Like [`next`](Self::next) but maps exhaustion to `None`.
    pub fn try_next(&mut self) -> Result<Option<&str>> {
        if !self.has_next()? {
            return Ok(None);
        }
        self.next().map(Some)
    }

    /// Release the underlying stream. Safe to call any number of times.
    pub fn close(&mut self) {
        self.reader = None;
        self.state = CursorState::Closed;
    }

    /// Cursors are read-only.
    pub fn remove(&mut self) -> Result<()> {
        Err(HashError::Unsupported("remove on a line cursor"))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of lines pulled from the stream so far, lookahead included.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }
}

/// Iterator adapter yielding owned lines from a [`LineCursor`].
pub struct OwnedLines<R: Read> {
    cursor: LineCursor<R>,
}

impl<R: Read> OwnedLines<R> {
    pub fn new(cursor: LineCursor<R>) -> Self {
        Self { cursor }
    }
}

impl<R: Read> Iterator for OwnedLines<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor.try_next() {
            Ok(Some(line)) => Some(Ok(line.to_string())),
            Ok(None) => None,
            Err(e) => {
                self.cursor.close();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn collection(
        content: &'static str,
    ) -> (
        LineCollection<impl Fn() -> io::Result<Cursor<&'static [u8]>>>,
        Arc<AtomicUsize>,
    ) {
        let opens = Arc::new(AtomicUsize::new(0));
        let counter = opens.clone();
        let factory = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, io::Error>(Cursor::new(content.as_bytes()))
        };
        (LineCollection::new("test", factory, Encoding::utf8()), opens)
    }

    fn drain<R: Read>(cursor: &mut LineCursor<R>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(line) = cursor.try_next().unwrap() {
            out.push(line.to_string());
        }
        out
    }

    #[test]
    fn test_cursor_reiterates_from_start() {
        let (lines, opens) = collection("alpha\nbeta\ngamma\n");
        let first = drain(&mut lines.cursor().unwrap());
        let second = drain(&mut lines.cursor().unwrap());
        assert_eq!(first, vec!["alpha", "beta", "gamma"]);
        assert_eq!(first, second);
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_size_is_cached() {
        let (lines, opens) = collection("a\nb\nc\nd");
        assert_eq!(lines.cached_size(), None);
        assert_eq!(lines.size().unwrap(), 4);
        assert_eq!(lines.size().unwrap(), 4);
        assert_eq!(lines.cached_size(), Some(4));
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_has_next_does_not_advance() {
        let (lines, _) = collection("one\ntwo\n");
        let mut cursor = lines.cursor().unwrap();
        assert!(cursor.has_next().unwrap());
        assert!(cursor.has_next().unwrap());
        assert!(cursor.has_next().unwrap());
        assert_eq!(cursor.next().unwrap(), "one");
        assert_eq!(cursor.line_number(), 1);
        assert_eq!(cursor.next().unwrap(), "two");
        assert!(!cursor.has_next().unwrap());
        assert!(cursor.is_closed());
    }

    #[test]
    fn test_next_without_has_next() {
        let (lines, _) = collection("one\ntwo\n");
        let mut cursor = lines.cursor().unwrap();
        assert_eq!(cursor.next().unwrap(), "one");
        assert_eq!(cursor.next().unwrap(), "two");
        assert!(matches!(cursor.next(), Err(HashError::EndOfSequence)));
        assert!(matches!(cursor.next(), Err(HashError::EndOfSequence)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (lines, _) = collection("one\n");
        let mut cursor = lines.cursor().unwrap();
        cursor.close();
        cursor.close();
        assert!(!cursor.has_next().unwrap());
        assert!(matches!(cursor.next(), Err(HashError::EndOfSequence)));
    }

    #[test]
    fn test_remove_is_unsupported() {
        let (lines, _) = collection("one\n");
        let mut cursor = lines.cursor().unwrap();
        assert!(matches!(cursor.remove(), Err(HashError::Unsupported(_))));
        assert_eq!(cursor.next().unwrap(), "one");
    }

    #[test]
    fn test_empty_source() {
        let (lines, _) = collection("");
        assert_eq!(lines.size().unwrap(), 0);
        let mut cursor = lines.cursor().unwrap();
        assert!(!cursor.has_next().unwrap());
        assert!(matches!(cursor.next(), Err(HashError::EndOfSequence)));
    }

    #[test]
    fn test_owned_lines() {
        let (lines, _) = collection("x\ny\n");
        let owned: Vec<String> = lines
            .owned_lines()
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(owned, vec!["x", "y"]);
    }

    #[test]
    fn test_open_failure_carries_name() {
        let factory = || -> io::Result<Cursor<Vec<u8>>> {
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"))
        };
        let lines = LineCollection::new("missing.txt", factory, Encoding::utf8());
        match lines.cursor() {
            Err(HashError::Open { name, .. }) => assert_eq!(name, "missing.txt"),
            _ => panic!("expected open error"),
        }
        assert!(lines.size().is_err());
        assert_eq!(lines.cached_size(), None);
    }

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::other("disk on fire"));
            }
            self.served = true;
            let data = b"first\nsec";
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    #[test]
    fn test_read_failure_is_fatal() {
        let mut cursor = LineCursor::new("flaky", FailingReader { served: false }, Encoding::utf8());
        assert_eq!(cursor.next().unwrap(), "first");
        match cursor.next() {
            Err(HashError::Read { name, line, .. }) => {
                assert_eq!(name, "flaky");
                assert_eq!(line, 2);
            }
            _ => panic!("expected read error"),
        }
        assert!(cursor.is_closed());
    }

    #[test]
    fn test_decode_failure_reports_line() {
        let data: &'static [u8] = b"ok\n\xff\xfe\n";
        let mut cursor = LineCursor::new("bin", Cursor::new(data), Encoding::utf8());
        assert_eq!(cursor.next().unwrap(), "ok");
        match cursor.next() {
            Err(HashError::Decode { line, encoding, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(encoding, "UTF-8");
            }
            _ => panic!("expected decode error"),
        }
    }

    #[test]
    fn test_lone_carriage_return_ends_a_line() {
        let (lines, _) = collection("a\rb\n");
        assert_eq!(lines.size().unwrap(), 2);
        let (lines, _) = collection("one\r\ntwo\rthree\n\rfour");
        assert_eq!(
            drain(&mut lines.cursor().unwrap()),
            vec!["one", "two", "three", "", "four"]
        );
    }

    #[test]
    fn test_utf16_source() {
        let text = "grüße\r\nnaïve\rlast";
        let bytes: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
        let lines = LineCollection::new(
            "wide",
            move || Ok::<_, io::Error>(Cursor::new(bytes.clone())),
            Encoding::utf16be(),
        )
        .with_buffer_capacity(3);
        assert_eq!(lines.size().unwrap(), 3);
        assert_eq!(
            drain(&mut lines.cursor().unwrap()),
            vec!["grüße", "naïve", "last"]
        );
    }

    #[test]
    fn test_malformed_utf16_reports_source_encoding() {
        let mut data: Vec<u8> = "ok\n".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        data.extend_from_slice(&[0x00, 0xdc, b'x', 0x00, b'\n', 0x00]);
        let mut cursor = LineCursor::new("wide", Cursor::new(data), Encoding::utf16le());
        assert_eq!(cursor.next().unwrap(), "ok");
        match cursor.next() {
            Err(HashError::Decode { line, encoding, .. }) => {
                assert_eq!(line, 2);
                assert_eq!(encoding, "UTF-16LE");
            }
            _ => panic!("expected decode error"),
        }
        assert!(cursor.is_closed());
    }
}
