//! Line splitting and character decoding.
//!
//! Raw lines are collected with memchr-driven scanning straight out of the
//! `BufRead` buffer, then decoded into a reusable `String`. Sources in an
//! encoding that is not ASCII-compatible pass through a [`Transcoder`]
//! first, so the splitter only ever sees single-byte terminators.

use crate::config::Encoding;
use encoding_rs::{Decoder, DecoderResult};
use memchr::memchr2;
use std::io::{self, BufRead, Read};

/// Byte written in place of a malformed input sequence. It never occurs in
/// UTF-8, so the line holding it fails to decode.
const MALFORMED_MARKER: u8 = 0xff;

const TRANSCODE_BUFFER: usize = 16 * 1024;

fn fill_buf_retrying<R: BufRead + ?Sized>(reader: &mut R) -> io::Result<&[u8]> {
    loop {
        match reader.fill_buf() {
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    // Already filled, so this only hands back the buffer.
    reader.fill_buf()
}

/// Read one raw line (without its terminator) into `buf`.
///
/// Returns `Ok(false)` at end of stream. A final line without a trailing
/// terminator is still returned. `\n`, `\r` and `\r\n` each end a line;
/// a `\r\n` pair split across two buffer fills still counts once.
pub fn read_raw_line<R: BufRead + ?Sized>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    let mut read_any = false;
    loop {
        let available = fill_buf_retrying(reader)?;
        if available.is_empty() {
            return Ok(read_any);
        }
        read_any = true;
        match memchr2(b'\n', b'\r', available) {
            Some(i) => {
                let terminator = available[i];
                buf.extend_from_slice(&available[..i]);
                reader.consume(i + 1);
                if terminator == b'\r' {
                    let rest = fill_buf_retrying(reader)?;
                    if rest.first() == Some(&b'\n') {
                        reader.consume(1);
                    }
                }
                return Ok(true);
            }
            None => {
                let len = available.len();
                buf.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

/// Decode one raw line into `out`, replacing its contents.
///
/// `bytes` is a line as read through a [`Transcoder`] for `encoding`: UTF-8
/// for transcoded encodings, the source bytes otherwise. Decoding is
/// strict. Returns `false` on a malformed sequence and leaves `out` cleared.
pub fn decode_into(bytes: &[u8], encoding: Encoding, out: &mut String) -> bool {
    out.clear();
    if encoding.is_utf8() || !encoding.is_ascii_compatible() {
        return match std::str::from_utf8(bytes) {
            Ok(s) => {
                out.push_str(s);
                true
            }
            Err(_) => false,
        };
    }
    match encoding
        .as_encoding_rs()
        .decode_without_bom_handling_and_without_replacement(bytes)
    {
        Some(s) => {
            out.push_str(&s);
            true
        }
        None => false,
    }
}

/// Byte stream that re-encodes its input as UTF-8.
///
/// ASCII-compatible encodings pass through untouched and are decoded one
/// line at a time by [`decode_into`]. Malformed input is replaced by a byte
/// that is invalid UTF-8, so the error surfaces on the line that holds it.
pub struct Transcoder<R> {
    inner: R,
    decoder: Option<Decoder>,
    input: Vec<u8>,
    in_pos: usize,
    in_end: usize,
    output: Vec<u8>,
    out_pos: usize,
    out_end: usize,
    eof: bool,
    done: bool,
}

impl<R: Read> Transcoder<R> {
    pub fn new(inner: R, encoding: Encoding) -> Self {
        let decoder = (!encoding.is_ascii_compatible())
            .then(|| encoding.as_encoding_rs().new_decoder_without_bom_handling());
        let capacity = if decoder.is_some() { TRANSCODE_BUFFER } else { 0 };
        Self {
            inner,
            decoder,
            input: vec![0; capacity],
            in_pos: 0,
            in_end: 0,
            output: vec![0; capacity],
            out_pos: 0,
            out_end: 0,
            eof: false,
            done: false,
        }
    }

    /// Whether bytes are re-encoded rather than passed through.
    pub fn is_transcoding(&self) -> bool {
        self.decoder.is_some()
    }

    fn refill(&mut self) -> io::Result<()> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(());
        };
        self.out_pos = 0;
        self.out_end = 0;
        while self.out_end == 0 && !self.done {
            if self.in_pos == self.in_end && !self.eof {
                let n = loop {
                    match self.inner.read(&mut self.input) {
                        Ok(n) => break n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                };
                self.in_pos = 0;
                self.in_end = n;
                self.eof = n == 0;
            }
            // One byte stays free for the malformed marker.
            let room = self.output.len() - 1;
            let (result, read, written) = decoder.decode_to_utf8_without_replacement(
                &self.input[self.in_pos..self.in_end],
                &mut self.output[self.out_end..room],
                self.eof,
            );
            self.in_pos += read;
            self.out_end += written;
            match result {
                DecoderResult::InputEmpty => self.done = self.eof,
                DecoderResult::OutputFull => {}
                DecoderResult::Malformed(_, _) => {
                    self.output[self.out_end] = MALFORMED_MARKER;
                    self.out_end += 1;
                }
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for Transcoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.decoder.is_none() {
            return self.inner.read(buf);
        }
        if self.out_pos == self.out_end {
            self.refill()?;
        }
        let n = buf.len().min(self.out_end - self.out_pos);
        buf[..n].copy_from_slice(&self.output[self.out_pos..self.out_pos + n]);
        self.out_pos += n;
        Ok(n)
    }
}
