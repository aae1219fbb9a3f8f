//! Streaming access to key sources.
//!
//! This module provides the pieces every construction pass is built on:
//! - Re-openable line collections with a cached line count
//! - A lookahead cursor with reusable line buffers
//! - Line splitting on LF, CR and CRLF, and strict decoding in any WHATWG
//!   encoding
//!
//! Memory use is independent of source size: one read buffer and two line
//! buffers per open cursor.

pub mod buffers;
pub mod decode;
pub mod lines;

pub use decode::{decode_into, read_raw_line, Transcoder};
pub use lines::{LineCollection, LineCursor, OwnedLines, StreamFactory};
