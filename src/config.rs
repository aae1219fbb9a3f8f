//! Build configuration shared by the library and the CLI.
//!
//! Settings are plain values passed down explicitly; nothing here is global,
//! so independent sources can be built concurrently with different options.

use crate::error::HashError;
use std::fmt;
use std::str::FromStr;

/// Largest signature width supported by [`SignedHash`](crate::mph::SignedHash).
pub const MAX_SIGNATURE_WIDTH: u32 = 64;

/// Signature width used by the CLI when `-s` is given without `-w`.
pub const DEFAULT_SIGNATURE_WIDTH: i32 = 32;

/// Seed for key fingerprints unless overridden.
///
/// Output files are a pure function of the input lines and the seed.
pub const DEFAULT_SEED: u64 = 0;

/// Character encoding of the input lines.
///
/// Any label known to the WHATWG Encoding Standard is accepted, so
/// `latin1`, `us-ascii` and `iso-8859-1` all resolve to windows-1252.
/// Encodings that are not ASCII-compatible (UTF-16LE, UTF-16BE,
/// ISO-2022-JP) are transcoded to UTF-8 before lines are split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding(&'static encoding_rs::Encoding);

impl Encoding {
    pub fn utf8() -> Self {
        Encoding(encoding_rs::UTF_8)
    }

    pub fn windows_1252() -> Self {
        Encoding(encoding_rs::WINDOWS_1252)
    }

    pub fn utf16le() -> Self {
        Encoding(encoding_rs::UTF_16LE)
    }

    pub fn utf16be() -> Self {
        Encoding(encoding_rs::UTF_16BE)
    }

    /// Look up an encoding by label, case-insensitively.
    ///
    /// The `replacement` encoding cannot decode anything and is refused.
    pub fn for_label(label: &str) -> Option<Self> {
        encoding_rs::Encoding::for_label(label.trim().as_bytes())
            .filter(|enc| *enc != encoding_rs::REPLACEMENT)
            .map(Encoding)
    }

    /// Canonical name, as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    pub fn is_utf8(&self) -> bool {
        self.0 == encoding_rs::UTF_8
    }

    /// Whether `\n` and `\r` are single bytes in this encoding, so raw
    /// lines can be split before decoding.
    pub fn is_ascii_compatible(&self) -> bool {
        self.0.is_ascii_compatible()
    }

    pub fn as_encoding_rs(&self) -> &'static encoding_rs::Encoding {
        self.0
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::utf8()
    }
}

impl From<&'static encoding_rs::Encoding> for Encoding {
    fn from(enc: &'static encoding_rs::Encoding) -> Self {
        Encoding(enc)
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Encoding::for_label(s)
            .ok_or_else(|| HashError::Config(format!("Unsupported encoding: {}", s)))
    }
}

/// Validate a requested signature width.
///
/// Widths `<= 0` disable signing and are always accepted.
pub fn check_signature_width(width: i32) -> Result<(), HashError> {
    if width > MAX_SIGNATURE_WIDTH as i32 {
        return Err(HashError::Config(format!(
            "Signature width {} exceeds the maximum of {} bits",
            width, MAX_SIGNATURE_WIDTH
        )));
    }
    Ok(())
}
