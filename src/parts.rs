//! Storage collaborator: resolving source names into part streams and
//! creating output artifacts.
//!
//! A source name is either a single file or a directory of MapReduce-style
//! `part-*` files. Parts ending in `.zst` / `.zstd` are decompressed on the
//! fly. Opening a source yields a [`LocalParts`] factory that concatenates
//! all parts, in name order, into one byte stream each time it is asked.

use crate::streaming::StreamFactory;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name suffixes marking zstd-compressed parts.
pub const COMPRESSION_SUFFIXES: &[&str] = &[".zst", ".zstd"];

/// Prefix of part files inside a source directory.
pub const PART_PREFIX: &str = "part-";

/// Default permission bits applied to every artifact.
pub const OPEN_PERMISSIONS: u32 = 0o777;

/// Remove a trailing compression suffix from `name`, if any.
pub fn strip_compression_suffix(name: &str) -> &str {
    for suffix in COMPRESSION_SUFFIXES {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return stripped;
        }
    }
    name
}

fn is_compressed(path: &Path) -> bool {
    path.to_str()
        .map(|s| COMPRESSION_SUFFIXES.iter().any(|suffix| s.ends_with(suffix)))
        .unwrap_or(false)
}

/// Where key sources come from and where artifacts go.
pub trait Storage {
    type Parts: StreamFactory;
    type Output: Write;

    /// Resolve `name` into a re-openable stream factory over its parts.
    fn open_parts(&self, name: &str) -> io::Result<Self::Parts>;

    /// Create (or truncate) the artifact at `path`.
    fn create(&self, path: &Path) -> io::Result<Self::Output>;

    /// Base name for artifacts derived from source `name`.
    fn destination_base<'a>(&self, name: &'a str) -> &'a str {
        let trimmed = name.trim_end_matches('/');
        strip_compression_suffix(if trimmed.is_empty() { name } else { trimmed })
    }
}

/// Local filesystem storage.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    permissions: Option<u32>,
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStorage {
    /// Storage that marks every artifact readable, writable and executable
    /// by everyone.
    pub fn new() -> Self {
        Self {
            permissions: Some(OPEN_PERMISSIONS),
        }
    }

    /// Override the permission bits set on artifacts; `None` leaves the
    /// process umask in charge.
    pub fn with_permissions(mut self, mode: Option<u32>) -> Self {
        self.permissions = mode;
        self
    }

    pub fn permissions(&self) -> Option<u32> {
        self.permissions
    }
}

impl Storage for LocalStorage {
    type Parts = LocalParts;
    type Output = File;

    fn open_parts(&self, name: &str) -> io::Result<LocalParts> {
        LocalParts::open(name)
    }

    fn create(&self, path: &Path) -> io::Result<File> {
        let file = File::create(path)?;
        if let Some(mode) = self.permissions {
            set_mode(path, mode)?;
        }
        Ok(file)
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Ordered list of part files making up one logical source.
#[derive(Debug, Clone)]
pub struct LocalParts {
    parts: Arc<[PathBuf]>,
}

impl LocalParts {
    /// Enumerate the parts of `path`.
    ///
    /// A regular file is a single part. A directory contributes its
    /// `part-*` entries sorted by name; other entries (`_SUCCESS`, `.crc`
    /// checksum files) are ignored.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let meta = fs::metadata(path)?;
        if !meta.is_dir() {
            return Ok(Self {
                parts: vec![path.to_path_buf()].into(),
            });
        }

        let mut parts = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name();
            let is_part = name
                .to_str()
                .map(|n| n.starts_with(PART_PREFIX) && !n.ends_with(".crc"))
                .unwrap_or(false);
            if is_part && entry.file_type()?.is_file() {
                parts.push(entry.path());
            }
        }
        if parts.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no {}* files in {}", PART_PREFIX, path.display()),
            ));
        }
        parts.sort();
        Ok(Self {
            parts: parts.into(),
        })
    }

    pub fn parts(&self) -> &[PathBuf] {
        &self.parts
    }
}

impl StreamFactory for LocalParts {
    type Stream = PartChain;

    /// Start over at the first part. The first part is opened eagerly so a
    /// missing or unreadable source is reported here rather than mid-pass.
    fn open_stream(&self) -> io::Result<PartChain> {
        let mut chain = PartChain {
            parts: self.parts.clone(),
            next: 0,
            current: None,
        };
        chain.open_next()?;
        Ok(chain)
    }
}

fn open_part(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    if is_compressed(path) {
        Ok(Box::new(zstd::stream::read::Decoder::new(file)?))
    } else {
        Ok(Box::new(file))
    }
}

/// Byte-wise concatenation of all parts, opened lazily one at a time.
pub struct PartChain {
    parts: Arc<[PathBuf]>,
    next: usize,
    current: Option<Box<dyn Read + Send>>,
}

impl PartChain {
    fn open_next(&mut self) -> io::Result<bool> {
        if self.next >= self.parts.len() {
            self.current = None;
            return Ok(false);
        }
        let part = open_part(&self.parts[self.next]).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("{}: {}", self.parts[self.next].display(), e),
            )
        })?;
        self.current = Some(part);
        self.next += 1;
        Ok(true)
    }
}

impl Read for PartChain {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if let Some(reader) = self.current.as_mut() {
                let n = reader.read(buf)?;
                if n > 0 {
                    return Ok(n);
                }
            }
            if !self.open_next()? {
                return Ok(0);
            }
        }
    }
}
