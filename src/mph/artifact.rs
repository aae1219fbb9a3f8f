//! On-disk representation of hash structures.
//!
//! Every artifact starts with an 8-byte big-endian magic number naming its
//! kind, followed by the MessagePack encoding of the structure. Decoded
//! structures are validated before use, so a damaged file is reported as
//! [`HashError::Format`] instead of failing on the first lookup.

use crate::error::{HashError, Result};
use crate::mph::{OrderedHash, SignedHash};
use memmap2::Mmap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Magic number of `.map` files.
pub const MAP_MAGIC: u64 = u64::from_be_bytes(*b"LHASHMAP");

/// Magic number of `.smap` files.
pub const SIGNED_MAGIC: u64 = u64::from_be_bytes(*b"LHASHSIG");

const MAGIC_LEN: usize = std::mem::size_of::<u64>();

/// A structure that can be written to and read from an artifact.
pub trait Persist: Serialize + DeserializeOwned {
    const MAGIC: u64;

    /// Reject a decoded value whose parts disagree with each other.
    fn validate(&self) -> Result<()>;

    /// Write header and body to `writer`.
    fn save<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&Self::MAGIC.to_be_bytes())?;
        rmp_serde::encode::write(&mut writer, self)
            .map_err(|e| io::Error::other(format!("Fail to serialize hash: {}", e)))?;
        writer.flush()
    }

    /// Read an artifact written by [`save`](Self::save).
    fn load<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; MAGIC_LEN];
        reader.read_exact(&mut magic)?;
        check_magic(u64::from_be_bytes(magic), Self::MAGIC)?;
        let value: Self = rmp_serde::decode::from_read(reader).map_err(decode_error)?;
        value.validate()?;
        Ok(value)
    }
}

impl Persist for OrderedHash {
    const MAGIC: u64 = MAP_MAGIC;

    fn validate(&self) -> Result<()> {
        OrderedHash::validate(self)
    }
}

impl Persist for SignedHash {
    const MAGIC: u64 = SIGNED_MAGIC;

    fn validate(&self) -> Result<()> {
        SignedHash::validate(self)
    }
}

fn decode_error(e: rmp_serde::decode::Error) -> HashError {
    HashError::Format(format!("Failed to deserialize hash: {}", e))
}

fn decode_checked<T: Persist>(body: &[u8]) -> Result<T> {
    let value: T = rmp_serde::from_slice(body).map_err(decode_error)?;
    value.validate()?;
    Ok(value)
}

fn check_magic(found: u64, expected: u64) -> Result<()> {
    if found != expected {
        return Err(HashError::Format(format!(
            "Invalid magic number: {:#018x}",
            found
        )));
    }
    Ok(())
}

/// Either kind of persisted hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Unsigned(OrderedHash),
    Signed(SignedHash),
}

impl Artifact {
    /// Decode an artifact from its full byte content.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() < MAGIC_LEN {
            return Err(HashError::Format(format!(
                "File too short: {} bytes",
                data.len()
            )));
        }
        let (head, body) = data.split_at(MAGIC_LEN);
        let mut magic = [0u8; MAGIC_LEN];
        magic.copy_from_slice(head);
        match u64::from_be_bytes(magic) {
            MAP_MAGIC => decode_checked(body).map(Artifact::Unsigned),
            SIGNED_MAGIC => decode_checked(body).map(Artifact::Signed),
            other => Err(HashError::Format(format!(
                "Invalid magic number: {:#018x}",
                other
            ))),
        }
    }

    /// Read an artifact from any reader.
    pub fn load<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_slice(&data)
    }

    /// Memory-map and decode the artifact at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            return Err(HashError::Format("File is empty".to_string()));
        }
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_slice(&mmap)
    }

    /// Input position of `key`; signed artifacts reject unknown keys.
    pub fn get(&self, key: &str) -> Option<u64> {
        match self {
            Artifact::Unsigned(hash) => hash.get(key),
            Artifact::Signed(hash) => hash.get(key),
        }
    }

    pub fn size64(&self) -> u64 {
        match self {
            Artifact::Unsigned(hash) => hash.size64(),
            Artifact::Signed(hash) => hash.size64(),
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Artifact::Signed(_))
    }
}
