//! Decoder for the engine's per-path `.ktest` records.
//!
//! Layout, all integers big-endian `u32`:
//!
//! ```text
//! magic        "KTEST" (or the legacy "BOUT\n")
//! version      1..=3
//! num_args     then per argument: len, bytes
//! sym_argvs    version >= 2 only
//! sym_argv_len version >= 2 only
//! num_objects  then per object: name len, name, byte len, bytes
//! ```

use serde::{Deserialize, Serialize};

const MAGIC: &[u8] = b"KTEST";
const LEGACY_MAGIC: &[u8] = b"BOUT\n";
const MAX_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordDecodeError {
    #[error("Record truncated at byte {offset}: {needed} more bytes expected")]
    Truncated { offset: usize, needed: usize },

    #[error("Not a ktest record (bad magic)")]
    BadMagic,

    #[error("Unsupported ktest version {0}")]
    UnsupportedVersion(u32),

    #[error("Object name at byte {offset} is not valid UTF-8")]
    InvalidName { offset: usize },

    #[error("{count} trailing bytes after the last object")]
    TrailingBytes { count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KTestObject {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KTest {
    pub version: u32,
    /// Command line the engine ran the program with.
    pub args: Vec<String>,
    pub sym_argvs: u32,
    pub sym_argv_len: u32,
    pub objects: Vec<KTestObject>,
}

impl KTest {
    pub fn object(&self, name: &str) -> Option<&KTestObject> {
        self.objects.iter().find(|o| o.name == name)
    }

    /// Serialize in the current (`KTEST`, version 3) layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&MAX_VERSION.to_be_bytes());
        put_len(&mut out, self.args.len());
        for arg in &self.args {
            put_bytes(&mut out, arg.as_bytes());
        }
        out.extend_from_slice(&self.sym_argvs.to_be_bytes());
        out.extend_from_slice(&self.sym_argv_len.to_be_bytes());
        put_len(&mut out, self.objects.len());
        for object in &self.objects {
            put_bytes(&mut out, object.name.as_bytes());
            put_bytes(&mut out, &object.bytes);
        }
        out
    }
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    let len = u32::try_from(len).unwrap_or(u32::MAX);
    out.extend_from_slice(&len.to_be_bytes());
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    put_len(out, bytes.len());
    out.extend_from_slice(bytes);
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], RecordDecodeError> {
        let remaining = self.bytes.len() - self.pos;
        if n > remaining {
            return Err(RecordDecodeError::Truncated {
                offset: self.pos,
                needed: n - remaining,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, RecordDecodeError> {
        let raw = self.take(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn sized(&mut self) -> Result<&'a [u8], RecordDecodeError> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

pub fn decode(bytes: &[u8]) -> Result<KTest, RecordDecodeError> {
    if !bytes.starts_with(MAGIC) && !bytes.starts_with(LEGACY_MAGIC) {
        return Err(RecordDecodeError::BadMagic);
    }
    let magic_len = if bytes.starts_with(MAGIC) {
        MAGIC.len()
    } else {
        LEGACY_MAGIC.len()
    };
    let mut cursor = Cursor {
        bytes,
        pos: magic_len,
    };

    let version = cursor.u32()?;
    if !(1..=MAX_VERSION).contains(&version) {
        return Err(RecordDecodeError::UnsupportedVersion(version));
    }

    let num_args = cursor.u32()?;
    let mut args = Vec::new();
    for _ in 0..num_args {
        args.push(String::from_utf8_lossy(cursor.sized()?).into_owned());
    }

    let (sym_argvs, sym_argv_len) = if version >= 2 {
        (cursor.u32()?, cursor.u32()?)
    } else {
        (0, 0)
    };

    let num_objects = cursor.u32()?;
    let mut objects = Vec::new();
    for _ in 0..num_objects {
        let offset = cursor.pos;
        let name = std::str::from_utf8(cursor.sized()?)
            .map_err(|_| RecordDecodeError::InvalidName { offset })?
            .to_string();
        let bytes = cursor.sized()?.to_vec();
        objects.push(KTestObject { name, bytes });
    }

    let trailing = bytes.len() - cursor.pos;
    if trailing > 0 {
        return Err(RecordDecodeError::TrailingBytes { count: trailing });
    }

    Ok(KTest {
        version,
        args,
        sym_argvs,
        sym_argv_len,
        objects,
    })
}
