//! On-disk layout: the fixed header and the append-only record stream.
//!
//! ```text
//! file    := header[64] record*
//! record  := payload_len: u32 LE | payload_crc: u32 LE | payload
//! payload := op: u8 | key_len: u16 LE | key | body_blob   (body only for Put)
//! body    := kind: u8 | value bytes
//! ```
//!
//! An encrypted store seals the body as `nonce[24] ++ aead(body)`; the CRC
//! is computed over the payload as written, so integrity is checkable
//! without the encryption key.

use crate::crypto::Cipher;
use crate::error::{Error, Result};
use crate::value::{Kind, Value};

pub(crate) const MAGIC: [u8; 4] = *b"MKV1";
pub(crate) const FORMAT_VERSION: u16 = 1;
pub(crate) const HEADER_LEN: u64 = 64;
pub(crate) const FLAG_ENCRYPTED: u16 = 1 << 0;
pub(crate) const SALT_LEN: usize = 16;

/// Bytes of framing (length + checksum) in front of every payload.
const RECORD_OVERHEAD: usize = 8;

const OP_PUT: u8 = 1;
const OP_REMOVE: u8 = 2;

/// CRC-32 (IEEE), bit-reflected.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xedb8_8320 & mask);
        }
    }
    !crc
}

/// The immutable portion of the file header. The committed length lives
/// outside it (and outside its CRC) because it changes on every append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub version: u16,
    pub flags: u16,
    pub salt: [u8; SALT_LEN],
}

impl Header {
    pub(crate) fn new(flags: u16, salt: [u8; SALT_LEN]) -> Self {
        Self {
            version: FORMAT_VERSION,
            flags,
            salt,
        }
    }

    pub(crate) fn encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Write the header fields and their CRC into the first 32 bytes.
    pub(crate) fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..24].copy_from_slice(&self.salt);
        let crc = crc32(&buf[0..24]);
        buf[24..28].copy_from_slice(&crc.to_le_bytes());
        buf[28..32].fill(0);
    }

    /// Returns `None` when the magic or header CRC does not check out.
    pub(crate) fn decode(buf: &[u8]) -> Option<Header> {
        if buf.len() < HEADER_LEN as usize || buf[0..4] != MAGIC {
            return None;
        }
        let stored = u32::from_le_bytes(buf[24..28].try_into().ok()?);
        if crc32(&buf[0..24]) != stored {
            return None;
        }
        let version = u16::from_le_bytes(buf[4..6].try_into().ok()?);
        let flags = u16::from_le_bytes(buf[6..8].try_into().ok()?);
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&buf[8..24]);
        Some(Header {
            version,
            flags,
            salt,
        })
    }
}

pub(crate) fn read_committed(buf: &[u8]) -> u64 {
    buf.get(32..40)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .unwrap_or(0)
}

pub(crate) fn write_committed(buf: &mut [u8], committed: u64) {
    buf[32..40].copy_from_slice(&committed.to_le_bytes());
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Record {
    Put { key: String, value: Value },
    Remove { key: String },
}

impl Record {
    /// Encode the record including its framing, sealing the body when a
    /// cipher is present.
    pub(crate) fn encode(&self, cipher: Option<&Cipher>) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(64);
        match self {
            Record::Put { key, value } => {
                payload.push(OP_PUT);
                push_key(&mut payload, key)?;
                let body = encode_body(value);
                match cipher {
                    Some(cipher) => payload.extend_from_slice(&cipher.seal(&body)?),
                    None => payload.extend_from_slice(&body),
                }
            }
            Record::Remove { key } => {
                payload.push(OP_REMOVE);
                push_key(&mut payload, key)?;
            }
        }
        let mut framed = Vec::with_capacity(RECORD_OVERHEAD + payload.len());
        framed.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        framed.extend_from_slice(&crc32(&payload).to_le_bytes());
        framed.extend_from_slice(&payload);
        Ok(framed)
    }

    /// Decode the record starting at `buf[0]`. Returns the record and the
    /// number of bytes consumed.
    ///
    /// Framing and checksum problems come back as [`Error::Corrupt`];
    /// a failed decrypt is [`Error::Crypto`] so callers can tell log
    /// truncation apart from a wrong key.
    pub(crate) fn decode(buf: &[u8], cipher: Option<&Cipher>) -> Result<(Record, usize)> {
        if buf.len() < RECORD_OVERHEAD {
            return Err(Error::Corrupt("truncated record frame".into()));
        }
        let payload_len = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
        if payload_len == 0 {
            return Err(Error::Corrupt("empty record frame".into()));
        }
        let total = RECORD_OVERHEAD + payload_len;
        if buf.len() < total {
            return Err(Error::Corrupt("record extends past committed data".into()));
        }
        let stored = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        let payload = &buf[RECORD_OVERHEAD..total];
        if crc32(payload) != stored {
            return Err(Error::Corrupt("record checksum mismatch".into()));
        }

        if payload.len() < 3 {
            return Err(Error::Corrupt("record payload too short".into()));
        }
        let op = payload[0];
        let key_len = u16::from_le_bytes(payload[1..3].try_into().unwrap()) as usize;
        let rest = &payload[3..];
        if rest.len() < key_len {
            return Err(Error::Corrupt("record key extends past payload".into()));
        }
        let key = std::str::from_utf8(&rest[..key_len])
            .map_err(|_| Error::Corrupt("record key is not valid utf-8".into()))?
            .to_string();

        match op {
            OP_REMOVE => Ok((Record::Remove { key }, total)),
            OP_PUT => {
                let blob = &rest[key_len..];
                let body = match cipher {
                    Some(cipher) => cipher.open(blob)?,
                    None => blob.to_vec(),
                };
                let value = decode_body(&body)?;
                Ok((Record::Put { key, value }, total))
            }
            other => Err(Error::Corrupt(format!("unknown record op {other}"))),
        }
    }
}

fn push_key(payload: &mut Vec<u8>, key: &str) -> Result<()> {
    if key.len() > u16::MAX as usize {
        return Err(Error::KeyTooLarge(key.len()));
    }
    payload.extend_from_slice(&(key.len() as u16).to_le_bytes());
    payload.extend_from_slice(key.as_bytes());
    Ok(())
}

fn encode_body(value: &Value) -> Vec<u8> {
    let mut body = vec![value.kind() as u8];
    match value {
        Value::Bool(b) => body.push(*b as u8),
        Value::F64(n) => body.extend_from_slice(&n.to_le_bytes()),
        Value::String(s) => body.extend_from_slice(s.as_bytes()),
        Value::Bytes(b) => body.extend_from_slice(b),
    }
    body
}

fn decode_body(body: &[u8]) -> Result<Value> {
    let (&tag, rest) = body
        .split_first()
        .ok_or_else(|| Error::Corrupt("empty value body".into()))?;
    match Kind::from_u8(tag) {
        Some(Kind::Bool) => match rest {
            [0] => Ok(Value::Bool(false)),
            [1] => Ok(Value::Bool(true)),
            _ => Err(Error::Corrupt("malformed bool body".into())),
        },
        Some(Kind::F64) => {
            let bytes: [u8; 8] = rest
                .try_into()
                .map_err(|_| Error::Corrupt("malformed f64 body".into()))?;
            Ok(Value::F64(f64::from_le_bytes(bytes)))
        }
        Some(Kind::String) => Ok(Value::String(
            std::str::from_utf8(rest)
                .map_err(|_| Error::Corrupt("string body is not valid utf-8".into()))?
                .to_string(),
        )),
        Some(Kind::Bytes) => Ok(Value::Bytes(rest.to_vec())),
        None => Err(Error::Corrupt(format!("unknown value kind {tag}"))),
    }
}
