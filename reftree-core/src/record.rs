//! Persisted record framing
//!
//! Every stored file is one frame:
//!
//! ```text
//! magic "RTV1" | flags (1 byte) | sha256 of payload (64 hex chars) | body
//! ```
//!
//! The payload is bincode; the body is the payload, zstd-compressed when
//! flag bit 0 is set. The checksum covers the uncompressed payload.

use crate::diff::Diff;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zstd::stream::{decode_all as zstd_decode, encode_all as zstd_encode};

/// Frame magic
pub const MAGIC: &[u8; 4] = b"RTV1";

const FLAG_COMPRESSED: u8 = 0x01;
const CHECKSUM_LEN: usize = 64;
const HEADER_LEN: usize = MAGIC.len() + 1 + CHECKSUM_LEN;

/// Reverse delta reconstructing `version` from `version + 1`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry<K> {
    pub version: u64,
    /// When `version` was committed (Unix seconds)
    pub committed_at: i64,
    pub reverse: Diff<K, Vec<u8>>,
}

/// The materialized current tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<K> {
    pub store_id: String,
    pub version: u64,
    /// Store creation time (Unix seconds)
    pub created_at: i64,
    /// When `version` was committed (Unix seconds)
    pub committed_at: i64,
    pub tree: Diff<K, Vec<u8>>,
}

/// Forward delta of a commit in flight
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal<K> {
    /// Version the delta produces
    pub version: u64,
    pub committed_at: i64,
    pub delta: Diff<K, Vec<u8>>,
}

/// Hex sha256 of `data`
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Frame a payload, compressing it at `level` if given
pub fn encode_frame(payload: &[u8], level: Option<i32>) -> Result<Vec<u8>> {
    let (flags, body) = match level {
        Some(level) => (FLAG_COMPRESSED, zstd_encode(payload, level)?),
        None => (0, payload.to_vec()),
    };
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(MAGIC);
    frame.push(flags);
    frame.extend_from_slice(checksum(payload).as_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Unframe a record, returning its payload
pub fn decode_frame(data: &[u8], verify: bool) -> Result<Vec<u8>> {
    if data.len() < HEADER_LEN || &data[..MAGIC.len()] != MAGIC {
        return Err(Error::Corrupt("not a record frame".into()));
    }
    let flags = data[MAGIC.len()];
    let expected = &data[MAGIC.len() + 1..HEADER_LEN];
    let body = &data[HEADER_LEN..];

    let payload = if flags & FLAG_COMPRESSED != 0 {
        zstd_decode(body).map_err(|e| Error::Corrupt(format!("Failed to decompress record: {}", e)))?
    } else {
        body.to_vec()
    };
    if verify && checksum(&payload).as_bytes() != expected {
        return Err(Error::Corrupt("record checksum mismatch".into()));
    }
    Ok(payload)
}

/// Serialize and frame a record
pub fn write_record<T: Serialize>(value: &T, level: Option<i32>) -> Result<Vec<u8>> {
    let payload = bincode::serialize(value)?;
    encode_frame(&payload, level)
}

/// Unframe and deserialize a record
pub fn read_record<T: DeserializeOwned>(data: &[u8], verify: bool) -> Result<T> {
    let payload = decode_frame(data, verify)?;
    bincode::deserialize(&payload).map_err(|e| Error::Corrupt(format!("Failed to decode record: {}", e)))
}
