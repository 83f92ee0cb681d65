//! Hashing primitives for ChainSign
//!
//! Every block hash is SHA-256 over the canonical JSON encoding of
//! `{previousHash, timestamp, data, nonce}`, emitted compact and in exactly
//! that key order. `data` is serialized from structs, so its key order is the
//! field declaration order and absent optional fields are omitted. The block
//! `id` and `hash` never take part.
//!
//! Floating-point fields are written the way ECMAScript prints numbers
//! (`120`, not `120.0`), so chains produced by the web app hash identically.

use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};

use crate::blockchain::RecordPayload;
use crate::error::Result;

/// Number of leading image bytes covered by a fingerprint.
pub const FINGERPRINT_PREFIX_LEN: usize = 1000;

/// Borrowed view of the hashable part of a block.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalContent<'a> {
    pub previous_hash: &'a str,
    pub timestamp: i64,
    pub data: &'a RecordPayload,
    pub nonce: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CanonicalHead<'a> {
    previous_hash: &'a str,
    timestamp: i64,
    data: &'a RecordPayload,
}

/// Render `value` as ECMAScript's `Number.prototype.toString` would.
///
/// Returns `None` for NaN and infinities, which JSON cannot represent.
pub fn format_number(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    if value == 0.0 {
        // Also covers -0.
        return Some("0".to_string());
    }
    if (1e-6..1e21).contains(&value.abs()) {
        // Shortest round-trip digits, never an exponent, no trailing `.0`.
        return Some(value.to_string());
    }
    let text = format!("{:e}", value);
    Some(match text.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{}e+{}", mantissa, exponent)
        }
        _ => text,
    })
}

/// `serialize_with` adapter emitting [`format_number`] as a bare JSON number.
pub fn serialize_number<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match format_number(*value) {
        Some(text) => RawValue::from_string(text)
            .map_err(S::Error::custom)?
            .serialize(serializer),
        None => serializer.serialize_unit(),
    }
}

/// SHA-256 of `bytes` as 64 lowercase hex characters.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn canonicalize(content: &CanonicalContent<'_>) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(content)?)
}

pub fn content_hash(content: &CanonicalContent<'_>) -> Result<String> {
    Ok(digest(&canonicalize(content)?))
}

/// Digest of the first [`FINGERPRINT_PREFIX_LEN`] bytes of an image.
pub fn image_fingerprint(raw_image: &[u8]) -> String {
    let end = raw_image.len().min(FINGERPRINT_PREFIX_LEN);
    digest(&raw_image[..end])
}

/// Incremental hasher for the mining loop.
///
/// The nonce is the last key of the canonical encoding, so everything before
/// it is absorbed once and each attempt only feeds the nonce digits and the
/// closing brace into a cloned SHA-256 state.
#[derive(Clone)]
pub struct NonceHasher {
    prefix_state: Sha256,
}

impl NonceHasher {
    pub fn new(previous_hash: &str, timestamp: i64, data: &RecordPayload) -> Result<Self> {
        let mut head = serde_json::to_vec(&CanonicalHead {
            previous_hash,
            timestamp,
            data,
        })?;
        // `{...}` -> `{...,"nonce":`
        head.pop();
        head.extend_from_slice(b",\"nonce\":");

        let mut prefix_state = Sha256::new();
        prefix_state.update(&head);
        Ok(NonceHasher { prefix_state })
    }

    pub fn hash(&self, nonce: u64) -> String {
        let mut hasher = self.prefix_state.clone();
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(b"}");
        hex::encode(hasher.finalize())
    }
}
