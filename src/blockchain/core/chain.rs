use serde::{Deserialize, Serialize};

use crate::crypto::{self, CanonicalContent};
use crate::error::Result;

/// Previous-hash sentinel of the genesis block, which is also its own hash.
pub const ZERO_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Id reserved for the genesis block.
pub const GENESIS_ID: &str = "genesis";

/// Model version stamped into every record's metadata.
pub const MODEL_VERSION: &str = "1.0.0";

/// Approximate location of a detected sign inside the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(serialize_with = "crypto::serialize_number")]
    pub x: f64,
    #[serde(serialize_with = "crypto::serialize_number")]
    pub y: f64,
    #[serde(serialize_with = "crypto::serialize_number")]
    pub width: f64,
    #[serde(serialize_with = "crypto::serialize_number")]
    pub height: f64,
}

/// Result of one sign detection as stored on the ledger.
///
/// Field order is part of the canonical hashing format; do not reorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub sign_type: String,
    #[serde(serialize_with = "crypto::serialize_number")]
    pub confidence: f64,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// Caller-supplied context for a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub model_version: String,
}

impl From<RecordContext> for RecordMetadata {
    fn from(ctx: RecordContext) -> Self {
        RecordMetadata {
            location: ctx.location,
            device_id: ctx.device_id,
            model_version: MODEL_VERSION.to_string(),
        }
    }
}

/// Application payload carried by a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayload {
    pub image_hash: String,
    pub detection_result: DetectionResult,
    pub metadata: RecordMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub hash: String,
    pub previous_hash: String,
    pub timestamp: i64,
    pub data: RecordPayload,
    pub nonce: u64,
}

impl Block {
    pub fn genesis() -> Self {
        Block {
            id: GENESIS_ID.to_string(),
            hash: ZERO_HASH.to_string(),
            previous_hash: ZERO_HASH.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            data: RecordPayload {
                image_hash: "genesis".to_string(),
                detection_result: DetectionResult {
                    sign_type: "GENESIS".to_string(),
                    confidence: 1.0,
                    bounding_box: None,
                    description: "Genesis block - ChainSign AI initialized".to_string(),
                },
                metadata: RecordMetadata {
                    location: None,
                    device_id: None,
                    model_version: MODEL_VERSION.to_string(),
                },
            },
            nonce: 0,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.id == GENESIS_ID
    }

    /// Hashable view of this block; `id` and `hash` are left out.
    pub fn content(&self) -> CanonicalContent<'_> {
        CanonicalContent {
            previous_hash: &self.previous_hash,
            timestamp: self.timestamp,
            data: &self.data,
            nonce: self.nonce,
        }
    }

    /// Digest of the block's current content, regardless of the stored `hash`.
    pub fn compute_hash(&self) -> Result<String> {
        crypto::content_hash(&self.content())
    }
}

/// A block that has been assembled but not yet mined.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub previous_hash: String,
    pub timestamp: i64,
    pub data: RecordPayload,
}

impl Candidate {
    pub fn new(id: String, previous: &Block, data: RecordPayload) -> Self {
        // Keep timestamps monotonic even if the wall clock steps backwards.
        let now = chrono::Utc::now().timestamp_millis();
        Candidate {
            id,
            previous_hash: previous.hash.clone(),
            timestamp: now.max(previous.timestamp),
            data,
        }
    }

    pub fn content(&self, nonce: u64) -> CanonicalContent<'_> {
        CanonicalContent {
            previous_hash: &self.previous_hash,
            timestamp: self.timestamp,
            data: &self.data,
            nonce,
        }
    }

    /// Seal the candidate with the hash and nonce found by the miner.
    pub fn finalize(self, hash: String, nonce: u64) -> Block {
        Block {
            id: self.id,
            hash,
            previous_hash: self.previous_hash,
            timestamp: self.timestamp,
            data: self.data,
            nonce,
        }
    }
}

/// Returns true when `hash` starts with `difficulty` zero hex digits.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}
