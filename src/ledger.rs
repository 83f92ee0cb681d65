//! Public entry point to the ChainSign ledger
//!
//! A [`Ledger`] is constructed explicitly and shared behind an `Arc`. Its
//! lifecycle is construct → [`Ledger::ensure_initialized`] → serve →
//! [`Ledger::flush`] on shutdown. Every operation initializes lazily as well,
//! so the first step is optional.
//!
//! Appends are serialized by an async writer lock that is held from reading
//! the latest block until the new block has been appended, so two records can
//! never claim the same predecessor. Mining runs on tokio's blocking pool;
//! readers only take short read locks on the store and are never held up by
//! a search in progress.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::blockchain::{
    find_by_id, verify_block, verify_chain, verify_chain_with_difficulty, Block, Candidate,
    DetectionResult, LedgerStore, RecordContext, RecordPayload,
};
use crate::config::Config;
use crate::crypto::image_fingerprint;
use crate::error::{ChainError, Result};
use crate::miner::Miner;
use crate::persistence::Persistence;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Outcome of verifying a single block by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockVerification {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    /// Blocks including genesis.
    pub total_blocks: usize,
    /// Blocks excluding genesis.
    pub records: usize,
    pub difficulty: u32,
    pub durable: bool,
    pub latest_hash: Option<String>,
    pub last_record_at: Option<i64>,
}

pub struct Ledger {
    store: LedgerStore,
    miner: Miner,
    writer: Mutex<()>,
}

impl Ledger {
    pub fn new(persistence: Arc<dyn Persistence>, miner: Miner) -> Self {
        Self {
            store: LedgerStore::new(persistence),
            miner,
            writer: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config.persistence(), config.build_miner()?))
    }

    pub fn ensure_initialized(&self) {
        self.store.ensure_initialized();
    }

    pub fn difficulty(&self) -> u32 {
        self.miner.difficulty()
    }

    pub fn is_durable(&self) -> bool {
        self.store.is_durable()
    }

    /// Fingerprint `image`, mine a block for the detection and append it.
    ///
    /// On `MiningAttemptsExceeded` nothing is appended and the call may be
    /// retried. A failed durable write is logged and the block is still
    /// returned; it lives in memory until the next successful write.
    pub async fn add_record(
        &self,
        image: &[u8],
        detection: DetectionResult,
        context: RecordContext,
    ) -> Result<Block> {
        validate_detection(&detection)?;
        self.ensure_initialized();

        let payload = RecordPayload {
            image_hash: image_fingerprint(image),
            detection_result: detection,
            metadata: context.into(),
        };

        let _writer = self.writer.lock().await;

        let previous = self.store.latest()?;
        let id = self.fresh_block_id();
        let candidate = Candidate::new(id, &previous, payload);

        let miner = self.miner.clone();
        let block = tokio::task::spawn_blocking(move || miner.mine_block(candidate))
            .await
            .map_err(|e| ChainError::Internal(format!("Mining task failed: {}", e)))??;

        match self.store.append(block.clone()) {
            Ok(()) => {}
            Err(e @ ChainError::PersistenceWriteFailure(_)) => {
                error!(
                    block_id = %block.id,
                    error = %e,
                    "Block appended in memory but not persisted; durable copy is behind"
                );
            }
            Err(e) => return Err(e),
        }

        info!(
            block_id = %block.id,
            hash = %block.hash,
            nonce = block.nonce,
            sign_type = %block.data.detection_result.sign_type,
            "ledger.append"
        );
        Ok(block)
    }

    /// Whole chain, genesis included.
    pub fn get_chain(&self) -> Vec<Block> {
        self.ensure_initialized();
        self.store.snapshot()
    }

    pub fn get_latest_block(&self) -> Result<Block> {
        self.ensure_initialized();
        self.store.latest()
    }

    /// Link and content-hash check of every block. Does not re-check difficulty.
    pub fn verify_chain_integrity(&self) -> bool {
        self.ensure_initialized();
        self.store.with_chain(verify_chain)
    }

    /// [`Ledger::verify_chain_integrity`] plus the proof-of-work predicate.
    pub fn verify_chain_strict(&self) -> bool {
        self.ensure_initialized();
        let difficulty = self.miner.difficulty();
        self.store
            .with_chain(|chain| verify_chain_with_difficulty(chain, difficulty))
    }

    /// Unknown ids are reported as `valid: false` with no block.
    pub fn verify_block_by_id(&self, id: &str) -> BlockVerification {
        self.ensure_initialized();
        self.store.with_chain(|chain| match find_by_id(chain, id) {
            Some((index, block)) => BlockVerification {
                valid: verify_block(chain, index),
                block: Some(block.clone()),
            },
            None => BlockVerification {
                valid: false,
                block: None,
            },
        })
    }

    pub fn find_block(&self, id: &str) -> Option<Block> {
        self.ensure_initialized();
        self.store
            .with_chain(|chain| find_by_id(chain, id).map(|(_, block)| block.clone()))
    }

    pub fn stats(&self) -> LedgerStats {
        self.ensure_initialized();
        let difficulty = self.miner.difficulty();
        let durable = self.store.is_durable();
        self.store.with_chain(|chain| {
            let records = chain.len().saturating_sub(1);
            LedgerStats {
                total_blocks: chain.len(),
                records,
                difficulty,
                durable,
                latest_hash: chain.last().map(|b| b.hash.clone()),
                last_record_at: (records > 0)
                    .then(|| chain.last().map(|b| b.timestamp))
                    .flatten(),
            }
        })
    }

    /// Rewrite the durable copy from memory; used on shutdown.
    pub async fn flush(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        if !self.store.is_initialized() {
            return Ok(());
        }
        self.store.flush()
    }

    fn fresh_block_id(&self) -> String {
        loop {
            let id = generate_block_id();
            if !self.store.with_chain(|chain| find_by_id(chain, &id).is_some()) {
                return id;
            }
        }
    }
}

fn generate_block_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("block-{}-{}", chrono::Utc::now().timestamp_millis(), suffix)
}

fn validate_detection(detection: &DetectionResult) -> Result<()> {
    if detection.sign_type.trim().is_empty() {
        return Err(ChainError::InvalidRecord("signType must not be empty".to_string()));
    }
    if !detection.confidence.is_finite() || !(0.0..=1.0).contains(&detection.confidence) {
        return Err(ChainError::InvalidRecord(format!(
            "confidence must be within [0, 1], got {}",
            detection.confidence
        )));
    }
    if let Some(bbox) = &detection.bounding_box {
        let coords = [bbox.x, bbox.y, bbox.width, bbox.height];
        if coords.iter().any(|v| !v.is_finite()) {
            return Err(ChainError::InvalidRecord(
                "boundingBox coordinates must be finite".to_string(),
            ));
        }
    }
    Ok(())
}
