//! Read-only integrity checks over a chain of blocks.
//!
//! Proof-of-work is an admission gate: [`verify_block`] and [`verify_chain`]
//! only confirm links and content hashes. [`verify_chain_with_difficulty`]
//! additionally re-checks the difficulty predicate.

use super::chain::{meets_difficulty, Block};

pub fn verify_block(chain: &[Block], index: usize) -> bool {
    if index == 0 {
        return !chain.is_empty();
    }
    let (Some(block), Some(previous)) = (chain.get(index), chain.get(index - 1)) else {
        return false;
    };

    if block.previous_hash != previous.hash {
        return false;
    }

    match block.compute_hash() {
        Ok(hash) => hash == block.hash,
        Err(_) => false,
    }
}

pub fn verify_chain(chain: &[Block]) -> bool {
    (1..chain.len()).all(|index| verify_block(chain, index))
}

pub fn verify_chain_with_difficulty(chain: &[Block], difficulty: u32) -> bool {
    verify_chain(chain)
        && chain
            .iter()
            .skip(1)
            .all(|block| meets_difficulty(&block.hash, difficulty))
}

/// Index of the first block with `id` in `chain`, if any.
pub fn find_by_id<'a>(chain: &'a [Block], id: &str) -> Option<(usize, &'a Block)> {
    chain.iter().enumerate().find(|(_, block)| block.id == id)
}

/// Index of the first block that fails [`verify_block`].
pub fn first_invalid_index(chain: &[Block]) -> Option<usize> {
    (1..chain.len()).find(|&index| !verify_block(chain, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{Candidate, DetectionResult, RecordMetadata, RecordPayload};
    use crate::miner::Miner;

    fn payload(sign: &str) -> RecordPayload {
        RecordPayload {
            image_hash: crate::crypto::digest(sign.as_bytes()),
            detection_result: DetectionResult {
                sign_type: sign.to_string(),
                confidence: 0.9,
                bounding_box: None,
                description: format!("{} sign", sign),
            },
            metadata: RecordMetadata {
                location: None,
                device_id: Some("cam-1".to_string()),
                model_version: "1.0.0".to_string(),
            },
        }
    }

    fn build_chain(len: usize) -> Vec<Block> {
        let miner = Miner::new(2, 1_000_000);
        let mut chain = vec![Block::genesis()];
        for i in 1..len {
            let previous = chain.last().unwrap();
            let candidate = Candidate::new(format!("block-{}", i), previous, payload("STOP"));
            let (hash, nonce) = miner.mine(&candidate).unwrap();
            chain.push(candidate.finalize(hash, nonce));
        }
        chain
    }

    #[test]
    fn test_empty_and_genesis_only_chains_are_valid() {
        assert!(verify_chain(&[]));
        assert!(verify_chain(&[Block::genesis()]));
        assert!(verify_block(&[Block::genesis()], 0));
    }

    #[test]
    fn test_mined_chain_verifies() {
        let chain = build_chain(4);
        assert!(verify_chain(&chain));
        assert!(verify_chain_with_difficulty(&chain, 2));
        assert_eq!(first_invalid_index(&chain), None);
    }

    #[test]
    fn test_payload_tamper_is_detected() {
        let mut chain = build_chain(3);
        chain[1].data.detection_result.confidence = 0.1;
        assert!(!verify_block(&chain, 1));
        assert!(verify_block(&chain, 2));
        assert!(!verify_chain(&chain));
        assert_eq!(first_invalid_index(&chain), Some(1));
    }

    #[test]
    fn test_rehashed_block_breaks_next_link() {
        let mut chain = build_chain(3);
        chain[1].data.metadata.location = Some("elsewhere".to_string());
        chain[1].hash = chain[1].compute_hash().unwrap();

        assert!(verify_block(&chain, 1));
        assert!(!verify_block(&chain, 2));
        assert!(!verify_chain(&chain));
    }

    #[test]
    fn test_difficulty_is_not_rechecked_by_plain_verification() {
        let mut chain = vec![Block::genesis()];
        let candidate = Candidate::new("block-weak".to_string(), &chain[0], payload("YIELD"));
        // Pick a nonce whose hash does not satisfy difficulty 2.
        let (hash, nonce) = (1u64..)
            .map(|n| (candidate_hash(&candidate, n), n))
            .find(|(h, _)| !h.starts_with("00"))
            .unwrap();
        chain.push(candidate.finalize(hash, nonce));

        assert!(verify_chain(&chain));
        assert!(!verify_chain_with_difficulty(&chain, 2));
    }

    #[test]
    fn test_find_by_id() {
        let chain = build_chain(3);
        let (index, block) = find_by_id(&chain, "block-2").unwrap();
        assert_eq!(index, 2);
        assert_eq!(block.id, "block-2");
        assert!(find_by_id(&chain, "does-not-exist").is_none());
        assert!(!verify_block(&chain, 99));
    }

    fn candidate_hash(candidate: &Candidate, nonce: u64) -> String {
        crate::crypto::content_hash(&candidate.content(nonce)).unwrap()
    }
}
