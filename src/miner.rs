//! Proof-of-work nonce search
//!
//! A nonce is admissible when the block hash starts with `difficulty` zero hex
//! digits. The search starts at 1 and returns the lowest admissible nonce, in
//! both the sequential and the rayon-backed parallel mode.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use crate::blockchain::{meets_difficulty, Block, Candidate};
use crate::crypto::NonceHasher;
use crate::error::{ChainError, Result};

pub const DEFAULT_DIFFICULTY: u32 = 2;
pub const DEFAULT_MAX_ATTEMPTS: u64 = 10_000_000;

/// Nonces handed to the thread pool per round in parallel mode.
const PARALLEL_BATCH: u64 = 4096;

#[derive(Clone)]
pub struct Miner {
    difficulty: u32,
    max_attempts: u64,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl std::fmt::Debug for Miner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Miner")
            .field("difficulty", &self.difficulty)
            .field("max_attempts", &self.max_attempts)
            .field("threads", &self.threads())
            .finish()
    }
}

impl Miner {
    /// Sequential miner.
    pub fn new(difficulty: u32, max_attempts: u64) -> Self {
        Miner {
            difficulty,
            max_attempts,
            pool: None,
        }
    }

    /// Miner backed by a dedicated rayon pool when `threads > 1`.
    pub fn with_threads(difficulty: u32, max_attempts: u64, threads: usize) -> Result<Self> {
        if threads <= 1 {
            return Ok(Self::new(difficulty, max_attempts));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("chainsign-miner-{}", i))
            .build()
            .map_err(|e| ChainError::Internal(format!("Failed to build mining pool: {}", e)))?;
        Ok(Miner {
            difficulty,
            max_attempts,
            pool: Some(Arc::new(pool)),
        })
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn max_attempts(&self) -> u64 {
        self.max_attempts
    }

    pub fn threads(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    /// Search for the lowest admissible nonce of `candidate`, returning `(hash, nonce)`.
    pub fn mine(&self, candidate: &Candidate) -> Result<(String, u64)> {
        let hasher = NonceHasher::new(&candidate.previous_hash, candidate.timestamp, &candidate.data)?;
        let start = Instant::now();

        let found = match &self.pool {
            Some(pool) => self.search_parallel(pool, &hasher),
            None => self.search_sequential(&hasher),
        };

        match found {
            Some((hash, nonce)) => {
                debug!(
                    block_id = %candidate.id,
                    nonce,
                    difficulty = self.difficulty,
                    elapsed_ms = %start.elapsed().as_millis(),
                    "miner.found"
                );
                Ok((hash, nonce))
            }
            None => Err(ChainError::MiningAttemptsExceeded {
                attempts: self.max_attempts,
            }),
        }
    }

    /// Mine `candidate` and seal it into a block.
    pub fn mine_block(&self, candidate: Candidate) -> Result<Block> {
        let (hash, nonce) = self.mine(&candidate)?;
        Ok(candidate.finalize(hash, nonce))
    }

    fn search_sequential(&self, hasher: &NonceHasher) -> Option<(String, u64)> {
        (1..=self.max_attempts)
            .map(|nonce| (hasher.hash(nonce), nonce))
            .find(|(hash, _)| meets_difficulty(hash, self.difficulty))
    }

    fn search_parallel(&self, pool: &rayon::ThreadPool, hasher: &NonceHasher) -> Option<(String, u64)> {
        let difficulty = self.difficulty;
        let mut start = 1u64;
        while start <= self.max_attempts {
            let end = start.saturating_add(PARALLEL_BATCH - 1).min(self.max_attempts);
            let found = pool.install(|| {
                (start..=end)
                    .into_par_iter()
                    .map(|nonce| (hasher.hash(nonce), nonce))
                    .find_first(|(hash, _)| meets_difficulty(hash, difficulty))
            });
            if found.is_some() {
                return found;
            }
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        None
    }
}
