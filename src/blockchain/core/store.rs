use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::{error, info, warn};

use super::chain::Block;
use super::validation;
use crate::error::{ChainError, Result};
use crate::persistence::Persistence;

/// Authoritative in-memory chain plus its durable mirror.
///
/// The chain is loaded (or bootstrapped with a genesis block) exactly once,
/// on the first call to [`LedgerStore::ensure_initialized`]. Appends must be
/// serialized by the caller; `Ledger` does this with its writer lock.
pub struct LedgerStore {
    persistence: Arc<dyn Persistence>,
    chain: OnceCell<RwLock<Vec<Block>>>,
}

impl LedgerStore {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Self {
            persistence,
            chain: OnceCell::new(),
        }
    }

    pub fn is_durable(&self) -> bool {
        self.persistence.is_durable()
    }

    pub fn is_initialized(&self) -> bool {
        self.chain.get().is_some()
    }

    /// Load or bootstrap the chain. Concurrent first callers block until the
    /// single initializer has finished; later calls return immediately.
    pub fn ensure_initialized(&self) {
        self.chain.get_or_init(|| RwLock::new(self.load_or_bootstrap()));
    }

    fn load_or_bootstrap(&self) -> Vec<Block> {
        if !self.persistence.is_durable() {
            warn!(
                backend = %self.persistence.describe(),
                "No durable storage configured; ledger history will not survive a restart"
            );
        }

        match self.persistence.load_chain() {
            Ok(Some(chain)) => {
                info!(
                    blocks = chain.len(),
                    location = %self.persistence.describe(),
                    "Loaded ledger from storage"
                );
                if let Some(index) = validation::first_invalid_index(&chain) {
                    warn!(index, "Loaded ledger fails integrity verification");
                }
                chain
            }
            Ok(None) => {
                info!(location = %self.persistence.describe(), "No stored ledger found; creating genesis block");
                self.bootstrap()
            }
            Err(e) => {
                error!(
                    error = %e,
                    location = %self.persistence.describe(),
                    "ledger.reset: stored chain is unreadable; DISCARDING it and starting a fresh genesis-only chain"
                );
                self.bootstrap()
            }
        }
    }

    fn bootstrap(&self) -> Vec<Block> {
        let chain = vec![Block::genesis()];
        if let Err(e) = self.persistence.save_chain(&chain) {
            error!(error = %e, "Failed to persist genesis block");
        }
        chain
    }

    fn chain(&self) -> Result<&RwLock<Vec<Block>>> {
        self.chain.get().ok_or(ChainError::EmptyChain)
    }

    /// Append `block` and rewrite the durable copy.
    ///
    /// A persistence failure is returned as `Err(PersistenceWriteFailure)` but
    /// the in-memory append stands; the two copies converge on the next
    /// successful write.
    pub fn append(&self, block: Block) -> Result<()> {
        let snapshot = {
            let mut chain = self.chain()?.write();
            chain.push(block);
            chain.clone()
        };
        self.persistence.save_chain(&snapshot)
    }

    /// Independent copy of the current chain; empty before initialization.
    pub fn snapshot(&self) -> Vec<Block> {
        self.chain
            .get()
            .map(|chain| chain.read().clone())
            .unwrap_or_default()
    }

    pub fn latest(&self) -> Result<Block> {
        self.chain()?.read().last().cloned().ok_or(ChainError::EmptyChain)
    }

    /// Run `f` against the chain under a read lock, without copying it.
    pub fn with_chain<R>(&self, f: impl FnOnce(&[Block]) -> R) -> R {
        match self.chain.get() {
            Some(chain) => f(&chain.read()),
            None => f(&[]),
        }
    }

    /// Rewrite the durable copy from memory.
    pub fn flush(&self) -> Result<()> {
        let snapshot = self.chain()?.read().clone();
        self.persistence.save_chain(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ZERO_HASH;
    use crate::persistence::InMemoryPersistence;

    #[test]
    fn test_latest_before_initialization_is_empty_chain() {
        let store = LedgerStore::new(Arc::new(InMemoryPersistence::new()));
        assert!(matches!(store.latest(), Err(ChainError::EmptyChain)));
        assert!(store.snapshot().is_empty());
        assert!(!store.is_initialized());
    }

    #[test]
    fn test_initialization_is_idempotent() {
        let backend = InMemoryPersistence::new();
        let store = LedgerStore::new(Arc::new(backend.clone()));
        store.ensure_initialized();
        let first = store.latest().unwrap();
        store.ensure_initialized();

        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(store.latest().unwrap(), first);
        assert_eq!(first.hash, ZERO_HASH);
        // Genesis is persisted immediately.
        assert_eq!(backend.blocks.lock().len(), 1);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let store = LedgerStore::new(Arc::new(InMemoryPersistence::new()));
        store.ensure_initialized();
        let mut snapshot = store.snapshot();
        snapshot[0].nonce = 99;
        snapshot.push(Block::genesis());

        assert_eq!(store.snapshot().len(), 1);
        assert_eq!(store.latest().unwrap().nonce, 0);
    }

    #[test]
    fn test_loads_existing_chain() {
        let backend = InMemoryPersistence::new();
        let mut genesis = Block::genesis();
        genesis.timestamp = 1;
        backend.save_chain(&[genesis.clone()]).unwrap();

        let store = LedgerStore::new(Arc::new(backend));
        store.ensure_initialized();
        assert_eq!(store.snapshot(), vec![genesis]);
    }
}
