//! Storage backends for the ledger
//!
//! The whole chain is written as one JSON array on every save. `JsonFilePersistence`
//! writes through a temporary file in the target directory and renames it over
//! the previous copy, so a crash mid-write leaves the last good file in place.

use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::NamedTempFile;

use crate::blockchain::Block;
use crate::error::{ChainError, Result};

/// Default file name of the persisted chain inside the data directory.
pub const CHAIN_FILE_NAME: &str = "blockchain-data.json";

/// Abstraction for persistence backends.
pub trait Persistence: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet. Unreadable or corrupt
    /// state is an `InitializationFailure`.
    fn load_chain(&self) -> Result<Option<Vec<Block>>>;

    /// Replace the stored chain with `chain`.
    fn save_chain(&self, chain: &[Block]) -> Result<()>;

    /// Whether saved state survives a process restart.
    fn is_durable(&self) -> bool;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backend storing `file_name` inside `data_dir`.
    pub fn in_dir(data_dir: impl AsRef<Path>, file_name: &str) -> Self {
        Self::new(data_dir.as_ref().join(file_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, chain: &[Block]) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, chain)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl Persistence for JsonFilePersistence {
    fn load_chain(&self) -> Result<Option<Vec<Block>>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ChainError::InitializationFailure(format!(
                    "Failed to open {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let chain: Vec<Block> = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ChainError::InitializationFailure(format!(
                "Failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })?;

        if chain.is_empty() {
            return Err(ChainError::InitializationFailure(format!(
                "{} holds an empty chain",
                self.path.display()
            )));
        }
        Ok(Some(chain))
    }

    fn save_chain(&self, chain: &[Block]) -> Result<()> {
        self.write_atomically(chain).map_err(|e| {
            ChainError::PersistenceWriteFailure(format!(
                "Failed to write {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Memory-only backend for tests and runs without a data directory.
/// Everything it holds is lost when the process exits.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    pub blocks: Arc<Mutex<Vec<Block>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn load_chain(&self) -> Result<Option<Vec<Block>>> {
        let blocks = self.blocks.lock();
        if blocks.is_empty() {
            Ok(None)
        } else {
            Ok(Some(blocks.clone()))
        }
    }

    fn save_chain(&self, chain: &[Block]) -> Result<()> {
        *self.blocks.lock() = chain.to_vec();
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonFilePersistence::in_dir(dir.path(), CHAIN_FILE_NAME);
        assert!(store.load_chain().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_chain() {
        let dir = TempDir::new().unwrap();
        let store = JsonFilePersistence::in_dir(dir.path().join("nested"), CHAIN_FILE_NAME);
        let chain = vec![Block::genesis()];

        store.save_chain(&chain).unwrap();
        assert!(store.path().exists());
        assert_eq!(store.load_chain().unwrap(), Some(chain));
    }

    #[test]
    fn test_corrupt_file_is_initialization_failure() {
        let dir = TempDir::new().unwrap();
        let store = JsonFilePersistence::in_dir(dir.path(), CHAIN_FILE_NAME);
        fs::write(store.path(), b"{ not json").unwrap();
        assert!(matches!(
            store.load_chain(),
            Err(ChainError::InitializationFailure(_))
        ));

        fs::write(store.path(), b"[]").unwrap();
        assert!(matches!(
            store.load_chain(),
            Err(ChainError::InitializationFailure(_))
        ));
    }

    #[test]
    fn test_unwritable_location_is_write_failure() {
        let dir = TempDir::new().unwrap();
        // A regular file where the data directory should be.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();
        let store = JsonFilePersistence::in_dir(&blocker, CHAIN_FILE_NAME);

        let err = store.save_chain(&[Block::genesis()]).unwrap_err();
        assert!(matches!(err, ChainError::PersistenceWriteFailure(_)));
    }

    #[test]
    fn test_in_memory_backend_is_not_durable() {
        let store = InMemoryPersistence::new();
        assert!(!store.is_durable());
        assert!(store.load_chain().unwrap().is_none());

        store.save_chain(&[Block::genesis()]).unwrap();
        assert_eq!(store.load_chain().unwrap().map(|c| c.len()), Some(1));
    }
}
