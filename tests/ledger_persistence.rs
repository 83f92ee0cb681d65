//! Integration tests for ledger durability, tamper detection and append serialization

use std::collections::HashSet;
use std::sync::Arc;

use chainsign::blockchain::{BoundingBox, DetectionResult, RecordContext, ZERO_HASH};
use chainsign::config::Config;
use chainsign::miner::Miner;
use chainsign::persistence::{InMemoryPersistence, JsonFilePersistence, CHAIN_FILE_NAME};
use chainsign::{ChainError, Ledger};
use tempfile::TempDir;

fn durable_ledger(dir: &TempDir) -> Ledger {
    let mut config = Config::default();
    config.ledger.data_dir = Some(dir.path().to_path_buf());
    Ledger::from_config(&config).expect("valid config")
}

fn detection(sign: &str, confidence: f64) -> DetectionResult {
    DetectionResult {
        sign_type: sign.to_string(),
        confidence,
        bounding_box: Some(BoundingBox {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
        }),
        description: format!("{} sign at the crossing", sign),
    }
}

fn at(location: &str) -> RecordContext {
    RecordContext {
        location: Some(location.to_string()),
        device_id: Some("cam-7".to_string()),
    }
}

#[tokio::test]
async fn test_chain_survives_restart() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;

    let before = {
        let ledger = durable_ledger(&dir);
        ledger.add_record(b"frame-1", detection("STOP", 0.94), at("lab")).await?;
        ledger.add_record(b"frame-2", detection("YIELD", 0.91), at("lab")).await?;
        ledger.get_chain()
    };
    assert!(dir.path().join(CHAIN_FILE_NAME).exists());

    let reopened = durable_ledger(&dir);
    let after = reopened.get_chain();
    assert_eq!(after, before);
    assert!(reopened.verify_chain_integrity());

    // Appending after a reload links onto the persisted tip.
    let next = reopened.add_record(b"frame-3", detection("NO_PARKING", 0.87), at("lab")).await?;
    assert_eq!(next.previous_hash, before[2].hash);
    Ok(())
}

#[tokio::test]
async fn test_long_decimal_confidence_survives_restart() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let confidences = [0.9856906946328695, 0.1 + 0.2, 0.7071067811865476, 1.0 / 3.0];

    {
        let ledger = durable_ledger(&dir);
        for (i, confidence) in confidences.iter().enumerate() {
            let mut detection = detection("STOP", *confidence);
            detection.bounding_box = Some(BoundingBox {
                x: 12.345678901234567,
                y: 0.1 * i as f64,
                width: 2.0 / 3.0,
                height: 199.99999999999997,
            });
            ledger
                .add_record(format!("frame-{}", i).as_bytes(), detection, at("lab"))
                .await?;
        }
        assert!(ledger.verify_chain_integrity());
    }

    let reopened = durable_ledger(&dir);
    let chain = reopened.get_chain();
    assert_eq!(chain.len(), confidences.len() + 1);
    for (block, confidence) in chain.iter().skip(1).zip(confidences) {
        assert_eq!(block.data.detection_result.confidence.to_bits(), confidence.to_bits());
    }
    assert!(reopened.verify_chain_integrity());
    assert!(reopened.verify_chain_strict());
    Ok(())
}

#[tokio::test]
async fn test_chain_written_by_web_app_verifies() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    std::fs::write(
        dir.path().join(CHAIN_FILE_NAME),
        include_str!("data/webapp-chain.json"),
    )?;

    let ledger = durable_ledger(&dir);
    let chain = ledger.get_chain();
    assert_eq!(chain.len(), 3);
    assert!(ledger.verify_chain_integrity());
    assert!(ledger.verify_chain_strict());
    assert!(ledger.verify_block_by_id("block-1700000002000-def456uvw").valid);

    // New records link onto the imported tip.
    let block = ledger.add_record(b"frame", detection("NO_PARKING", 0.87), at("lab")).await?;
    assert_eq!(block.previous_hash, chain[2].hash);
    assert!(ledger.verify_chain_integrity());
    Ok(())
}

#[tokio::test]
async fn test_links_and_proof_of_work_over_many_appends() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Ledger::new(Arc::new(InMemoryPersistence::new()), Miner::new(2, 1_000_000));
    for i in 0..5 {
        ledger
            .add_record(format!("frame-{}", i).as_bytes(), detection("SPEED_LIMIT", 0.89), at("road"))
            .await?;
    }

    let chain = ledger.get_chain();
    assert_eq!(chain.len(), 6);
    assert_eq!(chain[0].hash, ZERO_HASH);
    for i in 1..chain.len() {
        assert_eq!(chain[i].previous_hash, chain[i - 1].hash);
        assert!(chain[i].hash.starts_with("00"));
        assert!(chain[i].nonce >= 1);
        assert!(chain[i].timestamp >= chain[i - 1].timestamp);
    }
    assert!(ledger.verify_chain_integrity());
    assert!(ledger.verify_chain_strict());
    Ok(())
}

#[tokio::test]
async fn test_corrupt_file_resets_to_genesis() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let path = dir.path().join(CHAIN_FILE_NAME);
    std::fs::write(&path, "this is not a chain")?;

    let ledger = durable_ledger(&dir);
    let chain = ledger.get_chain();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].previous_hash, ZERO_HASH);
    assert!(ledger.verify_chain_integrity());

    // The fresh genesis chain replaced the unreadable file.
    let stored: Vec<serde_json::Value> = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(stored.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_tampered_file_fails_verification() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let target_id = {
        let ledger = durable_ledger(&dir);
        let block = ledger.add_record(b"frame", detection("STOP", 0.94), at("lab")).await?;
        ledger.add_record(b"frame-2", detection("YIELD", 0.91), at("lab")).await?;
        block.id
    };

    let path = dir.path().join(CHAIN_FILE_NAME);
    let mut stored: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    stored[1]["data"]["detectionResult"]["signType"] = serde_json::json!("YIELD");
    std::fs::write(&path, serde_json::to_string_pretty(&stored)?)?;

    let reopened = durable_ledger(&dir);
    assert_eq!(reopened.get_chain().len(), 3);
    assert!(!reopened.verify_chain_integrity());
    assert!(!reopened.verify_block_by_id(&target_id).valid);
    Ok(())
}

#[tokio::test]
async fn test_rehashed_block_breaks_following_link() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let (first_id, second_id) = {
        let ledger = durable_ledger(&dir);
        let a = ledger.add_record(b"a", detection("STOP", 0.94), at("lab")).await?;
        let b = ledger.add_record(b"b", detection("STOP", 0.95), at("lab")).await?;
        (a.id, b.id)
    };

    let store = JsonFilePersistence::in_dir(dir.path(), CHAIN_FILE_NAME);
    let path = store.path().to_path_buf();
    let mut chain: Vec<chainsign::blockchain::Block> = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    chain[1].data.metadata.location = Some("somewhere else".to_string());
    chain[1].hash = chain[1].compute_hash()?;
    std::fs::write(&path, serde_json::to_string(&chain)?)?;

    let reopened = durable_ledger(&dir);
    assert!(reopened.verify_block_by_id(&first_id).valid);
    assert!(!reopened.verify_block_by_id(&second_id).valid);
    assert!(!reopened.verify_chain_integrity());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_records_stay_linear() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = Arc::new(Ledger::new(
        Arc::new(InMemoryPersistence::new()),
        Miner::new(2, 1_000_000),
    ));

    let mut handles = Vec::new();
    for i in 0..8 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .add_record(format!("frame-{}", i).as_bytes(), detection("STOP", 0.9), at("lab"))
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let chain = ledger.get_chain();
    assert_eq!(chain.len(), 9);
    assert!(ledger.verify_chain_integrity());

    let predecessors: HashSet<_> = chain.iter().skip(1).map(|b| b.previous_hash.clone()).collect();
    assert_eq!(predecessors.len(), 8);
    let ids: HashSet<_> = chain.iter().map(|b| b.id.clone()).collect();
    assert_eq!(ids.len(), 9);
    Ok(())
}

#[tokio::test]
async fn test_memory_only_history_is_per_instance() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let first = Ledger::from_config(&config)?;
    first.add_record(b"frame", detection("STOP", 0.94), at("lab")).await?;
    assert_eq!(first.get_chain().len(), 2);
    assert!(!first.is_durable());

    let second = Ledger::from_config(&config)?;
    assert_eq!(second.get_chain().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_write_failure_keeps_in_memory_block() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, b"occupied")?;

    let ledger = Ledger::new(
        Arc::new(JsonFilePersistence::in_dir(&blocker, CHAIN_FILE_NAME)),
        Miner::new(2, 1_000_000),
    );
    let block = ledger.add_record(b"frame", detection("STOP", 0.94), at("lab")).await?;

    let chain = ledger.get_chain();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1], block);
    assert!(matches!(
        ledger.flush().await,
        Err(ChainError::PersistenceWriteFailure(_))
    ));
    Ok(())
}
