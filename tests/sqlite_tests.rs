//! Number allocation against SQLite, including two connections sharing one file.
//!
//! Run with: `cargo test --features sqlite --test sqlite_tests`

#![cfg(feature = "sqlite")]

use std::collections::BTreeSet;
use std::sync::Arc;

use kontor::core::*;
use kontor::sqlite::SqliteRepository;

#[tokio::test]
async fn end_to_end_contract_numbers() {
    let repo = Arc::new(SqliteRepository::open_in_memory().await.unwrap());
    let allocator = SequenceAllocator::new(repo);

    let first = allocator.allocate(DocumentFamily::Contract, 2025).await.unwrap();
    let second = allocator.allocate(DocumentFamily::Contract, 2025).await.unwrap();
    assert_eq!(first.number.to_string(), "CTR-2025-0001");
    assert_eq!(second.number.to_string(), "CTR-2025-0002");
}

#[tokio::test]
async fn numbers_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("kontor.db");
    {
        let repo = Arc::new(SqliteRepository::open(&db).await.unwrap());
        let allocator = SequenceAllocator::new(repo);
        for _ in 0..3 {
            allocator.allocate(DocumentFamily::Invoice, 2025).await.unwrap();
        }
    }

    let repo = Arc::new(SqliteRepository::open(&db).await.unwrap());
    let allocator = SequenceAllocator::new(repo);
    let next = allocator.allocate(DocumentFamily::Invoice, 2025).await.unwrap();
    assert_eq!(next.number.to_string(), "FAC-2025-0004");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_connections_never_hand_out_the_same_number() {
    const PER_CONNECTION: usize = 25;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("kontor.db");

    let a = SequenceAllocator::new(Arc::new(SqliteRepository::open(&db).await.unwrap()));
    let b = SequenceAllocator::new(Arc::new(SqliteRepository::open(&db).await.unwrap()));

    let mut handles = Vec::new();
    for allocator in [a, b] {
        for _ in 0..PER_CONNECTION {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                allocator.allocate(DocumentFamily::Invoice, 2025).await
            }));
        }
    }

    let mut sequences = BTreeSet::new();
    for handle in handles {
        let record = handle.await.unwrap().unwrap();
        assert!(sequences.insert(record.number.sequence), "duplicate {}", record.number);
    }
    assert_eq!(
        sequences,
        (1..=(2 * PER_CONNECTION) as u32).collect::<BTreeSet<_>>()
    );
}

#[tokio::test]
async fn malformed_imported_number_restarts_sequence() {
    let repo = Arc::new(SqliteRepository::open_in_memory().await.unwrap());
    // A legacy row that only shares the LIKE prefix.
    repo.insert_document(DocumentNumber::new(DocumentFamily::Invoice, 2025, 10_000))
        .await
        .unwrap();

    let allocator = SequenceAllocator::new(repo.clone());
    let record = allocator.allocate(DocumentFamily::Invoice, 2025).await.unwrap();
    assert_eq!(record.number.to_string(), "FAC-2025-0001");
}
