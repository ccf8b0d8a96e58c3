//! Writer behaviour against the in-memory store.

use cluster_analytics::ClusterAssignments;
use player_stats::{PlayerRecord, StageOutcome, StatsTable, MISSING, NUM_STATS};
use player_store::{
    build_documents, lookup, DocumentStore, InMemoryDocumentStore, PlayerDoc, StoreError, StoreWriter, WriteMode,
};

const SPLITS: [&str; 3] = ["all", "cb", "noncb"];

fn fixture(n: usize) -> (StatsTable, Vec<PlayerDoc>) {
    let records: Vec<PlayerRecord> = (0..n)
        .map(|i| {
            let mut stats = vec![MISSING; NUM_STATS];
            stats[0] = i as i64 + 1;
            stats[1] = 2277 - i as i64;
            stats[2] = 4_600_000_000 - i as i64 * 1000;
            PlayerRecord::new(format!("Player {i}"), i as u64 + 1, stats)
        })
        .collect();
    let table = StatsTable::from_records(records);

    let mut assignments = ClusterAssignments::new(table.usernames().map(str::to_string).collect());
    for (s, name) in SPLITS.iter().enumerate() {
        let labels: Vec<usize> = (0..n).map(|i| (i + s) % 7).collect();
        assignments.push_split(*name, &labels).unwrap();
    }
    let splits: Vec<String> = SPLITS.iter().map(|s| s.to_string()).collect();
    let docs = build_documents(&table, &assignments, &splits).unwrap();
    (table, docs)
}

#[tokio::test]
async fn test_rebuild_of_complete_collection_is_noop() {
    let (_, docs) = fixture(1000);
    let store = InMemoryDocumentStore::new();
    let writer = StoreWriter::new(&store, 128);

    assert_eq!(writer.write_all(&docs, WriteMode::Fresh).await.unwrap(), StageOutcome::Completed);
    assert_eq!(store.count().await.unwrap(), 1000);

    assert_eq!(writer.write_all(&docs, WriteMode::Fresh).await.unwrap(), StageOutcome::NothingToDo);
    assert_eq!(writer.write_all(&docs, WriteMode::Resume).await.unwrap(), StageOutcome::NothingToDo);
    assert_eq!(store.count().await.unwrap(), 1000);
}

#[tokio::test]
async fn test_drop_leaves_complete_collection_alone() {
    let (_, docs) = fixture(100);
    let store = InMemoryDocumentStore::new();
    let writer = StoreWriter::new(&store, 32);
    assert_eq!(writer.write_all(&docs, WriteMode::Fresh).await.unwrap(), StageOutcome::Completed);

    // Reject any write: a truncate-and-rewrite would surface as an error
    store.fail_beyond(Some(0));
    assert_eq!(writer.write_all(&docs, WriteMode::Drop).await.unwrap(), StageOutcome::NothingToDo);
    store.fail_beyond(None);
    assert_eq!(store.count().await.unwrap(), 100);
}

#[tokio::test]
async fn test_every_player_has_one_document_with_all_splits() {
    let (table, docs) = fixture(300);
    let store = InMemoryDocumentStore::new();
    StoreWriter::new(&store, 64).write_all(&docs, WriteMode::Fresh).await.unwrap();

    for record in table.iter() {
        let doc = store.find(&record.id()).await.unwrap().unwrap();
        assert_eq!(doc.username, record.username);
        assert_eq!(doc.stats, record.stats);
        assert!(SPLITS.iter().all(|s| doc.clusterids.contains_key(*s)));
    }
    assert_eq!(store.count().await.unwrap(), table.len() as u64);
}

#[tokio::test]
async fn test_partial_collection_needs_intent() {
    let (_, docs) = fixture(500);
    let store = InMemoryDocumentStore::new();
    store.upsert_batch(&docs[..120]).await.unwrap();

    let writer = StoreWriter::new(&store, 50);
    let err = writer.write_all(&docs, WriteMode::Fresh).await.unwrap_err();
    assert!(matches!(err, StoreError::PartialCollection { present: 120, expected: 500 }));
    assert_eq!(store.count().await.unwrap(), 120);

    assert_eq!(writer.write_all(&docs, WriteMode::Resume).await.unwrap(), StageOutcome::Completed);
    assert_eq!(store.count().await.unwrap(), 500);
}

#[tokio::test]
async fn test_failed_batch_then_resume() {
    let (_, docs) = fixture(1000);
    let store = InMemoryDocumentStore::new();
    let writer = StoreWriter::new(&store, 100);

    store.fail_beyond(Some(450));
    assert!(matches!(writer.write_all(&docs, WriteMode::Fresh).await, Err(StoreError::WriteRejected(_))));
    // Batches are atomic: only whole batches landed
    assert_eq!(store.count().await.unwrap(), 400);

    store.fail_beyond(None);
    assert_eq!(writer.write_all(&docs, WriteMode::Resume).await.unwrap(), StageOutcome::Completed);
    assert_eq!(store.count().await.unwrap(), 1000);
}

#[tokio::test]
async fn test_drop_rewrites_stale_collection() {
    let (_, docs) = fixture(200);
    let (_, stale) = fixture(50);
    let store = InMemoryDocumentStore::new();
    let mut foreign = stale[0].clone();
    foreign.id = "someone else".into();
    store.upsert_batch(&[foreign]).await.unwrap();

    let writer = StoreWriter::new(&store, 64);
    assert_eq!(writer.write_all(&docs, WriteMode::Drop).await.unwrap(), StageOutcome::Completed);
    assert_eq!(store.count().await.unwrap(), 200);
    assert!(!store.contains("someone else").await.unwrap());
}

#[tokio::test]
async fn test_lookup_is_case_insensitive() {
    let (_, docs) = fixture(10);
    let store = InMemoryDocumentStore::new();
    StoreWriter::new(&store, 4).write_all(&docs, WriteMode::Fresh).await.unwrap();

    let doc = lookup(&store, "PLAYER 3").await.unwrap().unwrap();
    assert_eq!(doc.username, "Player 3");
    assert_eq!(doc.clusterids["cb"], 4);
    assert!(lookup(&store, "nobody").await.unwrap().is_none());
}
