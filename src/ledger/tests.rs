use std::{collections::BTreeSet, path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use tempfile::TempDir;

use crate::{error::Error, hash::FileId, message::ChunkKey};

use super::{ChunkRecord, ChunkReplicas, FileRecord, Ledger, RestoreStatus};

fn file_id(byte: u8) -> FileId {
    FileId::from_bytes([byte; 32])
}

fn chunk_record(chunk_no: u32, degree: u8) -> ChunkRecord {
    ChunkRecord::new(ChunkKey::new(file_id(1), chunk_no), 100, degree)
}

fn file_record(byte: u8, chunks: usize) -> FileRecord {
    FileRecord {
        file_id: file_id(byte),
        path: PathBuf::from(format!("/data/file-{byte}")),
        name: format!("file-{byte}"),
        replication_degree: 2,
        backed_up: Utc::now(),
        chunks: (0..chunks).map(|_| ChunkReplicas::new(10)).collect(),
    }
}

#[tokio::test]
async fn mirrors_are_idempotent() {
    let ledger = Ledger::in_memory();
    let record = chunk_record(0, 3);
    let key = record.key;
    ledger.add_chunk(record).await.unwrap();

    assert!(ledger.add_mirror(&key, 7).await.unwrap());
    assert!(!ledger.add_mirror(&key, 7).await.unwrap());
    assert_eq!(ledger.perceived_replication(&key), Some(1));

    assert_eq!(ledger.remove_mirror(&key, 7).await.unwrap(), Some(true));
    assert_eq!(ledger.remove_mirror(&key, 7).await.unwrap(), Some(false));
    assert_eq!(ledger.perceived_replication(&key), Some(0));
}

#[tokio::test]
async fn mirror_of_unknown_chunk_is_ignored() {
    let ledger = Ledger::in_memory();
    let key = ChunkKey::new(file_id(9), 0);

    assert!(!ledger.add_mirror(&key, 3).await.unwrap());
    assert_eq!(ledger.remove_mirror(&key, 3).await.unwrap(), None);
    assert_eq!(ledger.perceived_replication(&key), None);
    assert_eq!(ledger.desired_replication(&key), None);
}

#[tokio::test]
async fn add_chunk_keeps_first_record() {
    let ledger = Ledger::in_memory();
    assert!(ledger.add_chunk(chunk_record(0, 2)).await.unwrap());
    assert!(!ledger.add_chunk(chunk_record(0, 5)).await.unwrap());
    assert_eq!(
        ledger.desired_replication(&ChunkKey::new(file_id(1), 0)),
        Some(2)
    );
}

#[tokio::test]
async fn mirrors_seen_while_storing_are_kept() {
    let ledger = Ledger::in_memory();
    let record = chunk_record(0, 3);
    let key = record.key;

    assert!(!ledger.add_pending_mirror(&key, 4));
    ledger.begin_store(key);
    assert!(ledger.add_pending_mirror(&key, 4));
    assert!(ledger.add_pending_mirror(&key, 5));

    assert!(ledger.add_chunk(record).await.unwrap());
    assert_eq!(ledger.chunk(&key).unwrap().mirrors, BTreeSet::from([4, 5]));
    assert!(!ledger.add_pending_mirror(&key, 6));
}

#[tokio::test]
async fn abandoned_store_drops_pending_mirrors() {
    let ledger = Ledger::in_memory();
    let key = ChunkKey::new(file_id(2), 0);

    ledger.begin_store(key);
    assert!(ledger.add_pending_mirror(&key, 4));
    ledger.abandon_store(&key);

    assert!(!ledger.add_pending_mirror(&key, 4));
    assert!(!ledger.has_chunk(&key));
}

#[tokio::test]
async fn concurrent_mirror_updates_do_not_duplicate() {
    let ledger = Arc::new(Ledger::in_memory());
    let record = chunk_record(0, 3);
    let key = record.key;
    ledger.add_chunk(record).await.unwrap();

    let mut tasks = vec![];
    for peer in 0..32u32 {
        let ledger = ledger.clone();
        tasks.push(tokio::spawn(async move {
            ledger.add_mirror(&key, peer % 4).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(ledger.perceived_replication(&key), Some(4));
}

#[tokio::test]
async fn remove_file_chunks_only_touches_that_file() {
    let ledger = Ledger::in_memory();
    ledger.add_chunk(chunk_record(0, 1)).await.unwrap();
    ledger.add_chunk(chunk_record(1, 1)).await.unwrap();
    let other = ChunkRecord::new(ChunkKey::new(file_id(2), 0), 5, 1);
    ledger.add_chunk(other.clone()).await.unwrap();

    let removed = ledger.remove_file_chunks(&file_id(1)).await.unwrap();
    assert_eq!(removed.len(), 2);
    assert_eq!(ledger.stored_chunks(), vec![other]);
}

#[tokio::test]
async fn confirmations_count_distinct_peers() {
    let ledger = Ledger::in_memory();
    ledger.add_file(file_record(4, 2)).await.unwrap();
    let key = ChunkKey::new(file_id(4), 1);

    ledger.add_confirmation(&key, 2).await.unwrap();
    ledger.add_confirmation(&key, 2).await.unwrap();
    ledger.add_confirmation(&key, 3).await.unwrap();
    assert_eq!(ledger.confirmations(&key), 2);

    ledger.remove_confirmation(&key, 3).await.unwrap();
    assert_eq!(ledger.confirmations(&key), 1);

    let out_of_range = ChunkKey::new(file_id(4), 9);
    assert!(!ledger.add_confirmation(&out_of_range, 2).await.unwrap());
}

#[tokio::test]
async fn files_are_found_by_path() {
    let ledger = Ledger::in_memory();
    let record = file_record(5, 1);
    ledger.add_file(record.clone()).await.unwrap();

    assert_eq!(ledger.file_by_path(&record.path), Some(record.clone()));
    assert!(ledger.is_own_file(&record.file_id));

    ledger.remove_file(&record.file_id).await.unwrap();
    assert!(ledger.file_by_path(&record.path).is_none());
}

#[tokio::test]
async fn tombstones_are_handed_out_once_per_peer() {
    let ledger = Ledger::in_memory();
    ledger
        .add_tombstone(file_id(6), BTreeSet::from([2, 3]))
        .await
        .unwrap();

    assert_eq!(ledger.take_tombstones_for(2).await.unwrap(), vec![file_id(6)]);
    assert!(ledger.take_tombstones_for(2).await.unwrap().is_empty());
    assert_eq!(ledger.take_tombstones_for(3).await.unwrap(), vec![file_id(6)]);
    assert!(ledger.tombstones().is_empty());
}

#[tokio::test]
async fn restore_buffer_ignores_duplicates_and_completes_in_order() {
    let ledger = Ledger::in_memory();
    let id = file_id(8);
    ledger.begin_restore(id, 3).unwrap();

    assert!(matches!(
        ledger.begin_restore(id, 3),
        Err(Error::RestoreInProgress(_))
    ));

    assert_eq!(
        ledger.add_restored_chunk(&ChunkKey::new(id, 2), vec![]),
        Some(true)
    );
    assert_eq!(
        ledger.add_restored_chunk(&ChunkKey::new(id, 0), b"ab".to_vec()),
        Some(true)
    );
    assert_eq!(
        ledger.add_restored_chunk(&ChunkKey::new(id, 0), b"zz".to_vec()),
        Some(false)
    );
    assert_eq!(
        ledger.add_restored_chunk(&ChunkKey::new(id, 7), b"zz".to_vec()),
        Some(false)
    );
    assert_eq!(ledger.missing_chunks(&id), vec![1]);
    assert_eq!(
        ledger.restore_status(&id),
        RestoreStatus::Restoring {
            received: 2,
            expected: 3
        }
    );

    ledger.add_restored_chunk(&ChunkKey::new(id, 1), b"cd".to_vec());
    assert_eq!(ledger.finish_restore(&id), Some(b"abcd".to_vec()));
    assert_eq!(ledger.restore_status(&id), RestoreStatus::Idle);
}

#[tokio::test]
async fn chunk_for_idle_file_is_discarded() {
    let ledger = Ledger::in_memory();
    let key = ChunkKey::new(file_id(8), 0);
    assert_eq!(ledger.add_restored_chunk(&key, vec![1]), None);
}

#[tokio::test]
async fn incomplete_restore_yields_nothing() {
    let ledger = Ledger::in_memory();
    let id = file_id(8);
    ledger.begin_restore(id, 2).unwrap();
    ledger.add_restored_chunk(&ChunkKey::new(id, 0), vec![1]);

    assert_eq!(ledger.finish_restore(&id), None);
    assert_eq!(ledger.restore_status(&id), RestoreStatus::Idle);
}

#[tokio::test]
async fn ledger_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger");
    let record = chunk_record(3, 2);
    let key = record.key;

    {
        let ledger = Ledger::open(&path).await.unwrap();
        ledger.add_file(file_record(4, 1)).await.unwrap();
        ledger.add_chunk(record).await.unwrap();
        ledger.add_mirror(&key, 5).await.unwrap();
        ledger
            .add_tombstone(file_id(6), BTreeSet::from([5]))
            .await
            .unwrap();
    }

    let ledger = Ledger::open(&path).await.unwrap();
    assert!(ledger.is_own_file(&file_id(4)));
    assert_eq!(ledger.perceived_replication(&key), Some(1));
    assert_eq!(ledger.tombstones().len(), 1);
}

#[tokio::test]
async fn concurrent_saves_all_reach_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger");
    let record = chunk_record(0, 9);
    let key = record.key;

    {
        let ledger = Arc::new(Ledger::open(&path).await.unwrap());
        ledger.add_chunk(record).await.unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for peer in 2..50 {
            let ledger = ledger.clone();
            tasks.spawn(async move { ledger.add_mirror(&key, peer).await.unwrap() });
        }
        while let Some(added) = tasks.join_next().await {
            assert!(added.unwrap());
        }
    }

    let ledger = Ledger::open(&path).await.unwrap();
    assert_eq!(ledger.perceived_replication(&key), Some(48));
}

#[tokio::test]
async fn deleted_files_are_remembered_for_grace_period() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger");
    let grace = Duration::from_secs(60);

    {
        let ledger = Ledger::open(&path).await.unwrap();
        ledger.mark_deleted(file_id(3), grace).await.unwrap();
        assert!(ledger.is_deleted(&file_id(3), grace));
        assert!(!ledger.is_deleted(&file_id(4), grace));
    }

    let ledger = Ledger::open(&path).await.unwrap();
    assert!(ledger.is_deleted(&file_id(3), grace));
    assert!(!ledger.is_deleted(&file_id(3), Duration::ZERO));

    ledger.mark_deleted(file_id(5), Duration::ZERO).await.unwrap();
    assert!(!ledger.is_deleted(&file_id(3), grace));
}

#[tokio::test]
async fn tombstones_can_be_withdrawn() {
    let ledger = Ledger::in_memory();
    ledger
        .add_tombstone(file_id(6), BTreeSet::from([2]))
        .await
        .unwrap();
    assert!(ledger.is_tombstoned(&file_id(6)));

    ledger
        .add_tombstone(file_id(6), BTreeSet::from([4]))
        .await
        .unwrap();
    assert_eq!(ledger.tombstones()[0].holders, BTreeSet::from([2, 4]));

    assert!(ledger.remove_tombstone(&file_id(6)).await.unwrap());
    assert!(!ledger.remove_tombstone(&file_id(6)).await.unwrap());
    assert!(!ledger.is_tombstoned(&file_id(6)));
}

#[tokio::test]
async fn replication_degree_of_file_can_change() {
    let ledger = Ledger::in_memory();
    let record = file_record(7, 2);
    ledger.add_file(record.clone()).await.unwrap();

    assert!(!ledger.set_replication_degree(&record.file_id, 2).await.unwrap());
    assert!(ledger.set_replication_degree(&record.file_id, 4).await.unwrap());
    assert_eq!(ledger.file(&record.file_id).unwrap().replication_degree, 4);
    assert!(!ledger.set_replication_degree(&file_id(9), 4).await.unwrap());
}

#[test]
fn replies_are_only_noted_while_watched() {
    let ledger = Ledger::in_memory();
    let key = ChunkKey::new(file_id(1), 0);

    ledger.note_reply(&key);
    ledger.watch_reply(key);
    assert!(!ledger.finish_watch(&key));

    ledger.watch_reply(key);
    ledger.note_reply(&key);
    assert!(ledger.finish_watch(&key));
    assert!(!ledger.finish_watch(&key));
}
