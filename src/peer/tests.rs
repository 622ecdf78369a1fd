use std::{collections::BTreeSet, path::PathBuf, time::Duration};

use tempfile::TempDir;
use tokio::{fs, time::sleep};

use crate::{
    config::PeerConfig,
    error::Error,
    message::{ChunkKey, Message, BASE_VERSION, ENHANCED_VERSION},
    transport::memory::MemoryGroup,
};

use super::{Peer, PeerId};

struct Cluster {
    dir: TempDir,
    group: MemoryGroup,
    peers: Vec<Peer>,
}

impl Cluster {
    async fn start(count: PeerId, offline: &[PeerId], configure: impl Fn(&mut PeerConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let group = MemoryGroup::new();

        let mut peers = vec![];
        for id in 1..=count {
            let mut config = PeerConfig::new(id, &dir.path().join("peers"));
            config.chunk_size = 100;
            config.workers = 4;
            config.retry_interval = Duration::from_millis(30);
            config.repair_delay = Duration::from_millis(20);
            config.reply_delay = Duration::from_millis(20);
            config.delete_rounds = 2;
            config.alive_interval = None;
            configure(&mut config);

            let peer = Peer::open(config, group.transport(id)).await.unwrap();
            if !offline.contains(&id) {
                group.join(id, peer.intake());
            }
            peers.push(peer);
        }

        Cluster { dir, group, peers }
    }

    fn peer(&self, id: PeerId) -> &Peer {
        &self.peers[id as usize - 1]
    }

    fn join(&self, id: PeerId) {
        self.group.join(id, self.peer(id).intake());
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> PathBuf {
        let files = self.dir.path().join("files");
        fs::create_dir_all(&files).await.unwrap();
        let path = files.join(name);
        fs::write(&path, data).await.unwrap();
        path
    }
}

fn contents(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn backup_reaches_replication_degree() {
    let cluster = Cluster::start(4, &[], |_| {}).await;
    let path = cluster.write_file("report.txt", &contents(250)).await;

    let report = cluster.peer(1).backup(&path, 2).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.size, 250);
    assert_eq!(report.chunks.len(), 3);

    let file_id = report.file_id;
    let record = cluster.peer(1).ledger().file(&file_id).unwrap();
    assert_eq!(record.chunk_count(), 3);
    assert_eq!(record.size(), 250);
    assert!(cluster.peer(1).ledger().stored_chunks().is_empty());

    for chunk_no in 0..3 {
        let key = ChunkKey::new(file_id, chunk_no);
        assert!(cluster.peer(1).ledger().confirmations(&key) >= 2);
        for id in 2..=4 {
            let ledger = cluster.peer(id).ledger();
            eventually(|| ledger.perceived_replication(&key) == Some(2)).await;
        }
    }
}

#[tokio::test]
async fn backup_rejects_bad_requests() {
    let cluster = Cluster::start(2, &[], |_| {}).await;
    let path = cluster.write_file("notes.txt", b"hello").await;

    for degree in [0, 10] {
        let result = cluster.peer(1).backup(&path, degree).await;
        assert!(matches!(result, Err(Error::InvalidReplicationDegree(d)) if d == degree));
    }

    let missing = cluster.dir.path().join("missing.txt");
    let result = cluster.peer(1).backup(&missing, 1).await;
    assert!(matches!(result, Err(Error::FileDoesNotExist(_))));

    let result = cluster.peer(1).backup(cluster.dir.path(), 1).await;
    assert!(matches!(result, Err(Error::FileDoesNotExist(_))));

    let result = cluster.peer(1).restore(&path).await;
    assert!(matches!(result, Err(Error::FileNotBackedUp(_))));
}

#[tokio::test]
async fn backup_reports_under_replicated_chunks() {
    let cluster = Cluster::start(2, &[], |config| config.backup_attempts = 2).await;
    let path = cluster.write_file("lonely.txt", &contents(120)).await;

    let report = cluster.peer(1).backup(&path, 3).await.unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.under_replicated().count(), 2);
    for chunk in &report.chunks {
        assert_eq!(chunk.confirmed, 1);
        assert_eq!(chunk.attempts, 2);
    }
}

#[tokio::test]
async fn restore_reassembles_file() {
    let cluster = Cluster::start(3, &[], |_| {}).await;
    let data = contents(200);
    let path = cluster.write_file("exact.bin", &data).await;

    let report = cluster.peer(1).backup(&path, 2).await.unwrap();
    assert_eq!(report.chunks.len(), 3);

    let restored = cluster.peer(1).restore(&path).await.unwrap();
    assert_eq!(restored.data, data);
    assert_eq!(restored.file_id, report.file_id);
    assert_eq!(fs::read(&restored.output).await.unwrap(), data);
}

#[tokio::test]
async fn enhanced_restore_uses_direct_replies() {
    let cluster = Cluster::start(3, &[], |config| {
        config.version = ENHANCED_VERSION.to_owned();
    })
    .await;
    let data = contents(330);
    let path = cluster.write_file("direct.bin", &data).await;

    cluster.peer(1).backup(&path, 2).await.unwrap();
    let restored = cluster.peer(1).restore(&path).await.unwrap();
    assert_eq!(restored.data, data);
}

#[tokio::test]
async fn restore_fails_without_holders() {
    let cluster = Cluster::start(3, &[], |config| config.restore_attempts = 2).await;
    let path = cluster.write_file("gone.bin", &contents(150)).await;
    let report = cluster.peer(1).backup(&path, 1).await.unwrap();

    cluster.group.leave(2);
    cluster.group.leave(3);

    let result = cluster.peer(1).restore(&path).await;
    match result {
        Err(Error::RestoreIncomplete {
            file_id,
            received,
            expected,
        }) => {
            assert_eq!(file_id, report.file_id);
            assert_eq!(received, 0);
            assert_eq!(expected, 2);
        }
        other => panic!("unexpected restore result: {other:?}"),
    }
}

#[tokio::test]
async fn delete_purges_every_holder() {
    let cluster = Cluster::start(3, &[], |_| {}).await;
    let path = cluster.write_file("secret.txt", &contents(180)).await;
    let report = cluster.peer(1).backup(&path, 2).await.unwrap();

    cluster.peer(1).delete(&path).await.unwrap();
    assert!(cluster.peer(1).ledger().file(&report.file_id).is_none());
    assert!(path.exists());

    for id in 2..=3 {
        let ledger = cluster.peer(id).ledger();
        eventually(|| ledger.stored_chunks().is_empty()).await;
    }

    let result = cluster.peer(1).delete(&path).await;
    assert!(matches!(result, Err(Error::FileNotBackedUp(_))));
}

#[tokio::test]
async fn returning_peer_learns_of_missed_delete() {
    let cluster = Cluster::start(3, &[], |config| {
        config.alive_interval = Some(Duration::from_millis(50));
    })
    .await;
    let path = cluster.write_file("missed.txt", &contents(90)).await;
    let report = cluster.peer(1).backup(&path, 2).await.unwrap();
    let key = ChunkKey::new(report.file_id, 0);
    eventually(|| cluster.peer(3).ledger().has_chunk(&key)).await;

    cluster.group.leave(3);
    cluster.peer(1).delete(&path).await.unwrap();
    let ledger = cluster.peer(2).ledger();
    eventually(|| ledger.stored_chunks().is_empty()).await;
    assert!(cluster.peer(3).ledger().has_chunk(&key));

    cluster.join(3);
    let ledger = cluster.peer(3).ledger();
    eventually(|| ledger.stored_chunks().is_empty()).await;
    let ledger = cluster.peer(1).ledger();
    eventually(|| ledger.tombstones().is_empty()).await;
}

#[tokio::test]
async fn late_putchunk_after_delete_is_not_stored() {
    let cluster = Cluster::start(3, &[], |_| {}).await;
    let data = contents(80);
    let path = cluster.write_file("late.txt", &data).await;
    let report = cluster.peer(1).backup(&path, 2).await.unwrap();
    let key = ChunkKey::new(report.file_id, 0);

    cluster.peer(1).delete(&path).await.unwrap();
    for id in 2..=3 {
        let ledger = cluster.peer(id).ledger();
        eventually(|| ledger.stored_chunks().is_empty()).await;
    }

    // a retransmission of the old backup still in flight
    let late = Message::put_chunk(BASE_VERSION, 1, key, 2, data).encode();
    for id in 2..=3 {
        cluster.peer(id).intake().send(late.clone()).await.unwrap();
    }

    let other = cluster.write_file("after.txt", &contents(30)).await;
    let other = cluster.peer(1).backup(&other, 2).await.unwrap();
    assert!(other.is_complete());
    let other_key = ChunkKey::new(other.file_id, 0);
    for id in 2..=3 {
        let ledger = cluster.peer(id).ledger();
        eventually(|| ledger.has_chunk(&other_key)).await;
        assert!(!ledger.has_chunk(&key));
        let budget = cluster.peer(id).chunks().accountant().budget().await;
        assert_eq!(budget.used, 30);
    }
}

#[tokio::test]
async fn holder_storing_after_delete_is_told_again() {
    let cluster = Cluster::start(3, &[3], |_| {}).await;
    let data = contents(60);
    let path = cluster.write_file("orphan.txt", &data).await;
    let report = cluster.peer(1).backup(&path, 1).await.unwrap();
    let key = ChunkKey::new(report.file_id, 0);

    cluster.peer(1).delete(&path).await.unwrap();
    let originator = cluster.peer(1).ledger();
    assert!(!originator.tombstones()[0].holders.contains(&3));

    // peer 3 never saw the backup nor the delete
    cluster.join(3);
    let late = Message::put_chunk(BASE_VERSION, 1, key, 1, data).encode();
    cluster.peer(3).intake().send(late).await.unwrap();

    eventually(|| {
        originator
            .tombstones()
            .iter()
            .any(|tombstone| tombstone.holders.contains(&3))
    })
    .await;
    let ledger = cluster.peer(3).ledger();
    eventually(|| !ledger.has_chunk(&key)).await;
    let budget = cluster.peer(3).chunks().accountant().budget().await;
    assert_eq!(budget.used, 0);
}

#[tokio::test]
async fn backup_again_with_new_degree_updates_record() {
    let cluster = Cluster::start(4, &[], |_| {}).await;
    let path = cluster.write_file("steady.txt", &contents(70)).await;
    let first = cluster.peer(1).backup(&path, 1).await.unwrap();

    let second = cluster.peer(1).backup(&path, 3).await.unwrap();
    assert_eq!(first.file_id, second.file_id);
    assert!(second.is_complete());

    let record = cluster.peer(1).ledger().file(&first.file_id).unwrap();
    assert_eq!(record.replication_degree, 3);
    let owner = cluster.peer(1).state().await;
    assert_eq!(owner.files[0].replication_degree, 3);
}

#[tokio::test]
async fn changed_file_replaces_previous_backup() {
    let cluster = Cluster::start(3, &[], |_| {}).await;
    let path = cluster.write_file("draft.txt", &contents(100)).await;
    let first = cluster.peer(1).backup(&path, 1).await.unwrap();

    fs::write(&path, contents(40)).await.unwrap();
    let second = cluster.peer(1).backup(&path, 1).await.unwrap();
    assert_ne!(first.file_id, second.file_id);

    let ledger = cluster.peer(1).ledger();
    assert!(ledger.file(&first.file_id).is_none());
    assert_eq!(ledger.files().len(), 1);

    for id in 2..=3 {
        let ledger = cluster.peer(id).ledger();
        eventually(|| {
            ledger
                .stored_chunks()
                .iter()
                .all(|record| record.key.file_id == second.file_id)
        })
        .await;
    }
}

#[tokio::test]
async fn eviction_is_repaired_by_remaining_holder() {
    let cluster = Cluster::start(4, &[4], |_| {}).await;
    let path = cluster.write_file("precious.bin", &contents(150)).await;
    let report = cluster.peer(1).backup(&path, 2).await.unwrap();
    assert!(report.is_complete());

    let keys: Vec<ChunkKey> = report.chunks.iter().map(|chunk| chunk.key).collect();
    for key in &keys {
        let ledger = cluster.peer(3).ledger();
        eventually(|| ledger.perceived_replication(key) == Some(1)).await;
    }

    cluster.join(4);
    let reclaimed = cluster.peer(2).reclaim(0).await.unwrap();
    assert_eq!(reclaimed.evicted.len(), 2);
    assert_eq!(reclaimed.freed, 150);

    for key in &keys {
        let holder = cluster.peer(3).ledger();
        eventually(|| {
            holder
                .chunk(key)
                .is_some_and(|record| record.mirrors == BTreeSet::from([4]))
        })
        .await;
        assert!(cluster.peer(4).ledger().has_chunk(key));
        assert!(!cluster.peer(2).ledger().has_chunk(key));

        let originator = cluster.peer(1).ledger();
        eventually(|| originator.confirmations(key) == 2).await;
    }
}

#[tokio::test]
async fn reclaim_evicts_surplus_copies_first() {
    let cluster = Cluster::start(3, &[], |config| config.backup_attempts = 2).await;
    let spare = cluster.write_file("spare.txt", &contents(50)).await;
    let needed = cluster.write_file("needed.txt", &contents(60)).await;

    let spare = cluster.peer(1).backup(&spare, 1).await.unwrap();
    let needed = cluster.peer(1).backup(&needed, 3).await.unwrap();
    let spare_key = ChunkKey::new(spare.file_id, 0);
    let needed_key = ChunkKey::new(needed.file_id, 0);

    let ledger = cluster.peer(2).ledger();
    eventually(|| ledger.perceived_replication(&spare_key) == Some(1)).await;
    eventually(|| ledger.perceived_replication(&needed_key) == Some(1)).await;

    let reclaimed = cluster.peer(2).reclaim(100).await.unwrap();
    assert_eq!(reclaimed.evicted, vec![spare_key]);
    assert_eq!(reclaimed.freed, 50);
    assert!(ledger.has_chunk(&needed_key));

    let budget = cluster.peer(2).chunks().accountant().budget().await;
    assert_eq!(budget.capacity, 100);
    assert_eq!(budget.used, 60);

    let result = cluster.peer(2).reclaim(0).await;
    assert!(result.is_ok());
    assert!(ledger.stored_chunks().is_empty());
}

#[tokio::test]
async fn state_lists_owned_and_stored_chunks() {
    let cluster = Cluster::start(3, &[], |_| {}).await;
    let path = cluster.write_file("listed.txt", &contents(120)).await;
    let report = cluster.peer(1).backup(&path, 2).await.unwrap();

    let owner = cluster.peer(1).state().await;
    assert_eq!(owner.id, 1);
    assert_eq!(owner.files.len(), 1);
    assert_eq!(owner.files[0].name, "listed.txt");
    assert_eq!(owner.files[0].file_id, report.file_id.to_string());
    assert_eq!(owner.files[0].chunks, vec![2, 2]);
    assert!(owner.chunks.is_empty());

    let ledger = cluster.peer(2).ledger();
    let key = ChunkKey::new(report.file_id, 1);
    eventually(|| ledger.perceived_replication(&key) == Some(1)).await;

    let holder = cluster.peer(2).state().await;
    assert!(holder.files.is_empty());
    assert_eq!(holder.chunks.len(), 2);
    assert_eq!(holder.chunks[1].size, 20);
    assert_eq!(holder.chunks[1].desired, 2);
    assert_eq!(holder.chunks[1].perceived, 2);
    assert_eq!(holder.storage.used, 120);
}
