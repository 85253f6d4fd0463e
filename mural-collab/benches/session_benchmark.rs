use criterion::{criterion_group, criterion_main, Criterion};
use mural_collab::presence::{PresenceMessage, PresenceRecord, PresenceRoom, PresenceTiming};
use mural_collab::protocol::SyncMessage;
use mural_collab::storage::{DocumentStore, JournalRecord, MemoryLog, Persister, StoreConfig};
use mural_collab::{MemoryHub, RoomId, RoomTransport};
use mural_core::{Board, CardDraft, Point, ReplicatedStore};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

fn card_delta() -> Vec<u8> {
    let mut board = Board::new(ReplicatedStore::new());
    board.add_card(CardDraft::default().titled("bench")).unwrap();
    board.take_outbound().remove(0)
}

fn bench_update_encode(c: &mut Criterion) {
    let peer = Uuid::new_v4();
    let room = RoomId::default().storage_key();
    let delta = card_delta();

    c.bench_function("update_frame_encode", |b| {
        b.iter(|| {
            let msg = SyncMessage::update(black_box(peer), room, 1, black_box(delta.clone()));
            black_box(msg.encode().unwrap());
        })
    });
}

fn bench_update_decode(c: &mut Criterion) {
    let msg = SyncMessage::update(Uuid::new_v4(), Uuid::new_v4(), 1, card_delta());
    let encoded = msg.encode().unwrap();

    c.bench_function("update_frame_decode", |b| {
        b.iter(|| black_box(SyncMessage::decode(black_box(&encoded)).unwrap()))
    });
}

fn bench_presence_handle(c: &mut Criterion) {
    let mut room = PresenceRoom::new(Uuid::new_v4(), "me", None, PresenceTiming::default());
    let peers: Vec<Uuid> = (0..100).map(|_| Uuid::new_v4()).collect();
    let mut seq = 0u64;

    c.bench_function("presence_handle_100_peers", |b| {
        b.iter(|| {
            seq += 1;
            let now = Instant::now();
            for (i, peer) in peers.iter().enumerate() {
                let msg = PresenceMessage::Update(PresenceRecord {
                    session_id: *peer,
                    name: "peer".into(),
                    color: "#ff0000".into(),
                    cursor: Some(Point::new(i as f64, seq as f64)),
                    seq,
                });
                black_box(room.handle_message(&msg, now));
            }
        })
    });
}

fn bench_journal_record(c: &mut Criterion) {
    let room = Uuid::new_v4();
    let delta = card_delta();

    c.bench_function("journal_record_encode", |b| {
        b.iter(|| black_box(JournalRecord::delta(room, 1, black_box(&delta)).encode().unwrap()))
    });
}

fn bench_persist_memory(c: &mut Criterion) {
    let log = Arc::new(MemoryLog::new());
    let (mut persister, _) = Persister::open(log, Uuid::new_v4(), usize::MAX).unwrap();
    let delta = card_delta();

    c.bench_function("persist_delta_memory", |b| {
        b.iter(|| persister.record(black_box(&delta)).unwrap())
    });
}

fn bench_persist_rocks(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(StoreConfig::at(dir.path())).unwrap();
    let (mut persister, _) = Persister::open(Arc::new(store), Uuid::new_v4(), usize::MAX).unwrap();
    let delta = card_delta();

    c.bench_function("persist_delta_rocksdb", |b| {
        b.iter(|| persister.record(black_box(&delta)).unwrap())
    });
}

fn bench_hub_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let hub = MemoryHub::default();
    let room = RoomId::new("bench");
    let transports: Vec<_> = (0..10).map(|_| hub.transport()).collect();
    let mut links = rt.block_on(async {
        let mut links = Vec::new();
        for t in &transports {
            links.push(t.connect(&room).await.unwrap());
        }
        links
    });
    let frame = SyncMessage::update(Uuid::new_v4(), room.storage_key(), 1, card_delta())
        .encode()
        .unwrap();

    c.bench_function("hub_fan_out_10_links", |b| {
        b.iter(|| {
            rt.block_on(async {
                links[0].outbound.send(frame.clone()).await.unwrap();
                for link in links.iter_mut().skip(1) {
                    black_box(link.inbound.recv().await.unwrap());
                }
            })
        })
    });
}

criterion_group!(
    benches,
    bench_update_encode,
    bench_update_decode,
    bench_presence_handle,
    bench_journal_record,
    bench_persist_memory,
    bench_persist_rocks,
    bench_hub_fan_out,
);
criterion_main!(benches);
