//! Session-side persistence: versioning, retry and compaction on top of an
//! [`UpdateLog`].

use log::{debug, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use super::journal::{JournalRecord, RecordKind};
use super::{StoreError, UpdateLog};

/// Updates recovered from storage, ready to be applied to a fresh document.
#[derive(Debug, Default)]
pub struct Restored {
    /// Snapshot first, then deltas in version order.
    pub updates: Vec<Vec<u8>>,
    /// Records dropped because they failed verification.
    pub skipped: usize,
}

/// Writes one room's deltas to an [`UpdateLog`].
///
/// Records that fail to store stay pending and are retried ahead of the
/// next write, so nothing is dropped while the session lives.
pub struct Persister {
    log: Arc<dyn UpdateLog>,
    room: Uuid,
    next_version: u64,
    pending: Vec<(u64, Vec<u8>)>,
    since_compaction: usize,
    compaction_threshold: usize,
}

impl Persister {
    /// Load the room's log and return the persister positioned after it.
    pub fn open(
        log: Arc<dyn UpdateLog>,
        room: Uuid,
        compaction_threshold: usize,
    ) -> Result<(Self, Restored), StoreError> {
        let stored = log.load(room)?;
        let mut restored = Restored::default();
        let mut last_version: Option<u64> = None;

        if let Some(bytes) = stored.snapshot {
            match Self::read_record(&bytes, room, RecordKind::Snapshot) {
                Ok(record) => {
                    last_version = Some(record.version);
                    restored.updates.push(record.update()?);
                }
                Err(e) => {
                    warn!("skipping snapshot for room {}: {}", room, e);
                    restored.skipped += 1;
                }
            }
        }

        let delta_count = stored.deltas.len();
        for (version, bytes) in stored.deltas {
            last_version = Some(last_version.map_or(version, |v| v.max(version)));
            match Self::read_record(&bytes, room, RecordKind::Delta)
                .and_then(|record| record.update())
            {
                Ok(update) => restored.updates.push(update),
                Err(e) => {
                    warn!("skipping record {} for room {}: {}", version, room, e);
                    restored.skipped += 1;
                }
            }
        }

        if !restored.updates.is_empty() {
            info!(
                "restored {} updates for room {} ({} skipped)",
                restored.updates.len(),
                room,
                restored.skipped
            );
        }

        let persister = Self {
            log,
            room,
            next_version: last_version.map_or(0, |v| v + 1),
            pending: Vec::new(),
            since_compaction: delta_count,
            compaction_threshold: compaction_threshold.max(1),
        };
        Ok((persister, restored))
    }

    fn read_record(bytes: &[u8], room: Uuid, kind: RecordKind) -> Result<JournalRecord, StoreError> {
        let record = JournalRecord::decode(bytes)?;
        if record.room != room || record.kind != kind {
            return Err(StoreError::Deserialization(format!(
                "unexpected {:?} record for room {}",
                record.kind, record.room
            )));
        }
        Ok(record)
    }

    /// Queue `update` and try to store everything pending.
    pub fn record(&mut self, update: &[u8]) -> Result<(), StoreError> {
        let record = JournalRecord::delta(self.room, self.next_version, update);
        self.pending.push((self.next_version, record.encode()?));
        self.next_version += 1;
        self.flush()
    }

    /// Store pending records. On failure they stay queued.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.log.append(self.room, &self.pending)?;
        debug!("persisted {} records for room {}", self.pending.len(), self.room);
        self.since_compaction += self.pending.len();
        self.pending.clear();
        Ok(())
    }

    /// Store what is pending and make the log durable.
    pub fn close(&mut self) -> Result<(), StoreError> {
        self.flush()?;
        self.log.sync()
    }

    pub fn needs_compaction(&self) -> bool {
        self.pending.is_empty() && self.since_compaction >= self.compaction_threshold
    }

    /// Replace the stored deltas with `full_state`.
    pub fn compact(&mut self, full_state: &[u8]) -> Result<(), StoreError> {
        self.flush()?;
        let Some(through) = self.next_version.checked_sub(1) else {
            return Ok(());
        };
        let snapshot = JournalRecord::snapshot(self.room, through, full_state).encode()?;
        self.log.compact(self.room, &snapshot, through)?;
        info!(
            "compacted {} deltas for room {} into a {} byte snapshot",
            self.since_compaction,
            self.room,
            snapshot.len()
        );
        self.since_compaction = 0;
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn room(&self) -> Uuid {
        self.room
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLog;

    fn open(log: &Arc<MemoryLog>, room: Uuid, threshold: usize) -> (Persister, Restored) {
        Persister::open(log.clone(), room, threshold).unwrap()
    }

    #[test]
    fn test_restore_in_order() {
        let log = Arc::new(MemoryLog::new());
        let room = Uuid::new_v4();
        {
            let (mut p, restored) = open(&log, room, 100);
            assert!(restored.updates.is_empty());
            p.record(b"a").unwrap();
            p.record(b"b").unwrap();
        }
        let (mut p, restored) = open(&log, room, 100);
        assert_eq!(restored.updates, vec![b"a".to_vec(), b"b".to_vec()]);

        // Versions continue after the restored ones.
        p.record(b"c").unwrap();
        let (_, restored) = open(&log, room, 100);
        assert_eq!(restored.updates.len(), 3);
        assert_eq!(restored.updates[2], b"c");
    }

    #[test]
    fn test_failure_keeps_pending_and_retries() {
        let log = Arc::new(MemoryLog::new());
        let room = Uuid::new_v4();
        let (mut p, _) = open(&log, room, 100);

        log.set_failing(true);
        assert!(p.record(b"first").is_err());
        assert_eq!(p.pending(), 1);

        log.set_failing(false);
        p.record(b"second").unwrap();
        assert_eq!(p.pending(), 0);

        let (_, restored) = open(&log, room, 100);
        assert_eq!(
            restored.updates,
            vec![b"first".to_vec(), b"second".to_vec()]
        );
    }

    #[test]
    fn test_close_flushes_pending() {
        let log = Arc::new(MemoryLog::new());
        let room = Uuid::new_v4();
        let (mut p, _) = open(&log, room, 100);

        log.set_failing(true);
        assert!(p.record(b"late").is_err());
        assert!(p.close().is_err());
        assert_eq!(p.pending(), 1);

        log.set_failing(false);
        p.close().unwrap();
        assert_eq!(p.pending(), 0);
        assert_eq!(log.delta_count(room), 1);
    }

    #[test]
    fn test_corrupted_record_skipped() {
        let log = Arc::new(MemoryLog::new());
        let room = Uuid::new_v4();
        let (mut p, _) = open(&log, room, 100);
        for update in [b"one", b"two", b"tri"] {
            p.record(update).unwrap();
        }
        assert!(log.corrupt(room, 1));

        let (_, restored) = open(&log, room, 100);
        assert_eq!(restored.skipped, 1);
        assert_eq!(restored.updates, vec![b"one".to_vec(), b"tri".to_vec()]);
    }

    #[test]
    fn test_compaction_threshold() {
        let log = Arc::new(MemoryLog::new());
        let room = Uuid::new_v4();
        let (mut p, _) = open(&log, room, 3);

        p.record(b"1").unwrap();
        p.record(b"2").unwrap();
        assert!(!p.needs_compaction());
        p.record(b"3").unwrap();
        assert!(p.needs_compaction());

        p.compact(b"state-after-3").unwrap();
        assert!(!p.needs_compaction());
        assert_eq!(log.delta_count(room), 0);
        assert!(log.has_snapshot(room));

        p.record(b"4").unwrap();
        let (_, restored) = open(&log, room, 3);
        assert_eq!(
            restored.updates,
            vec![b"state-after-3".to_vec(), b"4".to_vec()]
        );
    }

    #[test]
    fn test_foreign_room_record_rejected() {
        let log = Arc::new(MemoryLog::new());
        let room = Uuid::new_v4();
        let other = JournalRecord::delta(Uuid::new_v4(), 0, b"x").encode().unwrap();
        log.append(room, &[(0, other)]).unwrap();

        let (_, restored) = open(&log, room, 10);
        assert!(restored.updates.is_empty());
        assert_eq!(restored.skipped, 1);
    }
}
