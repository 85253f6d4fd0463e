//! In-memory [`UpdateLog`] for sessions without a data directory and for
//! tests. Failures can be injected to exercise the retry path.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{StoreError, StoredLog, UpdateLog};

#[derive(Default)]
struct RoomLog {
    snapshot: Option<Vec<u8>>,
    deltas: BTreeMap<u64, Vec<u8>>,
}

#[derive(Default)]
pub struct MemoryLog {
    rooms: Mutex<HashMap<Uuid, RoomLog>>,
    failing: AtomicBool,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write fails with [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn delta_count(&self, room: Uuid) -> usize {
        self.rooms().get(&room).map(|r| r.deltas.len()).unwrap_or(0)
    }

    pub fn has_snapshot(&self, room: Uuid) -> bool {
        self.rooms()
            .get(&room)
            .is_some_and(|r| r.snapshot.is_some())
    }

    /// Flip one byte in the stored record for `version`.
    pub fn corrupt(&self, room: Uuid, version: u64) -> bool {
        let mut rooms = self.rooms();
        match rooms
            .get_mut(&room)
            .and_then(|r| r.deltas.get_mut(&version))
        {
            Some(bytes) if !bytes.is_empty() => {
                let mid = bytes.len() / 2;
                bytes[mid] ^= 0xFF;
                true
            }
            _ => false,
        }
    }

    fn rooms(&self) -> MutexGuard<'_, HashMap<Uuid, RoomLog>> {
        self.rooms.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

impl UpdateLog for MemoryLog {
    fn load(&self, room: Uuid) -> Result<StoredLog, StoreError> {
        let rooms = self.rooms();
        Ok(rooms
            .get(&room)
            .map(|r| StoredLog {
                snapshot: r.snapshot.clone(),
                deltas: r.deltas.iter().map(|(v, b)| (*v, b.clone())).collect(),
            })
            .unwrap_or_default())
    }

    fn append(&self, room: Uuid, records: &[(u64, Vec<u8>)]) -> Result<(), StoreError> {
        self.check()?;
        let mut rooms = self.rooms();
        let log = rooms.entry(room).or_default();
        for (version, bytes) in records {
            log.deltas.insert(*version, bytes.clone());
        }
        Ok(())
    }

    fn compact(
        &self,
        room: Uuid,
        snapshot: &[u8],
        through_version: u64,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut rooms = self.rooms();
        let log = rooms.entry(room).or_default();
        log.snapshot = Some(snapshot.to_vec());
        log.deltas.retain(|version, _| *version > through_version);
        Ok(())
    }

    fn sync(&self) -> Result<(), StoreError> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rooms_isolated() {
        let log = MemoryLog::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        log.append(a, &[(0, vec![1]), (1, vec![2])]).unwrap();

        assert_eq!(log.load(a).unwrap().deltas.len(), 2);
        assert_eq!(log.load(b).unwrap(), StoredLog::default());
    }

    #[test]
    fn test_compact_drops_covered_deltas() {
        let log = MemoryLog::new();
        let room = Uuid::new_v4();
        log.append(room, &[(0, vec![0]), (1, vec![1]), (2, vec![2])])
            .unwrap();
        log.compact(room, b"snap", 1).unwrap();

        let stored = log.load(room).unwrap();
        assert_eq!(stored.snapshot.as_deref(), Some(&b"snap"[..]));
        assert_eq!(stored.deltas, vec![(2, vec![2])]);
    }

    #[test]
    fn test_injected_failure() {
        let log = MemoryLog::new();
        let room = Uuid::new_v4();
        log.set_failing(true);
        assert!(log.append(room, &[(0, vec![0])]).is_err());
        assert_eq!(log.delta_count(room), 0);

        log.set_failing(false);
        log.append(room, &[(0, vec![0])]).unwrap();
        assert_eq!(log.delta_count(room), 1);
    }
}
