//! RocksDB-backed update log.
//!
//! Column families:
//! - `snapshots` — latest compacted snapshot record per room
//! - `deltas`    — delta records keyed by `room:version`
//! - `metadata`  — per-room counters (bincode)

use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    Direction, IteratorMode, Options, SingleThreaded, WriteBatch, WriteOptions,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{StoreError, StoredLog, UpdateLog};

const CF_SNAPSHOTS: &str = "snapshots";
const CF_DELTAS: &str = "deltas";
const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: &[&str] = &[CF_SNAPSHOTS, CF_DELTAS, CF_METADATA];

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database directory path
    pub path: PathBuf,
    /// Block cache size in bytes (default: 32MB)
    pub block_cache_size: usize,
    /// Bloom filter bits per key (default: 10)
    pub bloom_filter_bits: i32,
    /// fsync on every write
    pub sync_writes: bool,
    pub max_open_files: i32,
    /// Write buffer size per column family (default: 16MB)
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mural_data"),
            block_cache_size: 32 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 256,
            write_buffer_size: 16 * 1024 * 1024,
        }
    }
}

impl StoreConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Small caches for tests.
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 4 * 1024 * 1024,
            bloom_filter_bits: 10,
            sync_writes: false,
            max_open_files: 64,
            write_buffer_size: 1024 * 1024,
        }
    }
}

/// Per-room bookkeeping stored next to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LogMetadata {
    pub room: Uuid,
    /// Highest delta version ever appended
    pub last_version: Option<u64>,
    /// Deltas currently stored (not yet folded into the snapshot)
    pub delta_count: u64,
    /// Version covered by the current snapshot
    pub snapshot_version: Option<u64>,
    pub snapshot_size: u64,
    /// Seconds since epoch
    pub updated_at: u64,
}

impl LogMetadata {
    fn new(room: Uuid) -> Self {
        Self {
            room,
            last_version: None,
            delta_count: 0,
            snapshot_version: None,
            snapshot_size: 0,
            updated_at: now_secs(),
        }
    }

    fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (meta, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(meta)
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// RocksDB-backed update log shared by every room in one data directory.
pub struct DocumentStore {
    db: DBWithThreadMode<SingleThreaded>,
    config: StoreConfig,
}

impl DocumentStore {
    /// Open the store, creating the database and column families if needed.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_open_files(config.max_open_files);
        db_opts.set_keep_log_file_num(5);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Self::cf_options(name, &config)))
            .collect();

        let db = DBWithThreadMode::<SingleThreaded>::open_cf_descriptors(
            &db_opts,
            &config.path,
            cf_descriptors,
        )?;

        Ok(Self { db, config })
    }

    fn cf_options(name: &str, config: &StoreConfig) -> Options {
        let mut opts = Options::default();

        let mut block_opts = BlockBasedOptions::default();
        let cache = Cache::new_lru_cache(config.block_cache_size);
        block_opts.set_block_cache(&cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits as f64, false);
        opts.set_block_based_table_factory(&block_opts);
        opts.set_write_buffer_size(config.write_buffer_size);

        match name {
            CF_DELTAS => {
                // Records are already LZ4 compressed
                opts.set_compression_type(DBCompressionType::None);
                opts.set_prefix_extractor(rocksdb::SliceTransform::create_fixed_prefix(16));
            }
            CF_SNAPSHOTS => {
                opts.set_compression_type(DBCompressionType::None);
                opts.optimize_for_point_lookup(config.block_cache_size as u64);
            }
            _ => {
                opts.set_compression_type(DBCompressionType::Lz4);
            }
        }

        opts
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn metadata(&self, room: Uuid) -> Result<Option<LogMetadata>, StoreError> {
        let cf = self.cf(CF_METADATA)?;
        match self.db.get_cf(cf, room.as_bytes())? {
            Some(bytes) => Ok(Some(LogMetadata::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Force memtables to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family '{name}' not found")))
    }

    /// Delta key: room (16 bytes) + version (8 bytes big-endian).
    fn delta_key(room: Uuid, version: u64) -> [u8; 24] {
        let mut key = [0u8; 24];
        key[..16].copy_from_slice(room.as_bytes());
        key[16..].copy_from_slice(&version.to_be_bytes());
        key
    }

    fn version_of(key: &[u8]) -> Option<u64> {
        let bytes: [u8; 8] = key.get(16..24)?.try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    /// Visit `(version, value)` of every delta for `room`, in order.
    fn scan_deltas(
        &self,
        room: Uuid,
        mut visit: impl FnMut(u64, &[u8]) -> bool,
    ) -> Result<(), StoreError> {
        let cf = self.cf(CF_DELTAS)?;
        let start = Self::delta_key(room, 0);
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward))
        {
            let (key, value) = item?;
            if key.len() != 24 || &key[..16] != room.as_bytes() {
                break;
            }
            let Some(version) = Self::version_of(&key) else {
                break;
            };
            if !visit(version, &value) {
                break;
            }
        }
        Ok(())
    }

    fn delete_deltas_through(
        &self,
        batch: &mut WriteBatch,
        room: Uuid,
        through_version: u64,
    ) -> Result<u64, StoreError> {
        let cf = self.cf(CF_DELTAS)?;
        let mut removed = 0;
        self.scan_deltas(room, |version, _| {
            if version > through_version {
                return false;
            }
            batch.delete_cf(cf, Self::delta_key(room, version));
            removed += 1;
            true
        })?;
        Ok(removed)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db.write_opt(batch, &write_opts)?;
        Ok(())
    }
}

impl UpdateLog for DocumentStore {
    fn sync(&self) -> Result<(), StoreError> {
        self.flush()
    }

    fn load(&self, room: Uuid) -> Result<StoredLog, StoreError> {
        let snapshot = self.db.get_cf(self.cf(CF_SNAPSHOTS)?, room.as_bytes())?;
        let mut deltas = Vec::new();
        self.scan_deltas(room, |version, value| {
            deltas.push((version, value.to_vec()));
            true
        })?;
        Ok(StoredLog { snapshot, deltas })
    }

    fn append(&self, room: Uuid, records: &[(u64, Vec<u8>)]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let cf_deltas = self.cf(CF_DELTAS)?;
        let mut meta = self.metadata(room)?.unwrap_or_else(|| LogMetadata::new(room));

        let mut batch = WriteBatch::default();
        for (version, bytes) in records {
            batch.put_cf(cf_deltas, Self::delta_key(room, *version), bytes);
            meta.last_version = Some(meta.last_version.map_or(*version, |v| v.max(*version)));
        }
        meta.delta_count += records.len() as u64;
        meta.updated_at = now_secs();
        batch.put_cf(self.cf(CF_METADATA)?, room.as_bytes(), meta.encode()?);

        self.write(batch)
    }

    fn compact(
        &self,
        room: Uuid,
        snapshot: &[u8],
        through_version: u64,
    ) -> Result<(), StoreError> {
        let mut meta = self.metadata(room)?.unwrap_or_else(|| LogMetadata::new(room));

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_SNAPSHOTS)?, room.as_bytes(), snapshot);
        let removed = self.delete_deltas_through(&mut batch, room, through_version)?;

        meta.delta_count = meta.delta_count.saturating_sub(removed);
        meta.snapshot_version = Some(through_version);
        meta.snapshot_size = snapshot.len() as u64;
        meta.updated_at = now_secs();
        batch.put_cf(self.cf(CF_METADATA)?, room.as_bytes(), meta.encode()?);

        self.write(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(dir: &tempfile::TempDir) -> DocumentStore {
        DocumentStore::open(StoreConfig::for_testing(dir.path())).unwrap()
    }

    #[test]
    fn test_store_open() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        assert!(store.path().exists());
    }

    #[test]
    fn test_append_and_load_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let room = Uuid::new_v4();

        // Out of order within one batch; keys sort them.
        store
            .append(room, &[(2, b"two".to_vec()), (0, b"zero".to_vec())])
            .unwrap();
        store.append(room, &[(1, b"one".to_vec())]).unwrap();

        let stored = store.load(room).unwrap();
        assert_eq!(stored.snapshot, None);
        assert_eq!(
            stored.deltas,
            vec![
                (0, b"zero".to_vec()),
                (1, b"one".to_vec()),
                (2, b"two".to_vec()),
            ]
        );

        let meta = store.metadata(room).unwrap().unwrap();
        assert_eq!(meta.last_version, Some(2));
        assert_eq!(meta.delta_count, 3);
    }

    #[test]
    fn test_rooms_do_not_leak() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append(a, &[(0, vec![1])]).unwrap();
        store.append(b, &[(0, vec![2]), (1, vec![3])]).unwrap();

        assert_eq!(store.load(a).unwrap().deltas, vec![(0, vec![1])]);
        assert_eq!(store.load(b).unwrap().deltas.len(), 2);
    }

    #[test]
    fn test_compact() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir);
        let room = Uuid::new_v4();
        let records: Vec<(u64, Vec<u8>)> = (0..10).map(|v| (v, vec![v as u8; 8])).collect();
        store.append(room, &records).unwrap();

        store.compact(room, b"full state", 6).unwrap();

        let stored = store.load(room).unwrap();
        assert_eq!(stored.snapshot.as_deref(), Some(&b"full state"[..]));
        let versions: Vec<u64> = stored.deltas.iter().map(|(v, _)| *v).collect();
        assert_eq!(versions, vec![7, 8, 9]);

        let meta = store.metadata(room).unwrap().unwrap();
        assert_eq!(meta.snapshot_version, Some(6));
        assert_eq!(meta.delta_count, 3);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let room = Uuid::new_v4();
        {
            let store = open(&dir);
            store.append(room, &[(0, b"persisted".to_vec())]).unwrap();
            store.sync().unwrap();
        }
        let store = open(&dir);
        assert_eq!(
            store.load(room).unwrap().deltas,
            vec![(0, b"persisted".to_vec())]
        );
    }
}
