//! Replicated document store.
//!
//! One yrs document per board. Each [`Collection`] is a pair of replicated
//! maps: live entities (id -> JSON string) and tombstones (id -> true).
//! A concurrent `set` and `delete` of the same id always resolves to
//! "deleted" because snapshots hide every tombstoned id, whatever order
//! the two updates arrive in.

use log::{debug, warn};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Any, Doc, Map, MapRef, Out, ReadTxn, StateVector, Transact, TransactionMut, Update};

use crate::collection::Collection;
use crate::error::CoreError;
use crate::model::Entity;

/// Full contents of one collection, keyed by entity id.
pub type MapSnapshot = BTreeMap<String, Value>;

/// Opaque binary update exchanged between replicas.
pub type Delta = Vec<u8>;

type ObserverFn = Box<dyn Fn(&MapSnapshot) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// A single write against the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Set {
        collection: Collection,
        id: String,
        value: Value,
    },
    Delete {
        collection: Collection,
        id: String,
    },
}

impl Mutation {
    pub fn set(collection: Collection, id: impl Into<String>, value: Value) -> Self {
        Mutation::Set {
            collection,
            id: id.into(),
            value,
        }
    }

    pub fn delete(collection: Collection, id: impl Into<String>) -> Self {
        Mutation::Delete {
            collection,
            id: id.into(),
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            Mutation::Set { collection, .. } | Mutation::Delete { collection, .. } => *collection,
        }
    }
}

struct Slot {
    live: MapRef,
    deleted: MapRef,
}

struct Observer {
    id: ObserverId,
    collection: Collection,
    callback: ObserverFn,
}

/// Raw view of one collection used to detect remote changes.
#[derive(PartialEq)]
struct RawCollection {
    live: Vec<(String, String)>,
    deleted: Vec<String>,
}

pub struct ReplicatedStore {
    doc: Doc,
    slots: Vec<Slot>,
    observers: Vec<Observer>,
    next_observer: u64,
}

impl Default for ReplicatedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicatedStore {
    pub fn new() -> Self {
        Self::from_doc(Doc::new())
    }

    /// Create a store whose writes are tagged with a fixed replica id.
    ///
    /// Concurrent writes to the same entity are ordered by replica id, so a
    /// fixed id makes the winner reproducible.
    pub fn with_replica_id(replica_id: u64) -> Self {
        Self::from_doc(Doc::with_client_id(replica_id))
    }

    fn from_doc(doc: Doc) -> Self {
        let slots = Collection::ALL
            .iter()
            .map(|c| Slot {
                live: doc.get_or_insert_map(c.map_name()),
                deleted: doc.get_or_insert_map(c.tombstone_map_name()),
            })
            .collect();

        Self {
            doc,
            slots,
            observers: Vec::new(),
            next_observer: 0,
        }
    }

    pub fn replica_id(&self) -> u64 {
        self.doc.client_id()
    }

    fn slot(&self, collection: Collection) -> &Slot {
        &self.slots[collection.index()]
    }

    // ─── Local writes ───────────────────────────────────────────

    /// Replace the whole value stored under `id`.
    pub fn set(
        &mut self,
        collection: Collection,
        id: &str,
        value: &Value,
    ) -> Result<Delta, CoreError> {
        if self.is_tombstoned(collection, id) {
            return Err(CoreError::Deleted {
                collection,
                id: id.to_string(),
            });
        }
        let batch = [Mutation::set(collection, id, value.clone())];
        Ok(self.apply_batch(&batch)?.unwrap_or_default())
    }

    /// Serialize and store a typed entity.
    pub fn put<E: Entity>(&mut self, entity: &E) -> Result<Delta, CoreError> {
        let value = serde_json::to_value(entity)?;
        self.set(E::COLLECTION, entity.id(), &value)
    }

    /// Remove `id` and tombstone it. Returns `None` if it was already deleted.
    pub fn delete(&mut self, collection: Collection, id: &str) -> Result<Option<Delta>, CoreError> {
        self.apply_batch(&[Mutation::delete(collection, id)])
    }

    /// Apply several writes in one transaction, producing one delta.
    ///
    /// Sets aimed at deleted ids are skipped. Returns `None` when nothing
    /// was written.
    pub fn apply_batch(&mut self, mutations: &[Mutation]) -> Result<Option<Delta>, CoreError> {
        // Encode everything first so a bad value cannot leave a half-written batch.
        let mut encoded = Vec::with_capacity(mutations.len());
        for m in mutations {
            match m {
                Mutation::Set { id, value, .. } => {
                    if !value.is_object() {
                        return Err(CoreError::InvalidEntity(format!(
                            "{id}: expected a JSON object"
                        )));
                    }
                    encoded.push(Some(serde_json::to_string(value)?));
                }
                Mutation::Delete { .. } => encoded.push(None),
            }
        }

        let mut touched = BTreeSet::new();
        let delta = {
            let mut txn = self.doc.transact_mut();
            for (m, json) in mutations.iter().zip(encoded) {
                let slot = &self.slots[m.collection().index()];
                let written = match (m, json) {
                    (Mutation::Set { collection, id, .. }, Some(json)) => {
                        Self::write_set(slot, &mut txn, *collection, id, json)
                    }
                    (Mutation::Delete { id, .. }, _) => Self::write_delete(slot, &mut txn, id),
                    (Mutation::Set { .. }, None) => false,
                };
                if written {
                    touched.insert(m.collection());
                }
            }
            if touched.is_empty() {
                None
            } else {
                Some(txn.encode_update_v1())
            }
        };

        self.notify(&touched);
        Ok(delta)
    }

    fn write_set(
        slot: &Slot,
        txn: &mut TransactionMut,
        collection: Collection,
        id: &str,
        json: String,
    ) -> bool {
        if slot.deleted.contains_key(&*txn, id) {
            debug!("skipping write to deleted {} entity {}", collection, id);
            return false;
        }
        slot.live.insert(txn, id, json);
        true
    }

    fn write_delete(slot: &Slot, txn: &mut TransactionMut, id: &str) -> bool {
        if slot.deleted.contains_key(&*txn, id) {
            return false;
        }
        slot.deleted.insert(txn, id, true);
        slot.live.remove(txn, id);
        true
    }

    // ─── Reads ──────────────────────────────────────────────────

    pub fn is_tombstoned(&self, collection: Collection, id: &str) -> bool {
        let txn = self.doc.transact();
        self.slot(collection).deleted.contains_key(&txn, id)
    }

    pub fn get_value(&self, collection: Collection, id: &str) -> Option<Value> {
        let txn = self.doc.transact();
        let slot = self.slot(collection);
        if slot.deleted.contains_key(&txn, id) {
            return None;
        }
        match slot.live.get(&txn, id)? {
            Out::Any(Any::String(json)) => serde_json::from_str(&json).ok(),
            _ => None,
        }
    }

    pub fn get<E: Entity>(&self, id: &str) -> Option<E> {
        let value = self.get_value(E::COLLECTION, id)?;
        serde_json::from_value(value).ok()
    }

    /// Current live entities of a collection. Unparseable entries are skipped.
    pub fn snapshot(&self, collection: Collection) -> MapSnapshot {
        let txn = self.doc.transact();
        let slot = self.slot(collection);
        let mut out = MapSnapshot::new();

        for (id, value) in slot.live.iter(&txn) {
            if slot.deleted.contains_key(&txn, id) {
                continue;
            }
            match value {
                Out::Any(Any::String(json)) => match serde_json::from_str::<Value>(&json) {
                    Ok(v) => {
                        out.insert(id.to_string(), v);
                    }
                    Err(e) => warn!("ignoring unparseable {} entity {}: {}", collection, id, e),
                },
                other => warn!("ignoring non-JSON {} entity {}: {:?}", collection, id, other),
            }
        }
        out
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.snapshot(collection).len()
    }

    pub fn is_empty(&self) -> bool {
        Collection::ALL.iter().all(|c| self.len(*c) == 0)
    }

    fn raw(&self, collection: Collection) -> RawCollection {
        let txn = self.doc.transact();
        let slot = self.slot(collection);
        let mut live: Vec<(String, String)> = slot
            .live
            .iter(&txn)
            .map(|(id, value)| (id.to_string(), value.to_string(&txn)))
            .collect();
        live.sort();
        let mut deleted: Vec<String> = slot.deleted.keys(&txn).map(str::to_string).collect();
        deleted.sort();
        RawCollection { live, deleted }
    }

    // ─── Observers ──────────────────────────────────────────────

    /// Register a callback fired with the full snapshot of `collection`
    /// after every local or remote batch that changed it.
    pub fn observe<F>(&mut self, collection: Collection, callback: F) -> ObserverId
    where
        F: Fn(&MapSnapshot) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.push(Observer {
            id,
            collection,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|o| o.id != id);
        self.observers.len() != before
    }

    fn notify(&self, changed: &BTreeSet<Collection>) {
        for collection in changed {
            if !self.observers.iter().any(|o| o.collection == *collection) {
                continue;
            }
            let snapshot = self.snapshot(*collection);
            for observer in self.observers.iter().filter(|o| o.collection == *collection) {
                (observer.callback)(&snapshot);
            }
        }
    }

    // ─── Sync ───────────────────────────────────────────────────

    /// Apply a remote or persisted update. Idempotent.
    ///
    /// Returns the collections whose visible contents changed.
    pub fn apply_update(&mut self, update: &[u8]) -> Result<Vec<Collection>, CoreError> {
        let decoded =
            Update::decode_v1(update).map_err(|e| CoreError::MalformedUpdate(e.to_string()))?;

        let before: Vec<RawCollection> = Collection::ALL.iter().map(|c| self.raw(*c)).collect();
        {
            let mut txn = self.doc.transact_mut();
            txn.apply_update(decoded)
                .map_err(|e| CoreError::MalformedUpdate(e.to_string()))?;
        }

        let changed: BTreeSet<Collection> = Collection::ALL
            .iter()
            .zip(before)
            .filter(|(c, raw)| self.raw(**c) != *raw)
            .map(|(c, _)| *c)
            .collect();

        if !changed.is_empty() {
            debug!("remote update changed {:?}", changed);
        }
        self.notify(&changed);
        Ok(changed.into_iter().collect())
    }

    /// True when `update` carries neither items nor deletions.
    pub fn is_empty_update(update: &[u8]) -> bool {
        Update::decode_v1(update).is_ok_and(|u| u.is_empty())
    }

    pub fn state_vector(&self) -> Vec<u8> {
        self.doc.transact().state_vector().encode_v1()
    }

    /// Everything this replica has that the peer owning `state_vector` lacks.
    pub fn encode_diff(&self, state_vector: &[u8]) -> Result<Delta, CoreError> {
        let sv = StateVector::decode_v1(state_vector)
            .map_err(|e| CoreError::MalformedStateVector(e.to_string()))?;
        Ok(self.doc.transact().encode_diff_v1(&sv))
    }

    /// Whole document as a single update, used for snapshots.
    pub fn encode_state_as_update(&self) -> Delta {
        self.doc
            .transact()
            .encode_state_as_update_v1(&StateVector::default())
    }
}

/// Merge several deltas into one equivalent update.
pub fn merge_deltas(deltas: &[Delta]) -> Result<Delta, CoreError> {
    match deltas {
        [] => Ok(Vec::new()),
        [single] => Ok(single.clone()),
        _ => {
            let refs: Vec<&[u8]> = deltas.iter().map(Vec::as_slice).collect();
            yrs::merge_updates_v1(refs.as_slice())
                .map_err(|e| CoreError::MalformedUpdate(e.to_string()))
        }
    }
}
