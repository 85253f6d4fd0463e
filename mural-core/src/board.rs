//! Local application state bridge.
//!
//! ```text
//!  remote delta ──▸ ReplicatedStore ──observe──▸ mirror (LocalState)
//!                        ▲                            │
//!                        └──── diff-before-write ◂────┘ edit()
//!                        │
//!                        └──▸ outbound deltas (take_outbound)
//! ```
//!
//! The mirror is replaced wholesale whenever the store reports a change.
//! Local edits run against a copy of the mirror and only entities that
//! differ from the stored value are written, all in one batch, so a
//! refresh of the mirror never writes anything back.

use log::{trace, warn};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::collection::Collection;
use crate::error::CoreError;
use crate::geometry;
use crate::model::{
    now_millis, new_entity_id, Area, Bounds, Card, CardDraft, Connector, Drawing, Entity,
    ExtraFields, Lens, Point,
};
use crate::store::{Delta, MapSnapshot, Mutation, ReplicatedStore};

/// UI-facing copy of the board contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalState {
    pub cards: Vec<Card>,
    pub areas: Vec<Area>,
    pub connectors: Vec<Connector>,
    pub drawings: Vec<Drawing>,
}

impl LocalState {
    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == id)
    }

    pub fn card_mut(&mut self, id: &str) -> Option<&mut Card> {
        self.cards.iter_mut().find(|c| c.id == id)
    }

    pub fn area(&self, id: &str) -> Option<&Area> {
        self.areas.iter().find(|a| a.id == id)
    }

    pub fn area_mut(&mut self, id: &str) -> Option<&mut Area> {
        self.areas.iter_mut().find(|a| a.id == id)
    }
}

fn lock(mirror: &Mutex<LocalState>) -> MutexGuard<'_, LocalState> {
    mirror.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_collection<E: Entity>(snapshot: &MapSnapshot) -> Vec<E> {
    snapshot
        .iter()
        .filter_map(|(id, value)| match serde_json::from_value::<E>(value.clone()) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!("skipping {} entity {}: {}", E::COLLECTION, id, e);
                None
            }
        })
        .collect()
}

fn refresh(mirror: &Mutex<LocalState>, collection: Collection, snapshot: &MapSnapshot) {
    let mut state = lock(mirror);
    match collection {
        Collection::Cards => {
            let mut cards: Vec<Card> = parse_collection(snapshot);
            cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            state.cards = cards;
        }
        // Snapshots are id-ordered already.
        Collection::Areas => state.areas = parse_collection(snapshot),
        Collection::Connectors => state.connectors = parse_collection(snapshot),
        Collection::Drawings => state.drawings = parse_collection(snapshot),
    }
    trace!("mirror refreshed {} ({} entries)", collection, snapshot.len());
}

/// How the diff treats entities of one collection.
#[derive(Clone, Copy)]
enum WritePolicy {
    Replace,
    AppendOnly,
}

/// Writes for one collection. `base` is what the caller started from:
/// only ids it held and dropped are deleted, so stored values the mirror
/// could not read are never removed as a side effect.
fn diff_collection<E: Entity>(
    current: &MapSnapshot,
    base: &[E],
    local: &[E],
    policy: WritePolicy,
    batch: &mut Vec<Mutation>,
) -> Result<(), CoreError> {
    let mut seen = HashSet::with_capacity(local.len());
    for entity in local {
        let id = entity.id();
        if id.is_empty() {
            return Err(CoreError::InvalidEntity(format!(
                "{} entity without an id",
                E::COLLECTION
            )));
        }
        seen.insert(id);

        let Some(stored) = current.get(id) else {
            batch.push(Mutation::set(E::COLLECTION, id, serde_json::to_value(entity)?));
            continue;
        };
        if let WritePolicy::AppendOnly = policy {
            continue;
        }
        // Compare parsed values: the stored JSON may be shaped differently.
        let unchanged = serde_json::from_value::<E>(stored.clone()).is_ok_and(|s| s == *entity);
        if !unchanged {
            batch.push(Mutation::set(E::COLLECTION, id, serde_json::to_value(entity)?));
        }
    }

    if let WritePolicy::Replace = policy {
        for id in base.iter().map(E::id) {
            if !seen.contains(id) && current.contains_key(id) {
                batch.push(Mutation::delete(E::COLLECTION, id));
            }
        }
    }
    Ok(())
}

/// A board replica plus its mirrored local state.
pub struct Board {
    store: ReplicatedStore,
    mirror: Arc<Mutex<LocalState>>,
    lens: Lens,
    /// Deltas produced by local edits, waiting for transport and durability.
    outbound: VecDeque<Delta>,
    deltas_produced: u64,
    /// Collections refreshed since the last `take_changed`.
    changed: Arc<Mutex<BTreeSet<Collection>>>,
}

impl Default for Board {
    fn default() -> Self {
        Self::new(ReplicatedStore::new())
    }
}

impl Board {
    pub fn new(mut store: ReplicatedStore) -> Self {
        let mirror = Arc::new(Mutex::new(LocalState::default()));
        let changed = Arc::new(Mutex::new(BTreeSet::new()));

        for collection in Collection::ALL {
            let target = mirror.clone();
            let touched = changed.clone();
            store.observe(collection, move |snapshot| {
                refresh(&target, collection, snapshot);
                touched
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(collection);
            });
            refresh(&mirror, collection, &store.snapshot(collection));
        }

        Self {
            store,
            mirror,
            lens: Lens::Default,
            outbound: VecDeque::new(),
            deltas_produced: 0,
            changed,
        }
    }

    pub fn store(&self) -> &ReplicatedStore {
        &self.store
    }

    pub fn lens(&self) -> Lens {
        self.lens
    }

    /// Switch the lens used for new cards and areas.
    pub fn set_lens(&mut self, lens: Lens) {
        self.lens = lens;
    }

    // ─── Reads ─────────────────────────────────────────────────

    pub fn state(&self) -> LocalState {
        lock(&self.mirror).clone()
    }

    pub fn cards(&self) -> Vec<Card> {
        lock(&self.mirror).cards.clone()
    }

    /// Areas with `card_ids` recomputed from geometry.
    pub fn areas(&self) -> Vec<Area> {
        let state = lock(&self.mirror);
        state
            .areas
            .iter()
            .map(|area| with_members(area, &state.cards))
            .collect()
    }

    pub fn connectors(&self) -> Vec<Connector> {
        lock(&self.mirror).connectors.clone()
    }

    pub fn drawings(&self) -> Vec<Drawing> {
        lock(&self.mirror).drawings.clone()
    }

    pub fn card(&self, id: &str) -> Option<Card> {
        lock(&self.mirror).card(id).cloned()
    }

    pub fn area(&self, id: &str) -> Option<Area> {
        let state = lock(&self.mirror);
        state.area(id).map(|area| with_members(area, &state.cards))
    }

    pub fn cards_on_board(&self, lens: Lens) -> Vec<Card> {
        lock(&self.mirror)
            .cards
            .iter()
            .filter(|c| c.board == lens)
            .cloned()
            .collect()
    }

    pub fn areas_on_board(&self, lens: Lens) -> Vec<Area> {
        self.areas().into_iter().filter(|a| a.board == lens).collect()
    }

    /// Existing cards blocking `card_id`. Dangling ids are ignored.
    pub fn blockers_of(&self, card_id: &str) -> Vec<Card> {
        let state = lock(&self.mirror);
        let Some(card) = state.card(card_id) else {
            return Vec::new();
        };
        card.blocked_by
            .iter()
            .filter_map(|id| state.card(id).cloned())
            .collect()
    }

    /// Both cards of a connector, or `None` if either end is gone.
    pub fn connector_endpoints(&self, connector_id: &str) -> Option<(Card, Card)> {
        let state = lock(&self.mirror);
        let connector = state.connectors.iter().find(|c| c.id == connector_id)?;
        let from = state.card(&connector.from_card_id)?.clone();
        let to = state.card(&connector.to_card_id)?.clone();
        Some((from, to))
    }

    // ─── Bridge ────────────────────────────────────────────────

    /// Run a local mutation against a copy of the mirror and write back
    /// whatever differs from the replicated document.
    pub fn edit<R>(&mut self, f: impl FnOnce(&mut LocalState) -> R) -> Result<R, CoreError> {
        let mut working = self.state();
        let result = f(&mut working);
        self.sync_local(&working)?;
        Ok(result)
    }

    /// Diff `state` against the document and write the differences as one
    /// batch. Returns `true` if a delta was produced.
    pub fn sync_local(&mut self, state: &LocalState) -> Result<bool, CoreError> {
        let base = self.state();
        let mut batch = Vec::new();
        diff_collection(
            &self.store.snapshot(Collection::Cards),
            &base.cards,
            &state.cards,
            WritePolicy::Replace,
            &mut batch,
        )?;
        diff_collection(
            &self.store.snapshot(Collection::Areas),
            &base.areas,
            &state.areas,
            WritePolicy::Replace,
            &mut batch,
        )?;
        diff_collection(
            &self.store.snapshot(Collection::Connectors),
            &base.connectors,
            &state.connectors,
            WritePolicy::Replace,
            &mut batch,
        )?;
        diff_collection(
            &self.store.snapshot(Collection::Drawings),
            &base.drawings,
            &state.drawings,
            WritePolicy::AppendOnly,
            &mut batch,
        )?;

        if batch.is_empty() {
            return Ok(false);
        }
        trace!("bridge writing {} mutations", batch.len());
        match self.store.apply_batch(&batch)? {
            Some(delta) => {
                self.outbound.push_back(delta);
                self.deltas_produced += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Apply a delta received from a peer or loaded from storage.
    pub fn apply_remote(&mut self, update: &[u8]) -> Result<Vec<Collection>, CoreError> {
        self.store.apply_update(update)
    }

    /// Drain deltas produced by local edits, oldest first.
    pub fn take_outbound(&mut self) -> Vec<Delta> {
        self.outbound.drain(..).collect()
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub fn deltas_produced(&self) -> u64 {
        self.deltas_produced
    }

    /// Collections whose mirror was refreshed since the last call, local
    /// and remote changes alike.
    pub fn take_changed(&mut self) -> Vec<Collection> {
        let mut changed = self.changed.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *changed).into_iter().collect()
    }

    // ─── Cards ─────────────────────────────────────────────────

    pub fn add_card(&mut self, draft: CardDraft) -> Result<Card, CoreError> {
        let card = draft.build(self.lens);
        let added = card.clone();
        self.edit(|state| state.cards.push(card))?;
        Ok(added)
    }

    /// Apply `f` to a card and bump its `updated_at`.
    pub fn update_card(
        &mut self,
        id: &str,
        f: impl FnOnce(&mut Card),
    ) -> Result<Card, CoreError> {
        self.edit(|state| {
            let card = state.card_mut(id)?;
            f(card);
            card.id = id.to_string();
            card.updated_at = now_millis();
            Some(card.clone())
        })?
        .ok_or_else(|| not_found(Collection::Cards, id))
    }

    pub fn move_card(&mut self, id: &str, position: Point) -> Result<(), CoreError> {
        self.edit(|state| {
            state.card_mut(id).map(|card| card.position = position)
        })?
        .ok_or_else(|| not_found(Collection::Cards, id))
    }

    /// Delete a card and every connector touching it.
    pub fn delete_card(&mut self, id: &str) -> Result<bool, CoreError> {
        self.edit(|state| {
            let before = state.cards.len();
            state.cards.retain(|c| c.id != id);
            state
                .connectors
                .retain(|c| c.from_card_id != id && c.to_card_id != id);
            state.cards.len() != before
        })
    }

    // ─── Connectors ────────────────────────────────────────────

    pub fn add_connector(
        &mut self,
        from_card_id: &str,
        to_card_id: &str,
        is_blocker: bool,
    ) -> Result<Connector, CoreError> {
        let connector = Connector {
            id: new_entity_id(),
            from_card_id: from_card_id.to_string(),
            to_card_id: to_card_id.to_string(),
            is_blocker,
            extra: ExtraFields::new(),
        };
        let added = connector.clone();

        self.edit(|state| {
            if is_blocker {
                if let Some(target) = state.card_mut(to_card_id) {
                    if !target.blocked_by.iter().any(|b| b == from_card_id) {
                        target.blocked_by.push(from_card_id.to_string());
                    }
                }
            }
            state.connectors.push(connector);
        })?;
        Ok(added)
    }

    pub fn remove_connector(&mut self, id: &str) -> Result<bool, CoreError> {
        self.edit(|state| {
            let Some(pos) = state.connectors.iter().position(|c| c.id == id) else {
                return false;
            };
            let connector = state.connectors.remove(pos);
            if connector.is_blocker {
                if let Some(target) = state.card_mut(&connector.to_card_id) {
                    target.blocked_by.retain(|b| *b != connector.from_card_id);
                }
            }
            true
        })
    }

    // ─── Drawings ──────────────────────────────────────────────

    /// Append a stroke. Strokes with fewer than two points are dropped.
    pub fn add_drawing(
        &mut self,
        points: Vec<Point>,
        color: &str,
        width: f64,
    ) -> Result<Option<Drawing>, CoreError> {
        if points.len() < 2 {
            return Ok(None);
        }
        let drawing = Drawing::new(points, color, width);
        let added = drawing.clone();
        self.edit(|state| state.drawings.push(drawing))?;
        Ok(Some(added))
    }

    // ─── Areas ─────────────────────────────────────────────────

    pub fn add_area(&mut self, label: &str, bounds: Bounds) -> Result<Area, CoreError> {
        let mut area = Area::new(self.lens, label, bounds);
        area.card_ids = self
            .cards()
            .iter()
            .filter(|c| geometry::area_contains(&area, c))
            .map(|c| c.id.clone())
            .collect();
        let added = area.clone();
        self.edit(|state| state.areas.push(area))?;
        Ok(added)
    }

    /// Create an area enclosing the given cards.
    ///
    /// Returns `None` when fewer than two of the ids name existing cards.
    pub fn create_area_around(
        &mut self,
        card_ids: &[String],
        label: &str,
    ) -> Result<Option<Area>, CoreError> {
        let cards: Vec<Card> = self
            .cards()
            .into_iter()
            .filter(|c| card_ids.contains(&c.id))
            .collect();
        if cards.len() < 2 {
            return Ok(None);
        }
        let Some(bounds) = geometry::enclosing_bounds(&cards) else {
            return Ok(None);
        };

        let mut area = Area::new(self.lens, label, bounds);
        area.card_ids = cards.iter().map(|c| c.id.clone()).collect();
        let added = area.clone();
        self.edit(|state| state.areas.push(area))?;
        Ok(Some(added))
    }

    pub fn update_area(
        &mut self,
        id: &str,
        f: impl FnOnce(&mut Area),
    ) -> Result<Area, CoreError> {
        self.edit(|state| {
            let area = state.area_mut(id)?;
            f(area);
            area.id = id.to_string();
            Some(area.clone())
        })?
        .ok_or_else(|| not_found(Collection::Areas, id))
    }

    /// Move the area's top-left corner. Cards stay where they are.
    pub fn move_area(&mut self, id: &str, position: Point) -> Result<(), CoreError> {
        let area = self.area(id).ok_or_else(|| not_found(Collection::Areas, id))?;
        if area.is_locked {
            return Err(CoreError::Locked(id.to_string()));
        }
        self.update_area(id, |area| {
            area.bounds.x = position.x;
            area.bounds.y = position.y;
        })?;
        Ok(())
    }

    /// Flip the lock flag, returning the new value.
    pub fn toggle_area_lock(&mut self, id: &str) -> Result<bool, CoreError> {
        let area = self.update_area(id, |area| area.is_locked = !area.is_locked)?;
        Ok(area.is_locked)
    }

    /// Lay the area's cards out on a grid. Returns how many cards moved
    /// into place.
    pub fn organize_area(&mut self, id: &str) -> Result<usize, CoreError> {
        let area = self.area(id).ok_or_else(|| not_found(Collection::Areas, id))?;
        if area.is_locked {
            return Err(CoreError::Locked(id.to_string()));
        }

        self.edit(|state| {
            let members: Vec<String> = geometry::cards_in_area(&area, &state.cards)
                .into_iter()
                .map(|c| c.id.clone())
                .collect();
            for (index, card_id) in members.iter().enumerate() {
                if let Some(card) = state.card_mut(card_id) {
                    card.position = geometry::grid_slot(&area.bounds, index);
                }
            }
            members.len()
        })
    }

    pub fn delete_area(&mut self, id: &str) -> Result<bool, CoreError> {
        self.edit(|state| {
            let before = state.areas.len();
            state.areas.retain(|a| a.id != id);
            state.areas.len() != before
        })
    }
}

fn with_members(area: &Area, cards: &[Card]) -> Area {
    let mut area = area.clone();
    area.card_ids = geometry::cards_in_area(&area, cards)
        .into_iter()
        .map(|c| c.id.clone())
        .collect();
    area
}

fn not_found(collection: Collection, id: &str) -> CoreError {
    CoreError::NotFound {
        collection,
        id: id.to_string(),
    }
}
