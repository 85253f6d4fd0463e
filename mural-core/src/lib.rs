//! Replicated board document for collaborative whiteboards.
//!
//! [`ReplicatedStore`] holds the CRDT document (cards, areas, connectors,
//! drawings) and [`Board`] mirrors it into plain Rust values for the UI,
//! writing local edits back with diff-before-write.

pub mod board;
pub mod collection;
pub mod error;
pub mod geometry;
pub mod model;
pub mod store;

pub use board::{Board, LocalState};
pub use collection::Collection;
pub use error::CoreError;
pub use model::{
    Area, Bounds, Card, CardDraft, CardType, Connector, Cursor, Drawing, Effort, Entity,
    FontWeight, Lens, Point, RiceScore, ShapeType, Status, TextAlign,
};
pub use store::{merge_deltas, Delta, MapSnapshot, Mutation, ObserverId, ReplicatedStore};
