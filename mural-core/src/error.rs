use crate::collection::Collection;

/// Errors produced by the replicated document and the board bridge.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("malformed update: {0}")]
    MalformedUpdate(String),

    #[error("malformed state vector: {0}")]
    MalformedStateVector(String),

    #[error("{collection} entity {id} was deleted")]
    Deleted { collection: Collection, id: String },

    #[error("{collection} entity {id} not found")]
    NotFound { collection: Collection, id: String },

    #[error("area {0} is locked")]
    Locked(String),

    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
