use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level replicated maps of a board document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    Cards,
    Areas,
    Connectors,
    Drawings,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Cards,
        Collection::Areas,
        Collection::Connectors,
        Collection::Drawings,
    ];

    /// Name of the replicated map holding live entities.
    pub fn map_name(&self) -> &'static str {
        match self {
            Collection::Cards => "cards",
            Collection::Areas => "areas",
            Collection::Connectors => "connectors",
            Collection::Drawings => "drawings",
        }
    }

    /// Name of the replicated map recording deleted ids.
    pub fn tombstone_map_name(&self) -> &'static str {
        match self {
            Collection::Cards => "cards.deleted",
            Collection::Areas => "areas.deleted",
            Collection::Connectors => "connectors.deleted",
            Collection::Drawings => "drawings.deleted",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Collection::Cards => 0,
            Collection::Areas => 1,
            Collection::Connectors => 2,
            Collection::Drawings => 3,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.map_name())
    }
}
