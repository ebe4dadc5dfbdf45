//! Persistence state of an embedded child.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a child stands relative to its owner's stored data.
///
/// The "marked for destruction" flag is orthogonal and tracked next to the
/// lifecycle, since a persisted child keeps being persisted until the commit
/// pass actually destroys it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// Built in memory, never saved.
    #[default]
    New,
    /// Saved; its record is part of the owner's raw value.
    Persisted,
    /// Destroyed. Saving it again returns it to `Persisted`.
    Destroyed,
}

impl Lifecycle {
    pub fn is_new(self) -> bool {
        matches!(self, Self::New)
    }

    pub fn is_persisted(self) -> bool {
        matches!(self, Self::Persisted)
    }

    pub fn is_destroyed(self) -> bool {
        matches!(self, Self::Destroyed)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Persisted => write!(f, "persisted"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}
