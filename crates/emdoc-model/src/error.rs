//! Error types for association operations.

use emdoc_types::{TypeError, ValidationFailure};
use thiserror::Error;

use crate::schema::AssociationKind;

/// Errors surfaced by associations and their owner.
#[derive(Debug, Error)]
pub enum AssociationError {
    /// A supplied value is not an instance of the declared child model.
    /// Raised before any state changes.
    #[error("association `{association}` expects {expected}, got {found}")]
    TypeMismatch {
        association: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A commit left entries unsaved or destructions incomplete.
    #[error("changes to association `{association}` were not applied")]
    ChangesNotApplied { association: String },

    /// A child's own validation failed.
    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    /// The schema declares no association by this name.
    #[error("{model} has no embedded association `{name}`")]
    UnknownAssociation { model: String, name: String },

    /// The association exists but has the other cardinality.
    #[error("association `{name}` is declared as {declared}")]
    WrongShape {
        name: String,
        declared: AssociationKind,
    },

    /// Stored data for the association is not a record or list of records.
    #[error("invalid raw value for `{name}`: {source}")]
    InvalidRaw {
        name: String,
        #[source]
        source: TypeError,
    },
}

impl AssociationError {
    pub(crate) fn not_applied(association: impl Into<String>) -> Self {
        Self::ChangesNotApplied {
            association: association.into(),
        }
    }

    /// Returns `true` for [`AssociationError::TypeMismatch`].
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }

    /// Returns `true` for [`AssociationError::ChangesNotApplied`].
    pub fn is_not_applied(&self) -> bool {
        matches!(self, Self::ChangesNotApplied { .. })
    }
}

/// Convenience type alias for association operations.
pub type AssociationResult<T> = Result<T, AssociationError>;
