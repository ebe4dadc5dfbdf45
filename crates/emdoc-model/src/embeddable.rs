//! The [`Embeddable`] trait: how a child model is built, serialized, and checked.

use emdoc_types::{Record, Violations};

use crate::document::Document;

/// A model that can live inside an owner's embedded association.
///
/// The trait doubles as the child factory: the engine calls
/// [`from_record`](Embeddable::from_record) both when loading stored data and
/// when building new children. The owning document is passed in so derived
/// attributes can read from it; the child's embedder is already bound to that
/// owner when this runs.
pub trait Embeddable: Sized + 'static {
    /// Short model name used in type mismatch errors and logs.
    fn model_name() -> &'static str;

    /// Construct the model from its serialized attributes.
    ///
    /// `embedder` is `None` only for children constructed outside any
    /// association.
    fn from_record(record: &Record, embedder: Option<&Document>) -> Self;

    /// Serialize the model into the record stored on the owner.
    fn to_record(&self) -> Record;

    /// Check the model's own business rules.
    fn validate(&self) -> Result<(), Violations> {
        Ok(())
    }

    /// Host-level destroy hook. Returning `false` vetoes the destruction.
    fn allow_destroy(&self) -> bool {
        true
    }
}
