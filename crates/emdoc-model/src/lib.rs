//! Embedded association engine for emdoc.
//!
//! An owner [`Document`] declares nested children through its [`Schema`]:
//! `embeds_one` for zero-or-one child and `embeds_many` for an ordered list.
//! Children behave like records of a persistence layer (they are built,
//! validated, saved, marked for destruction and destroyed) but their data
//! lives inline in the owner's raw attribute slot. There is no backing store.
//!
//! # Architecture
//!
//! - An [`AssociationDefinition`] is declared once per (model, name) and
//!   shared by every document of that schema.
//! - A document creates one association state per name on first access and
//!   keeps it for its whole life. [`EmbedsOne`] and [`EmbedsMany`] are cheap
//!   handles bound to that state.
//! - Targets load lazily from the raw value and are never re-derived until
//!   reloaded. Commits (`apply_changes`) persist or destroy pending entries
//!   and rewrite the raw value from the persisted, unmarked entries in target
//!   order.
//! - Children hold a weak back-reference (the embedder) to their owner, so a
//!   direct `save`/`destroy` on a child keeps the owner's raw value in sync.
//!
//! # Modules
//!
//! - [`error`]: [`AssociationError`] and the result alias
//! - [`config`]: Per-schema [`EmbedConfig`]
//! - [`embeddable`]: The [`Embeddable`] trait implemented by child models
//! - [`child`]: [`Child`] and the type-erased [`AnyChild`] handles
//! - [`definition`]: [`AssociationDefinition`] and add callbacks
//! - [`schema`]: [`Schema`] declarations
//! - [`document`]: The owner, [`Document`]
//! - [`association`]: The shared core plus [`EmbedsOne`] and [`EmbedsMany`]
//! - [`collection`]: The read-only [`CollectionView`]

pub mod association;
pub mod child;
pub mod collection;
pub mod config;
pub mod definition;
pub mod document;
pub mod embeddable;
pub mod error;
pub mod schema;

#[cfg(test)]
pub(crate) mod fixtures;

pub use association::{Association, ConcatOutcome, EmbedsMany, EmbedsOne};
pub use child::{AnyChild, Child};
pub use collection::CollectionView;
pub use config::EmbedConfig;
pub use definition::{AddCallback, AssociationDefinition, DefaultSupplier};
pub use document::{Assignment, Document, WeakDocument};
pub use embeddable::Embeddable;
pub use error::{AssociationError, AssociationResult};
pub use schema::{AssociationKind, Schema};

pub use emdoc_types::{
    DestructionVeto, Lifecycle, RawValue, Record, ValidationFailure, Violation, Violations,
};
