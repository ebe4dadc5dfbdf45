//! Foundation types for emdoc.
//!
//! This crate provides the value and lifecycle types shared by the embedded
//! association engine. It has no knowledge of owners or associations; it only
//! describes what a child's data looks like once serialized and which state a
//! child can be in.
//!
//! # Key Types
//!
//! - [`Record`]: Serialized form of a single child (a JSON object)
//! - [`RawValue`]: What an owner stores per association: absent, one record, or a list
//! - [`Lifecycle`]: Persistence state of a child entity
//! - [`Violations`]: Business-rule failures reported by a child's validation
//! - [`ValidationFailure`] / [`DestructionVeto`]: Child-level failures

pub mod error;
pub mod lifecycle;
pub mod raw;
pub mod violation;

pub use error::TypeError;
pub use lifecycle::Lifecycle;
pub use raw::{RawValue, Record};
pub use violation::{DestructionVeto, ValidationFailure, Violation, Violations};
