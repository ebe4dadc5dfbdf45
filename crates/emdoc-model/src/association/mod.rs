//! Embedded associations.
//!
//! [`AssociationCore`] carries what both cardinalities share: the definition,
//! the loaded flag, lazy loading from the raw value, the two-phase type check,
//! embedder injection around add callbacks, pending destructions, and the
//! `destroyed` list. [`EmbedsOne`] and [`EmbedsMany`] add their target shape
//! on top and implement the public [`Association`] trait.
//!
//! No `RefCell` borrow is held while a callback, a default supplier, a child
//! factory, or a child's save/destroy runs; any of them may re-enter the
//! association.

pub mod many;
pub mod one;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use emdoc_types::{Lifecycle, RawValue, Record};
use tracing::warn;

use crate::child::{AnyChild, Child, Embedder};
use crate::definition::AssociationDefinition;
use crate::document::{Assignment, Document};
use crate::embeddable::Embeddable;
use crate::error::{AssociationError, AssociationResult};
use crate::schema::AssociationKind;

pub use many::{ConcatOutcome, EmbedsMany};
pub use one::EmbedsOne;

/// Operations shared by every embedded association handle.
pub trait Association {
    /// The child model.
    type Entity: Embeddable;
    /// `Option<Child<_>>` or `Vec<Child<_>>`.
    type Target;
    /// What [`reader`](Association::reader) hands out.
    type Reader;

    fn owner(&self) -> &Document;

    fn name(&self) -> &str;

    fn is_loaded(&self) -> bool;

    /// The current target, loading it from the raw value on first call.
    fn target(&self) -> Self::Target;

    /// Unconditionally install `target`: marks the association loaded and
    /// embeds the children, without callbacks or raw value changes.
    fn set_target(&self, target: Self::Target);

    /// Read view of the target. `force` discards the cache and reloads first.
    fn reader(&self, force: bool) -> Self::Reader;

    /// Reload from the raw value, discarding unsaved entries, pending
    /// destructions, and the `destroyed` list.
    fn reload(&self) -> Self::Target;

    /// Construct a new unsaved child and admit it to the target. The raw
    /// value is untouched.
    fn build(&self, attributes: Record) -> Child<Self::Entity>;

    /// Destroy every persisted entry. All-or-nothing: a single veto leaves the
    /// target and raw value as they were and returns `false`.
    fn clear(&self) -> bool;

    /// Commit pass: save live entries, destroy marked and pending ones, drop
    /// destroyed entries from the target, and rewrite the raw value. Returns
    /// `false` if any save or destroy failed.
    fn apply_changes(&self) -> bool;

    /// Every target entry is persisted and no destruction is outstanding.
    fn is_settled(&self) -> bool;

    /// Entries removed by commits and clears since the last reload.
    fn destroyed(&self) -> Vec<Child<Self::Entity>>;

    /// Build, then save best-effort. A child that fails validation stays in
    /// the target unsaved.
    fn create(&self, attributes: Record) -> Child<Self::Entity> {
        let child = self.build(attributes);
        child.save();
        child
    }

    /// Build, then save, surfacing the child's validation failure. The child
    /// stays in the target either way.
    fn try_create(&self, attributes: Record) -> AssociationResult<Child<Self::Entity>> {
        let child = self.build(attributes);
        child.try_save()?;
        Ok(child)
    }

    /// Commit, then fail if anything stayed unsaved or undestroyed. Progress
    /// made by the pass is kept.
    fn try_apply_changes(&self) -> AssociationResult<()> {
        self.apply_changes();
        if self.is_settled() {
            Ok(())
        } else {
            warn!(association = self.name(), "changes not applied");
            Err(AssociationError::not_applied(self.name()))
        }
    }
}

/// Per-document association state with the model type erased, as stored in
/// the owner's name-to-association map.
pub(crate) trait ErasedAssociation {
    fn kind(&self) -> AssociationKind;
    fn model(&self) -> &'static str;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
    fn is_loaded(&self) -> bool;
    fn is_settled(&self) -> bool;
    fn commit(&self, owner: &Document) -> bool;
    /// Rewrite the owner's raw value from the target, unless a commit is
    /// already in progress or nothing is loaded.
    fn sync_raw(&self, owner: &Document);
    fn assign(&self, owner: &Document, assignment: Assignment) -> AssociationResult<()>;
}

/// Result of reading an association's stored data for the first time.
pub(crate) enum Loaded<T> {
    /// Children materialized from the raw value; persisted.
    Stored(Vec<Child<T>>),
    /// Children seeded from the definition default; new.
    Seeded(Vec<Child<T>>),
}

/// State captured before an immediate commit so a failure can be undone.
pub(crate) struct Snapshot<S, T> {
    target: S,
    pending: Vec<Child<T>>,
    destroyed: Vec<Child<T>>,
    raw: RawValue,
}

pub(crate) struct AssociationCore<T> {
    definition: Rc<AssociationDefinition<T>>,
    loaded: Cell<bool>,
    committing: Cell<bool>,
    /// Persisted entries displaced from the target, destroyed on commit.
    pending: RefCell<Vec<Child<T>>>,
    destroyed: RefCell<Vec<Child<T>>>,
}

impl<T: Embeddable> AssociationCore<T> {
    pub(crate) fn new(definition: Rc<AssociationDefinition<T>>) -> Self {
        Self {
            definition,
            loaded: Cell::new(false),
            committing: Cell::new(false),
            pending: RefCell::new(Vec::new()),
            destroyed: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn definition(&self) -> &AssociationDefinition<T> {
        &self.definition
    }

    pub(crate) fn name(&self) -> &str {
        self.definition.name()
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.loaded.get()
    }

    pub(crate) fn mark_loaded(&self) {
        self.loaded.set(true);
    }

    pub(crate) fn is_committing(&self) -> bool {
        self.committing.get()
    }

    /// Run `f` with raw value syncing from child saves suppressed.
    pub(crate) fn committing<R>(&self, f: impl FnOnce() -> R) -> R {
        let outer = self.committing.replace(true);
        let result = f();
        self.committing.set(outer);
        result
    }

    /// Whether writers should commit right away for this owner.
    pub(crate) fn commits_on_assign(&self, owner: &Document) -> bool {
        owner.is_persisted() && owner.schema().config().commit_on_assign
    }

    /// Check a whole batch against the model before anything is admitted.
    pub(crate) fn typecheck(&self, batch: Vec<AnyChild>) -> AssociationResult<Vec<Child<T>>> {
        batch
            .iter()
            .map(|any| {
                any.downcast::<T>()
                    .ok_or_else(|| AssociationError::TypeMismatch {
                        association: self.name().to_string(),
                        expected: T::model_name(),
                        found: any.model(),
                    })
            })
            .collect()
    }

    pub(crate) fn embed(&self, owner: &Document, child: &Child<T>) {
        child.set_embedder(Embedder::new(owner, self.definition.shared_name()));
    }

    /// Embed `child`, then fire before-add, `splice` it into the target, and
    /// fire after-add.
    pub(crate) fn admit(&self, owner: &Document, child: &Child<T>, splice: impl FnOnce()) {
        self.embed(owner, child);
        self.definition.run_before_add(owner, child);
        splice();
        self.definition.run_after_add(owner, child);
    }

    /// Materialize the stored children, or the default for a new owner with
    /// nothing stored.
    pub(crate) fn load(&self, owner: &Document) -> Loaded<T> {
        let raw = owner.read_raw(self.name());
        if raw.is_absent() && owner.is_new() {
            if let Some(default) = self.definition.build_default(owner) {
                let seeded = default
                    .into_records()
                    .iter()
                    .map(|record| self.definition.construct(owner, record, Lifecycle::New))
                    .collect();
                return Loaded::Seeded(seeded);
            }
        }
        Loaded::Stored(
            raw.into_records()
                .iter()
                .map(|record| self.definition.instantiate(owner, record))
                .collect(),
        )
    }

    /// Forget cached state ahead of a reload.
    pub(crate) fn reset(&self) {
        self.loaded.set(false);
        self.pending.borrow_mut().clear();
        self.destroyed.borrow_mut().clear();
    }

    /// Queue a displaced entry for destruction. Unsaved entries are simply
    /// dropped.
    pub(crate) fn schedule_destruction(&self, child: &Child<T>) {
        if !child.is_persisted() {
            return;
        }
        let mut pending = self.pending.borrow_mut();
        if !pending.contains(child) {
            pending.push(child.clone());
        }
    }

    /// Take `child` back out of the pending list when it re-enters the target.
    pub(crate) fn unschedule(&self, child: &Child<T>) {
        self.pending.borrow_mut().retain(|p| p != child);
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }

    pub(crate) fn pending(&self) -> Vec<Child<T>> {
        self.pending.borrow().clone()
    }

    /// Destroy every pending entry. Destroyed ones move to `destroyed`;
    /// vetoed ones stay pending. Returns `false` on any veto.
    pub(crate) fn destroy_pending(&self) -> bool {
        let pending = self.pending();
        let mut done = Vec::new();
        let mut all = true;
        for child in &pending {
            if child.is_destroyed() || child.destroy() {
                done.push(child.clone());
            } else {
                all = false;
            }
        }
        self.pending.borrow_mut().retain(|p| !done.contains(p));
        self.record_destroyed(done);
        all
    }

    /// All-or-nothing destruction for `clear`. Checks every veto first, then
    /// destroys. Returns `false` without touching anything if one is vetoed;
    /// a veto raised mid-way puts back the children already destroyed.
    pub(crate) fn destroy_all(&self, doomed: &[Child<T>]) -> bool {
        if let Some(vetoed) = doomed.iter().find(|c| !c.allows_destroy()) {
            warn!(
                association = self.name(),
                model = T::model_name(),
                lifecycle = %vetoed.lifecycle(),
                "clear vetoed"
            );
            return false;
        }
        let destroyed = self.committing(|| {
            let mut done: Vec<(&Child<T>, (Lifecycle, bool))> = Vec::with_capacity(doomed.len());
            for child in doomed {
                let before = (child.lifecycle(), child.is_marked_for_destruction());
                if !child.destroy() {
                    for (child, (lifecycle, marked)) in done.iter().rev() {
                        child.reinstate(*lifecycle, *marked);
                    }
                    return false;
                }
                done.push((child, before));
            }
            true
        });
        if !destroyed {
            warn!(
                association = self.name(),
                model = T::model_name(),
                "clear vetoed while destroying, changes undone"
            );
            return false;
        }
        self.pending.borrow_mut().clear();
        self.record_destroyed(doomed.iter().cloned());
        true
    }

    pub(crate) fn record_destroyed(&self, children: impl IntoIterator<Item = Child<T>>) {
        self.destroyed.borrow_mut().extend(children);
    }

    pub(crate) fn destroyed(&self) -> Vec<Child<T>> {
        self.destroyed.borrow().clone()
    }

    pub(crate) fn snapshot<S>(&self, owner: &Document, target: S) -> Snapshot<S, T> {
        Snapshot {
            target,
            pending: self.pending(),
            destroyed: self.destroyed(),
            raw: owner.read_raw(self.name()),
        }
    }

    /// Put back the lists and raw value; returns the target to reinstall.
    pub(crate) fn restore<S>(&self, owner: &Document, snapshot: Snapshot<S, T>) -> S {
        *self.pending.borrow_mut() = snapshot.pending;
        *self.destroyed.borrow_mut() = snapshot.destroyed;
        owner.write_raw(self.name(), snapshot.raw);
        snapshot.target
    }
}

/// Entries that count towards the raw value.
pub(crate) fn is_stored<T: Embeddable>(child: &Child<T>) -> bool {
    child.is_persisted() && !child.is_marked_for_destruction()
}

/// Entries the commit pass will try to save.
pub(crate) fn is_live<T: Embeddable>(child: &Child<T>) -> bool {
    !child.is_marked_for_destruction() && !child.is_destroyed()
}
