//! Ordered multi-child embedded association.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use emdoc_types::{RawValue, Record};
use tracing::{debug, warn};

use super::{is_live, is_stored, Association, AssociationCore, ErasedAssociation, Loaded};
use crate::child::{AnyChild, Child};
use crate::collection::CollectionView;
use crate::definition::AssociationDefinition;
use crate::document::{Assignment, Document};
use crate::embeddable::Embeddable;
use crate::error::{AssociationError, AssociationResult};
use crate::schema::AssociationKind;

/// Result of appending children to an [`EmbedsMany`].
#[must_use]
pub enum ConcatOutcome<T> {
    /// Every child was admitted and, for a committing owner, saved. Carries
    /// the whole target after the append.
    Applied(Vec<Child<T>>),
    /// At least one appended child failed to save. All of them stay in the
    /// target; those that saved are in the raw value.
    SaveFailed,
}

impl<T> ConcatOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn into_target(self) -> Option<Vec<Child<T>>> {
        match self {
            Self::Applied(target) => Some(target),
            Self::SaveFailed => None,
        }
    }
}

impl<T> PartialEq for ConcatOutcome<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Applied(a), Self::Applied(b)) => a == b,
            (Self::SaveFailed, Self::SaveFailed) => true,
            _ => false,
        }
    }
}

impl<T: Embeddable + fmt::Debug> fmt::Debug for ConcatOutcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied(target) => f.debug_tuple("Applied").field(target).finish(),
            Self::SaveFailed => f.write_str("SaveFailed"),
        }
    }
}

pub(crate) struct ManyState<T> {
    core: AssociationCore<T>,
    target: RefCell<Vec<Child<T>>>,
}

impl<T: Embeddable> ManyState<T> {
    pub(crate) fn new(definition: Rc<AssociationDefinition<T>>) -> Self {
        Self {
            core: AssociationCore::new(definition),
            target: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn current(&self) -> Vec<Child<T>> {
        self.target.borrow().clone()
    }

    fn ensure_loaded(&self, owner: &Document) {
        if self.core.is_loaded() {
            return;
        }
        match self.core.load(owner) {
            Loaded::Stored(children) => {
                *self.target.borrow_mut() = children;
                self.core.mark_loaded();
            }
            Loaded::Seeded(children) => {
                self.target.borrow_mut().clear();
                self.core.mark_loaded();
                for child in &children {
                    self.push(owner, child);
                }
            }
        }
    }

    fn push(&self, owner: &Document, child: &Child<T>) {
        self.core.admit(owner, child, || {
            self.target.borrow_mut().push(child.clone());
        });
    }

    fn stored_raw(&self) -> RawValue {
        self.target
            .borrow()
            .iter()
            .filter(|child| is_stored(child))
            .map(Child::to_record)
            .collect::<Vec<_>>()
            .into()
    }

    fn write_raw(&self, owner: &Document) {
        owner.write_raw(self.core.name(), self.stored_raw());
    }

    pub(crate) fn typecheck(&self, batch: Vec<AnyChild>) -> AssociationResult<Vec<Child<T>>> {
        self.core.typecheck(batch)
    }

    pub(crate) fn target(&self, owner: &Document) -> Vec<Child<T>> {
        self.ensure_loaded(owner);
        self.current()
    }

    pub(crate) fn set_target(&self, owner: &Document, target: Vec<Child<T>>) {
        for child in &target {
            self.core.embed(owner, child);
        }
        *self.target.borrow_mut() = target;
        self.core.mark_loaded();
    }

    pub(crate) fn reload(&self, owner: &Document) -> Vec<Child<T>> {
        self.core.reset();
        self.target.borrow_mut().clear();
        self.target(owner)
    }

    pub(crate) fn build(&self, owner: &Document, attributes: Record) -> Child<T> {
        self.ensure_loaded(owner);
        let child = self.core.definition().build(owner, attributes);
        self.push(owner, &child);
        child
    }

    /// Swap the whole target. Persisted entries left out are queued for
    /// destruction; entries already present are kept without firing add
    /// callbacks again.
    pub(crate) fn replace(&self, owner: &Document, children: Vec<Child<T>>) {
        self.ensure_loaded(owner);
        let previous = self.current();
        for old in previous.iter().filter(|old| !children.contains(old)) {
            self.core.schedule_destruction(old);
        }
        self.target.borrow_mut().clear();
        for child in &children {
            self.core.unschedule(child);
            if previous.contains(child) {
                self.core.embed(owner, child);
                self.target.borrow_mut().push(child.clone());
            } else {
                self.push(owner, child);
            }
        }
    }

    pub(crate) fn writer(
        &self,
        owner: &Document,
        batch: Vec<AnyChild>,
    ) -> AssociationResult<Vec<Child<T>>> {
        let children = self.typecheck(batch)?;
        if !self.core.commits_on_assign(owner) {
            self.replace(owner, children.clone());
            return Ok(children);
        }

        self.ensure_loaded(owner);
        let snapshot = self.core.snapshot(owner, self.current());
        self.replace(owner, children.clone());

        let entries = self.current();
        let pending = self.core.pending();
        let committable = entries.iter().filter(|c| is_live(c)).all(Child::is_valid)
            && entries
                .iter()
                .filter(|c| c.is_marked_for_destruction())
                .chain(pending.iter())
                .all(Child::allows_destroy);
        if committable {
            self.apply_changes(owner);
        }
        if committable && self.is_settled() {
            debug!(
                association = self.core.name(),
                entries = children.len(),
                "assignment committed"
            );
            return Ok(children);
        }

        let previous = self.core.restore(owner, snapshot);
        *self.target.borrow_mut() = previous;
        warn!(association = self.core.name(), model = T::model_name(), "assignment rolled back");
        Err(AssociationError::not_applied(self.core.name()))
    }

    pub(crate) fn concat(&self, owner: &Document, children: Vec<Child<T>>) -> ConcatOutcome<T> {
        self.ensure_loaded(owner);
        for child in &children {
            self.core.unschedule(child);
            self.push(owner, child);
        }
        if self.core.commits_on_assign(owner) {
            let mut saved = true;
            for child in &children {
                saved &= child.save();
            }
            if !saved {
                warn!(
                    association = self.core.name(),
                    model = T::model_name(),
                    "appended children not saved"
                );
                return ConcatOutcome::SaveFailed;
            }
        }
        debug!(association = self.core.name(), appended = children.len(), "children appended");
        ConcatOutcome::Applied(self.current())
    }

    pub(crate) fn apply_changes(&self, owner: &Document) -> bool {
        self.ensure_loaded(owner);
        let entries = self.current();
        let ok = self.core.committing(|| {
            let mut ok = true;
            let mut removed = Vec::new();
            for child in &entries {
                if child.is_marked_for_destruction() {
                    if child.destroy() {
                        removed.push(child.clone());
                    } else {
                        ok = false;
                    }
                } else if child.is_destroyed() {
                    removed.push(child.clone());
                } else if !child.save() {
                    ok = false;
                }
            }
            self.target.borrow_mut().retain(|c| !removed.contains(c));
            self.core.record_destroyed(removed);
            self.core.destroy_pending() && ok
        });
        self.write_raw(owner);
        debug!(
            association = self.core.name(),
            entries = self.target.borrow().len(),
            ok,
            "changes applied"
        );
        ok
    }

    pub(crate) fn clear(&self, owner: &Document) -> bool {
        self.ensure_loaded(owner);
        let mut doomed: Vec<Child<T>> = self
            .current()
            .into_iter()
            .filter(Child::is_persisted)
            .collect();
        doomed.extend(self.core.pending());
        if !self.core.destroy_all(&doomed) {
            return false;
        }
        self.target.borrow_mut().clear();
        owner.write_raw(self.core.name(), RawValue::empty_list());
        debug!(association = self.core.name(), destroyed = doomed.len(), "cleared");
        true
    }

    pub(crate) fn is_settled(&self) -> bool {
        if !self.core.is_loaded() {
            return true;
        }
        self.target.borrow().iter().all(is_stored) && !self.core.has_pending()
    }
}

impl<T: Embeddable> ErasedAssociation for ManyState<T> {
    fn kind(&self) -> AssociationKind {
        AssociationKind::EmbedsMany
    }

    fn model(&self) -> &'static str {
        T::model_name()
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn std::any::Any> {
        self
    }

    fn is_loaded(&self) -> bool {
        self.core.is_loaded()
    }

    fn is_settled(&self) -> bool {
        ManyState::is_settled(self)
    }

    fn commit(&self, owner: &Document) -> bool {
        self.apply_changes(owner)
    }

    fn sync_raw(&self, owner: &Document) {
        if self.core.is_loaded() && !self.core.is_committing() {
            self.write_raw(owner);
        }
    }

    fn assign(&self, owner: &Document, assignment: Assignment) -> AssociationResult<()> {
        match assignment {
            Assignment::Many(children) => self.writer(owner, children).map(drop),
            Assignment::One(_) => Err(AssociationError::WrongShape {
                name: self.core.name().to_string(),
                declared: AssociationKind::EmbedsMany,
            }),
        }
    }
}

/// Handle to an ordered multi-child embedded association of a [`Document`].
pub struct EmbedsMany<T> {
    owner: Document,
    state: Rc<ManyState<T>>,
}

impl<T> Clone for EmbedsMany<T> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Embeddable> EmbedsMany<T> {
    pub(crate) fn new(owner: Document, state: Rc<ManyState<T>>) -> Self {
        Self { owner, state }
    }

    /// Replace the whole collection.
    ///
    /// The batch is type-checked before anything changes. For a persisted
    /// owner the new collection is committed right away; if any entering
    /// child is invalid or a displaced child refuses destruction, the target,
    /// the pending destructions, and the raw value are restored and
    /// [`AssociationError::ChangesNotApplied`] is returned.
    pub fn writer(&self, children: Vec<AnyChild>) -> AssociationResult<Vec<Child<T>>> {
        self.state.writer(&self.owner, children)
    }

    /// Replace the whole collection without persisting anything.
    pub fn replace(&self, children: Vec<AnyChild>) -> AssociationResult<Vec<Child<T>>> {
        let children = self.state.typecheck(children)?;
        self.state.replace(&self.owner, children.clone());
        Ok(children)
    }

    /// Append children in order. Nothing is appended if any of them is the
    /// wrong model.
    pub fn concat(&self, children: Vec<AnyChild>) -> AssociationResult<ConcatOutcome<T>> {
        let children = self.state.typecheck(children)?;
        Ok(self.state.concat(&self.owner, children))
    }

    /// Append one child of the right model.
    pub fn push(&self, child: Child<T>) -> ConcatOutcome<T> {
        self.state.concat(&self.owner, vec![child])
    }

    /// Read view over the target.
    pub fn view(&self) -> CollectionView<T> {
        CollectionView::new(self.clone())
    }

    /// Returns `true` if both handles share the same association state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl<T: Embeddable> Association for EmbedsMany<T> {
    type Entity = T;
    type Target = Vec<Child<T>>;
    type Reader = CollectionView<T>;

    fn owner(&self) -> &Document {
        &self.owner
    }

    fn name(&self) -> &str {
        self.state.core.name()
    }

    fn is_loaded(&self) -> bool {
        self.state.core.is_loaded()
    }

    fn target(&self) -> Vec<Child<T>> {
        self.state.target(&self.owner)
    }

    fn set_target(&self, target: Vec<Child<T>>) {
        self.state.set_target(&self.owner, target);
    }

    fn reader(&self, force: bool) -> CollectionView<T> {
        if force {
            self.reload();
        } else {
            self.state.ensure_loaded(&self.owner);
        }
        self.view()
    }

    fn reload(&self) -> Vec<Child<T>> {
        self.state.reload(&self.owner)
    }

    fn build(&self, attributes: Record) -> Child<T> {
        self.state.build(&self.owner, attributes)
    }

    fn clear(&self) -> bool {
        self.state.clear(&self.owner)
    }

    fn apply_changes(&self) -> bool {
        self.state.apply_changes(&self.owner)
    }

    fn is_settled(&self) -> bool {
        self.state.is_settled()
    }

    fn destroyed(&self) -> Vec<Child<T>> {
        self.state.core.destroyed()
    }
}

impl<T: Embeddable> fmt::Debug for EmbedsMany<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("EmbedsMany");
        s.field("name", &self.state.core.name());
        if self.state.core.is_loaded() {
            s.field("len", &self.state.target.borrow().len());
        } else {
            s.field("len", &"<not loaded>");
        }
        s.finish()
    }
}
