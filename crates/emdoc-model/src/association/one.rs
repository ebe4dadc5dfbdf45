//! Zero-or-one embedded child.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use emdoc_types::{RawValue, Record};
use tracing::{debug, warn};

use super::{is_live, is_stored, Association, AssociationCore, ErasedAssociation, Loaded};
use crate::child::{AnyChild, Child};
use crate::definition::AssociationDefinition;
use crate::document::{Assignment, Document};
use crate::embeddable::Embeddable;
use crate::error::{AssociationError, AssociationResult};
use crate::schema::AssociationKind;

pub(crate) struct OneState<T> {
    core: AssociationCore<T>,
    target: RefCell<Option<Child<T>>>,
}

impl<T: Embeddable> OneState<T> {
    pub(crate) fn new(definition: Rc<AssociationDefinition<T>>) -> Self {
        Self {
            core: AssociationCore::new(definition),
            target: RefCell::new(None),
        }
    }

    fn current(&self) -> Option<Child<T>> {
        self.target.borrow().clone()
    }

    fn ensure_loaded(&self, owner: &Document) {
        if self.core.is_loaded() {
            return;
        }
        match self.core.load(owner) {
            Loaded::Stored(children) => {
                *self.target.borrow_mut() = children.into_iter().next();
                self.core.mark_loaded();
            }
            Loaded::Seeded(children) => {
                *self.target.borrow_mut() = None;
                self.core.mark_loaded();
                if let Some(child) = children.into_iter().next() {
                    self.install(owner, &child);
                }
            }
        }
    }

    fn install(&self, owner: &Document, child: &Child<T>) {
        self.core.admit(owner, child, || {
            *self.target.borrow_mut() = Some(child.clone());
        });
    }

    /// Queue the current occupant for destruction unless it is `incoming`.
    fn displace(&self, incoming: Option<&Child<T>>) {
        if let Some(previous) = self.current() {
            if incoming != Some(&previous) {
                self.core.schedule_destruction(&previous);
            }
        }
    }

    fn stored_raw(&self) -> RawValue {
        self.current()
            .filter(is_stored)
            .map(|child| child.to_record())
            .into()
    }

    fn write_raw(&self, owner: &Document) {
        owner.write_raw(self.core.name(), self.stored_raw());
    }

    fn typecheck(&self, incoming: Option<AnyChild>) -> AssociationResult<Option<Child<T>>> {
        match incoming {
            Some(any) => Ok(self.core.typecheck(vec![any])?.pop()),
            None => Ok(None),
        }
    }

    pub(crate) fn target(&self, owner: &Document) -> Option<Child<T>> {
        self.ensure_loaded(owner);
        self.current()
    }

    pub(crate) fn set_target(&self, owner: &Document, target: Option<Child<T>>) {
        if let Some(child) = &target {
            self.core.embed(owner, child);
        }
        *self.target.borrow_mut() = target;
        self.core.mark_loaded();
    }

    pub(crate) fn reload(&self, owner: &Document) -> Option<Child<T>> {
        self.core.reset();
        *self.target.borrow_mut() = None;
        self.target(owner)
    }

    pub(crate) fn build(&self, owner: &Document, attributes: Record) -> Child<T> {
        self.ensure_loaded(owner);
        let child = self.core.definition().build(owner, attributes);
        self.displace(Some(&child));
        self.install(owner, &child);
        child
    }

    pub(crate) fn replace(&self, owner: &Document, incoming: Option<Child<T>>) {
        self.ensure_loaded(owner);
        self.displace(incoming.as_ref());
        match incoming {
            Some(child) if self.current().as_ref() == Some(&child) => {
                self.core.embed(owner, &child);
            }
            Some(child) => {
                self.core.unschedule(&child);
                self.install(owner, &child);
            }
            None => *self.target.borrow_mut() = None,
        }
    }

    pub(crate) fn writer(
        &self,
        owner: &Document,
        incoming: Option<AnyChild>,
    ) -> AssociationResult<Option<Child<T>>> {
        let incoming = self.typecheck(incoming)?;
        if !self.core.commits_on_assign(owner) {
            self.replace(owner, incoming.clone());
            return Ok(incoming);
        }

        self.ensure_loaded(owner);
        let snapshot = self.core.snapshot(owner, self.current());
        self.replace(owner, incoming.clone());

        let current = self.current();
        let pending = self.core.pending();
        let committable = current.as_ref().filter(|c| is_live(c)).map_or(true, |c| c.is_valid())
            && current
                .iter()
                .filter(|c| c.is_marked_for_destruction())
                .chain(pending.iter())
                .all(Child::allows_destroy);
        if committable {
            self.apply_changes(owner);
        }
        if committable && self.is_settled() {
            debug!(association = self.core.name(), "assignment committed");
            return Ok(incoming);
        }

        let previous = self.core.restore(owner, snapshot);
        *self.target.borrow_mut() = previous;
        warn!(association = self.core.name(), model = T::model_name(), "assignment rolled back");
        Err(AssociationError::not_applied(self.core.name()))
    }

    pub(crate) fn apply_changes(&self, owner: &Document) -> bool {
        self.ensure_loaded(owner);
        let current = self.current();
        let ok = self.core.committing(|| {
            let mut ok = true;
            let mut removed = false;
            if let Some(child) = &current {
                if child.is_marked_for_destruction() {
                    if child.destroy() {
                        removed = true;
                    } else {
                        ok = false;
                    }
                } else if child.is_destroyed() {
                    removed = true;
                } else if !child.save() {
                    ok = false;
                }
            }
            if let Some(child) = current.as_ref().filter(|_| removed) {
                let mut target = self.target.borrow_mut();
                if target.as_ref() == Some(child) {
                    *target = None;
                }
                drop(target);
                self.core.record_destroyed([child.clone()]);
            }
            self.core.destroy_pending() && ok
        });
        self.write_raw(owner);
        debug!(association = self.core.name(), ok, "changes applied");
        ok
    }

    pub(crate) fn clear(&self, owner: &Document) -> bool {
        self.ensure_loaded(owner);
        let mut doomed: Vec<Child<T>> =
            self.current().filter(Child::is_persisted).into_iter().collect();
        doomed.extend(self.core.pending());
        if !self.core.destroy_all(&doomed) {
            return false;
        }
        *self.target.borrow_mut() = None;
        owner.write_raw(self.core.name(), RawValue::Absent);
        debug!(association = self.core.name(), destroyed = doomed.len(), "cleared");
        true
    }

    pub(crate) fn is_settled(&self) -> bool {
        if !self.core.is_loaded() {
            return true;
        }
        self.current().map_or(true, |child| is_stored(&child)) && !self.core.has_pending()
    }
}

impl<T: Embeddable> ErasedAssociation for OneState<T> {
    fn kind(&self) -> AssociationKind {
        AssociationKind::EmbedsOne
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
        OneState::is_settled(self)
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
            Assignment::One(child) => self.writer(owner, child).map(drop),
            Assignment::Many(_) => Err(AssociationError::WrongShape {
                name: self.core.name().to_string(),
                declared: AssociationKind::EmbedsOne,
            }),
        }
    }
}

/// Handle to a zero-or-one embedded association of a [`Document`].
pub struct EmbedsOne<T> {
    owner: Document,
    state: Rc<OneState<T>>,
}

impl<T> Clone for EmbedsOne<T> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Embeddable> EmbedsOne<T> {
    pub(crate) fn new(owner: Document, state: Rc<OneState<T>>) -> Self {
        Self { owner, state }
    }

    /// Replace the child. For a persisted owner the change is committed
    /// right away: an invalid newcomer or a vetoed destruction of the
    /// previous child restores the prior state and returns
    /// [`AssociationError::ChangesNotApplied`].
    pub fn writer(&self, child: Option<AnyChild>) -> AssociationResult<Option<Child<T>>> {
        self.state.writer(&self.owner, child)
    }

    /// Replace the child without persisting anything. A persisted previous
    /// child is destroyed on the next commit.
    pub fn replace(&self, child: Option<AnyChild>) -> AssociationResult<Option<Child<T>>> {
        let child = self.state.typecheck(child)?;
        self.state.replace(&self.owner, child.clone());
        Ok(child)
    }

    /// Returns `true` if both handles share the same association state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl<T: Embeddable> Association for EmbedsOne<T> {
    type Entity = T;
    type Target = Option<Child<T>>;
    type Reader = Option<Child<T>>;

    fn owner(&self) -> &Document {
        &self.owner
    }

    fn name(&self) -> &str {
        self.state.core.name()
    }

    fn is_loaded(&self) -> bool {
        self.state.core.is_loaded()
    }

    fn target(&self) -> Option<Child<T>> {
        self.state.target(&self.owner)
    }

    fn set_target(&self, target: Option<Child<T>>) {
        self.state.set_target(&self.owner, target);
    }

    fn reader(&self, force: bool) -> Option<Child<T>> {
        if force {
            self.reload()
        } else {
            self.target()
        }
    }

    fn reload(&self) -> Option<Child<T>> {
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

impl<T: Embeddable + fmt::Debug> fmt::Debug for EmbedsOne<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("EmbedsOne");
        s.field("name", &self.state.core.name());
        if self.state.core.is_loaded() {
            s.field("target", &self.state.current());
        } else {
            s.field("target", &"<not loaded>");
        }
        s.finish()
    }
}
