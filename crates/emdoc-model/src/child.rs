//! Shared handles to embedded children.
//!
//! A [`Child`] is a reference-counted handle: the caller that built it, the
//! association target, and the `destroyed` list can all hold the same entity.
//! Equality is identity. [`AnyChild`] erases the model type so batches of
//! arbitrary children can be type-checked before any of them is admitted.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use emdoc_types::{DestructionVeto, Lifecycle, Record, ValidationFailure};
use tracing::{debug, warn};

use crate::document::{Document, WeakDocument};
use crate::embeddable::Embeddable;

/// Back-reference from a child to the association that holds it.
///
/// The owner is held weakly: the owner already owns the association state
/// that owns the child.
#[derive(Clone)]
pub(crate) struct Embedder {
    owner: WeakDocument,
    association: Rc<str>,
}

impl Embedder {
    pub(crate) fn new(owner: &Document, association: Rc<str>) -> Self {
        Self {
            owner: owner.downgrade(),
            association,
        }
    }
}

struct ChildInner<T> {
    data: RefCell<T>,
    lifecycle: Cell<Lifecycle>,
    marked: Cell<bool>,
    embedder: RefCell<Option<Embedder>>,
}

/// A handle to an embedded child entity.
pub struct Child<T> {
    inner: Rc<ChildInner<T>>,
}

impl<T> Clone for Child<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Child<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for Child<T> {}

impl<T: Embeddable> Child<T> {
    /// Wrap a freshly constructed model. The child is new and not embedded.
    pub fn new(data: T) -> Self {
        Self::from_parts(data, Lifecycle::New, None)
    }

    pub(crate) fn from_parts(data: T, lifecycle: Lifecycle, embedder: Option<Embedder>) -> Self {
        Self {
            inner: Rc::new(ChildInner {
                data: RefCell::new(data),
                lifecycle: Cell::new(lifecycle),
                marked: Cell::new(false),
                embedder: RefCell::new(embedder),
            }),
        }
    }

    /// Borrow the model.
    ///
    /// # Panics
    ///
    /// Panics if the model is currently borrowed mutably.
    pub fn get(&self) -> Ref<'_, T> {
        self.inner.data.borrow()
    }

    /// Borrow the model mutably.
    ///
    /// # Panics
    ///
    /// Panics if the model is currently borrowed.
    pub fn get_mut(&self) -> RefMut<'_, T> {
        self.inner.data.borrow_mut()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle.get()
    }

    pub fn is_new(&self) -> bool {
        self.lifecycle().is_new()
    }

    pub fn is_persisted(&self) -> bool {
        self.lifecycle().is_persisted()
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle().is_destroyed()
    }

    /// Schedule the child for destruction on the next commit.
    pub fn mark_for_destruction(&self) {
        self.inner.marked.set(true);
    }

    pub fn is_marked_for_destruction(&self) -> bool {
        self.inner.marked.get()
    }

    /// Run the model's validation.
    pub fn validate(&self) -> Result<(), ValidationFailure> {
        self.inner
            .data
            .borrow()
            .validate()
            .map_err(|violations| ValidationFailure::new(T::model_name(), violations))
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Best-effort save. Returns `false` and leaves the lifecycle untouched
    /// when validation fails.
    pub fn save(&self) -> bool {
        self.try_save().is_ok()
    }

    /// Save, surfacing the validation failure.
    ///
    /// On success the child becomes persisted and, if it is embedded, the
    /// owner's raw value is rewritten from the association target.
    pub fn try_save(&self) -> Result<(), ValidationFailure> {
        self.validate()?;
        self.inner.lifecycle.set(Lifecycle::Persisted);
        debug!(model = T::model_name(), "child saved");
        self.notify_embedder();
        Ok(())
    }

    /// Whether the host-level destroy hook would let this child go.
    pub fn allows_destroy(&self) -> bool {
        self.inner.data.borrow().allow_destroy()
    }

    /// Best-effort destroy. Returns `false` when vetoed.
    pub fn destroy(&self) -> bool {
        self.try_destroy().is_ok()
    }

    /// Destroy the child, bypassing the mark phase.
    pub fn try_destroy(&self) -> Result<(), DestructionVeto> {
        if !self.allows_destroy() {
            warn!(model = T::model_name(), "destruction vetoed");
            return Err(DestructionVeto::new(T::model_name()));
        }
        self.inner.lifecycle.set(Lifecycle::Destroyed);
        self.inner.marked.set(false);
        debug!(model = T::model_name(), "child destroyed");
        self.notify_embedder();
        Ok(())
    }

    /// The owner this child is embedded in, if it is still alive.
    pub fn embedder(&self) -> Option<Document> {
        self.inner
            .embedder
            .borrow()
            .as_ref()
            .and_then(|e| e.owner.upgrade())
    }

    /// Name of the association this child was last admitted to.
    pub fn embedded_as(&self) -> Option<String> {
        self.inner
            .embedder
            .borrow()
            .as_ref()
            .map(|e| e.association.to_string())
    }

    /// Serialize the model.
    pub fn to_record(&self) -> Record {
        self.inner.data.borrow().to_record()
    }

    /// Returns `true` if both handles point at the same entity.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Put back the state a destroy overwrote, without touching the raw value.
    pub(crate) fn reinstate(&self, lifecycle: Lifecycle, marked: bool) {
        self.inner.lifecycle.set(lifecycle);
        self.inner.marked.set(marked);
    }

    pub(crate) fn set_embedder(&self, embedder: Embedder) {
        *self.inner.embedder.borrow_mut() = Some(embedder);
    }

    fn notify_embedder(&self) {
        let binding = self.inner.embedder.borrow().clone();
        let Some(embedder) = binding else {
            return;
        };
        if let Some(owner) = embedder.owner.upgrade() {
            owner.sync_embedded(&embedder.association);
        }
    }
}

impl<T: Embeddable + fmt::Debug> fmt::Debug for Child<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(T::model_name());
        s.field("lifecycle", &self.lifecycle());
        if self.is_marked_for_destruction() {
            s.field("marked_for_destruction", &true);
        }
        match self.inner.data.try_borrow() {
            Ok(data) => s.field("data", &*data),
            Err(_) => s.field("data", &"<borrowed>"),
        };
        s.finish()
    }
}

/// A child of any model.
///
/// Used where a batch comes from outside the typed API (owner-level
/// assignment, heterogeneous inputs) and must be checked against the
/// association's model before admission.
#[derive(Clone)]
pub struct AnyChild {
    inner: Rc<dyn Any>,
    model: &'static str,
}

impl AnyChild {
    /// Model name of the wrapped child.
    pub fn model(&self) -> &'static str {
        self.model
    }

    /// Recover the typed handle, or `None` if the child is another model.
    pub fn downcast<T: Embeddable>(&self) -> Option<Child<T>> {
        Rc::clone(&self.inner)
            .downcast::<ChildInner<T>>()
            .ok()
            .map(|inner| Child { inner })
    }

    pub fn is<T: Embeddable>(&self) -> bool {
        self.inner.is::<ChildInner<T>>()
    }
}

impl<T: Embeddable> From<Child<T>> for AnyChild {
    fn from(child: Child<T>) -> Self {
        let inner: Rc<dyn Any> = child.inner;
        Self {
            inner,
            model: T::model_name(),
        }
    }
}

impl<T: Embeddable> From<&Child<T>> for AnyChild {
    fn from(child: &Child<T>) -> Self {
        child.clone().into()
    }
}

impl fmt::Debug for AnyChild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnyChild").field(&self.model).finish()
    }
}
