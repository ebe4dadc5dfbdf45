//! The owner of embedded associations.
//!
//! A [`Document`] holds a plain attribute bag, one raw slot per declared
//! association, a persisted flag, and the per-name association states it has
//! created so far. Association states are created on first access and live
//! as long as the document.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};

use emdoc_types::{RawValue, Record};
use serde_json::Value;
use tracing::debug;

use crate::association::many::{EmbedsMany, ManyState};
use crate::association::one::{EmbedsOne, OneState};
use crate::association::ErasedAssociation;
use crate::child::AnyChild;
use crate::embeddable::Embeddable;
use crate::error::{AssociationError, AssociationResult};
use crate::schema::{AssociationKind, Schema};

struct DocumentInner {
    schema: Rc<Schema>,
    persisted: Cell<bool>,
    attributes: RefCell<BTreeMap<String, Value>>,
    raw: RefCell<BTreeMap<String, RawValue>>,
    associations: RefCell<HashMap<String, Rc<dyn ErasedAssociation>>>,
}

/// A host document that embeds children.
///
/// Cloning produces another handle to the same document.
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

/// A non-owning handle to a [`Document`].
#[derive(Clone)]
pub struct WeakDocument {
    inner: Weak<DocumentInner>,
}

impl WeakDocument {
    pub fn upgrade(&self) -> Option<Document> {
        self.inner.upgrade().map(|inner| Document { inner })
    }
}

impl fmt::Debug for WeakDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDocument")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// A dynamically typed value for an owner-level association write.
#[derive(Clone, Debug)]
pub enum Assignment {
    One(Option<AnyChild>),
    Many(Vec<AnyChild>),
}

impl Document {
    /// A new, unpersisted document.
    pub fn new(schema: &Rc<Schema>) -> Self {
        Self {
            inner: Rc::new(DocumentInner {
                schema: Rc::clone(schema),
                persisted: Cell::new(false),
                attributes: RefCell::new(BTreeMap::new()),
                raw: RefCell::new(BTreeMap::new()),
                associations: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// A persisted document loaded from stored data.
    ///
    /// Keys naming a declared association become that association's raw
    /// value; every other key becomes a plain attribute.
    pub fn instantiate(schema: &Rc<Schema>, record: Record) -> AssociationResult<Self> {
        let document = Self::new(schema);
        for (key, value) in record {
            if schema.declares(&key) {
                let raw = RawValue::try_from(value).map_err(|source| AssociationError::InvalidRaw {
                    name: key.clone(),
                    source,
                })?;
                document.write_raw(&key, raw);
            } else {
                document.set_attribute(&key, value);
            }
        }
        document.mark_persisted();
        Ok(document)
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.inner.schema
    }

    pub fn is_persisted(&self) -> bool {
        self.inner.persisted.get()
    }

    pub fn is_new(&self) -> bool {
        !self.is_persisted()
    }

    pub fn mark_persisted(&self) {
        self.inner.persisted.set(true);
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.inner.attributes.borrow().get(name).cloned()
    }

    pub fn set_attribute(&self, name: &str, value: Value) {
        self.inner
            .attributes
            .borrow_mut()
            .insert(name.to_string(), value);
    }

    /// The stored form of an association. Unset slots read as absent.
    pub fn read_raw(&self, name: &str) -> RawValue {
        self.inner
            .raw
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn write_raw(&self, name: &str, raw: RawValue) {
        self.inner.raw.borrow_mut().insert(name.to_string(), raw);
    }

    /// The single-child association `name`.
    pub fn embeds_one<T: Embeddable>(&self, name: &str) -> AssociationResult<EmbedsOne<T>> {
        let state = self.typed_state(name, AssociationKind::EmbedsOne)?;
        let model = state.model();
        let state = state
            .into_any()
            .downcast::<OneState<T>>()
            .map_err(|_| self.model_mismatch::<T>(name, model))?;
        Ok(EmbedsOne::new(self.clone(), state))
    }

    /// The multi-child association `name`.
    pub fn embeds_many<T: Embeddable>(&self, name: &str) -> AssociationResult<EmbedsMany<T>> {
        let state = self.typed_state(name, AssociationKind::EmbedsMany)?;
        let model = state.model();
        let state = state
            .into_any()
            .downcast::<ManyState<T>>()
            .map_err(|_| self.model_mismatch::<T>(name, model))?;
        Ok(EmbedsMany::new(self.clone(), state))
    }

    /// Owner-level write: delegates to the association's writer.
    pub fn assign(&self, name: &str, assignment: Assignment) -> AssociationResult<()> {
        let state = self.association_state(name)?;
        state.assign(self, assignment)
    }

    /// Names of associations whose target has been loaded.
    pub fn loaded_associations(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .associations
            .borrow()
            .iter()
            .filter(|(_, state)| state.is_loaded())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Commit every loaded association. Returns `false` if any entry stayed
    /// unsaved or any destruction did not complete.
    pub fn save(&self) -> bool {
        self.try_save().is_ok()
    }

    /// Commit every loaded association and mark the document persisted.
    ///
    /// Every association is committed even after one fails; the error names
    /// the first unsettled association in declaration order.
    pub fn try_save(&self) -> AssociationResult<()> {
        let mut unsettled = None;
        for name in self.inner.schema.association_names() {
            let state = self.inner.associations.borrow().get(name).cloned();
            let Some(state) = state.filter(|s| s.is_loaded()) else {
                continue;
            };
            state.commit(self);
            if !state.is_settled() && unsettled.is_none() {
                unsettled = Some(name.to_string());
            }
        }
        match unsettled {
            Some(name) => Err(AssociationError::not_applied(name)),
            None => {
                self.mark_persisted();
                debug!(model = self.inner.schema.model(), "document saved");
                Ok(())
            }
        }
    }

    pub fn downgrade(&self) -> WeakDocument {
        WeakDocument {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Returns `true` if both handles point at the same document.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Rewrite the raw value of `name` after one of its children changed
    /// persistence state on its own.
    pub(crate) fn sync_embedded(&self, name: &str) {
        let state = self.inner.associations.borrow().get(name).cloned();
        if let Some(state) = state {
            state.sync_raw(self);
        }
    }

    fn association_state(&self, name: &str) -> AssociationResult<Rc<dyn ErasedAssociation>> {
        if let Some(state) = self.inner.associations.borrow().get(name) {
            return Ok(Rc::clone(state));
        }
        let declaration = self.inner.schema.declaration(name).ok_or_else(|| {
            AssociationError::UnknownAssociation {
                model: self.inner.schema.model().to_string(),
                name: name.to_string(),
            }
        })?;
        let state = declaration.instantiate();
        self.inner
            .associations
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&state));
        Ok(state)
    }

    fn typed_state(
        &self,
        name: &str,
        kind: AssociationKind,
    ) -> AssociationResult<Rc<dyn ErasedAssociation>> {
        let state = self.association_state(name)?;
        if state.kind() != kind {
            return Err(AssociationError::WrongShape {
                name: name.to_string(),
                declared: state.kind(),
            });
        }
        Ok(state)
    }

    fn model_mismatch<T: Embeddable>(
        &self,
        name: &str,
        declared: &'static str,
    ) -> AssociationError {
        AssociationError::TypeMismatch {
            association: name.to_string(),
            expected: declared,
            found: T::model_name(),
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Document {}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("model", &self.inner.schema.model())
            .field("persisted", &self.is_persisted())
            .field("attributes", &*self.inner.attributes.borrow())
            .field("raw", &*self.inner.raw.borrow())
            .finish()
    }
}
