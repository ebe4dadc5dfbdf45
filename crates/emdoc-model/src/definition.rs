//! Per-(model, name) association descriptors.
//!
//! An [`AssociationDefinition`] is built once when the schema is declared and
//! is immutable afterwards. It carries the default supplier and the add
//! callbacks, and acts as the child factory for its association.

use std::fmt;
use std::rc::Rc;

use emdoc_types::{Lifecycle, RawValue, Record};

use crate::child::{Child, Embedder};
use crate::document::Document;
use crate::embeddable::Embeddable;

/// Produces the initial data for a new owner whose raw value is absent.
pub enum DefaultSupplier {
    /// Ignores the owner.
    Static(Box<dyn Fn() -> RawValue>),
    /// Computes the default from the owner.
    Owner(Box<dyn Fn(&Document) -> RawValue>),
}

impl DefaultSupplier {
    fn supply(&self, owner: &Document) -> RawValue {
        match self {
            Self::Static(f) => f(),
            Self::Owner(f) => f(owner),
        }
    }
}

impl fmt::Debug for DefaultSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(_) => f.write_str("DefaultSupplier::Static"),
            Self::Owner(_) => f.write_str("DefaultSupplier::Owner"),
        }
    }
}

/// A before-add or after-add hook.
///
/// The signature is fixed when the callback is registered, so invocation
/// never has to inspect arity.
pub enum AddCallback<T> {
    /// Receives only the owner.
    Owner(Box<dyn Fn(&Document)>),
    /// Receives the owner and the child being added.
    OwnerAndChild(Box<dyn Fn(&Document, &Child<T>)>),
}

impl<T> AddCallback<T> {
    pub fn owner(f: impl Fn(&Document) + 'static) -> Self {
        Self::Owner(Box::new(f))
    }

    pub fn with_child(f: impl Fn(&Document, &Child<T>) + 'static) -> Self {
        Self::OwnerAndChild(Box::new(f))
    }

    fn call(&self, owner: &Document, child: &Child<T>) {
        match self {
            Self::Owner(f) => f(owner),
            Self::OwnerAndChild(f) => f(owner, child),
        }
    }
}

impl<T> fmt::Debug for AddCallback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner(_) => f.write_str("AddCallback::Owner"),
            Self::OwnerAndChild(_) => f.write_str("AddCallback::OwnerAndChild"),
        }
    }
}

/// Immutable descriptor of one embedded association.
pub struct AssociationDefinition<T> {
    name: Rc<str>,
    default: Option<DefaultSupplier>,
    before_add: Vec<AddCallback<T>>,
    after_add: Vec<AddCallback<T>>,
}

impl<T: Embeddable> AssociationDefinition<T> {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Rc::from(name.as_ref()),
            default: None,
            before_add: Vec::new(),
            after_add: Vec::new(),
        }
    }

    /// Default data that does not depend on the owner.
    pub fn default(mut self, supplier: impl Fn() -> RawValue + 'static) -> Self {
        self.default = Some(DefaultSupplier::Static(Box::new(supplier)));
        self
    }

    /// Default data computed from the owner.
    pub fn default_from_owner(
        mut self,
        supplier: impl Fn(&Document) -> RawValue + 'static,
    ) -> Self {
        self.default = Some(DefaultSupplier::Owner(Box::new(supplier)));
        self
    }

    pub fn before_add(mut self, callback: AddCallback<T>) -> Self {
        self.before_add.push(callback);
        self
    }

    pub fn after_add(mut self, callback: AddCallback<T>) -> Self {
        self.after_add.push(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Rc<str> {
        Rc::clone(&self.name)
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    /// Invoke the default supplier, if any.
    pub fn build_default(&self, owner: &Document) -> Option<RawValue> {
        self.default.as_ref().map(|supplier| supplier.supply(owner))
    }

    /// The default as a single-record template for `build`. List defaults
    /// seed a whole collection and are not merged into individual builds.
    pub(crate) fn default_record(&self, owner: &Document) -> Option<Record> {
        match self.build_default(owner)? {
            RawValue::Record(record) => Some(record),
            RawValue::Absent | RawValue::List(_) => None,
        }
    }

    pub fn run_before_add(&self, owner: &Document, child: &Child<T>) {
        for callback in &self.before_add {
            callback.call(owner, child);
        }
    }

    pub fn run_after_add(&self, owner: &Document, child: &Child<T>) {
        for callback in &self.after_add {
            callback.call(owner, child);
        }
    }

    /// Materialize a child from stored data. The result is persisted.
    pub fn instantiate(&self, owner: &Document, record: &Record) -> Child<T> {
        self.construct(owner, record, Lifecycle::Persisted)
    }

    /// Construct a new, unsaved child from the default template merged with
    /// `attributes`.
    pub fn build(&self, owner: &Document, attributes: Record) -> Child<T> {
        let mut record = self.default_record(owner).unwrap_or_default();
        record.extend(attributes);
        self.construct(owner, &record, Lifecycle::New)
    }

    pub(crate) fn construct(
        &self,
        owner: &Document,
        record: &Record,
        lifecycle: Lifecycle,
    ) -> Child<T> {
        let embedder = Embedder::new(owner, self.shared_name());
        let data = T::from_record(record, Some(owner));
        Child::from_parts(data, lifecycle, Some(embedder))
    }
}

impl<T> fmt::Debug for AssociationDefinition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssociationDefinition")
            .field("name", &self.name)
            .field("default", &self.default)
            .field("before_add", &self.before_add.len())
            .field("after_add", &self.after_add.len())
            .finish()
    }
}
