//! Model schemas: which embedded associations a document declares.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::association::many::ManyState;
use crate::association::one::OneState;
use crate::association::ErasedAssociation;
use crate::config::EmbedConfig;
use crate::definition::AssociationDefinition;
use crate::embeddable::Embeddable;

/// Cardinality of an embedded association.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    EmbedsOne,
    EmbedsMany,
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmbedsOne => write!(f, "embeds_one"),
            Self::EmbedsMany => write!(f, "embeds_many"),
        }
    }
}

/// A declared association with its model type erased.
pub(crate) trait Declaration {
    fn name(&self) -> &str;
    fn kind(&self) -> AssociationKind;
    fn model(&self) -> &'static str;
    /// Fresh per-document state for this association.
    fn instantiate(&self) -> Rc<dyn ErasedAssociation>;
}

struct Declared<T> {
    kind: AssociationKind,
    definition: Rc<AssociationDefinition<T>>,
}

impl<T: Embeddable> Declaration for Declared<T> {
    fn name(&self) -> &str {
        self.definition.name()
    }

    fn kind(&self) -> AssociationKind {
        self.kind
    }

    fn model(&self) -> &'static str {
        T::model_name()
    }

    fn instantiate(&self) -> Rc<dyn ErasedAssociation> {
        let definition = Rc::clone(&self.definition);
        match self.kind {
            AssociationKind::EmbedsOne => {
                Rc::new(OneState::new(definition)) as Rc<dyn ErasedAssociation>
            }
            AssociationKind::EmbedsMany => Rc::new(ManyState::new(definition)),
        }
    }
}

/// The embedded associations of one document model.
///
/// Declaring a name twice replaces the earlier declaration.
pub struct Schema {
    model: String,
    config: EmbedConfig,
    declarations: Vec<Rc<dyn Declaration>>,
}

impl Schema {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            config: EmbedConfig::default(),
            declarations: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EmbedConfig) -> Self {
        self.config = config;
        self
    }

    /// Declare a zero-or-one child association.
    pub fn embeds_one<T: Embeddable>(self, definition: AssociationDefinition<T>) -> Self {
        self.declare(AssociationKind::EmbedsOne, definition)
    }

    /// Declare an ordered multi-child association.
    pub fn embeds_many<T: Embeddable>(self, definition: AssociationDefinition<T>) -> Self {
        self.declare(AssociationKind::EmbedsMany, definition)
    }

    /// Finish declaration. Documents share the schema.
    pub fn into_shared(self) -> Rc<Self> {
        Rc::new(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    pub fn declares(&self, name: &str) -> bool {
        self.declaration(name).is_some()
    }

    pub fn kind_of(&self, name: &str) -> Option<AssociationKind> {
        self.declaration(name).map(|d| d.kind())
    }

    /// Declared association names, in declaration order.
    pub fn association_names(&self) -> Vec<&str> {
        self.declarations.iter().map(|d| d.name()).collect()
    }

    pub(crate) fn declaration(&self, name: &str) -> Option<&Rc<dyn Declaration>> {
        self.declarations.iter().find(|d| d.name() == name)
    }

    fn declare<T: Embeddable>(
        mut self,
        kind: AssociationKind,
        definition: AssociationDefinition<T>,
    ) -> Self {
        let declared: Rc<dyn Declaration> = Rc::new(Declared {
            kind,
            definition: Rc::new(definition),
        });
        match self
            .declarations
            .iter()
            .position(|d| d.name() == declared.name())
        {
            Some(index) => self.declarations[index] = declared,
            None => self.declarations.push(declared),
        }
        self
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let associations: Vec<String> = self
            .declarations
            .iter()
            .map(|d| format!("{} {}: {}", d.kind(), d.name(), d.model()))
            .collect();
        f.debug_struct("Schema")
            .field("model", &self.model)
            .field("associations", &associations)
            .field("config", &self.config)
            .finish()
    }
}
