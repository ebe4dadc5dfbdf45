//! Test models and documents shared by the unit tests.

use std::rc::Rc;

use emdoc_types::{RawValue, Record, Violations};
use serde_json::{json, Value};

use crate::association::Association;
use crate::definition::AssociationDefinition;
use crate::document::{Document, WeakDocument};
use crate::embeddable::Embeddable;
use crate::schema::Schema;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn attrs(value: Value) -> Record {
    match value {
        Value::Object(record) => record,
        other => panic!("not a record: {other}"),
    }
}

pub fn records(value: Value) -> RawValue {
    RawValue::try_from(value).unwrap()
}

fn string_field(record: &Record, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_owned)
}

fn require(field: &str, value: &Option<String>) -> Result<(), Violations> {
    let mut violations = Violations::new();
    if value.as_deref().map_or(true, str::is_empty) {
        violations.add(field, "can't be blank");
    }
    violations.into_result()
}

#[derive(Clone, Debug, PartialEq)]
pub struct Project {
    pub title: Option<String>,
}

impl Project {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
        }
    }

    pub fn untitled() -> Self {
        Self { title: None }
    }
}

impl Embeddable for Project {
    fn model_name() -> &'static str {
        "Project"
    }

    fn from_record(record: &Record, _embedder: Option<&Document>) -> Self {
        Self {
            title: string_field(record, "title"),
        }
    }

    fn to_record(&self) -> Record {
        attrs(json!({ "title": self.title }))
    }

    fn validate(&self) -> Result<(), Violations> {
        require("title", &self.title)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Author {
    pub name: Option<String>,
}

impl Author {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
        }
    }

    pub fn anonymous() -> Self {
        Self { name: None }
    }
}

impl Embeddable for Author {
    fn model_name() -> &'static str {
        "Author"
    }

    fn from_record(record: &Record, _embedder: Option<&Document>) -> Self {
        Self {
            name: string_field(record, "name"),
        }
    }

    fn to_record(&self) -> Record {
        attrs(json!({ "name": self.name }))
    }

    fn validate(&self) -> Result<(), Violations> {
        require("name", &self.name)
    }
}

/// A project whose destruction is always vetoed.
#[derive(Clone, Debug)]
pub struct LockedProject(pub Project);

impl Embeddable for LockedProject {
    fn model_name() -> &'static str {
        "LockedProject"
    }

    fn from_record(record: &Record, embedder: Option<&Document>) -> Self {
        Self(Project::from_record(record, embedder))
    }

    fn to_record(&self) -> Record {
        self.0.to_record()
    }

    fn validate(&self) -> Result<(), Violations> {
        self.0.validate()
    }

    fn allow_destroy(&self) -> bool {
        false
    }
}

#[derive(Clone, Debug)]
pub struct LockedAuthor(pub Author);

impl Embeddable for LockedAuthor {
    fn model_name() -> &'static str {
        "LockedAuthor"
    }

    fn from_record(record: &Record, embedder: Option<&Document>) -> Self {
        Self(Author::from_record(record, embedder))
    }

    fn to_record(&self) -> Record {
        self.0.to_record()
    }

    fn validate(&self) -> Result<(), Violations> {
        self.0.validate()
    }

    fn allow_destroy(&self) -> bool {
        false
    }
}

/// Appends the owner's `name` attribute to its title on construction.
#[derive(Clone, Debug)]
pub struct StampedProject {
    pub title: Option<String>,
}

impl Embeddable for StampedProject {
    fn model_name() -> &'static str {
        "StampedProject"
    }

    fn from_record(record: &Record, embedder: Option<&Document>) -> Self {
        let suffix = embedder
            .and_then(|owner| owner.attribute("name"))
            .and_then(|name| name.as_str().map(str::to_owned))
            .unwrap_or_default();
        Self {
            title: string_field(record, "title").map(|title| format!("{title}{suffix}")),
        }
    }

    fn to_record(&self) -> Record {
        attrs(json!({ "title": self.title }))
    }
}

#[derive(Clone, Debug)]
pub struct Dummy;

impl Embeddable for Dummy {
    fn model_name() -> &'static str {
        "Dummy"
    }

    fn from_record(_record: &Record, _embedder: Option<&Document>) -> Self {
        Self
    }

    fn to_record(&self) -> Record {
        Record::new()
    }
}

/// Refuses destruction while it is the last live entry of its owner's
/// `items`.
#[derive(Clone, Debug)]
pub struct LastStanding {
    pub title: Option<String>,
    owner: Option<WeakDocument>,
}

impl Embeddable for LastStanding {
    fn model_name() -> &'static str {
        "LastStanding"
    }

    fn from_record(record: &Record, embedder: Option<&Document>) -> Self {
        Self {
            title: string_field(record, "title"),
            owner: embedder.map(Document::downgrade),
        }
    }

    fn to_record(&self) -> Record {
        attrs(json!({ "title": self.title }))
    }

    fn allow_destroy(&self) -> bool {
        let Some(owner) = self.owner.as_ref().and_then(WeakDocument::upgrade) else {
            return true;
        };
        let items = owner.embeds_many::<LastStanding>("items").unwrap();
        items.target().iter().filter(|c| !c.is_destroyed()).count() > 1
    }
}

/// A team carrying its own document, which embeds many `Project`s as
/// `members`. Validating the team commits the roster.
#[derive(Debug)]
pub struct Team {
    pub name: Option<String>,
    pub roster: Document,
}

impl Team {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            roster: Document::new(&roster_schema()),
        }
    }
}

impl Embeddable for Team {
    fn model_name() -> &'static str {
        "Team"
    }

    fn from_record(record: &Record, _embedder: Option<&Document>) -> Self {
        let mut raw = Record::new();
        if let Some(members) = record.get("members") {
            raw.insert("members".to_string(), members.clone());
        }
        Self {
            name: string_field(record, "name"),
            roster: Document::instantiate(&roster_schema(), raw).unwrap(),
        }
    }

    fn to_record(&self) -> Record {
        attrs(json!({
            "name": self.name,
            "members": Value::from(self.roster.read_raw("members")),
        }))
    }

    fn validate(&self) -> Result<(), Violations> {
        let mut violations = Violations::new();
        if let Err(err) = self.roster.try_save() {
            violations.add("members", err.to_string());
        }
        violations.into_result()
    }
}

pub fn roster_schema() -> Rc<Schema> {
    Schema::new("Roster")
        .embeds_many(AssociationDefinition::<Project>::new("members"))
        .into_shared()
}

/// `Shelf` embeds many `LastStanding` entries as `items`.
pub fn shelf_schema() -> Rc<Schema> {
    Schema::new("Shelf")
        .embeds_many(AssociationDefinition::<LastStanding>::new("items"))
        .into_shared()
}

/// `Org` embeds many `Team`s as `teams`.
pub fn org_schema() -> Rc<Schema> {
    Schema::new("Org")
        .embeds_many(AssociationDefinition::<Team>::new("teams"))
        .into_shared()
}

/// `Book` embeds one `Author` as `author`.
pub fn book_schema() -> Rc<Schema> {
    Schema::new("Book")
        .embeds_one(AssociationDefinition::<Author>::new("author"))
        .into_shared()
}

/// `User` embeds many `Project`s as `projects`.
pub fn user_schema() -> Rc<Schema> {
    Schema::new("User")
        .embeds_many(AssociationDefinition::<Project>::new("projects"))
        .into_shared()
}

pub fn existing_book() -> Document {
    Document::instantiate(
        &book_schema(),
        attrs(json!({"title": "My Life", "author": {"name": "Johny"}})),
    )
    .unwrap()
}

pub fn existing_user() -> Document {
    Document::instantiate(
        &user_schema(),
        attrs(json!({"name": "Rick", "projects": [{"title": "Genesis"}]})),
    )
    .unwrap()
}
