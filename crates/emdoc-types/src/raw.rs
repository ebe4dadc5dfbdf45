//! Serialized child data as stored on an owner.
//!
//! An owner keeps one [`RawValue`] per declared association. Single-child
//! associations store [`RawValue::Absent`] or [`RawValue::Record`];
//! multi-child associations store [`RawValue::List`]. The engine never reads
//! children back from anything but this value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// The serialized form of a single child: a JSON object.
pub type Record = serde_json::Map<String, Value>;

/// The inline representation of an association's persisted children.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// Nothing stored (JSON `null`).
    #[default]
    Absent,
    /// A single serialized child.
    Record(Record),
    /// An ordered list of serialized children.
    List(Vec<Record>),
}

impl RawValue {
    /// An empty list, the cleared state of a multi-child association.
    pub fn empty_list() -> Self {
        Self::List(Vec::new())
    }

    /// Returns `true` if nothing is stored.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns `true` if the value holds no records at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Absent => true,
            Self::Record(_) => false,
            Self::List(records) => records.is_empty(),
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Record]> {
        match self {
            Self::List(records) => Some(records),
            _ => None,
        }
    }

    /// Flatten into the records it holds, in stored order.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Absent => Vec::new(),
            Self::Record(record) => vec![record],
            Self::List(records) => records,
        }
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        match self {
            Self::Absent => 0,
            Self::Record(_) => 1,
            Self::List(records) => records.len(),
        }
    }
}

impl From<Record> for RawValue {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

impl From<Vec<Record>> for RawValue {
    fn from(records: Vec<Record>) -> Self {
        Self::List(records)
    }
}

impl From<Option<Record>> for RawValue {
    fn from(record: Option<Record>) -> Self {
        record.map_or(Self::Absent, Self::Record)
    }
}

impl From<RawValue> for Value {
    fn from(raw: RawValue) -> Self {
        match raw {
            RawValue::Absent => Value::Null,
            RawValue::Record(record) => Value::Object(record),
            RawValue::List(records) => {
                Value::Array(records.into_iter().map(Value::Object).collect())
            }
        }
    }
}

impl TryFrom<Value> for RawValue {
    type Error = TypeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Self::Absent),
            Value::Object(record) => Ok(Self::Record(record)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::Object(record) => Ok(record),
                    _ => Err(TypeError::NotARecordElement { index }),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            other => Err(TypeError::NotARecord(other.to_string())),
        }
    }
}
