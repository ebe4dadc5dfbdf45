//! Validation and destruction failures reported by child entities.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single failed business rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// The attribute the rule applies to, if any.
    pub field: Option<String>,
    pub message: String,
}

impl Violation {
    pub fn on(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// A rule that does not belong to any single attribute.
    pub fn base(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field} {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// The set of violations produced by one validation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    /// Record a violation on `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(Violation::on(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.0.iter()
    }

    /// All messages recorded for `field`.
    pub fn on(&self, field: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|v| v.field.as_deref() == Some(field))
            .map(|v| v.message.as_str())
            .collect()
    }

    /// `Ok(())` when nothing was recorded, otherwise the violations themselves.
    pub fn into_result(self) -> Result<(), Violations> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, violation) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

impl FromIterator<Violation> for Violations {
    fn from_iter<I: IntoIterator<Item = Violation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A child refused to save because its own rules failed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("validation failed for {model}: {violations}")]
pub struct ValidationFailure {
    /// Type name of the child model.
    pub model: String,
    pub violations: Violations,
}

impl ValidationFailure {
    pub fn new(model: impl Into<String>, violations: Violations) -> Self {
        Self {
            model: model.into(),
            violations,
        }
    }
}

/// A host-level hook refused to let a child be destroyed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("destruction of {model} was vetoed")]
pub struct DestructionVeto {
    pub model: String,
}

impl DestructionVeto {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}
