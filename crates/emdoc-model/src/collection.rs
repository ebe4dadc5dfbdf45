//! Read view over an [`EmbedsMany`] target.

use std::fmt;
use std::vec;

use crate::association::{Association, ConcatOutcome, EmbedsMany};
use crate::child::{AnyChild, Child};
use crate::embeddable::Embeddable;
use crate::error::AssociationResult;

/// What [`EmbedsMany::reader`](crate::Association::reader) returns.
///
/// Reads always reflect the current target; iteration walks a snapshot
/// taken when it starts, so children may be saved or destroyed while
/// iterating. Mutations go through the underlying association.
pub struct CollectionView<T> {
    association: EmbedsMany<T>,
}

impl<T> Clone for CollectionView<T> {
    fn clone(&self) -> Self {
        Self {
            association: self.association.clone(),
        }
    }
}

impl<T: Embeddable> CollectionView<T> {
    pub(crate) fn new(association: EmbedsMany<T>) -> Self {
        Self { association }
    }

    pub fn iter(&self) -> vec::IntoIter<Child<T>> {
        self.to_vec().into_iter()
    }

    pub fn len(&self) -> usize {
        self.to_vec().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<Child<T>> {
        self.to_vec().into_iter().next()
    }

    pub fn last(&self) -> Option<Child<T>> {
        self.to_vec().pop()
    }

    pub fn get(&self, index: usize) -> Option<Child<T>> {
        self.to_vec().into_iter().nth(index)
    }

    pub fn to_vec(&self) -> Vec<Child<T>> {
        self.association.target()
    }

    /// Append one child; see [`EmbedsMany::push`].
    pub fn push(&self, child: Child<T>) -> ConcatOutcome<T> {
        self.association.push(child)
    }

    /// Append children; see [`EmbedsMany::concat`].
    pub fn concat(&self, children: Vec<AnyChild>) -> AssociationResult<ConcatOutcome<T>> {
        self.association.concat(children)
    }

    /// Commit pending changes of the collection.
    pub fn save(&self) -> bool {
        self.association.apply_changes()
    }

    pub fn try_save(&self) -> AssociationResult<()> {
        self.association.try_apply_changes()
    }

    pub fn reload(&self) -> &Self {
        self.association.reload();
        self
    }

    pub fn clear(&self) -> bool {
        self.association.clear()
    }

    pub fn association(&self) -> &EmbedsMany<T> {
        &self.association
    }
}

impl<'a, T: Embeddable> IntoIterator for &'a CollectionView<T> {
    type Item = Child<T>;
    type IntoIter = vec::IntoIter<Child<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Embeddable + fmt::Debug> fmt::Debug for CollectionView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limit = self.association.owner().schema().config().inspect_limit;
        let entries = self.to_vec();
        let mut list = f.debug_list();
        list.entries(entries.iter().take(limit));
        if entries.len() > limit {
            list.entry(&format_args!("..."));
        }
        list.finish()
    }
}
