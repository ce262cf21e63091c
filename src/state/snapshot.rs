//! Immutable topic snapshots.

use super::patch::{apply_op, is_noop, PatchOp};
use crate::error::PatchError;
use serde_json::Value;
use std::sync::Arc;

/// An immutable JSON document shared behind an `Arc`.
///
/// Applying patches never touches the receiver: the first effective
/// operation copies the document (`Arc::make_mut`), later ones edit the copy.
/// A batch of no-ops hands back the very same allocation, so
/// [`Snapshot::same`] is the change signal.
#[derive(Debug, Clone)]
pub struct Snapshot(Arc<Value>);

impl Snapshot {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    pub fn empty() -> Self {
        Self::new(Value::Null)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Identity comparison.
    pub fn same(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Produce the next snapshot. On error nothing is returned and the
    /// receiver is unchanged.
    pub fn apply(&self, ops: &[PatchOp]) -> Result<Snapshot, PatchError> {
        let mut next = Arc::clone(&self.0);
        for op in ops {
            if is_noop(&next, op) {
                continue;
            }
            apply_op(Arc::make_mut(&mut next), op)?;
        }
        Ok(Snapshot(next))
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}
