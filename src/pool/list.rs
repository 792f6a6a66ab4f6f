//! Tombstoned slot list
//!
//! Indices are assigned at append time and never reassigned. Removing
//! a value leaves a tombstone in its slot; surrounding slots keep their
//! positions, so indices handed out to other components stay valid for
//! the life of the list.

use std::collections::TryReserveError;
use thiserror::Error;

/// Allocation failure while reserving slot storage
#[derive(Debug, Error)]
#[error("failed to reserve {requested} slots")]
pub struct AllocError {
    /// Number of elements the reservation asked for
    pub requested: usize,
    #[source]
    source: TryReserveError,
}

/// Growable list with stable indices and tombstoned removal
#[derive(Debug)]
pub struct SlotList<T> {
    slots: Vec<Option<T>>,
    /// Number of slots currently holding a value
    live: usize,
}

impl<T> SlotList<T> {
    /// Create an empty list with room for `capacity` slots
    pub fn with_capacity(capacity: usize) -> Result<Self, AllocError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|source| AllocError {
            requested: capacity,
            source,
        })?;
        Ok(Self { slots, live: 0 })
    }

    /// Append a value and return its permanent index
    pub fn push(&mut self, value: T) -> Result<usize, AllocError> {
        self.slots.try_reserve(1).map_err(|source| AllocError {
            requested: 1,
            source,
        })?;
        let index = self.slots.len();
        self.slots.push(Some(value));
        self.live += 1;
        Ok(index)
    }

    /// Get the value at `index`; `None` for tombstones and unknown indices
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Mutable access to the value at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Tombstone the slot at `index` and hand its value to the caller.
    ///
    /// The slot count is unchanged and no other slot moves; the index
    /// is never assigned to another value afterwards. Returns `None`
    /// when the slot is already a tombstone or was never assigned.
    pub fn take(&mut self, index: usize) -> Option<T> {
        let value = self.slots.get_mut(index)?.take()?;
        self.live -= 1;
        Some(value)
    }

    /// Total slot count, tombstones included
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots still holding a value
    pub fn live(&self) -> usize {
        self.live
    }

    /// Check whether no slot was ever assigned
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Iterate every slot in index order, tombstones as `None`
    pub fn iter(&self) -> impl Iterator<Item = Option<&T>> {
        self.slots.iter().map(Option::as_ref)
    }

    /// Iterate live values only, in index order
    pub fn iter_live(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }
}
