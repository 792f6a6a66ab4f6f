//! Stable-index storage
//!
//! Slot lists where an index, once assigned, stays valid for the life
//! of the list. Removal tombstones a slot in place instead of shifting
//! or reusing it.

mod list;

pub use list::{AllocError, SlotList};
