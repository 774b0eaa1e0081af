//! Drag-reorder of blocks within a section.
//!
//! Drop targets are insertion indices in `0..=len`: index `i` means "before
//! the block currently at `i`", and `len` is the end-of-list sentinel.

use kila_types::BlockKey;

/// Final position of a block dragged from `from` and dropped at `to`.
///
/// Returns `None` when the drop would not move anything: dropping on itself
/// or on the slot right after itself. Out-of-range indices are rejected too.
pub fn plan_move(len: usize, from: usize, to: usize) -> Option<usize> {
    if from >= len || to > len {
        return None;
    }
    if to == from || to == from + 1 {
        return None;
    }
    Some(if to > from { to - 1 } else { to })
}

/// Move an element according to [`plan_move`]. Returns whether it moved.
pub fn apply_move<T>(items: &mut Vec<T>, from: usize, to: usize) -> bool {
    let Some(target) = plan_move(items.len(), from, to) else {
        return false;
    };
    let item = items.remove(from);
    items.insert(target, item);
    true
}

/// Transient drag state: what is being dragged and where it would land.
///
/// Purely visual; cleared on drag end or drop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DragTracker {
    dragging: Option<BlockKey>,
    drop_hint: Option<usize>,
}

impl DragTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, key: BlockKey) {
        self.dragging = Some(key);
        self.drop_hint = None;
    }

    /// Record the hovered drop index for insertion-point feedback.
    pub fn hover(&mut self, index: usize) {
        if self.dragging.is_some() {
            self.drop_hint = Some(index);
        }
    }

    pub fn dragging(&self) -> Option<BlockKey> {
        self.dragging
    }

    pub fn drop_hint(&self) -> Option<usize> {
        self.drop_hint
    }

    /// Clear all state, returning the dragged key if there was one.
    pub fn finish(&mut self) -> Option<BlockKey> {
        self.drop_hint = None;
        self.dragging.take()
    }
}
